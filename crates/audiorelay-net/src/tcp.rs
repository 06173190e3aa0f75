use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time;

use audiorelay_foundation::{AppError, ShutdownToken};

use crate::broadcaster::Broadcaster;
use crate::client::{StreamClient, RAW_CLIENT_QUEUE};

/// A write that has not completed within this window marks the client dead.
const WRITE_DEADLINE: Duration = Duration::from_secs(2);

/// Raw-stream transport: every accepted connection receives the
/// undelimited concatenation of encoded frames.
pub struct TcpServer {
    port: u16,
    broadcaster: Arc<Broadcaster>,
}

impl TcpServer {
    pub fn new(port: u16, broadcaster: Arc<Broadcaster>) -> Self {
        Self { port, broadcaster }
    }

    pub async fn start(&self, mut shutdown: ShutdownToken) -> Result<JoinHandle<()>, AppError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| AppError::Net(format!("failed to bind TCP port {}: {}", self.port, e)))?;
        tracing::info!("TCP server listening on tcp://0.0.0.0:{}", self.port);

        let broadcaster = self.broadcaster.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, addr)) => {
                                spawn_client_writer(socket, addr, broadcaster.clone());
                            }
                            Err(e) => {
                                tracing::warn!("TCP accept error: {}", e);
                            }
                        }
                    }
                }
            }
            broadcaster.unregister_all();
            tracing::info!("TCP server stopped");
        }))
    }
}

/// Registers the connection and drains its frame queue onto the socket.
/// Any write error or deadline overrun ends the task and removes the
/// client; delivery to other clients is never affected.
fn spawn_client_writer(mut socket: TcpStream, addr: SocketAddr, broadcaster: Arc<Broadcaster>) {
    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!("set_nodelay failed for {}: {}", addr, e);
    }

    let (client, mut rx) = StreamClient::new(addr, RAW_CLIENT_QUEUE);
    let id = client.id;
    broadcaster.register(client);

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match time::timeout(WRITE_DEADLINE, socket.write_all(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!("Write to {} failed: {}", addr, e);
                    break;
                }
                Err(_) => {
                    tracing::debug!("Write to {} exceeded {:?} deadline", addr, WRITE_DEADLINE);
                    break;
                }
            }
        }
        broadcaster.remove(id);
    });
}
