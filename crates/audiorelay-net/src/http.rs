use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use audiorelay_audio::{CaptureStats, DeviceConfig};
use audiorelay_foundation::{AppError, ProcessingConfig, ShutdownToken};

use crate::buffered::{BufferedBroadcaster, BACKLOG_FRAMES};
use crate::client::{StreamClient, WAV_CLIENT_QUEUE};
use crate::wav::streaming_wav_header;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub broadcaster: Arc<BufferedBroadcaster>,
    pub stats: Arc<CaptureStats>,
    pub processing: ProcessingConfig,
    pub device: DeviceConfig,
    pub configured_buffer_size: usize,
    pub actual_buffer_size: usize,
    pub capture_running: Arc<AtomicBool>,
    pub started: Instant,
}

/// HTTP/WAV transport plus the status endpoints.
pub struct HttpServer {
    port: u16,
    state: HttpState,
}

impl HttpServer {
    pub fn new(port: u16, state: HttpState) -> Self {
        Self { port, state }
    }

    pub async fn start(&self, shutdown: ShutdownToken) -> Result<JoinHandle<()>, AppError> {
        let app = Router::new()
            .route("/", get(index))
            .route("/stream.wav", get(stream_wav))
            .route("/status", get(status))
            .route("/debug", get(debug))
            .with_state(self.state.clone());

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| AppError::Net(format!("failed to bind HTTP port {}: {}", self.port, e)))?;
        tracing::info!(
            "HTTP server listening on http://0.0.0.0:{}/stream.wav",
            self.port
        );

        // Closing every live stream is what lets graceful shutdown finish:
        // dropping the senders ends the response bodies.
        let broadcaster = self.state.broadcaster.clone();
        let mut stream_closer = shutdown.clone();
        tokio::spawn(async move {
            stream_closer.wait().await;
            broadcaster.unregister_all();
        });

        let mut server_shutdown = shutdown;
        Ok(tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                server_shutdown.wait().await;
            });
            if let Err(e) = serve.await {
                tracing::error!("HTTP server error: {}", e);
            }
            tracing::info!("HTTP server stopped");
        }))
    }
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

/// One WAV stream per connection: header, then the recent backlog, then
/// live frames until the client goes away.
async fn stream_wav(
    State(state): State<HttpState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    tracing::info!("WAV stream connected: {}", addr);

    let (client, rx) = StreamClient::new(addr, WAV_CLIENT_QUEUE);
    let header_frame = streaming_wav_header(state.device.sample_rate, state.device.channels);
    client.send(header_frame);
    state.broadcaster.register(client);

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response()
}

async fn status(State(state): State<HttpState>) -> impl IntoResponse {
    let snap = state.stats.snapshot();
    let capture = if state.capture_running.load(Ordering::SeqCst) {
        "running"
    } else {
        "stopped"
    };
    let payload = json!({
        "status": capture,
        "clients": state.broadcaster.count(),
        "sample_rate": state.device.sample_rate,
        "channels": state.device.channels,
        "buffer_size": state.configured_buffer_size,
        "actual_buffer_size": state.actual_buffer_size,
        "frames": snap.frames,
        "bytes_sent": snap.bytes_sent,
        "silent_frames": snap.silent_frames,
        "processing": {
            "silence_detection": state.processing.silence_detection,
            "silence_threshold": state.processing.silence_threshold,
            "volume_multiplier": state.processing.volume_multiplier,
        },
        "timestamp": chrono::Utc::now().timestamp(),
        "server_uptime": state.started.elapsed().as_secs_f64(),
    });
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(payload),
    )
}

async fn debug(State(state): State<HttpState>) -> impl IntoResponse {
    let payload = json!({
        "clients": state.broadcaster.count(),
        "buffers": {
            "audio_history_frames": state.broadcaster.backlog_len(),
            "audio_history_max": BACKLOG_FRAMES,
            "config_buffer_size": state.configured_buffer_size,
            "actual_buffer_size": state.actual_buffer_size,
        },
        "audio_config": {
            "sample_rate": state.device.sample_rate,
            "channels": state.device.channels,
        },
        "processing": {
            "silence_detection": state.processing.silence_detection,
            "silence_threshold": state.processing.silence_threshold,
        },
    });
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(payload),
    )
}
