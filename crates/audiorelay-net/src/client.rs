use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Frames queued per raw-stream client before it counts as too slow
/// (roughly half a second of 20 ms frames).
pub const RAW_CLIENT_QUEUE: usize = 32;
/// WAV clients need headroom for a full backlog replay on connect.
pub const WAV_CLIENT_QUEUE: usize = 128;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity; membership and removal key on this
/// rather than on the connection object itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One attached consumer: the broadcaster-facing end of the connection.
/// The transport side drains the paired receiver under its own deadline.
pub struct StreamClient {
    pub id: ClientId,
    pub addr: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl StreamClient {
    pub fn new(addr: SocketAddr, queue_depth: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (
            Self {
                id: ClientId::next(),
                addr,
                tx,
            },
            rx,
        )
    }

    /// Non-blocking enqueue. False means the client is gone or its queue is
    /// full, either way it is due for removal.
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let (a, _rx_a) = StreamClient::new(test_addr(), 4);
        let (b, _rx_b) = StreamClient::new(test_addr(), 4);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn send_fails_once_queue_is_full() {
        let (client, _rx) = StreamClient::new(test_addr(), 2);
        assert!(client.send(Bytes::from_static(b"a")));
        assert!(client.send(Bytes::from_static(b"b")));
        assert!(!client.send(Bytes::from_static(b"c")));
    }

    #[test]
    fn send_fails_after_receiver_drops() {
        let (client, rx) = StreamClient::new(test_addr(), 2);
        drop(rx);
        assert!(!client.send(Bytes::from_static(b"a")));
    }
}
