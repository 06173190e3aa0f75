use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::broadcaster::Broadcaster;
use crate::client::{ClientId, StreamClient};

/// Most recent frames kept for replay to late-joining clients.
pub const BACKLOG_FRAMES: usize = 50;

/// Fan-out with a bounded backlog: every dispatched frame is also kept in
/// a FIFO of the last [`BACKLOG_FRAMES`] frames, and a newly connecting
/// client receives that backlog before it joins the live set.
pub struct BufferedBroadcaster {
    inner: Broadcaster,
    backlog: Mutex<VecDeque<Bytes>>,
}

impl BufferedBroadcaster {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Broadcaster::new(name),
            backlog: Mutex::new(VecDeque::with_capacity(BACKLOG_FRAMES)),
        }
    }

    /// Live fan-out first, then the frame goes into the backlog, evicting
    /// the oldest entry past capacity.
    pub fn dispatch(&self, frame: &Bytes) {
        self.inner.dispatch(frame);

        let mut backlog = self.backlog.lock();
        backlog.push_back(frame.clone());
        if backlog.len() > BACKLOG_FRAMES {
            backlog.pop_front();
        }
    }

    /// Replays the current backlog, oldest first, into the client's queue,
    /// then adds it to the live set so it picks up with the next dispatch.
    pub fn register(&self, client: StreamClient) {
        let replay: Vec<Bytes> = self.backlog.lock().iter().cloned().collect();
        for frame in replay {
            if !client.send(frame) {
                tracing::warn!(
                    "Client {} queue filled during backlog replay",
                    client.id
                );
                break;
            }
        }
        self.inner.register(client);
    }

    pub fn remove(&self, id: ClientId) {
        self.inner.remove(id);
    }

    pub fn unregister_all(&self) {
        self.inner.unregister_all();
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }
}
