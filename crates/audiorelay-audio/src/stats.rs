use parking_lot::RwLock;

/// Point-in-time view of the capture counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub bytes_sent: u64,
    pub silent_frames: u64,
}

/// Cumulative pipeline counters. Written only by the capture pump, behind
/// a lock of their own so status readers never contend with fan-out.
#[derive(Debug, Default)]
pub struct CaptureStats {
    inner: RwLock<StatsSnapshot>,
}

impl CaptureStats {
    pub fn record_frame(&self) {
        self.inner.write().frames += 1;
    }

    pub fn record_silent_frame(&self) {
        self.inner.write().silent_frames += 1;
    }

    pub fn record_bytes(&self, count: usize) {
        self.inner.write().bytes_sent += count as u64;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CaptureStats::default();
        stats.record_frame();
        stats.record_frame();
        stats.record_silent_frame();
        stats.record_bytes(4096);
        stats.record_bytes(4096);

        let snap = stats.snapshot();
        assert_eq!(snap.frames, 2);
        assert_eq!(snap.silent_frames, 1);
        assert_eq!(snap.bytes_sent, 8192);
    }
}
