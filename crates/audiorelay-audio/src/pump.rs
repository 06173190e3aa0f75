use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;

use audiorelay_foundation::{AudioError, ProcessingConfig};

use crate::detector::{SilenceDetector, SilenceGate};
use crate::encoder::encode_frame;
use crate::frame_reader::FrameSource;
use crate::processor::SignalProcessor;
use crate::stats::CaptureStats;

/// Receives every encoded frame the pump produces. Implementations must
/// only enqueue; a slow consumer is never allowed to pace the pump.
pub type FrameSink = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Backoff between retries after a device read error.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);
/// Consecutive read errors tolerated before the session is abandoned.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;
/// Cadence of the human-readable status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// The capture loop: read, throttle, condition, encode, dispatch.
pub struct RelayPump<S: FrameSource> {
    source: S,
    processor: SignalProcessor,
    detector: SilenceDetector,
    gate: SilenceGate,
    silence_detection: bool,
    buffer_size: usize,
    stats: Arc<CaptureStats>,
    sink: FrameSink,
}

impl<S: FrameSource> RelayPump<S> {
    pub fn new(
        source: S,
        params: &ProcessingConfig,
        buffer_size: usize,
        stats: Arc<CaptureStats>,
        sink: FrameSink,
    ) -> Self {
        Self {
            source,
            processor: SignalProcessor::new(params),
            detector: SilenceDetector::new(params.silence_threshold),
            gate: SilenceGate::new(),
            silence_detection: params.silence_detection,
            buffer_size,
            stats,
            sink,
        }
    }

    /// Runs until `running` clears or the device fails fatally. Transient
    /// read errors are retried with a short backoff; too many in a row end
    /// the session, which must then be restarted externally.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), AudioError> {
        tracing::info!("Capture pump started (buffer {} samples)", self.buffer_size);

        let mut consecutive_errors = 0u32;
        let mut last_status = Instant::now();
        let mut bytes_since_status = 0usize;

        while running.load(Ordering::SeqCst) {
            let frame = match self.source.read_frame() {
                Ok(frame) => {
                    consecutive_errors = 0;
                    frame
                }
                Err(e) if !e.is_transient() => {
                    tracing::error!("Unrecoverable audio read error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        "Audio read error ({} consecutive): {}",
                        consecutive_errors,
                        e
                    );
                    if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        tracing::error!("Too many consecutive errors, stopping audio capture");
                        return Err(AudioError::Fatal(format!(
                            "capture abandoned after {} consecutive read errors",
                            consecutive_errors
                        )));
                    }
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };

            self.stats.record_frame();

            let mut suppressed = false;
            if self.silence_detection {
                let silent = self.detector.is_silent(&frame.samples);
                if silent {
                    self.stats.record_silent_frame();
                }
                suppressed = self.gate.observe(silent);
            }

            // During extended silence the frame is counted but nothing is
            // encoded or sent; the wire simply stalls until audio resumes.
            if !suppressed {
                let processed = self.processor.process(&frame.samples);
                let encoded = encode_frame(&processed);
                self.stats.record_bytes(encoded.len());
                bytes_since_status += encoded.len();
                (self.sink)(encoded);
            }

            if last_status.elapsed() >= STATUS_INTERVAL {
                self.log_status(bytes_since_status, last_status.elapsed());
                bytes_since_status = 0;
                last_status = Instant::now();
            }
        }

        tracing::info!("Capture pump stopped");
        Ok(())
    }

    fn log_status(&self, bytes: usize, elapsed: Duration) {
        let snap = self.stats.snapshot();
        let rate_kbs = bytes as f64 / elapsed.as_secs_f64() / 1024.0;
        let total_mb = snap.bytes_sent as f64 / 1024.0 / 1024.0;
        let state = if self.silence_detection && self.gate.consecutive() > 0 {
            "silent"
        } else {
            "streaming"
        };

        if self.silence_detection {
            let silence_percent = if snap.frames > 0 {
                snap.silent_frames as f64 / snap.frames as f64 * 100.0
            } else {
                0.0
            };
            tracing::info!(
                "Audio status: {} | frames: {} | buffer: {} | total: {:.1} MB | rate: {:.1} KB/s | silence: {:.1}%",
                state,
                snap.frames,
                self.buffer_size,
                total_mb,
                rate_kbs,
                silence_percent
            );
        } else {
            tracing::info!(
                "Audio status: {} | frames: {} | buffer: {} | total: {:.1} MB | rate: {:.1} KB/s",
                state,
                snap.frames,
                self.buffer_size,
                total_mb,
                rate_kbs
            );
        }
    }
}

/// Handle to the dedicated pump thread.
pub struct PumpThread {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl PumpThread {
    pub fn spawn<S: FrameSource + 'static>(mut pump: RelayPump<S>) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_flag = running.clone();
        let handle = thread::Builder::new()
            .name("audio-pump".to_string())
            .spawn(move || {
                if let Err(e) = pump.run(&thread_flag) {
                    tracing::error!("Capture session failed: {}", e);
                    thread_flag.store(false, Ordering::SeqCst);
                }
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn pump thread: {}", e)))?;
        Ok(Self { handle, running })
    }

    /// Cleared by `stop()` or by a fatal capture error; status reporting
    /// reads it to tell "running" from "stopped".
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Signals the loop and waits for the in-flight cycle to finish.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::AudioFrame;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Feeds a script of read results, then clears the running flag so the
    /// pump winds down on its own.
    struct ScriptedSource {
        script: VecDeque<Result<Vec<i16>, AudioError>>,
        running: Arc<AtomicBool>,
        reads: Arc<Mutex<u32>>,
    }

    impl ScriptedSource {
        fn new(
            script: Vec<Result<Vec<i16>, AudioError>>,
            running: Arc<AtomicBool>,
        ) -> (Self, Arc<Mutex<u32>>) {
            let reads = Arc::new(Mutex::new(0));
            (
                Self {
                    script: script.into(),
                    running,
                    reads: reads.clone(),
                },
                reads,
            )
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<AudioFrame, AudioError> {
            *self.reads.lock() += 1;
            match self.script.pop_front() {
                Some(Ok(samples)) => Ok(AudioFrame {
                    samples,
                    timestamp: Instant::now(),
                    sample_rate: 48_000,
                    channels: 2,
                }),
                Some(Err(e)) => Err(e),
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    Err(AudioError::StreamFailed)
                }
            }
        }
    }

    fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<Bytes>>>) {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let inner = collected.clone();
        let sink: FrameSink = Arc::new(move |frame| inner.lock().push(frame));
        (sink, collected)
    }

    fn params(silence_detection: bool) -> ProcessingConfig {
        ProcessingConfig {
            silence_detection,
            silence_threshold: 1000,
            volume_multiplier: 1.0,
            clip_threshold: 28_000,
        }
    }

    #[test]
    fn frames_are_processed_encoded_and_dispatched() {
        let running = Arc::new(AtomicBool::new(true));
        let script = vec![Ok(vec![1i16, -1, 2, -2]), Ok(vec![3, -3, 4, -4])];
        let (source, _) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(false), 4, stats.clone(), sink);
        pump.run(&running).unwrap();

        let frames = collected.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &[1, 0, 0xFF, 0xFF, 2, 0, 0xFE, 0xFF]);

        let snap = stats.snapshot();
        assert_eq!(snap.frames, 2);
        assert_eq!(snap.bytes_sent, 16);
        assert_eq!(snap.silent_frames, 0);
    }

    #[test]
    fn extended_silence_suppresses_dispatch_but_not_counters() {
        let running = Arc::new(AtomicBool::new(true));
        let script: Vec<_> = (0..40).map(|_| Ok(vec![0i16; 8])).collect();
        let (source, _) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(true), 8, stats.clone(), sink);
        pump.run(&running).unwrap();

        // The first 30 silent frames still stream; from the 31st on, nothing.
        assert_eq!(collected.lock().len(), 30);

        let snap = stats.snapshot();
        assert_eq!(snap.frames, 40);
        assert_eq!(snap.silent_frames, 40);
        assert_eq!(snap.bytes_sent, 30 * 16);
    }

    #[test]
    fn activity_after_silence_resumes_immediately() {
        let running = Arc::new(AtomicBool::new(true));
        let mut script: Vec<_> = (0..35).map(|_| Ok(vec![0i16; 4])).collect();
        script.push(Ok(vec![5000i16, 0, 0, 0]));
        script.push(Ok(vec![0i16; 4]));
        let (source, _) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(true), 4, stats.clone(), sink);
        pump.run(&running).unwrap();

        // 30 leading silent frames, the loud frame, and the single silent
        // frame after it (the gate restarts counting from zero).
        assert_eq!(collected.lock().len(), 32);
        assert_eq!(stats.snapshot().silent_frames, 36);
    }

    #[test]
    fn transient_errors_are_retried() {
        let running = Arc::new(AtomicBool::new(true));
        let script = vec![
            Err(AudioError::StreamFailed),
            Err(AudioError::StreamFailed),
            Ok(vec![7i16, 7, 7, 7]),
        ];
        let (source, reads) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(false), 4, stats.clone(), sink);
        pump.run(&running).unwrap();

        assert_eq!(collected.lock().len(), 1);
        assert_eq!(stats.snapshot().frames, 1);
        // Two failures, the good frame, then the end-of-script read.
        assert_eq!(*reads.lock(), 4);
    }

    #[test]
    fn persistent_errors_become_fatal() {
        let running = Arc::new(AtomicBool::new(true));
        let script: Vec<_> = (0..20).map(|_| Err(AudioError::StreamFailed)).collect();
        let (source, reads) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(false), 4, stats.clone(), sink);
        let result = pump.run(&running);

        assert!(matches!(result, Err(AudioError::Fatal(_))));
        // Gives up once the error count exceeds the tolerance: 11 reads.
        assert_eq!(*reads.lock(), 11);
        assert!(collected.lock().is_empty());
        assert_eq!(stats.snapshot().frames, 0);
    }

    #[test]
    fn a_good_frame_resets_the_error_count() {
        let running = Arc::new(AtomicBool::new(true));
        let mut script: Vec<Result<Vec<i16>, AudioError>> =
            (0..9).map(|_| Err(AudioError::StreamFailed)).collect();
        script.push(Ok(vec![1i16; 4]));
        for _ in 0..9 {
            script.push(Err(AudioError::StreamFailed));
        }
        script.push(Ok(vec![2i16; 4]));
        let (source, _) = ScriptedSource::new(script, running.clone());
        let stats = Arc::new(CaptureStats::default());
        let (sink, collected) = collecting_sink();

        let mut pump = RelayPump::new(source, &params(false), 4, stats.clone(), sink);
        pump.run(&running).unwrap();

        assert_eq!(collected.lock().len(), 2);
        assert_eq!(stats.snapshot().frames, 2);
    }
}
