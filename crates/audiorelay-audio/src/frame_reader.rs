use std::time::Instant;

use audiorelay_foundation::AudioError;

use crate::capture::{AudioFrame, DeviceConfig};
use crate::ring_buffer::AudioConsumer;

/// Blocking source of fixed-size capture frames, the seam between the
/// capture pump and whatever produces samples.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError>;
}

/// Assembles whole interleaved frames out of the sample ring buffer.
pub struct FrameReader {
    consumer: AudioConsumer,
    device_config: DeviceConfig,
    frame_len: usize,
}

impl FrameReader {
    pub fn new(consumer: AudioConsumer, device_config: DeviceConfig, frame_len: usize) -> Self {
        Self {
            consumer,
            device_config,
            frame_len,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Returns the next complete frame, or `None` when the buffer does not
    /// yet hold one.
    pub fn try_read_frame(&mut self) -> Option<AudioFrame> {
        if self.consumer.slots() < self.frame_len {
            return None;
        }
        let mut samples = vec![0i16; self.frame_len];
        if !self.consumer.read_exact(&mut samples) {
            return None;
        }
        Some(AudioFrame {
            samples,
            timestamp: Instant::now(),
            sample_rate: self.device_config.sample_rate,
            channels: self.device_config.channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;

    fn reader_with_producer(frame_len: usize) -> (crate::ring_buffer::AudioProducer, FrameReader) {
        let (prod, cons) = AudioRingBuffer::new(frame_len * 4).split();
        let cfg = DeviceConfig {
            sample_rate: 48_000,
            channels: 2,
        };
        (prod, FrameReader::new(cons, cfg, frame_len))
    }

    #[test]
    fn no_frame_until_enough_samples() {
        let (mut prod, mut reader) = reader_with_producer(8);
        prod.write(&[1i16; 7]);
        assert!(reader.try_read_frame().is_none());
        prod.write(&[2i16; 1]);
        let frame = reader.try_read_frame().expect("frame should be complete");
        assert_eq!(frame.samples.len(), 8);
        assert_eq!(frame.sample_rate, 48_000);
        assert_eq!(frame.channels, 2);
    }

    #[test]
    fn frames_come_out_in_capture_order() {
        let (mut prod, mut reader) = reader_with_producer(4);
        prod.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(reader.try_read_frame().unwrap().samples, vec![1, 2, 3, 4]);
        assert_eq!(reader.try_read_frame().unwrap().samples, vec![5, 6, 7, 8]);
        assert!(reader.try_read_frame().is_none());
    }
}
