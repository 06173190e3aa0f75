use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audiorelay_foundation::{AudioError, AudioSettings};

use crate::frame_reader::{FrameReader, FrameSource};
use crate::ring_buffer::AudioProducer;

/// One fixed-size batch of interleaved samples, owned by the pump until
/// it is encoded.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub timestamp: Instant,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Negotiated device parameters, fixed for the session.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Effective interleaved frame size for one capture session.
///
/// A configured positive size wins; otherwise target ~20 ms of audio,
/// rounded up to a power of two and clamped to [256, 2048], per channel.
pub fn effective_buffer_size(configured: usize, sample_rate: u32, channels: u16) -> usize {
    if configured > 0 {
        return configured * channels as usize;
    }

    let target_samples = (sample_rate as f64 * 0.02) as usize;
    let mut size = 1usize;
    while size < target_samples {
        size <<= 1;
    }
    size = size.clamp(256, 2048);

    let result = size * channels as usize;
    tracing::debug!(
        "Auto-calculated buffer size: {} samples (from {} Hz, {} channels)",
        result,
        sample_rate,
        channels
    );
    result
}

/// Picks the stream configuration for a capture session, preferring the
/// requested rate and channel count when the device supports them.
pub fn negotiate_config(
    device: &cpal::Device,
    requested: &AudioSettings,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == requested.channels
                && range.min_sample_rate() <= requested.sample_rate
                && range.max_sample_rate() >= requested.sample_rate
            {
                return Ok((
                    StreamConfig {
                        channels: requested.channels,
                        sample_rate: requested.sample_rate,
                        buffer_size: BufferSize::Default,
                    },
                    range.sample_format(),
                ));
            }
        }
    }

    let default_config = device.default_input_config()?;
    tracing::warn!(
        "Device does not support {} Hz / {} ch, using device default {} Hz / {} ch",
        requested.sample_rate,
        requested.channels,
        default_config.sample_rate(),
        default_config.channels()
    );
    Ok((
        StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: BufferSize::Default,
        },
        default_config.sample_format(),
    ))
}

/// An open cpal input stream feeding the sample ring buffer. Dropping the
/// session closes the device.
pub struct CaptureSession {
    stream: Option<Stream>,
    device_config: DeviceConfig,
}

impl CaptureSession {
    pub fn open(
        device: &cpal::Device,
        config: StreamConfig,
        sample_format: SampleFormat,
        producer: AudioProducer,
        stream_failed: Arc<AtomicBool>,
    ) -> Result<Self, AudioError> {
        let device_config = DeviceConfig {
            sample_rate: config.sample_rate,
            channels: config.channels,
        };

        let stream = build_stream(device, config, sample_format, producer, stream_failed)?;
        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            device_config,
        })
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.device_config.clone()
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("Audio capture stream closed");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(
    device: &cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    producer: AudioProducer,
    stream_failed: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let producer = Arc::new(Mutex::new(producer));

    let err_fn = {
        let stream_failed = stream_failed.clone();
        move |err: cpal::StreamError| {
            tracing::error!("Audio stream error: {}", err);
            stream_failed.store(true, Ordering::SeqCst);
        }
    };

    // Common path once samples are i16.
    let handle_i16 = move |data: &[i16]| {
        let written = producer.lock().write(data);
        if written < data.len() {
            tracing::trace!("Ring buffer full, dropped {} samples", data.len() - written);
        }
    };

    // Conversion buffer lives on the audio thread; no allocation per callback.
    thread_local! {
        static CONVERT_BUFFER: std::cell::RefCell<Vec<i16>> = const { std::cell::RefCell::new(Vec::new()) };
    }

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &_| {
                handle_i16(data);
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        let clamped = s.clamp(-1.0, 1.0);
                        converted.push((clamped * 32767.0).round() as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        converted.push((s as i32 - 32768) as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    Ok(stream)
}

/// How long to wait for a complete frame before reporting a read error.
const READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Poll cadence while waiting on the ring buffer, a fraction of the
/// nominal 20 ms frame period.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The production `FrameSource`: blocks on the ring buffer until a full
/// frame arrives, surfacing device trouble as errors for the pump's
/// retry/backoff policy.
pub struct DeviceSource {
    reader: FrameReader,
    stream_failed: Arc<AtomicBool>,
}

impl DeviceSource {
    pub fn new(reader: FrameReader, stream_failed: Arc<AtomicBool>) -> Self {
        Self {
            reader,
            stream_failed,
        }
    }
}

impl FrameSource for DeviceSource {
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError> {
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            if self.stream_failed.swap(false, Ordering::SeqCst) {
                return Err(AudioError::StreamFailed);
            }
            if let Some(frame) = self.reader.try_read_frame() {
                return Ok(frame);
            }
            if Instant::now() >= deadline {
                return Err(AudioError::ReadTimeout {
                    timeout: READ_TIMEOUT,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
