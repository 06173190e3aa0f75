pub mod capture;
pub mod detector;
pub mod device;
pub mod encoder;
pub mod frame_reader;
pub mod processor;
pub mod pump;
pub mod ring_buffer;
pub mod stats;

pub use capture::{
    effective_buffer_size, negotiate_config, AudioFrame, CaptureSession, DeviceConfig,
    DeviceSource,
};
pub use detector::{SilenceDetector, SilenceGate};
pub use device::{DeviceInfo, DeviceManager};
pub use encoder::encode_frame;
pub use frame_reader::{FrameReader, FrameSource};
pub use processor::SignalProcessor;
pub use pump::{FrameSink, PumpThread, RelayPump};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
pub use stats::{CaptureStats, StatsSnapshot};
