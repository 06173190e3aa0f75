pub mod broadcaster;
pub mod buffered;
pub mod client;
pub mod http;
pub mod tcp;
pub mod wav;

pub use broadcaster::Broadcaster;
pub use buffered::{BufferedBroadcaster, BACKLOG_FRAMES};
pub use client::{ClientId, StreamClient, RAW_CLIENT_QUEUE, WAV_CLIENT_QUEUE};
pub use http::{HttpServer, HttpState};
pub use tcp::TcpServer;
pub use wav::{streaming_wav_header, WAV_HEADER_LEN};
