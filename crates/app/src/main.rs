use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use audiorelay_audio::{
    effective_buffer_size, negotiate_config, AudioRingBuffer, CaptureSession, CaptureStats,
    DeviceManager, DeviceSource, FrameReader, FrameSink, PumpThread, RelayPump,
};
use audiorelay_foundation::{
    CaptureState, RelayConfig, ShutdownHandler, StateManager,
};
use audiorelay_net::{Broadcaster, BufferedBroadcaster, HttpServer, HttpState, TcpServer};

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "audiorelay.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    tracing::info!("Starting AudioRelay service");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "audiorelay.toml".to_string());
    let config = RelayConfig::load(Path::new(&config_path))?;

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install();

    state_manager.transition(CaptureState::Initializing)?;

    // --- Device & capture stream ---
    let device_manager = DeviceManager::new();
    tracing::info!("Audio host: {:?}", device_manager.host_id());
    let device = device_manager.select(&config.audio)?;
    let (stream_config, sample_format) = negotiate_config(&device, &config.audio)?;

    let frame_len = effective_buffer_size(
        config.audio.buffer_size,
        stream_config.sample_rate,
        stream_config.channels,
    );
    let ring = AudioRingBuffer::new(frame_len * 16);
    let (producer, consumer) = ring.split();
    let stream_failed = Arc::new(AtomicBool::new(false));

    let mut session = CaptureSession::open(
        &device,
        stream_config,
        sample_format,
        producer,
        stream_failed.clone(),
    )?;
    let device_config = session.device_config();
    tracing::info!(
        "Audio capture initialized: {} Hz, {} channels, buffer {} samples",
        device_config.sample_rate,
        device_config.channels,
        frame_len
    );

    // --- Broadcasters & capture pump ---
    let stats = Arc::new(CaptureStats::default());
    let tcp_broadcaster = Arc::new(Broadcaster::new("tcp"));
    let wav_broadcaster = Arc::new(BufferedBroadcaster::new("wav"));

    // Every encoded frame fans out to both transports.
    let sink: FrameSink = {
        let tcp = tcp_broadcaster.clone();
        let wav = wav_broadcaster.clone();
        let tcp_enabled = config.protocols.tcp.enabled;
        let http_enabled = config.protocols.http.enabled;
        Arc::new(move |frame: Bytes| {
            if tcp_enabled {
                tcp.dispatch(&frame);
            }
            if http_enabled {
                wav.dispatch(&frame);
            }
        })
    };

    let reader = FrameReader::new(consumer, device_config.clone(), frame_len);
    let source = DeviceSource::new(reader, stream_failed);
    let pump = RelayPump::new(source, &config.processing, frame_len, stats.clone(), sink);
    let pump_thread = PumpThread::spawn(pump)?;

    // --- Protocol servers ---
    let mut server_handles = Vec::new();
    if config.protocols.tcp.enabled {
        let server = TcpServer::new(config.server.tcp_port, tcp_broadcaster.clone());
        server_handles.push(server.start(shutdown.clone()).await?);
    }
    if config.protocols.http.enabled {
        let state = HttpState {
            broadcaster: wav_broadcaster.clone(),
            stats: stats.clone(),
            processing: config.processing.clone(),
            device: device_config.clone(),
            configured_buffer_size: config.audio.buffer_size,
            actual_buffer_size: frame_len,
            capture_running: pump_thread.running_handle(),
            started: std::time::Instant::now(),
        };
        let server = HttpServer::new(config.server.http_port, state);
        server_handles.push(server.start(shutdown.clone()).await?);
    }

    state_manager.transition(CaptureState::Capturing)?;
    tracing::info!("AudioRelay service started");

    // --- Run until ctrl-c ---
    let mut waiter = shutdown.clone();
    waiter.wait().await;

    tracing::info!("Shutting down AudioRelay service...");
    pump_thread.stop();
    session.stop();
    for handle in server_handles {
        let _ = handle.await;
    }
    state_manager.transition(CaptureState::Stopped)?;
    tracing::info!("AudioRelay service stopped");
    Ok(())
}
