use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use voice_bridge::recording::{EncoderFactory, FfmpegEncoderFactory, WavEncoderFactory};
use voice_bridge::store::FsObjectStore;
use voice_bridge::{create_router, AppState, Config, MemoryStore, RelayContext};

#[derive(Debug, Parser)]
#[command(name = "voice-bridge", about = "Telephony ↔ speech-backend call bridge")]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/voice-bridge")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Arc::new(Config::load(&args.config)?);

    info!("voice-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("service: {}", cfg.service.name);
    info!("speech backend: {}", cfg.backend.url);

    let encoders: Arc<dyn EncoderFactory> = match cfg.recording.encoder.as_str() {
        "ffmpeg" => Arc::new(FfmpegEncoderFactory {
            sample_rate: cfg.recording.encoder_sample_rate,
        }),
        _ => Arc::new(WavEncoderFactory {
            sample_rate: cfg.recording.encoder_sample_rate,
        }),
    };

    let relay = RelayContext {
        config: cfg.clone(),
        store: Arc::new(MemoryStore::new()),
        objects: Arc::new(FsObjectStore::new(cfg.recording.artifact_dir.clone())?),
        encoders,
    };

    let addr = format!("{}:{}", cfg.service.bind, cfg.service.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", addr);

    axum::serve(listener, create_router(AppState::new(relay)))
        .await
        .context("server error")?;

    Ok(())
}
