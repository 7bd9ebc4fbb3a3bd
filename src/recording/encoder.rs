use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::warn;

/// Byte-stream sink in front of a streaming encoder.
///
/// `write` suspends when the encoder cannot accept more input; the
/// recording drain task is the only caller, so backpressure never reaches
/// the relay path.
#[async_trait]
pub trait EncoderSink: Send {
    /// Append raw PCM (16-bit LE mono) to the encoder input.
    async fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Path of the artifact this sink produces.
    fn artifact_path(&self) -> &Path;

    /// Close the input and wait for the encoder, bounded by `timeout`.
    /// Exceeding the bound force-finalizes: the encoder is killed and
    /// whatever was written so far stands as the artifact.
    async fn finish(self: Box<Self>, timeout: Duration) -> Result<()>;
}

pub trait EncoderFactory: Send + Sync {
    fn create(&self, work_dir: &Path, session_id: &str) -> Result<Box<dyn EncoderSink>>;
}

// ============================================================================
// WAV sink (in-process)
// ============================================================================

/// WAV writer sink, used when no external encoder is configured.
pub struct WavEncoder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl WavEncoder {
    pub fn create(path: PathBuf, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
            path,
        })
    }
}

#[async_trait]
impl EncoderSink for WavEncoder {
    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().context("WAV writer already closed")?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .context("failed to write sample to WAV")?;
        }
        Ok(())
    }

    fn artifact_path(&self) -> &Path {
        &self.path
    }

    async fn finish(mut self: Box<Self>, _timeout: Duration) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("failed to finalize WAV file")?;
        }
        Ok(())
    }
}

impl Drop for WavEncoder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

pub struct WavEncoderFactory {
    pub sample_rate: u32,
}

impl EncoderFactory for WavEncoderFactory {
    fn create(&self, work_dir: &Path, session_id: &str) -> Result<Box<dyn EncoderSink>> {
        let path = work_dir.join(format!("{session_id}.wav"));
        Ok(Box::new(WavEncoder::create(path, self.sample_rate)?))
    }
}

// ============================================================================
// ffmpeg sink (external process)
// ============================================================================

/// External `ffmpeg` process fed through piped stdin. Pipe capacity is the
/// backpressure signal: `write_all` suspends when the encoder falls behind.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
}

impl FfmpegEncoder {
    pub fn spawn(path: PathBuf, sample_rate: u32) -> Result<Self> {
        let rate = sample_rate.to_string();
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "s16le", "-ar", rate.as_str(), "-ac", "1"])
            .args(["-i", "pipe:0"])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn ffmpeg")?;

        let stdin = child.stdin.take();

        Ok(Self { child, stdin, path })
    }
}

#[async_trait]
impl EncoderSink for FfmpegEncoder {
    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        self.stdin
            .as_mut()
            .context("encoder input already closed")?
            .write_all(pcm)
            .await
            .context("failed to write to encoder")
    }

    fn artifact_path(&self) -> &Path {
        &self.path
    }

    async fn finish(mut self: Box<Self>, timeout: Duration) -> Result<()> {
        // Closing stdin signals end-of-input
        drop(self.stdin.take());

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                warn!("ffmpeg exited with {status}");
                Ok(())
            }
            Ok(Err(e)) => Err(e).context("failed to wait for ffmpeg"),
            Err(_) => {
                warn!("ffmpeg did not exit within {:?}, killing", timeout);
                self.child.kill().await.ok();
                Ok(())
            }
        }
    }
}

pub struct FfmpegEncoderFactory {
    pub sample_rate: u32,
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, work_dir: &Path, session_id: &str) -> Result<Box<dyn EncoderSink>> {
        let path = work_dir.join(format!("{session_id}.mp3"));
        Ok(Box::new(FfmpegEncoder::spawn(path, self.sample_rate)?))
    }
}
