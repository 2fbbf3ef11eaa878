//! Локальный синтез через piper
//!
//! Резервный провайдер без учетных данных: текст подается на stdin, WAV
//! забирается из файла. Выравнивания нет.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{RenderError, Result};
use crate::media::AudioFormat;
use crate::tts::{ChunkAudio, TtsProvider};
use crate::utils::truncate_output;

/// Локальный piper провайдер
pub struct PiperProvider {
    binary: PathBuf,
    model: String,
}

impl PiperProvider {
    pub fn new(model: String) -> Result<Self> {
        let binary = which::which("piper")
            .map_err(|_| RenderError::ToolNotInstalled("piper".to_string()))?;
        Ok(Self { binary, model })
    }
}

#[async_trait]
impl TtsProvider for PiperProvider {
    async fn synthesize_chunk(&self, text: &str) -> Result<ChunkAudio> {
        let output_file = tempfile::Builder::new()
            .prefix("piper_")
            .suffix(".wav")
            .tempfile()?;

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(output_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::TtsGeneration(format!(
                "piper failed with {}: {}",
                output.status,
                truncate_output(&stderr, 300)
            )));
        }

        let bytes = tokio::fs::read(output_file.path()).await?;
        if bytes.is_empty() {
            return Err(RenderError::TtsGeneration(
                "piper produced an empty audio file".to_string(),
            ));
        }

        Ok(ChunkAudio {
            bytes,
            format: AudioFormat::Wav,
            alignment: None,
        })
    }

    fn name(&self) -> &'static str {
        "piper"
    }
}
