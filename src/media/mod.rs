//! Работа с медиафайлами через внешний кодировщик

pub mod concat;
pub mod ffmpeg;
pub mod mixer;
pub mod video;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::probe;

/// Формат аудиофайла
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// Несжатый WAV
    Wav,
    /// MP3
    Mp3,
    /// AAC в контейнере MP4
    M4a,
}

impl AudioFormat {
    /// Расширение файла
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
        }
    }
}

/// Аудиофайл с измеренной длительностью.
///
/// Длительность всегда получена измерением (§probe), не доверием метаданным
/// провайдера. Значение неизменяемо; операции сведения порождают новый ассет.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    /// Путь к файлу
    pub path: PathBuf,
    /// Измеренная длительность, секунды
    pub duration_seconds: f64,
    /// Формат файла
    pub format: AudioFormat,
}

impl AudioAsset {
    /// Создает ассет, заново измеряя длительность файла
    pub fn probe(path: &Path, format: AudioFormat) -> Result<Self> {
        let duration_seconds = probe::duration(path);
        if duration_seconds <= 0.0 {
            return Err(RenderError::AudioProcessing(format!(
                "unusable audio file (duration probe failed): {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            duration_seconds,
            format,
        })
    }
}
