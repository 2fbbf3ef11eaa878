//! Модуль конфигурации библиотеки rendernova
//!
//! Этот модуль содержит структуры и перечисления для настройки конвейера.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Пресет оформления субтитров для контентной вертикали
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StylePreset {
    /// Историческая наррация
    History,
    /// Исекай-истории
    Isekai,
    /// Проповеди
    Sermon,
    /// Вертикальные короткие ролики
    Shorts,
    /// Пресет по умолчанию
    Default,
}

impl StylePreset {
    /// Подбирает пресет по имени вертикали, неизвестное имя дает пресет по умолчанию
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "history" => Self::History,
            "isekai" => Self::Isekai,
            "sermon" => Self::Sermon,
            "shorts" => Self::Shorts,
            _ => Self::Default,
        }
    }

    /// Получить строковое представление пресета
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Isekai => "isekai",
            Self::Sermon => "sermon",
            Self::Shorts => "shorts",
            Self::Default => "default",
        }
    }
}

/// Настройки повторных попыток вызова TTS провайдера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Максимальное число попыток на один чанк
    pub max_attempts: u32,
    /// Пауза после ответа rate-limit, секунды
    pub rate_limit_backoff_secs: f64,
    /// Пауза после таймаута запроса, секунды
    pub timeout_backoff_secs: f64,
    /// Пауза после прочих временных сбоев, секунды
    pub error_backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_backoff_secs: 30.0,
            timeout_backoff_secs: 2.0,
            error_backoff_secs: 1.0,
        }
    }
}

/// Настройки синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// API ключ ElevenLabs
    pub elevenlabs_api_key: Option<String>,
    /// API ключ OpenAI
    pub openai_api_key: Option<String>,
    /// Путь к модели piper для локального синтеза
    pub piper_model: Option<String>,
    /// Идентификатор голоса у выбранного провайдера
    pub voice: String,
    /// Таймаут одного HTTP запроса, секунды
    pub request_timeout_secs: u64,
    /// Настройки повторных попыток
    pub retry: RetryConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            elevenlabs_api_key: None,
            openai_api_key: None,
            piper_model: None,
            voice: "nova".to_string(),
            request_timeout_secs: 90,
            retry: RetryConfig::default(),
        }
    }
}

/// Интервал расстановки изображений внутри временного диапазона
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DensityBucket {
    /// Начало диапазона, секунды
    pub start_secs: f64,
    /// Шаг расстановки внутри диапазона, секунды
    pub interval_secs: f64,
}

/// Настройки планировщика изображений
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Диапазоны плотности, упорядочены по началу
    pub buckets: Vec<DensityBucket>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        // Эмпирические значения под темп наррации: плотнее в начале ролика
        Self {
            buckets: vec![
                DensityBucket { start_secs: 0.0, interval_secs: 10.0 },
                DensityBucket { start_secs: 60.0, interval_secs: 30.0 },
                DensityBucket { start_secs: 300.0, interval_secs: 40.0 },
                DensityBucket { start_secs: 600.0, interval_secs: 60.0 },
            ],
        }
    }
}

/// Настройки видеокодирования
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Целевое разрешение в формате "WxH"
    pub resolution: String,
    /// Частота кадров
    pub fps: u32,
    /// Пресет x264
    pub preset: String,
    /// Постоянный фактор качества
    pub crf: u32,
    /// Битрейт аудио
    pub audio_bitrate: String,
    /// Жесткий таймаут одного вызова кодировщика, секунды
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution: "1920x1080".to_string(),
            fps: 30,
            preset: "veryfast".to_string(),
            crf: 28,
            audio_bitrate: "192k".to_string(),
            timeout_secs: 1800,
        }
    }
}

impl EncoderConfig {
    /// Разбирает строку разрешения "WxH"
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let parts: Vec<&str> = self.resolution.trim().split(['x', 'X']).collect();
        if parts.len() != 2 {
            return Err(RenderError::Configuration(format!(
                "invalid resolution string: {}",
                self.resolution
            )));
        }
        let width = parts[0].parse::<u32>().map_err(|_| {
            RenderError::Configuration(format!("invalid resolution width: {}", parts[0]))
        })?;
        let height = parts[1].parse::<u32>().map_err(|_| {
            RenderError::Configuration(format!("invalid resolution height: {}", parts[1]))
        })?;
        if width == 0 || height == 0 {
            return Err(RenderError::Configuration(format!(
                "resolution must be non-zero: {}",
                self.resolution
            )));
        }
        Ok((width, height))
    }
}

/// Настройки сведения фоновой музыки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgmConfig {
    /// Громкость музыкальной подложки (множитель)
    pub bgm_volume: f32,
    /// Усиление наррации (множитель)
    pub narration_volume: f32,
    /// Длительность фейдов и кроссфейдов на границах сегментов, секунды
    pub fade_secs: f64,
    /// За сколько секунд до конца наррации должен закончиться фейд-аут
    pub tail_silence_secs: f64,
}

impl Default for BgmConfig {
    fn default() -> Self {
        Self {
            bgm_volume: 0.15,
            narration_volume: 1.5,
            fade_secs: 2.0,
            tail_silence_secs: 3.0,
        }
    }
}

/// Конфигурация конвейера рендеринга
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Настройки синтеза речи
    pub tts: TtsConfig,
    /// Настройки планировщика изображений
    pub scheduler: SchedulerConfig,
    /// Настройки кодировщика
    pub encoder: EncoderConfig,
    /// Настройки фоновой музыки
    pub bgm: BgmConfig,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tts: TtsConfig::default(),
            scheduler: SchedulerConfig::default(),
            encoder: EncoderConfig::default(),
            bgm: BgmConfig::default(),
            cleanup_temp_files: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_from_name_falls_back_to_default() {
        assert_eq!(StylePreset::from_name("history"), StylePreset::History);
        assert_eq!(StylePreset::from_name("SHORTS"), StylePreset::Shorts);
        assert_eq!(StylePreset::from_name("cooking"), StylePreset::Default);
        assert_eq!(StylePreset::from_name(""), StylePreset::Default);
    }

    #[test]
    fn resolution_parsing() {
        let mut enc = EncoderConfig::default();
        assert_eq!(enc.dimensions().unwrap(), (1920, 1080));

        enc.resolution = "1080x1920".to_string();
        assert_eq!(enc.dimensions().unwrap(), (1080, 1920));

        enc.resolution = "widexhigh".to_string();
        assert!(enc.dimensions().is_err());

        enc.resolution = "1920".to_string();
        assert!(enc.dimensions().is_err());

        enc.resolution = "0x1080".to_string();
        assert!(enc.dimensions().is_err());
    }

    #[test]
    fn default_buckets_match_documented_cutovers() {
        let cfg = SchedulerConfig::default();
        let starts: Vec<f64> = cfg.buckets.iter().map(|b| b.start_secs).collect();
        let intervals: Vec<f64> = cfg.buckets.iter().map(|b| b.interval_secs).collect();
        assert_eq!(starts, vec![0.0, 60.0, 300.0, 600.0]);
        assert_eq!(intervals, vec![10.0, 30.0, 40.0, 60.0]);
    }
}
