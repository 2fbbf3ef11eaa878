//! Модуль для отслеживания прогресса выполнения конвейера
//!
//! Репортер передается конвейеру явным значением, глобального состояния нет.

use serde::{Deserialize, Serialize};

/// Этап конвейера рендеринга
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStep {
    /// Генерация речи
    SpeechGeneration,
    /// Построение субтитров
    SubtitleGeneration,
    /// Планирование изображений
    ImageScheduling,
    /// Сведение фоновой музыки
    AudioMixing,
    /// Сборка видео
    VideoAssembly,
}

impl ProcessStep {
    /// Получить строковое представление этапа
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpeechGeneration => "speech_generation",
            Self::SubtitleGeneration => "subtitle_generation",
            Self::ImageScheduling => "image_scheduling",
            Self::AudioMixing => "audio_mixing",
            Self::VideoAssembly => "video_assembly",
        }
    }
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressReporter: Send + Sync {
    /// Метод, вызываемый при переходе между этапами и внутри этапа
    fn report(&self, step: ProcessStep, percent: f32, details: Option<&str>);
}

/// Репортер, который никуда не отправляет уведомления
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _step: ProcessStep, _percent: f32, _details: Option<&str>) {}
}

/// Репортер, пишущий уведомления в журнал
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, step: ProcessStep, percent: f32, details: Option<&str>) {
        match details {
            Some(details) => log::info!("[{}] {:.0}% {}", step.as_str(), percent, details),
            None => log::info!("[{}] {:.0}%", step.as_str(), percent),
        }
    }
}
