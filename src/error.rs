//! Модуль обработки ошибок библиотеки rendernova
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе конвейера.

use thiserror::Error;

/// Ошибки конвейера рендеринга
#[derive(Debug, Error)]
pub enum RenderError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Провайдер ограничил частоту запросов
    #[error("TTS provider rate limited: {0}")]
    RateLimited(String),

    /// Превышено время ожидания запроса к провайдеру
    #[error("TTS request timed out: {0}")]
    Timeout(String),

    /// Постоянная ошибка провайдера, повтор не поможет
    #[error("TTS provider rejected the request: {0}")]
    Provider(String),

    /// Ошибка генерации TTS
    #[error("TTS generation error: {0}")]
    TtsGeneration(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка обработки видео
    #[error("Video processing error: {0}")]
    VideoProcessing(String),

    /// Ошибка планирования изображений
    #[error("Image scheduling error: {0}")]
    Scheduling(String),

    /// Ошибка обработки субтитров
    #[error("Subtitle error: {0}")]
    Subtitle(String),

    /// Внешний инструмент не найден в PATH
    #[error("{0} is not installed")]
    ToolNotInstalled(String),

    /// Внешняя команда завершилась с ненулевым кодом
    #[error("{tool} failed with exit code {status}: {stderr}")]
    CommandFailed {
        tool: &'static str,
        status: i32,
        stderr: String,
    },

    /// Внешняя команда не уложилась в отведенное время
    #[error("{tool} timed out after {seconds} s")]
    CommandTimeout { tool: &'static str, seconds: u64 },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Неверный формат
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Класс задержки перед повторной попыткой вызова провайдера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Провайдер просит подождать, пауза десятки секунд
    RateLimit,
    /// Истек таймаут запроса, короткая пауза
    Timeout,
    /// Прочий временный сбой, минимальная пауза
    Transient,
    /// Повторять бессмысленно
    Permanent,
}

impl RenderError {
    /// Классифицирует ошибку для логики повторных попыток TTS
    pub fn retry_class(&self) -> RetryClass {
        match self {
            RenderError::RateLimited(_) => RetryClass::RateLimit,
            RenderError::Timeout(_) => RetryClass::Timeout,
            RenderError::Http(e) if e.is_timeout() => RetryClass::Timeout,
            RenderError::Http(_) | RenderError::Io(_) => RetryClass::Transient,
            RenderError::TtsGeneration(_) => RetryClass::Transient,
            _ => RetryClass::Permanent,
        }
    }
}

/// Тип Result для библиотеки rendernova
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_provider_errors() {
        assert_eq!(
            RenderError::RateLimited("429".into()).retry_class(),
            RetryClass::RateLimit
        );
        assert_eq!(
            RenderError::Timeout("deadline".into()).retry_class(),
            RetryClass::Timeout
        );
        assert_eq!(
            RenderError::TtsGeneration("503".into()).retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            RenderError::Provider("bad voice id".into()).retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            RenderError::Configuration("no key".into()).retry_class(),
            RetryClass::Permanent
        );
    }
}
