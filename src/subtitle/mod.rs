//! Построение субтитров из таймлайна
//!
//! Две чистые функции над списком записей таймлайна: SRT дорожка для
//! дистрибуции и стилизованный ASS для вжигания в видео.

pub mod ass;
pub mod srt;

/// Реплика субтитров
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    /// Время начала, секунды
    pub start_seconds: f64,
    /// Время окончания, секунды
    pub end_seconds: f64,
    /// Текст реплики; внутренние переводы строк сохраняются
    pub text: String,
}
