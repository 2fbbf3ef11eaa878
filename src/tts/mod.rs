//! Генерация речи
//!
//! Этот модуль превращает текст наррации в один склеенный аудиофайл и
//! таймлайн предложений, скрывая особенности провайдеров и временные сбои.
//! Провайдер выбирается один раз на задание по доступным учетным данным,
//! а не на каждый чанк.

pub mod chunker;
pub mod elevenlabs;
pub mod openai;
pub mod piper;
pub mod timeline;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TtsConfig;
use crate::error::{RenderError, Result, RetryClass};
use crate::media::concat::concat_audio;
use crate::media::{AudioAsset, AudioFormat};
use crate::probe;
use crate::utils::temp::ScratchDir;
use crate::utils::truncate_output;
use chunker::TextChunk;
use timeline::TimelineEntry;

/// Провайдер синтеза речи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    /// ElevenLabs, отдает посимвольное выравнивание
    ElevenLabs,
    /// OpenAI TTS
    OpenAi,
    /// Локальный piper
    Piper,
}

impl Provider {
    /// Получить строковое представление провайдера
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElevenLabs => "elevenlabs",
            Self::OpenAi => "openai",
            Self::Piper => "piper",
        }
    }

    /// Потолок размера чанка в символах.
    ///
    /// Меньше для медленных и жестко лимитированных провайдеров, больше для
    /// тарифицируемых по символам.
    pub fn max_chunk_chars(&self) -> usize {
        match self {
            Self::ElevenLabs => 1_800,
            Self::OpenAi => 4_500,
            Self::Piper => 2_000,
        }
    }
}

/// Выбор провайдера по доступным учетным данным, один раз на задание
pub fn select_provider(config: &TtsConfig) -> Result<Provider> {
    if config.elevenlabs_api_key.is_some() {
        return Ok(Provider::ElevenLabs);
    }
    if config.openai_api_key.is_some() {
        return Ok(Provider::OpenAi);
    }
    if config.piper_model.is_some() && which::which("piper").is_ok() {
        return Ok(Provider::Piper);
    }
    Err(RenderError::Configuration(
        "no TTS provider available: set an ElevenLabs or OpenAI API key, or install piper with a voice model".to_string(),
    ))
}

/// Посимвольное выравнивание, возвращаемое провайдером
#[derive(Debug, Clone, Default)]
pub struct CharAlignment {
    /// Символы произнесенного текста
    pub characters: Vec<char>,
    /// Времена начала символов, секунды
    pub start_times: Vec<f64>,
    /// Времена конца символов, секунды
    pub end_times: Vec<f64>,
}

/// Аудио одного синтезированного чанка
#[derive(Debug, Clone)]
pub struct ChunkAudio {
    /// Байты аудиофайла
    pub bytes: Vec<u8>,
    /// Формат аудио
    pub format: AudioFormat,
    /// Выравнивание, если провайдер его вернул
    pub alignment: Option<CharAlignment>,
}

/// Трейт TTS провайдера
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Синтезировать один чанк текста
    async fn synthesize_chunk(&self, text: &str) -> Result<ChunkAudio>;

    /// Имя провайдера для журнала
    fn name(&self) -> &'static str;
}

/// Создает клиента выбранного провайдера
pub fn build_provider(kind: Provider, config: &TtsConfig) -> Result<Box<dyn TtsProvider>> {
    match kind {
        Provider::ElevenLabs => {
            let api_key = config.elevenlabs_api_key.clone().ok_or_else(|| {
                RenderError::Configuration("ElevenLabs API key is required".to_string())
            })?;
            Ok(Box::new(elevenlabs::ElevenLabsProvider::new(
                api_key,
                config.voice.clone(),
                config.request_timeout_secs,
            )?))
        }
        Provider::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                RenderError::Configuration("OpenAI API key is required".to_string())
            })?;
            Ok(Box::new(openai::OpenAiProvider::new(
                api_key,
                config.voice.clone(),
                config.request_timeout_secs,
            )?))
        }
        Provider::Piper => {
            let model = config.piper_model.clone().ok_or_else(|| {
                RenderError::Configuration("piper voice model path is required".to_string())
            })?;
            Ok(Box::new(piper::PiperProvider::new(model)?))
        }
    }
}

/// Результат синтеза наррации
#[derive(Debug)]
pub struct SynthesisOutput {
    /// Склеенный аудиофайл с измеренной длительностью
    pub audio: AudioAsset,
    /// Таймлайн предложений по всей наррации
    pub timeline: Vec<TimelineEntry>,
    /// Хотя бы часть таймлайна построена пропорциональной оценкой
    pub proportional_timing: bool,
}

/// Синтезатор речи
pub struct SpeechSynthesizer {
    config: TtsConfig,
    kind: Provider,
    provider: Box<dyn TtsProvider>,
}

impl SpeechSynthesizer {
    /// Создать синтезатор, выбрав провайдера по учетным данным
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let kind = select_provider(config)?;
        let provider = build_provider(kind, config)?;
        log::info!("Selected TTS provider: {}", kind.as_str());
        Ok(Self {
            config: config.clone(),
            kind,
            provider,
        })
    }

    /// Выбранный провайдер
    pub fn provider_kind(&self) -> Provider {
        self.kind
    }

    /// Синтезирует наррацию в один аудиофайл и таймлайн предложений.
    ///
    /// Чанки синтезируются последовательно, итоговый порядок аудио совпадает
    /// с порядком чанков. Задание без единого успешного чанка — ошибка.
    pub async fn synthesize(
        &self,
        narration: &str,
        scratch: &ScratchDir,
    ) -> Result<SynthesisOutput> {
        let prepared = chunker::prepare_text(narration);
        let sentences = chunker::split_sentences(&prepared);
        if sentences.is_empty() {
            return Err(RenderError::TtsGeneration(
                "narration contains no sentences".to_string(),
            ));
        }

        let chunks = chunker::pack_chunks(&sentences, self.kind.max_chunk_chars());
        log::info!(
            "Synthesizing {} sentences in {} chunks with {}",
            sentences.len(),
            chunks.len(),
            self.provider.name()
        );

        let mut chunk_files = Vec::with_capacity(chunks.len());
        let mut entries: Vec<TimelineEntry> = Vec::with_capacity(sentences.len());
        let mut offset = 0.0f64;
        let mut format: Option<AudioFormat> = None;
        let mut proportional_timing = false;

        for (i, chunk) in chunks.iter().enumerate() {
            let audio = self.synthesize_chunk_with_retry(chunk, i).await?;
            let path = scratch.file(&format!("chunk_{}", i), audio.format.extension());
            tokio::fs::write(&path, &audio.bytes).await?;

            let chunk_duration = probe::duration(&path);
            if chunk_duration <= 0.0 {
                return Err(RenderError::AudioProcessing(format!(
                    "chunk {}: could not measure duration of {}",
                    i,
                    path.display()
                )));
            }

            match &audio.alignment {
                Some(alignment) => {
                    let (chunk_entries, used_fallback) =
                        timeline::from_alignment(chunk, alignment, chunk_duration, offset);
                    proportional_timing |= used_fallback;
                    entries.extend(chunk_entries);
                }
                None => {
                    proportional_timing = true;
                    entries.extend(timeline::proportional(chunk, chunk_duration, offset));
                }
            }

            format.get_or_insert(audio.format);
            chunk_files.push(path);
            offset += chunk_duration;
            log::debug!(
                "Chunk {}/{} done, {:.2} s, cumulative {:.2} s",
                i + 1,
                chunks.len(),
                chunk_duration,
                offset
            );
        }

        let format = format.ok_or_else(|| {
            RenderError::TtsGeneration("no chunks were synthesized".to_string())
        })?;

        let merged = scratch.file("narration", format.extension());
        concat_audio(&chunk_files, format, &merged).await?;

        let total = probe::duration(&merged);
        if total <= 0.0 {
            return Err(RenderError::AudioProcessing(format!(
                "could not measure duration of merged narration {}",
                merged.display()
            )));
        }

        if proportional_timing {
            log::warn!("Timeline partially estimated from character counts, subtitle timing is approximate");
        }

        Ok(SynthesisOutput {
            audio: AudioAsset {
                path: merged,
                duration_seconds: total,
                format,
            },
            timeline: entries,
            proportional_timing,
        })
    }

    /// Синтез одного чанка с повторными попытками.
    ///
    /// Пауза между попытками зависит от класса сбоя; постоянные ошибки не
    /// повторяются. Исчерпание попыток прерывает весь синтез — чанк нельзя
    /// молча пропустить.
    async fn synthesize_chunk_with_retry(
        &self,
        chunk: &TextChunk,
        index: usize,
    ) -> Result<ChunkAudio> {
        let retry = &self.config.retry;
        let mut last_error: Option<RenderError> = None;

        for attempt in 1..=retry.max_attempts {
            match self.provider.synthesize_chunk(&chunk.text).await {
                Ok(audio) => return Ok(audio),
                Err(error) => {
                    let class = error.retry_class();
                    if class == RetryClass::Permanent {
                        log::error!("Chunk {} failed permanently: {}", index, error);
                        return Err(error);
                    }

                    let backoff_secs = match class {
                        RetryClass::RateLimit => retry.rate_limit_backoff_secs,
                        RetryClass::Timeout => retry.timeout_backoff_secs,
                        _ => retry.error_backoff_secs,
                    };
                    log::warn!(
                        "Chunk {} attempt {}/{} failed ({}), backing off {:.1} s",
                        index,
                        attempt,
                        retry.max_attempts,
                        error,
                        backoff_secs
                    );
                    last_error = Some(error);
                    if attempt < retry.max_attempts {
                        tokio::time::sleep(Duration::from_secs_f64(backoff_secs)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RenderError::TtsGeneration(format!("chunk {}: synthesis failed", index))
        }))
    }
}

/// Классификация неуспешного HTTP статуса провайдера
pub(crate) fn classify_http_failure(
    provider: &'static str,
    status: reqwest::StatusCode,
    body: &str,
) -> RenderError {
    use reqwest::StatusCode;

    let detail = format!(
        "{}: HTTP {}: {}",
        provider,
        status.as_u16(),
        truncate_output(body, 300)
    );

    if status == StatusCode::TOO_MANY_REQUESTS || body.to_ascii_lowercase().contains("rate limit")
    {
        RenderError::RateLimited(detail)
    } else if matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        RenderError::Provider(detail)
    } else {
        RenderError::TtsGeneration(detail)
    }
}

/// Классификация сетевой ошибки reqwest
pub(crate) fn classify_send_error(provider: &'static str, error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        RenderError::Timeout(format!("{}: {}", provider, error))
    } else {
        RenderError::Http(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn provider_priority_follows_credentials() {
        let mut config = TtsConfig {
            elevenlabs_api_key: Some("xi".to_string()),
            openai_api_key: Some("sk".to_string()),
            ..TtsConfig::default()
        };
        assert_eq!(select_provider(&config).unwrap(), Provider::ElevenLabs);

        config.elevenlabs_api_key = None;
        assert_eq!(select_provider(&config).unwrap(), Provider::OpenAi);

        config.openai_api_key = None;
        // Модель piper не задана, локальный провайдер не рассматривается
        assert!(select_provider(&config).is_err());
    }

    #[test]
    fn chunk_ceilings_per_provider() {
        assert_eq!(Provider::ElevenLabs.max_chunk_chars(), 1_800);
        assert_eq!(Provider::OpenAi.max_chunk_chars(), 4_500);
        assert_eq!(Provider::Piper.max_chunk_chars(), 2_000);
    }

    #[test]
    fn http_failure_classification() {
        use reqwest::StatusCode;

        assert!(matches!(
            classify_http_failure("test", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            RenderError::RateLimited(_)
        ));
        assert!(matches!(
            classify_http_failure("test", StatusCode::SERVICE_UNAVAILABLE, "rate limit hit"),
            RenderError::RateLimited(_)
        ));
        assert!(matches!(
            classify_http_failure("test", StatusCode::UNAUTHORIZED, "bad key"),
            RenderError::Provider(_)
        ));
        assert!(matches!(
            classify_http_failure("test", StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            RenderError::TtsGeneration(_)
        ));
    }

    struct FlakyProvider {
        calls: std::sync::Arc<AtomicU32>,
        failures_before_success: u32,
        error_kind: fn() -> RenderError,
    }

    #[async_trait]
    impl TtsProvider for FlakyProvider {
        async fn synthesize_chunk(&self, _text: &str) -> Result<ChunkAudio> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err((self.error_kind)());
            }
            Ok(ChunkAudio {
                bytes: vec![0u8; 16],
                format: AudioFormat::Mp3,
                alignment: None,
            })
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn synthesizer_with(provider: FlakyProvider, retry_backoff_secs: f64) -> SpeechSynthesizer {
        let mut config = TtsConfig::default();
        config.retry.rate_limit_backoff_secs = retry_backoff_secs;
        config.retry.timeout_backoff_secs = retry_backoff_secs / 10.0;
        config.retry.error_backoff_secs = retry_backoff_secs / 10.0;
        SpeechSynthesizer {
            config,
            kind: Provider::OpenAi,
            provider: Box::new(provider),
        }
    }

    fn chunk(text: &str) -> TextChunk {
        chunker::pack_chunks(&[text.to_string()], usize::MAX).remove(0)
    }

    #[tokio::test]
    async fn rate_limited_twice_succeeds_on_third_attempt() {
        let _ = env_logger::builder().is_test(true).try_init();
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        let synthesizer = synthesizer_with(
            FlakyProvider {
                calls: calls.clone(),
                failures_before_success: 2,
                error_kind: || RenderError::RateLimited("429".to_string()),
            },
            0.05,
        );

        let started = Instant::now();
        let audio = synthesizer
            .synthesize_chunk_with_retry(&chunk("Hello."), 0)
            .await
            .unwrap();
        let elapsed = started.elapsed().as_secs_f64();

        assert_eq!(audio.bytes.len(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Две паузы rate-limit класса
        assert!(elapsed >= 0.1, "expected two backoff waits, got {:.3} s", elapsed);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        let synthesizer = synthesizer_with(
            FlakyProvider {
                calls: calls.clone(),
                failures_before_success: u32::MAX,
                error_kind: || RenderError::Provider("bad voice".to_string()),
            },
            0.05,
        );

        let result = synthesizer
            .synthesize_chunk_with_retry(&chunk("Hello."), 0)
            .await;
        assert!(matches!(result, Err(RenderError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        let synthesizer = synthesizer_with(
            FlakyProvider {
                calls: calls.clone(),
                failures_before_success: u32::MAX,
                error_kind: || RenderError::TtsGeneration("503".to_string()),
            },
            0.01,
        );

        let result = synthesizer
            .synthesize_chunk_with_retry(&chunk("Hello."), 3)
            .await;
        assert!(matches!(result, Err(RenderError::TtsGeneration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
