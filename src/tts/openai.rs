//! Модуль для интеграции с OpenAI TTS API
//!
//! Провайдер возвращает сырые MP3 байты без выравнивания, таймлайн для него
//! всегда строится пропорциональной оценкой.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{RenderError, Result};
use crate::media::AudioFormat;
use crate::tts::{classify_http_failure, classify_send_error, ChunkAudio, TtsProvider};

const API_URL: &str = "https://api.openai.com/v1/audio/speech";
const MODEL: &str = "tts-1";

/// Клиент OpenAI TTS
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    voice: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, voice: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            voice,
        })
    }
}

#[async_trait]
impl TtsProvider for OpenAiProvider {
    async fn synthesize_chunk(&self, text: &str) -> Result<ChunkAudio> {
        log::debug!("Sending TTS request to OpenAI ({} chars)", text.chars().count());
        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": MODEL,
                "voice": self.voice,
                "input": text,
                "response_format": "mp3",
                "speed": 1.0,
            }))
            .send()
            .await
            .map_err(|e| classify_send_error("openai", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(classify_http_failure("openai", status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_send_error("openai", e))?;
        if bytes.is_empty() {
            return Err(RenderError::TtsGeneration(
                "openai: empty audio in response".to_string(),
            ));
        }

        Ok(ChunkAudio {
            bytes: bytes.to_vec(),
            format: AudioFormat::Mp3,
            alignment: None,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
