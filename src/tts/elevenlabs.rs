//! ElevenLabs TTS client.
//!
//! Uses the with-timestamps endpoint: the response is a JSON envelope with
//! base64 audio and per-character alignment arrays, which gives accurate
//! sentence timing downstream.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{RenderError, Result};
use crate::media::AudioFormat;
use crate::tts::{classify_http_failure, classify_send_error, CharAlignment, ChunkAudio, TtsProvider};

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_multilingual_v2";

/// ElevenLabs HTTP client
pub struct ElevenLabsProvider {
    client: Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsProvider {
    pub fn new(api_key: String, voice_id: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            voice_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AlignmentPayload {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio_base64: String,
    alignment: Option<AlignmentPayload>,
    normalized_alignment: Option<AlignmentPayload>,
}

fn to_char_alignment(payload: AlignmentPayload) -> CharAlignment {
    // The API returns one-character strings; an empty entry maps to a space
    // so the time arrays stay index-aligned.
    let characters: Vec<char> = payload
        .characters
        .iter()
        .map(|s| s.chars().next().unwrap_or(' '))
        .collect();
    CharAlignment {
        characters,
        start_times: payload.character_start_times_seconds,
        end_times: payload.character_end_times_seconds,
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
    async fn synthesize_chunk(&self, text: &str) -> Result<ChunkAudio> {
        let url = format!(
            "{}/text-to-speech/{}/with-timestamps",
            API_BASE, self.voice_id
        );

        log::debug!("Sending TTS request to ElevenLabs ({} chars)", text.chars().count());
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": MODEL_ID,
            }))
            .send()
            .await
            .map_err(|e| classify_send_error("elevenlabs", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(classify_http_failure("elevenlabs", status, &body));
        }

        let payload: SpeechResponse = response
            .json()
            .await
            .map_err(|e| classify_send_error("elevenlabs", e))?;

        let bytes = STANDARD.decode(&payload.audio_base64).map_err(|e| {
            RenderError::Provider(format!("elevenlabs: invalid base64 audio: {}", e))
        })?;
        if bytes.is_empty() {
            return Err(RenderError::TtsGeneration(
                "elevenlabs: empty audio in response".to_string(),
            ));
        }

        let alignment = payload
            .alignment
            .or(payload.normalized_alignment)
            .map(to_char_alignment);
        if alignment.is_none() {
            log::warn!("ElevenLabs response carries no alignment, timing will be estimated");
        }

        Ok(ChunkAudio {
            bytes,
            format: AudioFormat::Mp3,
            alignment,
        })
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}
