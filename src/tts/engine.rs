//! Core TTS trait and the HTTP implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::AudioFormat;
use crate::config::TtsConfig;

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum TtsError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("synthesis request failed: {0}")]
    Request(String),

    #[error("synthesis request timed out")]
    Timeout,

    #[error("synthesis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("synthesis service returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesizedAudio / Synthesizer
// ---------------------------------------------------------------------------

/// Audio produced for one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError>;
}

// ---------------------------------------------------------------------------
// HttpSynthesizer
// ---------------------------------------------------------------------------

/// OpenAI-compatible speech client.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: TtsConfig,
}

impl HttpSynthesizer {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            client: crate::http_client(config.timeout_secs),
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/audio/speech",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model":           self.config.model,
            "input":           text,
            "voice":           self.config.voice,
            "response_format": self.config.format.as_str(),
            "speed":           self.config.speed,
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TtsError::EmptyText);
        }

        let request = self.client.post(self.endpoint()).json(&self.request_body(text));
        let response = crate::with_bearer(request, self.config.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        log::debug!(
            "tts: {} chars → {} bytes of {}",
            text.chars().count(),
            bytes.len(),
            self.config.format.as_str()
        );
        Ok(SynthesizedAudio {
            bytes,
            format: self.config.format,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> TtsConfig {
        TtsConfig {
            base_url: "http://localhost:8880".into(),
            voice: "nova".into(),
            format: AudioFormat::Pcm,
            ..TtsConfig::default()
        }
    }

    #[test]
    fn request_body_carries_voice_and_format() {
        let tts = HttpSynthesizer::from_config(&make_config());
        assert_eq!(tts.endpoint(), "http://localhost:8880/v1/audio/speech");

        let body = tts.request_body("hello");
        assert_eq!(body["input"], "hello");
        assert_eq!(body["voice"], "nova");
        assert_eq!(body["response_format"], "pcm");
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_network() {
        let tts = HttpSynthesizer::from_config(&make_config());
        assert!(matches!(
            tts.synthesize("   ").await.unwrap_err(),
            TtsError::EmptyText
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        let tts = HttpSynthesizer::from_config(&TtsConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..make_config()
        });
        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, TtsError::Request(_) | TtsError::Timeout));
    }

    #[test]
    fn synthesizer_is_object_safe() {
        let _tts: Box<dyn Synthesizer> = Box::new(HttpSynthesizer::from_config(&make_config()));
    }
}
