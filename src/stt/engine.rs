//! Core STT trait and the HTTP implementation.
//!
//! [`SttEngine`] is object-safe and `Send + Sync` so the controller can hold
//! it as `Arc<dyn SttEngine>`.
//!
//! [`HttpSttEngine`] talks to any OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint (OpenAI, faster-whisper-server,
//! whisper.cpp server, …).
//!
//! [`MockSttEngine`] (`#[cfg(test)]`) returns a pre-configured response.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::{pcm, TARGET_SAMPLE_RATE};
use crate::config::SttConfig;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// Nothing to transcribe.
    #[error("no audio to transcribe")]
    EmptyAudio,

    #[error("failed to encode audio: {0}")]
    Encode(String),

    #[error("transcription request failed: {0}")]
    Request(String),

    #[error("transcription request timed out")]
    Timeout,

    #[error("transcription service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    /// The service answered but recognised no speech.
    #[error("no speech recognised")]
    EmptyTranscript,
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SttError::Timeout
        } else {
            SttError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Speech-to-text collaborator.
///
/// # Contract
///
/// - `pcm` is mono 16-bit little-endian samples at 16 kHz.
/// - Returns trimmed, non-empty text, or [`SttError::EmptyTranscript`].
#[async_trait]
pub trait SttEngine: Send + Sync {
    async fn transcribe(&self, pcm: &[u8]) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn SttEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SttEngine>) {}
};

fn finish_transcript(text: &str) -> Result<String, SttError> {
    let text = text.trim();
    if text.is_empty() {
        Err(SttError::EmptyTranscript)
    } else {
        Ok(text.to_string())
    }
}

// ---------------------------------------------------------------------------
// HttpSttEngine
// ---------------------------------------------------------------------------

/// OpenAI-compatible transcription client.
///
/// All connection details come from [`SttConfig`].
pub struct HttpSttEngine {
    client: reqwest::Client,
    config: SttConfig,
}

impl HttpSttEngine {
    pub fn from_config(config: &SttConfig) -> Self {
        Self {
            client: crate::http_client(config.timeout_secs),
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn form(&self, wav: Vec<u8>) -> Result<reqwest::multipart::Form, SttError> {
        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::Encode(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("response_format", "json");
        if self.config.language != "auto" && !self.config.language.is_empty() {
            form = form.text("language", self.config.language.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl SttEngine for HttpSttEngine {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError> {
        if audio.len() < 2 {
            return Err(SttError::EmptyAudio);
        }
        let wav = pcm::encode_wav(audio, TARGET_SAMPLE_RATE)
            .map_err(|e| SttError::Encode(e.to_string()))?;

        let request = self.client.post(self.endpoint()).multipart(self.form(wav)?);
        let response = crate::with_bearer(request, self.config.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::Parse(e.to_string()))?;
        let text = json["text"]
            .as_str()
            .ok_or_else(|| SttError::Parse("missing `text` field".into()))?;

        let text = finish_transcript(text)?;
        log::debug!("stt: transcribed {} bytes → {:?}", audio.len(), text);
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// Test double returning a fixed response.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
}

#[cfg(test)]
impl MockSttEngine {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SttEngine for MockSttEngine {
    async fn transcribe(&self, pcm: &[u8]) -> Result<String, SttError> {
        // Same input contract as the real engine.
        if pcm.len() < 2 {
            return Err(SttError::EmptyAudio);
        }
        finish_transcript(&self.response.clone()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(language: &str) -> SttConfig {
        SttConfig {
            base_url: "http://localhost:8000/".into(),
            language: language.into(),
            ..SttConfig::default()
        }
    }

    // --- MockSttEngine ---

    #[tokio::test]
    async fn mock_ok_returns_trimmed_text() {
        let engine = MockSttEngine::ok("  hello there ");
        assert_eq!(engine.transcribe(&[0; 32]).await.unwrap(), "hello there");
    }

    #[tokio::test]
    async fn mock_blank_text_is_empty_transcript() {
        let engine = MockSttEngine::ok("   ");
        let err = engine.transcribe(&[0; 32]).await.unwrap_err();
        assert!(matches!(err, SttError::EmptyTranscript));
    }

    #[tokio::test]
    async fn mock_rejects_empty_audio() {
        let engine = MockSttEngine::ok("text");
        assert!(matches!(
            engine.transcribe(&[]).await.unwrap_err(),
            SttError::EmptyAudio
        ));
    }

    #[tokio::test]
    async fn mock_err_returns_configured_error() {
        let engine = MockSttEngine::err(SttError::Timeout);
        assert!(matches!(
            engine.transcribe(&[0; 32]).await.unwrap_err(),
            SttError::Timeout
        ));
    }

    // --- HttpSttEngine ---

    #[test]
    fn endpoint_strips_trailing_slash() {
        let engine = HttpSttEngine::from_config(&config("en"));
        assert_eq!(
            engine.endpoint(),
            "http://localhost:8000/v1/audio/transcriptions"
        );
    }

    #[tokio::test]
    async fn http_engine_rejects_empty_audio_without_network() {
        let engine = HttpSttEngine::from_config(&config("auto"));
        assert!(matches!(
            engine.transcribe(&[]).await.unwrap_err(),
            SttError::EmptyAudio
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        let engine = HttpSttEngine::from_config(&SttConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..SttConfig::default()
        });
        let err = engine.transcribe(&[0; 320]).await.unwrap_err();
        assert!(matches!(err, SttError::Request(_) | SttError::Timeout));
    }

    #[test]
    fn engine_is_object_safe() {
        let engine: Box<dyn SttEngine> = Box::new(HttpSttEngine::from_config(&config("en")));
        drop(engine);
    }

    #[test]
    fn error_display_includes_status() {
        let e = SttError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert!(e.to_string().contains("503"));
    }
}
