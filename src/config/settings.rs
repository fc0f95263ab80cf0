//! Application settings structs, defaults and TOML persistence.
//!
//! Every section derives `Serialize`/`Deserialize` with `#[serde(default)]`,
//! so a partial `settings.toml` only overrides the keys it names.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

use super::AppPaths;

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Remote speech-to-text service (OpenAI-compatible transcription API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub enabled: bool,
    /// e.g. `http://localhost:8000` or `https://api.openai.com`.
    pub base_url: String,
    /// `None` / empty for local servers that need no auth.
    pub api_key: Option<String>,
    pub model: String,
    /// ISO-639-1 code, or `"auto"` to let the service detect it.
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8000".into(),
            api_key: None,
            model: "whisper-1".into(),
            language: "auto".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Chat model producing the assistant's replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for the whole streamed response.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.7,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Speech synthesis service (OpenAI-compatible speech API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    /// `pcm` (raw 16-bit mono at `sample_rate`) or `wav`.
    pub format: AudioFormat,
    /// Rate of `pcm` responses.
    pub sample_rate: u32,
    pub speed: f32,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8880".into(),
            api_key: None,
            model: "tts-1".into(),
            voice: "alloy".into(),
            format: AudioFormat::Wav,
            sample_rate: 24_000,
            speed: 1.0,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of recorded PCM handed to the transcriber.
    pub sample_rate: u32,
    /// Recording is truncated past this length.
    pub max_recording_secs: f32,
    /// How long a stopped voice task waits for its audio.
    pub audio_wait_timeout_secs: f32,
    /// Open the microphone at startup.
    pub capture_enabled: bool,
    /// Play synthesized replies through the default output device.
    pub playback_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_recording_secs: 60.0,
            audio_wait_timeout_secs: 10.0,
            capture_enabled: true,
            playback_enabled: true,
        }
    }
}

impl AudioConfig {
    pub fn audio_wait_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.audio_wait_timeout_secs.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP front-end listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 50051,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Conversation persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `None` means `<data_dir>/voice-assistant/sessions`.
    pub storage_dir: Option<PathBuf>,
    /// Messages (user + assistant) sent to the model per request.
    pub history_limit: usize,
    /// Entries kept in `sessions_index.json`.
    pub index_limit: usize,
    /// Reopen the most recent session at startup instead of starting fresh.
    pub resume_latest: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            history_limit: 20,
            index_limit: 100,
            resume_latest: true,
        }
    }
}

impl SessionConfig {
    pub fn resolved_dir(&self, paths: &AppPaths) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| paths.sessions_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// PersonaConfig
// ---------------------------------------------------------------------------

/// How the assistant presents itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub assistant_name: String,
    /// Replaces the built-in system prompt template.  Supports the
    /// `{{assistant_name}}`, `{{current_time}}`, `{{time_greeting}}` and
    /// `{{session_context}}` placeholders.
    pub base_prompt: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Aria".into(),
            base_prompt: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_assistant::config::AppConfig;
///
/// // Missing file → defaults
/// let config = AppConfig::load().unwrap();
/// println!("listening on {}:{}", config.server.host, config.server.port);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub persona: PersonaConfig,
}

impl AppConfig {
    /// Load from the platform `settings.toml`; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.stt.base_url, loaded.stt.base_url);
        assert_eq!(original.llm.model, loaded.llm.model);
        assert_eq!(original.llm.max_tokens, loaded.llm.max_tokens);
        assert_eq!(original.tts.format, loaded.tts.format);
        assert_eq!(original.tts.voice, loaded.tts.voice);
        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.server.port, loaded.server.port);
        assert_eq!(original.session.history_limit, loaded.session.history_limit);
        assert_eq!(original.persona.assistant_name, loaded.persona.assistant_name);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).expect("no error");
        assert_eq!(config.server.port, 50051);
        assert_eq!(config.audio.sample_rate, 16_000);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 50051);
        assert_eq!(cfg.audio.audio_wait_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.session.history_limit, 20);
        assert_eq!(cfg.session.index_limit, 100);
        assert!(cfg.llm.api_key.is_none());
        assert!(cfg.persona.base_prompt.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[tts]\nformat = \"pcm\"\nenabled = false\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.tts.format, AudioFormat::Pcm);
        assert!(!cfg.tts.enabled);
        assert_eq!(cfg.llm.base_url, "http://localhost:11434");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn socket_addr_parses() {
        let server = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
        };
        assert_eq!(server.socket_addr().unwrap().port(), 8080);

        let bad = ServerConfig {
            host: "not an ip".into(),
            port: 1,
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn session_dir_defaults_to_app_paths() {
        let paths = AppPaths::new();
        let cfg = SessionConfig::default();
        assert_eq!(cfg.resolved_dir(&paths), paths.sessions_dir);

        let custom = SessionConfig {
            storage_dir: Some(PathBuf::from("/tmp/sessions")),
            ..SessionConfig::default()
        };
        assert_eq!(custom.resolved_dir(&paths), PathBuf::from("/tmp/sessions"));
    }
}
