use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::auth::Credentials;
use crate::session::{SessionConfig, DEFAULT_ENDPOINT};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    pub credentials: Credentials,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    /// Largest inbound message accepted, in bytes
    pub receive_buffer_bytes: usize,
    /// How long the WebSocket upgrade may take before the session gives up
    pub handshake_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            receive_buffer_bytes: 1024 * 1024,
            handshake_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Device serial number; a random one is generated when unset
    pub sn: Option<String>,
    pub scene: String,
    pub vcn: String,
    pub chunk_size: usize,
    pub frame_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sn: None,
            scene: "main_box".to_string(),
            vcn: "x5_lingxiaoyue_flow".to_string(),
            chunk_size: 1280,
            frame_interval_ms: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    #[default]
    Audio,
    Text,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub mode: RequestMode,
    /// Raw 16kHz mono 16-bit PCM, or a WAV file in that format
    pub audio_path: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where synthesized speech is saved; not saved when unset
    pub tts_dir: Option<String>,
    /// Save raw PCM speech as WAV
    pub tts_wav: bool,
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// overlaid with `AIUI_`-prefixed environment variables, e.g.
    /// `AIUI_CREDENTIALS__API_SECRET`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AIUI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        if self.session.chunk_size == 0 {
            bail!("session.chunk_size must be greater than zero");
        }

        let mut session = SessionConfig::new(self.credentials.clone());
        session.endpoint = self.service.endpoint.clone();
        session.scene = self.session.scene.clone();
        session.vcn = self.session.vcn.clone();
        session.chunk_size = self.session.chunk_size;
        session.frame_interval = Duration::from_millis(self.session.frame_interval_ms);
        if let Some(sn) = &self.session.sn {
            session.sn = sn.clone();
        }

        Ok(session)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.service.handshake_timeout_ms)
    }

    /// `request.audio_path` with `~` and environment variables expanded
    pub fn audio_path(&self) -> Result<Option<String>> {
        match &self.request.audio_path {
            Some(path) => Ok(Some(shellexpand::full(path)?.into_owned())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = Config::from_toml(
            r#"
            [credentials]
            app_id = "app"
            api_key = "key"
            api_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.service.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.request.mode, RequestMode::Audio);

        let session = cfg.session_config().unwrap();
        assert_eq!(session.chunk_size, 1280);
        assert_eq!(session.frame_interval, Duration::from_millis(40));
        assert_eq!(session.scene, "main_box");
        assert!(session.sn.starts_with("aiui-stream-"));
    }

    #[test]
    fn test_full_config() {
        let cfg = Config::from_toml(
            r#"
            [service]
            endpoint = "ws://127.0.0.1:9001/sos"

            [credentials]
            app_id = "app"
            api_key = "key"
            api_secret = "secret"

            [session]
            sn = "rk3328-mic-array"
            scene = "test_box"
            chunk_size = 640
            frame_interval_ms = 20

            [request]
            mode = "text"
            text = "你是谁"

            [output]
            tts_dir = "out"
            tts_wav = true
            "#,
        )
        .unwrap();

        let session = cfg.session_config().unwrap();
        assert_eq!(session.endpoint, "ws://127.0.0.1:9001/sos");
        assert_eq!(session.sn, "rk3328-mic-array");
        assert_eq!(session.scene, "test_box");
        assert_eq!(session.vcn, "x5_lingxiaoyue_flow");
        assert_eq!(session.chunk_size, 640);
        assert_eq!(cfg.request.mode, RequestMode::Text);
        assert_eq!(cfg.request.text.as_deref(), Some("你是谁"));
        assert!(cfg.output.tts_wav);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let cfg = Config::from_toml(
            r#"
            [credentials]
            app_id = "app"
            api_key = "key"
            api_secret = "secret"

            [session]
            chunk_size = 0
            "#,
        )
        .unwrap();

        assert!(cfg.session_config().is_err());
    }

    #[test]
    fn test_env_credentials_stay_verbatim() {
        // the only test touching AIUI_ variables
        std::env::set_var("AIUI_CREDENTIALS__APP_ID", "01234567");
        std::env::set_var("AIUI_CREDENTIALS__API_KEY", "5e123456");
        std::env::set_var("AIUI_CREDENTIALS__API_SECRET", "1.50");
        std::env::set_var("AIUI_SESSION__CHUNK_SIZE", "640");
        std::env::set_var("AIUI_OUTPUT__TTS_WAV", "true");

        let cfg = Config::load("/nonexistent/aiui-stream");

        for key in [
            "AIUI_CREDENTIALS__APP_ID",
            "AIUI_CREDENTIALS__API_KEY",
            "AIUI_CREDENTIALS__API_SECRET",
            "AIUI_SESSION__CHUNK_SIZE",
            "AIUI_OUTPUT__TTS_WAV",
        ] {
            std::env::remove_var(key);
        }

        let cfg = cfg.unwrap();
        assert_eq!(cfg.credentials.app_id, "01234567");
        assert_eq!(cfg.credentials.api_key, "5e123456");
        assert_eq!(cfg.credentials.api_secret, "1.50");
        assert_eq!(cfg.session.chunk_size, 640);
        assert!(cfg.output.tts_wav);
        assert_eq!(cfg.handshake_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(Config::from_toml("[session]\nscene = \"x\"").is_err());
    }
}
