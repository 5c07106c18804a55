use crate::defaults;
use crate::error::{Result, VoxlinkError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub playback: PlaybackConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub poll_interval_ms: u64,
}

/// Realtime session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket endpoint of the realtime service.
    pub endpoint: Option<String>,
    /// Model requested in the setup message.
    pub model: String,
    /// Environment variable the API key is read from. The key itself is
    /// never serialized.
    pub api_key_env: String,
    /// Bound of the outbound frame queue; frames beyond it are dropped.
    pub send_queue: usize,
}

/// Playback output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::CAPTURE_SAMPLE_RATE,
            poll_interval_ms: defaults::CAPTURE_POLL_INTERVAL_MS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: defaults::DEFAULT_MODEL.to_string(),
            api_key_env: defaults::API_KEY_ENV.to_string(),
            send_queue: defaults::SEND_QUEUE_BOUND,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::PLAYBACK_SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLINK_ENDPOINT → session.endpoint
    /// - VOXLINK_MODEL → session.model
    /// - VOXLINK_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("VOXLINK_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.session.endpoint = Some(endpoint);
        }

        if let Ok(model) = std::env::var("VOXLINK_MODEL")
            && !model.is_empty()
        {
            self.session.model = model;
        }

        if let Ok(device) = std::env::var("VOXLINK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Validate field values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(VoxlinkError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.playback.sample_rate == 0 {
            return Err(VoxlinkError::ConfigInvalidValue {
                key: "playback.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.poll_interval_ms == 0 {
            return Err(VoxlinkError::ConfigInvalidValue {
                key: "audio.poll_interval_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.session.send_queue == 0 {
            return Err(VoxlinkError::ConfigInvalidValue {
                key: "session.send_queue".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voxlink_env() {
        remove_env("VOXLINK_ENDPOINT");
        remove_env("VOXLINK_MODEL");
        remove_env("VOXLINK_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        // Audio defaults
        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.poll_interval_ms, 16);

        // Session defaults
        assert_eq!(config.session.endpoint, None);
        assert_eq!(config.session.model, "realtime-voice-1");
        assert_eq!(config.session.api_key_env, "VOXLINK_API_KEY");
        assert_eq!(config.session.send_queue, 64);

        // Playback defaults
        assert_eq!(config.playback.device, None);
        assert_eq!(config.playback.sample_rate, 24000);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            device = "pipewire"
            sample_rate = 16000

            [session]
            endpoint = "wss://example.test/live"
            model = "custom-voice"

            [playback]
            sample_rate = 24000
        "#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.device, Some("pipewire".to_string()));
        assert_eq!(
            config.session.endpoint,
            Some("wss://example.test/live".to_string())
        );
        assert_eq!(config.session.model, "custom-voice");
    }

    #[test]
    fn test_load_missing_fields_use_defaults() {
        let toml_content = r#"
            [session]
            model = "other-voice"
        "#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.session.model, "other-voice");
        assert_eq!(config.session.send_queue, 64);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.playback.sample_rate, 24000);
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"this is not [valid toml").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let path = Path::new("/nonexistent/voxlink/config.toml");
        let config = Config::load_or_default(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_invalid_toml_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"broken = ").unwrap();

        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxlink_env();

        set_env("VOXLINK_ENDPOINT", "wss://override.test/live");
        set_env("VOXLINK_MODEL", "override-voice");
        set_env("VOXLINK_AUDIO_DEVICE", "pulse");

        let config = Config::default().with_env_overrides();
        assert_eq!(
            config.session.endpoint,
            Some("wss://override.test/live".to_string())
        );
        assert_eq!(config.session.model, "override-voice");
        assert_eq!(config.audio.device, Some("pulse".to_string()));

        clear_voxlink_env();
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxlink_env();

        set_env("VOXLINK_MODEL", "");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.session.model, "realtime-voice-1");

        clear_voxlink_env();
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;

        match config.validate() {
            Err(VoxlinkError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "audio.sample_rate");
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_send_queue() {
        let mut config = Config::default();
        config.session.send_queue = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.audio.poll_interval_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_is_not_part_of_config() {
        // Serializing the config must never leak credentials; only the env
        // var *name* is stored.
        let toml = toml::to_string(&Config::default()).unwrap();
        assert!(toml.contains("api_key_env"));
        assert!(!toml.to_lowercase().contains("secret"));
    }
}
