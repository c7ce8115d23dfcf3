use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default TCP port senders connect to.
pub const DEFAULT_PORT: u16 = 8009;

/// Floor for the idle-sender disconnect interval.
pub const MIN_INACTIVITY_SECS: u64 = 5;

/// Receiver application configuration.
///
/// Loaded once at startup from an optional JSON file plus environment
/// overrides; see [`ReceiverConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Instance name advertised over mDNS.
    #[serde(alias = "instanceName")]
    pub instance_name: String,
    /// TCP port the signaling listener binds.
    pub port: u16,
    /// Text describing the application status, sent to senders in the
    /// connect acknowledgement (may be displayed by the sender application).
    #[serde(alias = "statusText")]
    pub status_text: String,
    /// Seconds before an idle sender connection is closed. A keepalive
    /// resets the clock. Values below 5 are raised to the floor.
    #[serde(alias = "maxInactivity")]
    pub max_inactivity_secs: u64,
    /// Grace period after visibility loss before playback is torn down.
    #[serde(alias = "visibilityGraceMs")]
    pub visibility_grace_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            instance_name: "Embercast Receiver".to_owned(),
            port: DEFAULT_PORT,
            status_text: "Ready to play".to_owned(),
            max_inactivity_secs: 10,
            visibility_grace_ms: 10_000,
        }
    }
}

impl ReceiverConfig {
    /// Idle-sender disconnect interval, clamped to the 5-second floor.
    pub fn max_inactivity(&self) -> Duration {
        let secs = self.max_inactivity_secs.max(MIN_INACTIVITY_SECS);
        if secs != self.max_inactivity_secs {
            warn!(
                "max_inactivity {}s below the {}s floor — raised",
                self.max_inactivity_secs, MIN_INACTIVITY_SECS
            );
        }
        Duration::from_secs(secs)
    }

    /// Grace period between visibility loss and teardown.
    pub fn visibility_grace(&self) -> Duration {
        Duration::from_millis(self.visibility_grace_ms)
    }

    /// Load configuration for this process.
    ///
    /// Reads the JSON file named by `EMBERCAST_CONFIG` when set, otherwise
    /// starts from defaults, then applies individual `EMBERCAST_*`
    /// environment overrides.
    pub fn from_env() -> Result<Self, crate::EmbercastError> {
        let mut config = match std::env::var("EMBERCAST_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    crate::EmbercastError::ConfigurationInvalid {
                        reason: format!("{path}: {e}"),
                    }
                })?
            }
            Err(_) => Self::default(),
        };

        if let Some(port) = env_parse("EMBERCAST_PORT") {
            config.port = port;
        }
        if let Ok(text) = std::env::var("EMBERCAST_STATUS_TEXT") {
            config.status_text = text;
        }
        if let Some(secs) = env_parse("EMBERCAST_MAX_INACTIVITY") {
            config.max_inactivity_secs = secs;
        }
        if let Some(ms) = env_parse("EMBERCAST_VISIBILITY_GRACE_MS") {
            config.visibility_grace_ms = ms;
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "instanceName": "Living Room",
            "port": 9009,
            "statusText": "Warming up",
            "maxInactivity": 30,
            "visibilityGraceMs": 600000
        }"#;

        let cfg: ReceiverConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.instance_name, "Living Room");
        assert_eq!(cfg.port, 9009);
        assert_eq!(cfg.max_inactivity_secs, 30);
        assert_eq!(cfg.visibility_grace(), Duration::from_secs(600));
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "status_text": "Ready",
            "max_inactivity_secs": 12
        }"#;

        let cfg: ReceiverConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.status_text, "Ready");
        assert_eq!(cfg.max_inactivity(), Duration::from_secs(12));
        // Unspecified fields fall back to defaults
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn inactivity_below_floor_is_raised() {
        let cfg = ReceiverConfig {
            max_inactivity_secs: 1,
            ..Default::default()
        };
        assert_eq!(cfg.max_inactivity(), Duration::from_secs(MIN_INACTIVITY_SECS));
    }

    #[test]
    fn defaults_match_policy() {
        let cfg = ReceiverConfig::default();
        assert_eq!(cfg.max_inactivity(), Duration::from_secs(10));
        assert_eq!(cfg.visibility_grace(), Duration::from_millis(10_000));
    }
}
