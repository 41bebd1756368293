// Configuration management for the rtcsignal CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/rtcsignal/config.json
// - Linux: ~/.config/rtcsignal/config.json
// - Windows: %APPDATA%\rtcsignal\config.json

use anyhow::{Context, Result};
use rtcsignal_core::{IceServer, SessionConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Session settings handed to every peer connection
    #[serde(default)]
    pub session: SessionConfig,

    /// Settings of the in-process demo
    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Host candidates each simulated engine gathers per ICE generation
    pub candidates_per_round: usize,

    /// How long the demo waits for both peers to connect
    pub connect_timeout_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            candidates_per_round: 2,
            connect_timeout_secs: 5,
        }
    }
}

const KEYS: &[&str] = &[
    "role",
    "renegotiation",
    "ice_servers",
    "ice_transport_policy",
    "bundle_policy",
    "rtcp_mux_policy",
    "ice_restart",
    "voice_activity_detection",
    "candidates_per_round",
    "connect_timeout_secs",
];

/// Parse a bare word into a kebab/lowercase serde enum
fn parse_enum<T: DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("Invalid value: {}", value))
}

fn enum_str<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("rtcsignal");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the default config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from `path`, or create and save the default if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            info!("Creating default config at {}", path.display());
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value. The session part is validated before it is kept.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        let session = &mut next.session;
        match key {
            "role" => {
                session.role = value
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))
                    .context("Invalid role")?;
            }
            "renegotiation" => session.renegotiation = parse_enum(value)?,
            "ice_servers" => {
                session.rtc.ice_servers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(IceServer::stun)
                    .collect();
            }
            "ice_transport_policy" => session.rtc.ice_transport_policy = parse_enum(value)?,
            "bundle_policy" => session.rtc.bundle_policy = parse_enum(value)?,
            "rtcp_mux_policy" => session.rtc.rtcp_mux_policy = parse_enum(value)?,
            "ice_restart" => {
                session.offer.ice_restart = value.parse().context("Invalid boolean value")?;
            }
            "voice_activity_detection" => {
                let vad: bool = value.parse().context("Invalid boolean value")?;
                session.offer.voice_activity_detection = vad;
                session.answer.voice_activity_detection = vad;
            }
            "candidates_per_round" => {
                next.demo.candidates_per_round = value.parse().context("Invalid number")?;
            }
            "connect_timeout_secs" => {
                next.demo.connect_timeout_secs = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        next.session
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Rejected configuration")?;
        *self = next;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        let session = &self.session;
        let value = match key {
            "role" => session.role.to_string(),
            "renegotiation" => enum_str(&session.renegotiation),
            "ice_servers" => session
                .rtc
                .ice_servers
                .iter()
                .flat_map(|s| s.urls.iter().cloned())
                .collect::<Vec<_>>()
                .join(","),
            "ice_transport_policy" => enum_str(&session.rtc.ice_transport_policy),
            "bundle_policy" => enum_str(&session.rtc.bundle_policy),
            "rtcp_mux_policy" => enum_str(&session.rtc.rtcp_mux_policy),
            "ice_restart" => session.offer.ice_restart.to_string(),
            "voice_activity_detection" => session.offer.voice_activity_detection.to_string(),
            "candidates_per_round" => self.demo.candidates_per_round.to_string(),
            "connect_timeout_secs" => self.demo.connect_timeout_secs.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }
}
