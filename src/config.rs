//! Node configuration: autosave gates, respawn-to-lobby routing and engine timings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the node looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/player-sync.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PLAYER_SYNC_CONFIG_PATH";

/// Per-trigger autosave switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutosaveSettings {
    /// Save when the player changes world on this node.
    pub on_world_change: bool,
    /// Save on death.
    pub on_death: bool,
    /// Save with reason `kick` on a forced disconnect. The quit that follows saves regardless.
    pub on_kick: bool,
    /// Save before a likely move to another node.
    pub on_server_switch: bool,
    /// Debounced save on experience, level or enchant changes.
    pub on_xp_change: bool,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            on_world_change: true,
            on_death: true,
            on_kick: true,
            on_server_switch: true,
            on_xp_change: true,
        }
    }
}

/// Sends respawning players to a lobby node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RespawnToLobbySettings {
    /// Route respawning players to [`Self::server`].
    pub enabled: bool,
    /// Name of the target node as known by the proxy.
    pub server: String,
}

/// Identity of this node inside the proxy network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Name of this node, reported in the handshake and health check.
    pub id: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            id: "server".into(),
        }
    }
}

/// Which session notices are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NoticeSettings {
    /// Tell the player their record was applied.
    pub on_load: bool,
    /// Tell the player their record could not be loaded.
    pub on_load_failure: bool,
}

impl Default for NoticeSettings {
    fn default() -> Self {
        Self {
            on_load: true,
            on_load_failure: true,
        }
    }
}

/// Proxy integration switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Whether a plugin-messaging channel to the proxy is available for node transfers.
    pub transport_enabled: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            transport_enabled: true,
        }
    }
}

/// Engine timings.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Window within which repeated progress changes collapse into one save.
    #[serde(rename = "debounce_window_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub debounce_window: Duration,
    /// Synchronous saves slower than this are reported.
    #[serde(rename = "slow_save_threshold_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub slow_save_threshold: Duration,
    /// Length of one scheduling tick.
    #[serde(rename = "tick_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(250),
            slow_save_threshold: Duration::from_millis(1_000),
            tick: Duration::from_millis(50),
        }
    }
}

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Per-trigger autosave switches.
    pub autosave: AutosaveSettings,
    /// Respawn-to-lobby routing.
    pub respawn_to_lobby: RespawnToLobbySettings,
    /// Identity of this node.
    pub server: ServerSettings,
    /// Session notices.
    pub notices: NoticeSettings,
    /// Proxy integration.
    pub proxy: ProxySettings,
    /// Engine timings.
    pub timings: TimingSettings,
}

impl SyncSettings {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!(
                        path = %path.display(),
                        server = %settings.server.id,
                        "loaded sync configuration"
                    );
                    settings
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    /// The lobby node respawning players are sent to, when the feature applies to this node.
    pub fn lobby_target(&self) -> Option<&str> {
        let target = self.respawn_to_lobby.server.trim();
        if !self.respawn_to_lobby.enabled || target.is_empty() || target == self.server.id {
            return None;
        }
        Some(target)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
