/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Longest client name the wire format allows, in characters.
pub const MAX_CLIENT_NAME_LENGTH: usize = 16;

/// Configuration for the Busware middleware.
///
/// Loaded from a TOML file in XDG-compliant directories. Every section falls
/// back to its defaults, so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuswareConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Default values configuration
    pub defaults: DefaultsConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a single dispatch pass waits for the first pending message, in milliseconds
    pub dispatch_poll_ms: u64,
    /// How long `stop`/`shutdown` waits for running execution units, in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Default timeout for a service call when the caller passes none, in milliseconds
    pub service_call_timeout_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum length of a client name, in characters. Values above
    /// [`MAX_CLIENT_NAME_LENGTH`] are capped to it.
    pub max_client_name_length: usize,
    /// Maximum goals a single action server executes at once; `0` means unbounded
    pub max_concurrent_goals: usize,
}

/// Default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Prefix for generated action client names
    pub action_client_prefix: String,
    /// Prefix for generated service client names
    pub service_client_prefix: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dispatch_poll_ms: 100,
            shutdown_timeout_ms: 10_000,
            service_call_timeout_ms: 5_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_client_name_length: MAX_CLIENT_NAME_LENGTH,
            max_concurrent_goals: 0,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            action_client_prefix: "act".to_string(),
            service_client_prefix: "cli".to_string(),
        }
    }
}

impl BuswareConfig {
    /// Dispatch poll interval as a `Duration`
    pub const fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.timeouts.dispatch_poll_ms)
    }

    /// Shutdown timeout as a `Duration`
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.shutdown_timeout_ms)
    }

    /// Default service call timeout as a `Duration`
    pub const fn service_call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.service_call_timeout_ms)
    }

    /// The effective client name limit: the configured value, never above
    /// [`MAX_CLIENT_NAME_LENGTH`].
    pub const fn client_name_limit(&self) -> usize {
        if self.limits.max_client_name_length < MAX_CLIENT_NAME_LENGTH {
            self.limits.max_client_name_length
        } else {
            MAX_CLIENT_NAME_LENGTH
        }
    }

    /// The goal admission limit, or `None` when execution is unbounded.
    pub const fn goal_limit(&self) -> Option<usize> {
        match self.limits.max_concurrent_goals {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the underlying `toml` error if the text is not valid TOML or
    /// a field has the wrong type.
    pub fn from_toml_str(config_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<Self>(config_str)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `busware/config.toml` under `$XDG_CONFIG_HOME` (falling back
    /// to `~/.config`) and the XDG config dirs. A missing file yields the
    /// defaults; an unreadable or malformed file is logged and also yields
    /// the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("busware") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => match Self::from_toml_str(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration");
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: BuswareConfig = BuswareConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_constraints() {
        let config = BuswareConfig::default();
        assert_eq!(config.limits.max_client_name_length, 16);
        assert_eq!(config.goal_limit(), None);
        assert_eq!(config.dispatch_poll(), Duration::from_millis(100));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = BuswareConfig::from_toml_str(
            r#"
            [limits]
            max_concurrent_goals = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.goal_limit(), Some(4));
        assert_eq!(config.limits.max_client_name_length, 16);
        assert_eq!(config.timeouts.service_call_timeout_ms, 5_000);
        assert_eq!(config.defaults.action_client_prefix, "act");
    }

    #[test]
    fn client_name_limit_cannot_exceed_wire_maximum() {
        let raised = BuswareConfig::from_toml_str("[limits]\nmax_client_name_length = 64").unwrap();
        assert_eq!(raised.client_name_limit(), MAX_CLIENT_NAME_LENGTH);
        let lowered = BuswareConfig::from_toml_str("[limits]\nmax_client_name_length = 8").unwrap();
        assert_eq!(lowered.client_name_limit(), 8);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(BuswareConfig::from_toml_str("[limits]\nmax_concurrent_goals = \"many\"").is_err());
    }
}
