//! Application-level configuration loading: join codes, scoring knobs and the
//! static token directory.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::identity::{StaticTokenDirectory, UserIdentity};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_BACK_CONFIG_PATH";

const DEFAULT_JOIN_CODE_LENGTH: usize = 6;
const DEFAULT_MAX_JOIN_CODE_ATTEMPTS: u32 = 32;
const DEFAULT_BASE_POINTS: u32 = 1000;
const DEFAULT_LATENCY_ALLOWANCE_SECS: f64 = 2.0;
const DEFAULT_FUZZY_MAX_DISTANCE: usize = 1;
const DEFAULT_FUZZY_MIN_LENGTH: usize = 5;
const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Number of digits in generated join codes.
    pub join_code_length: usize,
    /// Collisions tolerated before session creation gives up.
    pub max_join_code_attempts: u32,
    /// Base points used when a game does not specify its own.
    pub default_base_points: u32,
    /// How far below the server-observed elapsed time a client may claim to be.
    pub latency_allowance: Duration,
    /// Edit distance tolerated for typed answers.
    pub fuzzy_max_distance: usize,
    /// Typed answers shorter than this must match exactly.
    pub fuzzy_min_length: usize,
    /// Upper bound on a token lookup.
    pub identity_timeout: Duration,
    users: Vec<ConfiguredUser>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfiguredUser {
    token: String,
    id: Uuid,
    name: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        users = app_config.users.len(),
                        join_code_length = app_config.join_code_length,
                        "loaded configuration"
                    );
                    app_config
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

    /// Register an extra token in the directory. Used by tests and tooling.
    pub fn with_user(mut self, token: impl Into<String>, id: Uuid, name: impl Into<String>) -> Self {
        self.users.push(ConfiguredUser {
            token: token.into(),
            id,
            name: name.into(),
        });
        self
    }

    /// Build the token directory from the configured users.
    pub fn token_directory(&self) -> StaticTokenDirectory {
        StaticTokenDirectory::new(self.users.iter().map(|user| {
            (
                user.token.clone(),
                UserIdentity {
                    id: user.id,
                    name: user.name.clone(),
                },
            )
        }))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    join_code_length: usize,
    max_join_code_attempts: u32,
    default_base_points: u32,
    latency_allowance_secs: f64,
    fuzzy_max_distance: usize,
    fuzzy_min_length: usize,
    identity_timeout_secs: u64,
    users: Vec<RawUser>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            join_code_length: DEFAULT_JOIN_CODE_LENGTH,
            max_join_code_attempts: DEFAULT_MAX_JOIN_CODE_ATTEMPTS,
            default_base_points: DEFAULT_BASE_POINTS,
            latency_allowance_secs: DEFAULT_LATENCY_ALLOWANCE_SECS,
            fuzzy_max_distance: DEFAULT_FUZZY_MAX_DISTANCE,
            fuzzy_min_length: DEFAULT_FUZZY_MIN_LENGTH,
            identity_timeout_secs: DEFAULT_IDENTITY_TIMEOUT_SECS,
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single token directory entry.
struct RawUser {
    token: String,
    id: Uuid,
    name: String,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let join_code_length = if (4..=12).contains(&value.join_code_length) {
            value.join_code_length
        } else {
            warn!(
                requested = value.join_code_length,
                "join code length out of range; using default"
            );
            DEFAULT_JOIN_CODE_LENGTH
        };
        let latency_allowance = if value.latency_allowance_secs.is_finite() {
            Duration::from_secs_f64(value.latency_allowance_secs.max(0.0))
        } else {
            Duration::from_secs_f64(DEFAULT_LATENCY_ALLOWANCE_SECS)
        };

        Self {
            join_code_length,
            max_join_code_attempts: value.max_join_code_attempts.max(1),
            default_base_points: value.default_base_points,
            latency_allowance,
            fuzzy_max_distance: value.fuzzy_max_distance,
            fuzzy_min_length: value.fuzzy_min_length,
            identity_timeout: Duration::from_secs(value.identity_timeout_secs.max(1)),
            users: value
                .users
                .into_iter()
                .filter(|user| !user.token.trim().is_empty())
                .map(|user| ConfiguredUser {
                    token: user.token.trim().to_owned(),
                    id: user.id,
                    name: user.name,
                })
                .collect(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::identity::IdentityProvider;

    #[test]
    fn missing_fields_take_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{ "fuzzy_max_distance": 2 }"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.join_code_length, 6);
        assert_eq!(config.max_join_code_attempts, 32);
        assert_eq!(config.default_base_points, 1000);
        assert_eq!(config.latency_allowance, Duration::from_secs(2));
        assert_eq!(config.fuzzy_max_distance, 2);
        assert_eq!(config.fuzzy_min_length, 5);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "join_code_length": 40, "max_join_code_attempts": 0, "latency_allowance_secs": -3 }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.join_code_length, 6);
        assert_eq!(config.max_join_code_attempts, 1);
        assert_eq!(config.latency_allowance, Duration::ZERO);
    }

    #[tokio::test]
    async fn configured_users_feed_the_token_directory() {
        let id = Uuid::new_v4();
        let raw: RawConfig = serde_json::from_str(&format!(
            r#"{{ "users": [ {{ "token": "host-token", "id": "{id}", "name": "Host" }}, {{ "token": " ", "id": "{id}", "name": "Blank" }} ] }}"#
        ))
        .unwrap();
        let config = AppConfig::from(raw);

        let directory = config.token_directory();
        let resolved = directory.resolve("host-token".into()).await.unwrap();
        assert_eq!(resolved.id, id);
        assert_eq!(resolved.name, "Host");
        assert!(directory.resolve(" ".into()).await.is_none());
    }
}
