//! Configuration for Keystone.
//!
//! Loaded from `~/.keystone/config.toml`:
//!
//! ```toml
//! [bootstrap]
//! role = "sim-chain"
//! watchdog_secs = 30
//!
//! [parameters]
//! hardcoded_client_addresses = ["agoric1alice", "${DEMO_ADDRESS}"]
//!
//! [log]
//! filter = "keystone_engine=debug,info"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use keystone_types::{Role, RoleError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Environment variable that overrides the configured role.
pub const ROLE_ENV: &str = "KEYSTONE_ROLE";

#[derive(Debug, Default, Deserialize)]
pub struct KeystoneConfig {
    pub bootstrap: Option<BootstrapConfig>,
    /// Free-form run parameters handed to behaviors.
    #[serde(default)]
    pub parameters: BTreeMap<String, toml::Value>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BootstrapConfig {
    pub role: Option<Role>,
    /// Abort a run that has not finished after this many seconds.
    pub watchdog_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber` filter directives. `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("parameter '{name}' cannot be represented: {message}")]
    Parameter { name: String, message: String },
}

impl KeystoneConfig {
    /// Load the user config. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| {
            tracing::warn!("Failed to read config at {:?}: {}", path, err);
            ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            }
        })?;

        toml::from_str(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.bootstrap.as_ref().and_then(|b| b.role)
    }

    #[must_use]
    pub fn watchdog_secs(&self) -> Option<u64> {
        self.bootstrap.as_ref().and_then(|b| b.watchdog_secs)
    }

    #[must_use]
    pub fn log_filter(&self) -> Option<String> {
        self.log
            .as_ref()
            .and_then(|log| log.filter.as_deref())
            .map(expand_env_vars)
    }

    /// Run parameters as JSON, with `${VAR}` references expanded.
    pub fn parameters(&self) -> Result<BTreeMap<String, Value>, ConfigError> {
        self.parameters
            .iter()
            .map(|(name, value)| {
                toml_to_json(value)
                    .map(|json| (name.clone(), json))
                    .map_err(|message| ConfigError::Parameter {
                        name: name.clone(),
                        message,
                    })
            })
            .collect()
    }
}

/// Pick the role: command line, then [`ROLE_ENV`], then config, then `chain`.
///
/// An unrecognized value at the first level that is present is an error; it
/// does not fall through to the next level.
pub fn resolve_role(
    cli: Option<&str>,
    env_value: Option<&str>,
    configured: Option<Role>,
) -> Result<Role, RoleError> {
    if let Some(raw) = cli.or(env_value) {
        return raw.parse();
    }
    Ok(configured.unwrap_or_default())
}

/// Convert a TOML value to JSON, expanding `${VAR}` in strings.
fn toml_to_json(value: &toml::Value) -> Result<Value, String> {
    match value {
        toml::Value::String(s) => Ok(Value::String(expand_env_vars(s))),
        toml::Value::Integer(i) => Ok(Value::Number((*i).into())),
        toml::Value::Float(f) => {
            let n = serde_json::Number::from_f64(*f).ok_or_else(|| format!("Invalid float: {f}"))?;
            Ok(Value::Number(n))
        }
        toml::Value::Boolean(b) => Ok(Value::Bool(*b)),
        toml::Value::Array(arr) => {
            let json_arr: Result<Vec<_>, _> = arr.iter().map(toml_to_json).collect();
            Ok(Value::Array(json_arr?))
        }
        toml::Value::Table(table) => {
            let mut map = serde_json::Map::new();
            for (k, v) in table {
                map.insert(k.clone(), toml_to_json(v)?);
            }
            Ok(Value::Object(map))
        }
        toml::Value::Datetime(dt) => Ok(Value::String(dt.to_string())),
    }
}

/// Replace each `${VAR}` with its environment value; unset variables become
/// empty and an unclosed `${` is kept as written.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".keystone").join("config.toml"))
}
