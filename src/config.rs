//! Purpose: Load the optional JSON run configuration.
//! Exports: `Config`, `DEFAULT_CREDENTIALS_FILE`, `overlay`.
//! Role: Every field defaults to the built-in deployment values; a file overrides any subset.
//! Invariants: A partial nested plan keeps the owning job's defaults for the keys it omits.
//! Invariants: Unknown keys are rejected so typos fail loudly instead of silently using defaults.
use std::path::{Path, PathBuf};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api::ClientOptions;
use crate::core::error::{Error, ErrorKind};
use crate::core::retry::RetryPolicy;
use crate::job::{ExportConfig, ReplicateConfig};

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Service-account key file consulted when no key is set in the environment.
    pub credentials: PathBuf,
    pub retry: RetryPolicy,
    pub client: ClientOptions,
    pub export: ExportConfig,
    pub replicate: ReplicateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            retry: RetryPolicy::default(),
            client: ClientOptions::default(),
            export: ExportConfig::default(),
            replicate: ReplicateConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message(format!("failed to read config {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json(&text).map_err(|err| {
            let message = match err.message() {
                Some(detail) => format!("invalid config {}: {detail}", path.display()),
                None => format!("invalid config {}", path.display()),
            };
            err.with_message(message)
        })
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(err.to_string())
                .with_hint("Config keys: credentials, retry, client, export, replicate.")
        })
    }
}

/// Deserializes a partial object over `base`: keys present in the input win, the rest keep `base`.
pub fn overlay<'de, D, T>(base: T, deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Serialize + DeserializeOwned,
{
    let patch = Value::deserialize(deserializer)?;
    let merged = match (serde_json::to_value(base).map_err(D::Error::custom)?, patch) {
        (Value::Object(mut fields), Value::Object(patch)) => {
            fields.extend(patch);
            Value::Object(fields)
        }
        (_, patch) => patch,
    };
    serde_json::from_value(merged).map_err(D::Error::custom)
}
