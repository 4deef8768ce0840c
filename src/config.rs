//! Gateway configuration
//!
//! Loaded once at startup from a `.yaml`/`.yml` or `.json` file with
//! PascalCase keys:
//!
//! ```yaml
//! GroundStation:
//!   Name: Tokyo
//!   ID: gs-1
//!   Address: api.example.com:443
//!   Key: api-key.json
//!   PlanUpdateInterval: 60
//! Data:
//!   - Name: uhf
//!     Address: 0.0.0.0:5000
//!     Framing: AX.25
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::types::FramingKind;
use crate::{GatewayError, Result};

/// Plan polling interval used when none is configured.
pub const DEFAULT_PLAN_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

/// Document formats accepted for configuration and schedule files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            "json" => Ok(DocumentFormat::Json),
            _ => Err(GatewayError::UnsupportedConfigFormat { extension }),
        }
    }

    fn parse<T: DeserializeOwned>(self, text: &str, path: &Path) -> Result<T> {
        let parsed = match self {
            DocumentFormat::Yaml => serde_yaml_ng::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|details| GatewayError::Config {
            path: path.to_path_buf(),
            details,
        })
    }
}

/// Read and deserialize a YAML or JSON document.
pub(crate) fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = DocumentFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .map_err(|source| GatewayError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
    format.parse(&text, path)
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Config {
    pub ground_station: GroundStationConfig,
    pub data: Vec<DataChannelConfig>,
    /// Retained for schedule-admin endpoints; the gateway itself does not serve them.
    pub schedulers: Vec<SchedulerConfig>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading config file: {}", path.display());
        let config: Config = load_document(path)?;
        config.validate(path)?;
        debug!(channels = config.data.len(), "Config loaded");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        let origin = PathBuf::from("<inline>");
        let config: Config = format.parse(text, &origin)?;
        config.validate(&origin)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |details: String| GatewayError::Config {
            path: path.to_path_buf(),
            details,
        };

        let mut names = HashSet::new();
        for (index, channel) in self.data.iter().enumerate() {
            if channel.name.trim().is_empty() {
                return Err(invalid(format!("data channel {index} has no Name")));
            }
            if channel.address.trim().is_empty() {
                return Err(invalid(format!("data channel {} has no Address", channel.name)));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(invalid(format!("duplicate data channel name {}", channel.name)));
            }
        }
        Ok(())
    }
}

/// Identity of this ground station and how often to refresh its plans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct GroundStationConfig {
    pub name: String,
    #[serde(rename = "ID", alias = "Id")]
    pub id: String,
    /// Platform API address
    pub address: String,
    /// Path of the API key file
    pub key: String,
    /// Seconds between plan listings; zero means [`DEFAULT_PLAN_UPDATE_INTERVAL`]
    pub plan_update_interval: u64,
}

impl GroundStationConfig {
    pub fn plan_update_interval(&self) -> Duration {
        match self.plan_update_interval {
            0 => DEFAULT_PLAN_UPDATE_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }
}

/// One TCP data channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataChannelConfig {
    /// Used in logs and binding owners
    pub name: String,
    /// TCP listen address, e.g. `0.0.0.0:5000`
    pub address: String,
    #[serde(default)]
    pub framing: FramingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl DataChannelConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self { name: name.into(), address: address.into(), ..Default::default() }
    }

    pub fn with_framing(mut self, framing: FramingKind) -> Self {
        self.framing = framing;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct SchedulerConfig {
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}
