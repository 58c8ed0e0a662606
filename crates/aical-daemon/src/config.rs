//! Daemon configuration.
//!
//! Everything lives in one `config.toml`, by default at
//! `~/.config/aical/config.toml`. Every section is optional.
//!
//! Google credentials support secret references (see [`crate::secret`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use aical_core::{LogFormat, TracingConfig, parse_level};
use aical_sync::{SchedulerConfig, SyncConfig};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub sync: SyncSettings,
    pub scheduler: SchedulerSettings,
    pub store: StoreSettings,
    pub google: GoogleSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Hard deadline of one cycle.
    pub deadline_secs: u64,
    /// Offset such as `+02:00` that decides where the week starts. UTC if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            deadline_secs: SyncConfig::DEFAULT_DEADLINE_SECS,
            utc_offset: None,
        }
    }
}

impl SyncSettings {
    pub fn offset(&self) -> DaemonResult<FixedOffset> {
        match self.utc_offset.as_deref() {
            None => Ok(Utc.fix()),
            Some(raw) => raw.trim().parse::<FixedOffset>().map_err(|e| {
                DaemonError::config(format!(
                    "sync.utc_offset {:?} is not an offset like +02:00: {}",
                    raw, e
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub jobs: Vec<JobSettings>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            jobs: vec![JobSettings {
                name: "sync".to_string(),
                interval_secs: 300,
            }],
        }
    }
}

/// One `[[scheduler.jobs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    pub name: String,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database file; `~/` is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Google Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            timeout_secs: 30,
            api_base: None,
            token_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl DaemonConfig {
    /// Loads the default file, or the defaults when it does not exist.
    pub fn load() -> DaemonResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> DaemonResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aical")
            .join("config.toml")
    }

    pub fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aical")
            .join("aical.db")
    }

    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.sync.deadline_secs == 0 {
            return Err(DaemonError::config("sync.deadline_secs must be positive"));
        }
        self.sync.offset()?;
        if self.google.timeout_secs == 0 {
            return Err(DaemonError::config("google.timeout_secs must be positive"));
        }
        parse_level(&self.logging.level).map_err(|e| DaemonError::config(e.to_string()))?;
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(Self::default_store_path)
    }

    pub fn sync_config(&self) -> DaemonResult<SyncConfig> {
        Ok(SyncConfig::default()
            .with_deadline(Duration::from_secs(self.sync.deadline_secs))
            .with_utc_offset(self.sync.offset()?))
    }

    /// Job names are checked against the registered handlers when the
    /// scheduler is built.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler
            .jobs
            .iter()
            .fold(SchedulerConfig::new(), |config, job| {
                config.with_job(&job.name, Duration::from_secs(job.interval_secs))
            })
    }

    /// Tracing setup for the daemon loop or for a one-shot command.
    pub fn tracing_config(&self, daemon: bool, debug: bool) -> DaemonResult<TracingConfig> {
        if debug {
            return Ok(TracingConfig::interactive(true));
        }
        if !daemon {
            return Ok(TracingConfig::interactive(false));
        }
        let level = parse_level(&self.logging.level)?;
        Ok(TracingConfig::daemon()
            .with_level(level)
            .with_format(self.logging.format))
    }

    /// Copy safe to print: literal secrets are masked, references are kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(secret) = copy.google.client_secret.as_mut() {
            if !is_reference(secret) {
                *secret = "<redacted>".to_string();
            }
        }
        copy
    }
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Resolves credentials and builds the gateway configuration.
    pub fn to_gateway_config(&self) -> DaemonResult<aical_gateway::google::GoogleConfig> {
        use aical_gateway::google::GoogleConfig;

        let credentials = self.resolve_credentials()?;
        credentials.validate().map_err(DaemonError::config)?;

        let mut config =
            GoogleConfig::new(credentials).with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(ref api_base) = self.api_base {
            config = config.with_api_base(api_base);
        }
        if let Some(ref token_url) = self.token_url {
            config = config.with_token_url(token_url);
        }
        config.validate().map_err(DaemonError::config)?;
        Ok(config)
    }

    pub(crate) fn resolve_credentials(
        &self,
    ) -> DaemonResult<aical_gateway::google::OAuthCredentials> {
        use aical_gateway::google::OAuthCredentials;

        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            DaemonError::config(format!(
                "google.client_id is missing from {}",
                DaemonConfig::default_path().display()
            ))
        })?;
        let raw_secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| DaemonError::config("google.client_secret is missing"))?;

        let client_id = crate::secret::resolve(raw_id)
            .map_err(|e| DaemonError::config(format!("client_id: {}", e)))?;
        let client_secret = crate::secret::resolve(raw_secret)
            .map_err(|e| DaemonError::config(format!("client_secret: {}", e)))?;

        Ok(OAuthCredentials::new(client_id, client_secret))
    }
}

fn is_reference(value: &str) -> bool {
    value.starts_with("env::") || value.starts_with("pass::")
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
