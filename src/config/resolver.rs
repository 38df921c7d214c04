//! Precedence resolution for console configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`ITSM_API_URL`, and `USER` for the actor)
//! 3. Data-dir config.kdl (`<data-dir>/config.kdl`)
//! 4. System config.kdl (`~/.config/itsm/config.kdl`)
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::config::{ItsmConfig, OutputFormat};

/// Environment variable overriding the REST backend URL.
pub const API_URL_ENV: &str = "ITSM_API_URL";

/// Environment variable overriding the system config directory.
pub const CONFIG_DIR_ENV: &str = "ITSM_CONFIG_DIR";

pub const DEFAULT_SLA_WARNING_THRESHOLD: u8 = 25;
pub const DEFAULT_SLA_SCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_ACTOR: &str = "service-desk";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from the data directory's config.kdl
    DataDir,
    /// Value from the system config.kdl
    System,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::DataDir => write!(f, "data-dir"),
            ValueSource::System => write!(f, "system"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    pub actor: Resolved<String>,
    /// Percent of the SLA window left when a warning is raised
    pub sla_warning_threshold: Resolved<u8>,
    /// Seconds between SLA scans
    pub sla_scan_interval: Resolved<u64>,
    pub bulk_item_delay_ms: Resolved<u64>,
    pub api_url: Option<Resolved<String>>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
            actor: Resolved::new(DEFAULT_ACTOR.to_string(), ValueSource::Default),
            sla_warning_threshold: Resolved::new(
                DEFAULT_SLA_WARNING_THRESHOLD,
                ValueSource::Default,
            ),
            sla_scan_interval: Resolved::new(DEFAULT_SLA_SCAN_INTERVAL_SECS, ValueSource::Default),
            bulk_item_delay_ms: Resolved::new(0, ValueSource::Default),
            api_url: None,
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> &OutputFormat {
        &self.output_format.value
    }

    pub fn actor(&self) -> &str {
        &self.actor.value
    }

    /// Warning threshold as a fraction of the SLA window (25 -> 0.25).
    pub fn sla_warning_fraction(&self) -> f64 {
        f64::from(self.sla_warning_threshold.value) / 100.0
    }

    pub fn sla_scan_interval(&self) -> Duration {
        Duration::from_secs(self.sla_scan_interval.value)
    }

    pub fn bulk_item_delay(&self) -> Duration {
        Duration::from_millis(self.bulk_item_delay_ms.value)
    }

    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_ref().map(|r| r.value.as_str())
    }

    /// Every key with its effective value and source, in `CONFIG_KEYS` order.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>, ValueSource)> {
        vec![
            (
                "output-format",
                Some(self.output_format.value.to_string()),
                self.output_format.source.clone(),
            ),
            ("actor", Some(self.actor.value.clone()), self.actor.source.clone()),
            (
                "sla-warning-threshold",
                Some(self.sla_warning_threshold.value.to_string()),
                self.sla_warning_threshold.source.clone(),
            ),
            (
                "sla-scan-interval",
                Some(self.sla_scan_interval.value.to_string()),
                self.sla_scan_interval.source.clone(),
            ),
            (
                "bulk-item-delay-ms",
                Some(self.bulk_item_delay_ms.value.to_string()),
                self.bulk_item_delay_ms.source.clone(),
            ),
            match &self.api_url {
                Some(r) => ("api-url", Some(r.value.clone()), r.source.clone()),
                None => ("api-url", None, ValueSource::Default),
            },
        ]
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_format: Option<OutputFormat>,
    pub actor: Option<String>,
    pub api_url: Option<String>,
    pub sla_scan_interval: Option<u64>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_sla_scan_interval(mut self, secs: u64) -> Self {
        self.sla_scan_interval = Some(secs);
        self
    }
}

/// Path of the system-wide config.kdl.
///
/// `ITSM_CONFIG_DIR` replaces the platform config directory when set.
pub fn system_config_path() -> Option<PathBuf> {
    let base = match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()?,
    };
    Some(base.join("itsm").join("config.kdl"))
}

/// Path of the data directory's config.kdl.
pub fn data_dir_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.kdl")
}

/// Resolve configuration for `data_dir` with the full precedence chain.
pub fn resolve_config(data_dir: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system = match system_config_path() {
        Some(path) => ItsmConfig::load(&path)?,
        None => ItsmConfig::new(),
    };
    let local = ItsmConfig::load(&data_dir_config_path(data_dir))?;
    Ok(resolve_layers(&system, &local, overrides))
}

fn pick<T: Clone>(
    cli: Option<&T>,
    local: Option<&T>,
    system: Option<&T>,
) -> Option<Resolved<T>> {
    if let Some(v) = cli {
        Some(Resolved::new(v.clone(), ValueSource::CliFlag))
    } else if let Some(v) = local {
        Some(Resolved::new(v.clone(), ValueSource::DataDir))
    } else {
        system.map(|v| Resolved::new(v.clone(), ValueSource::System))
    }
}

/// Merge already-loaded layers. Environment variables sit between the CLI
/// and the files.
pub fn resolve_layers(
    system: &ItsmConfig,
    local: &ItsmConfig,
    overrides: &ConfigOverrides,
) -> ResolvedConfig {
    let mut result = ResolvedConfig::default();

    if let Some(r) = pick(
        overrides.output_format.as_ref(),
        local.output_format.as_ref(),
        system.output_format.as_ref(),
    ) {
        result.output_format = r;
    }

    if let Some(r) = pick(
        overrides.actor.as_ref(),
        local.actor.as_ref(),
        system.actor.as_ref(),
    ) {
        result.actor = r;
    } else if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            result.actor = Resolved::new(user, ValueSource::EnvVar("USER".to_string()));
        }
    }

    if let Some(r) = pick(
        None,
        local.sla_warning_threshold.as_ref(),
        system.sla_warning_threshold.as_ref(),
    ) {
        result.sla_warning_threshold = r;
    }

    if let Some(r) = pick(
        overrides.sla_scan_interval.as_ref(),
        local.sla_scan_interval.as_ref(),
        system.sla_scan_interval.as_ref(),
    ) {
        result.sla_scan_interval = r;
    }

    if let Some(r) = pick(
        None,
        local.bulk_item_delay_ms.as_ref(),
        system.bulk_item_delay_ms.as_ref(),
    ) {
        result.bulk_item_delay_ms = r;
    }

    result.api_url = match &overrides.api_url {
        Some(url) => Some(Resolved::new(url.clone(), ValueSource::CliFlag)),
        None => match std::env::var(API_URL_ENV) {
            Ok(url) if !url.is_empty() => Some(Resolved::new(
                url,
                ValueSource::EnvVar(API_URL_ENV.to_string()),
            )),
            _ => pick(None, local.api_url.as_ref(), system.api_url.as_ref()),
        },
    };

    result
}
