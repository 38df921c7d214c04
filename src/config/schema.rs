//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The `ItsmConfig` struct mirroring the file
//! - Conversion to and from KDL documents
//! - Validation and per-key get/set used by `itsm config`
//! - Reading and writing the file on disk

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every key accepted in config.kdl.
pub const CONFIG_KEYS: &[&str] = &[
    "output-format",
    "actor",
    "sla-warning-threshold",
    "sla-scan-interval",
    "bulk-item-delay-ms",
    "api-url",
];

/// Console preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// output-format "human"          // or "json"
/// actor "jmoreno"                // author of notes and audit entries
/// sla-warning-threshold 25       // percent of the SLA window left
/// sla-scan-interval 60           // seconds between SLA scans
/// bulk-item-delay-ms 0           // pause between bulk items
/// api-url "http://localhost:3000"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItsmConfig {
    pub output_format: Option<OutputFormat>,

    /// Name recorded as the author of notes and audit entries
    pub actor: Option<String>,

    /// Warn when less than this percentage of the SLA window remains (1-99)
    pub sla_warning_threshold: Option<u8>,

    /// Seconds between SLA scans in `sla watch`
    pub sla_scan_interval: Option<u64>,

    /// Pause between items of a bulk operation, in milliseconds
    pub bulk_item_delay_ms: Option<u64>,

    /// Base URL of the REST backend
    pub api_url: Option<String>,
}

impl ItsmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(threshold) = self.sla_warning_threshold {
            if !(1..=99).contains(&threshold) {
                return Err(format!(
                    "sla-warning-threshold must be 1-99, got {}",
                    threshold
                ));
            }
        }
        if self.sla_scan_interval == Some(0) {
            return Err("sla-scan-interval must be at least 1 second".to_string());
        }
        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("api-url must start with http:// or https://, got {}", url));
            }
        }
        if let Some(ref actor) = self.actor {
            if actor.trim().is_empty() {
                return Err("actor must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes and out-of-range values are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
        }

        if let Some(s) = first_string(doc, "actor") {
            config.actor = Some(s.to_string());
        }

        if let Some(i) = first_integer(doc, "sla-warning-threshold") {
            if (1..=99).contains(&i) {
                config.sla_warning_threshold = Some(i as u8);
            }
        }

        if let Some(i) = first_integer(doc, "sla-scan-interval") {
            if i >= 1 {
                config.sla_scan_interval = u64::try_from(i).ok();
            }
        }

        if let Some(i) = first_integer(doc, "bulk-item-delay-ms") {
            config.bulk_item_delay_ms = u64::try_from(i).ok();
        }

        if let Some(s) = first_string(doc, "api-url") {
            config.api_url = Some(s.to_string());
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref format) = self.output_format {
            push_node(&mut doc, "output-format", KdlValue::String(format.as_str().to_string()));
        }
        if let Some(ref actor) = self.actor {
            push_node(&mut doc, "actor", KdlValue::String(actor.clone()));
        }
        if let Some(threshold) = self.sla_warning_threshold {
            push_node(&mut doc, "sla-warning-threshold", KdlValue::Integer(threshold as i128));
        }
        if let Some(interval) = self.sla_scan_interval {
            push_node(&mut doc, "sla-scan-interval", KdlValue::Integer(interval as i128));
        }
        if let Some(delay) = self.bulk_item_delay_ms {
            push_node(&mut doc, "bulk-item-delay-ms", KdlValue::Integer(delay as i128));
        }
        if let Some(ref url) = self.api_url {
            push_node(&mut doc, "api-url", KdlValue::String(url.clone()));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &ItsmConfig) {
        if other.output_format.is_some() {
            self.output_format = other.output_format.clone();
        }
        if other.actor.is_some() {
            self.actor = other.actor.clone();
        }
        if other.sla_warning_threshold.is_some() {
            self.sla_warning_threshold = other.sla_warning_threshold;
        }
        if other.sla_scan_interval.is_some() {
            self.sla_scan_interval = other.sla_scan_interval;
        }
        if other.bulk_item_delay_ms.is_some() {
            self.bulk_item_delay_ms = other.bulk_item_delay_ms;
        }
        if other.api_url.is_some() {
            self.api_url = other.api_url.clone();
        }
    }

    /// Get one key as a string, if set.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(match key {
            "output-format" => self.output_format.as_ref().map(|f| f.to_string()),
            "actor" => self.actor.clone(),
            "sla-warning-threshold" => self.sla_warning_threshold.map(|v| v.to_string()),
            "sla-scan-interval" => self.sla_scan_interval.map(|v| v.to_string()),
            "bulk-item-delay-ms" => self.bulk_item_delay_ms.map(|v| v.to_string()),
            "api-url" => self.api_url.clone(),
            _ => return Err(unknown_key(key)),
        })
    }

    /// Set one key from a string, validating the result.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "output-format" => {
                updated.output_format = Some(OutputFormat::parse(value).ok_or_else(|| {
                    Error::Config(format!("output-format must be json or human, got {}", value))
                })?);
            }
            "actor" => updated.actor = Some(value.to_string()),
            "sla-warning-threshold" => {
                updated.sla_warning_threshold = Some(parse_number(key, value)?);
            }
            "sla-scan-interval" => updated.sla_scan_interval = Some(parse_number(key, value)?),
            "bulk-item-delay-ms" => updated.bulk_item_delay_ms = Some(parse_number(key, value)?),
            "api-url" => updated.api_url = Some(value.trim_end_matches('/').to_string()),
            _ => return Err(unknown_key(key)),
        }
        updated.validate().map_err(Error::Config)?;
        *self = updated;
        Ok(())
    }

    /// Read config.kdl. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_kdl(&doc))
    }

    /// Write config.kdl, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_kdl().to_string())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(CONFIG_FILE_MODE))?;
        }
        Ok(())
    }
}

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;

fn first_entry<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn first_string<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    first_entry(doc, name).and_then(|v| v.as_string())
}

fn first_integer(doc: &KdlDocument, name: &str) -> Option<i128> {
    first_entry(doc, name).and_then(|v| v.as_integer())
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {}", key, value)))
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "Unknown config key: {} (valid keys: {})",
        key,
        CONFIG_KEYS.join(", ")
    ))
}
