use serde::Serialize;
use std::path::Path;

use super::{Output, json};
use crate::Result;
use crate::config::{ConfigOverrides, ItsmConfig, data_dir_config_path, resolve_config};

#[derive(Serialize)]
pub struct ConfigGetResult {
    pub key: String,
    pub value: Option<String>,
    pub source: String,
}

impl Output for ConfigGetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.value {
            Some(value) => format!("{} = {} ({})", self.key, value, self.source),
            None => format!("{} is not set", self.key),
        }
    }
}

/// Effective value of one key, wherever it came from.
pub fn config_get(
    data_dir: &Path,
    overrides: &ConfigOverrides,
    key: &str,
) -> Result<ConfigGetResult> {
    // Rejects unknown keys
    ItsmConfig::new().get(key)?;

    let resolved = resolve_config(data_dir, overrides)?;
    let (value, source) = resolved
        .entries()
        .into_iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, value, source)| (value, source.to_string()))
        .unwrap_or((None, "default".to_string()));
    Ok(ConfigGetResult {
        key: key.to_string(),
        value,
        source,
    })
}

#[derive(Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
    pub path: String,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path)
    }
}

/// Write one key to the data directory's config.kdl.
pub fn config_set(data_dir: &Path, key: &str, value: &str) -> Result<ConfigSetResult> {
    let path = data_dir_config_path(data_dir);
    let mut config = ItsmConfig::load(&path)?;
    config.set(key, value)?;
    config.save(&path)?;
    Ok(ConfigSetResult {
        key: key.to_string(),
        value: config.get(key)?.unwrap_or_default(),
        path: path.display().to_string(),
    })
}

#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    pub source: String,
}

#[derive(Serialize)]
pub struct ConfigListResult {
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{:<22} {:<30} ({})",
                    e.key,
                    e.value.as_deref().unwrap_or("-"),
                    e.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn config_list(data_dir: &Path, overrides: &ConfigOverrides) -> Result<ConfigListResult> {
    let resolved = resolve_config(data_dir, overrides)?;
    let entries = resolved
        .entries()
        .into_iter()
        .map(|(key, value, source)| ConfigEntry {
            key: key.to_string(),
            value,
            source: source.to_string(),
        })
        .collect();
    Ok(ConfigListResult { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_set_then_get_reports_data_dir_source() {
        let env = TestEnv::new();
        config_set(env.data_path(), "sla-warning-threshold", "40").unwrap();

        let got = config_get(env.data_path(), &ConfigOverrides::new(), "sla-warning-threshold")
            .unwrap();
        assert_eq!(got.value.as_deref(), Some("40"));
        assert_eq!(got.source, "data-dir");
    }

    #[test]
    fn test_cli_override_wins() {
        let env = TestEnv::new();
        config_set(env.data_path(), "actor", "alice").unwrap();
        let overrides = ConfigOverrides::new().with_actor("bob");

        let got = config_get(env.data_path(), &overrides, "actor").unwrap();
        assert_eq!(got.value.as_deref(), Some("bob"));
        assert_eq!(got.source, "cli");
    }

    #[test]
    fn test_invalid_values_and_keys_rejected() {
        let env = TestEnv::new();
        assert!(config_set(env.data_path(), "sla-warning-threshold", "0").is_err());
        assert!(config_set(env.data_path(), "colour", "blue").is_err());
        assert!(config_get(env.data_path(), &ConfigOverrides::new(), "colour").is_err());
    }

    #[test]
    fn test_list_covers_every_key() {
        let env = TestEnv::new();
        let list = config_list(env.data_path(), &ConfigOverrides::new()).unwrap();
        let keys: Vec<&str> = list.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, crate::config::CONFIG_KEYS.to_vec());
    }
}
