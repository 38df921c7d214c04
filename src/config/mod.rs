//! Configuration for the service-desk console.
//!
//! Preferences live in `config.kdl`, at two levels:
//! - System: `~/.config/itsm/config.kdl` (or `$ITSM_CONFIG_DIR/itsm/config.kdl`)
//! - Data dir: `<data-dir>/config.kdl`, written by `itsm config set`
//!
//! Keys: `output-format`, `actor`, `sla-warning-threshold`,
//! `sla-scan-interval`, `bulk-item-delay-ms`, `api-url`.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    API_URL_ENV, CONFIG_DIR_ENV, ConfigOverrides, Resolved, ResolvedConfig, ValueSource,
    data_dir_config_path, resolve_config, resolve_layers, system_config_path,
};
pub use schema::{CONFIG_KEYS, ItsmConfig, OutputFormat};
#[cfg(unix)]
pub use schema::CONFIG_FILE_MODE;
