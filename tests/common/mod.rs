//! Common test utilities for itsm integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's data or config directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data and config directories.
///
/// The `itsm()` method returns a `Command` that sets `ITSM_DATA_DIR` and
/// `ITSM_CONFIG_DIR` per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize the data directory.
    pub fn init() -> Self {
        let env = Self::new();
        env.itsm().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the itsm binary with isolated directories.
    pub fn itsm(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_itsm"));
        cmd.env("ITSM_DATA_DIR", self.data_dir.path());
        cmd.env("ITSM_CONFIG_DIR", self.config_dir.path());
        cmd.env("USER", "tester");
        cmd.env_remove("ITSM_API_URL");
        cmd.env_remove("ITSM_ACTION_LOG");
        cmd.env_remove("ITSM_LOG");
        cmd
    }

    /// Run a command that must succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.itsm().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "itsm {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Open an incident and return its ID.
    pub fn create_incident(&self, title: &str, priority: &str) -> String {
        let created = self.json(&["incident", "create", title, "-p", priority]);
        created["id"].as_str().unwrap().to_string()
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
