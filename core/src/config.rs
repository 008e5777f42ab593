/**
 * config.rs
 * Parser for gatekeeper.yaml (YAML format) plus environment resolution
 *
 * Format:
 * ```yaml
 * apiVersion: gatekeeper/v1
 * kind: Config
 * spec:
 *   portRangeStart: 8000
 *   portRangeEnd: 10000
 *   observeIntervalSecs: 30
 * ```
 *
 * Precedence, lowest first: built-in defaults, then the config file
 * under the home directory, then the environment (GATEKEEPER_HOME,
 * PORT_RANGE_START, PORT_RANGE_END, OBSERVE_INTERVAL_SECS).
 */
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{GatekeeperError, Result};
use crate::{DEFAULT_OBSERVE_INTERVAL_SECS, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START};

/// Name of the config file inside the gatekeeper home directory.
pub const CONFIG_FILE_NAME: &str = "gatekeeper.yaml";

/// Name of the state snapshot file inside the home directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Name of the append-only audit ledger inside the home directory.
pub const LEDGER_FILE_NAME: &str = "ledger.jsonl";

/// Name of the observation spool directory inside the home directory.
pub const SPOOL_DIR_NAME: &str = "spool";

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatekeeperConfig {
    pub home: PathBuf,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub observe_interval_secs: u64,
}

/// gatekeeper.yaml file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub api_version: String,
    pub kind: String,
    pub spec: ConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub observe_interval_secs: u64,
}

impl GatekeeperConfig {
    /// Built-in defaults rooted at the given home directory.
    pub fn defaults<P: Into<PathBuf>>(home: P) -> Self {
        Self {
            home: home.into(),
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
            observe_interval_secs: DEFAULT_OBSERVE_INTERVAL_SECS,
        }
    }

    /// Resolve configuration from defaults, the config file (if present)
    /// and the process environment.
    ///
    /// # Example
    /// ```no_run
    /// use gatekeeper_core::GatekeeperConfig;
    ///
    /// let config = GatekeeperConfig::resolve().unwrap();
    /// assert!(config.port_range_start <= config.port_range_end);
    /// ```
    pub fn resolve() -> Result<Self> {
        let mut config = Self::defaults(default_home());

        let file_path = config.config_path();
        if file_path.exists() {
            let file = ConfigFile::load(&file_path)?;
            config.port_range_start = file.spec.port_range_start;
            config.port_range_end = file.spec.port_range_end;
            config.observe_interval_secs = file.spec.observe_interval_secs;
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through an injectable lookup so the
    /// override logic is testable without touching the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup("GATEKEEPER_HOME") {
            self.home = PathBuf::from(home);
        }
        if let Some(raw) = lookup("PORT_RANGE_START") {
            self.port_range_start = parse_env_port("PORT_RANGE_START", &raw)?;
        }
        if let Some(raw) = lookup("PORT_RANGE_END") {
            self.port_range_end = parse_env_port("PORT_RANGE_END", &raw)?;
        }
        if let Some(raw) = lookup("OBSERVE_INTERVAL_SECS") {
            self.observe_interval_secs = raw.trim().parse::<u64>().map_err(|_| {
                GatekeeperError::Config(format!(
                    "OBSERVE_INTERVAL_SECS must be an integer number of seconds, got '{}'",
                    raw
                ))
            })?;
        }
        Ok(())
    }

    /// Validate the resolved configuration, reporting every offending
    /// field in one error.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.port_range_start == 0 {
            problems.push("portRangeStart must be >= 1".to_string());
        }
        if self.port_range_start > self.port_range_end {
            problems.push(format!(
                "portRangeStart ({}) must be <= portRangeEnd ({})",
                self.port_range_start, self.port_range_end
            ));
        }
        if self.observe_interval_secs == 0 {
            problems.push("observeIntervalSecs must be >= 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GatekeeperError::Config(problems.join("; ")))
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE_NAME)
    }

    pub fn state_path(&self) -> PathBuf {
        self.home.join(STATE_FILE_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.home.join(LEDGER_FILE_NAME)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.home.join(SPOOL_DIR_NAME)
    }

    /// Write the current values back out as a config file.
    pub fn save_file(&self) -> Result<()> {
        ConfigFile::from_config(self).save(self.config_path())
    }
}

impl ConfigFile {
    /// Load gatekeeper.yaml from the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GatekeeperError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| GatekeeperError::Config(format!("Failed to read config: {}", e)))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| GatekeeperError::Config(format!("Invalid config YAML: {}", e)))?;

        file.validate()?;
        Ok(file)
    }

    /// Validate file structure.
    ///
    /// Ensures:
    /// - apiVersion is "gatekeeper/v1"
    /// - kind is "Config"
    pub fn validate(&self) -> Result<()> {
        if self.api_version != "gatekeeper/v1" {
            return Err(GatekeeperError::Config(format!(
                "Invalid apiVersion: expected 'gatekeeper/v1', got '{}'",
                self.api_version
            )));
        }

        if self.kind != "Config" {
            return Err(GatekeeperError::Config(format!(
                "Invalid kind: expected 'Config', got '{}'",
                self.kind
            )));
        }

        Ok(())
    }

    /// Save gatekeeper.yaml to the given path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| GatekeeperError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn from_config(config: &GatekeeperConfig) -> Self {
        Self {
            api_version: "gatekeeper/v1".to_string(),
            kind: "Config".to_string(),
            spec: ConfigSpec {
                port_range_start: config.port_range_start,
                port_range_end: config.port_range_end,
                observe_interval_secs: config.observe_interval_secs,
            },
        }
    }
}

fn parse_env_port(name: &str, raw: &str) -> Result<u16> {
    raw.trim().parse::<u16>().map_err(|_| {
        GatekeeperError::Config(format!(
            "{} must be a port number (1-65535), got '{}'",
            name, raw
        ))
    })
}

fn default_home() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".gatekeeper"),
        Err(_) => PathBuf::from(".gatekeeper"),
    }
}
