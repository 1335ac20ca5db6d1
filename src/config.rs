// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Configuration persistence for kube-machine
//!
//! Stores defaults for connecting to the cluster and waiting on machines.
//! All kube-machine data is stored under ~/.kube-machine/:
//! - ~/.kube-machine/config.json - user configuration
//! - ~/.kube-machine/log/ - rolling log files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the base kube-machine directory (~/.kube-machine/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".kube-machine"))
        .context("Could not determine home directory")
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_wait_timeout_minutes() -> u64 {
    5
}

/// kube-machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Kubeconfig context (kubeconfig current context when unset)
    #[serde(default)]
    pub context: Option<String>,

    /// Namespace used when none is given on the command line
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Unset by default: pod watches and exec channels idle for long periods
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,

    /// How long `wait` waits for a pod to start running
    #[serde(default = "default_wait_timeout_minutes")]
    pub wait_timeout_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: None,
            namespace: default_namespace(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: None,
            wait_timeout_minutes: default_wait_timeout_minutes(),
        }
    }
}

impl Config {
    /// Load config from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the config file path (~/.kube-machine/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}
