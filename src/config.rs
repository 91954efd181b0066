//! User configuration.
//!
//! Loaded from `$XDG_CONFIG_HOME/kernel-manager/config.toml` when present.
//! Every key is optional; a missing file means defaults.
//!
//! ```toml
//! [sched_ext]
//! scx_conf_path = "/etc/default/scx"
//! poll_interval_ms = 1000
//!
//! [commands]
//! pkexec = "/usr/bin/pkexec"
//!
//! [kernels]
//! search_pattern = "^linux"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "kernel-manager";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sched_ext: SchedExtConfig,
    pub commands: CommandsConfig,
    pub kernels: KernelsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedExtConfig {
    /// sysfs file reporting `enabled`/`disabled`.
    pub state_path: PathBuf,
    /// sysfs file naming the active scheduler.
    pub ops_path: PathBuf,
    /// Shell-sourced `KEY=VALUE` file read by the scx service.
    pub scx_conf_path: PathBuf,
    /// systemd unit that launches the scheduler.
    pub service: String,
    pub poll_interval_ms: u64,
}

impl Default for SchedExtConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("/sys/kernel/sched_ext/state"),
            ops_path: PathBuf::from("/sys/kernel/sched_ext/root/ops"),
            scx_conf_path: PathBuf::from("/etc/default/scx"),
            service: "scx".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl SchedExtConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    pub pkexec: String,
    pub systemctl: String,
    pub bash: String,
    pub pacman: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            pkexec: "/usr/bin/pkexec".to_string(),
            systemctl: "/usr/bin/systemctl".to_string(),
            bash: "/usr/bin/bash".to_string(),
            pacman: "/usr/bin/pacman".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelsConfig {
    /// Regex handed to `pacman -Ss` to find kernel candidates.
    pub search_pattern: String,
}

impl Default for KernelsConfig {
    fn default() -> Self {
        Self {
            search_pattern: "^linux".to_string(),
        }
    }
}

/// `$XDG_CONFIG_HOME/kernel-manager/config.toml`, if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load from an explicit path (must exist) or the default location
    /// (may be absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config '{}'", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sched_ext.poll_interval_ms == 0 {
            bail!("sched_ext.poll_interval_ms must be greater than zero");
        }
        if self.sched_ext.service.trim().is_empty() {
            bail!("sched_ext.service must not be empty");
        }
        if self.kernels.search_pattern.trim().is_empty() {
            bail!("kernels.search_pattern must not be empty");
        }
        for (key, value) in [
            ("commands.pkexec", &self.commands.pkexec),
            ("commands.systemctl", &self.commands.systemctl),
            ("commands.bash", &self.commands.bash),
            ("commands.pacman", &self.commands.pacman),
        ] {
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
        }
        Ok(())
    }
}
