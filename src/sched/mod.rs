//! sched_ext scheduler selection.
//!
//! Reading the active scheduler is two sysfs reads with no side effects.
//! Changing it means patching `/etc/default/scx` and poking the `scx`
//! systemd unit through the privileged helper.

pub mod conf;
pub mod controller;
pub mod service;

use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::SchedExtConfig;
use crate::files::read_first_line;

/// Reported when sched_ext is enabled but the ops file names no scheduler.
pub const UNKNOWN_SCHEDULER: &str = "unknown";

const STATE_ENABLED: &str = "enabled";

/// Schedulers offered for selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Scheduler {
    #[default]
    Bpfland,
    Central,
    Lavd,
    Layered,
    Nest,
    Qmap,
    Rlfifo,
    Rustland,
    Rusty,
    Simple,
    Userland,
}

impl Scheduler {
    pub const ALL: [Scheduler; 11] = [
        Scheduler::Bpfland,
        Scheduler::Central,
        Scheduler::Lavd,
        Scheduler::Layered,
        Scheduler::Nest,
        Scheduler::Qmap,
        Scheduler::Rlfifo,
        Scheduler::Rustland,
        Scheduler::Rusty,
        Scheduler::Simple,
        Scheduler::Userland,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scheduler::Bpfland => "scx_bpfland",
            Scheduler::Central => "scx_central",
            Scheduler::Lavd => "scx_lavd",
            Scheduler::Layered => "scx_layered",
            Scheduler::Nest => "scx_nest",
            Scheduler::Qmap => "scx_qmap",
            Scheduler::Rlfifo => "scx_rlfifo",
            Scheduler::Rustland => "scx_rustland",
            Scheduler::Rusty => "scx_rusty",
            Scheduler::Simple => "scx_simple",
            Scheduler::Userland => "scx_userland",
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scheduler {
    type Err = anyhow::Error;

    /// Accepts the full name (`scx_rusty`) or the short form (`rusty`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let full = if s.starts_with("scx_") {
            s.to_string()
        } else {
            format!("scx_{s}")
        };
        match Scheduler::ALL.iter().find(|sched| sched.name() == full) {
            Some(sched) => Ok(*sched),
            None => bail!(
                "unknown scheduler '{}'; expected one of: {}",
                s,
                Scheduler::ALL
                    .iter()
                    .map(|sched| sched.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Location of the two sched_ext sysfs files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedPaths {
    pub state: PathBuf,
    pub ops: PathBuf,
}

impl SchedPaths {
    pub fn new(state: impl AsRef<Path>, ops: impl AsRef<Path>) -> Self {
        Self {
            state: state.as_ref().to_path_buf(),
            ops: ops.as_ref().to_path_buf(),
        }
    }
}

impl From<&SchedExtConfig> for SchedPaths {
    fn from(config: &SchedExtConfig) -> Self {
        Self::new(&config.state_path, &config.ops_path)
    }
}

/// What the kernel is currently scheduling with.
///
/// Anything other than `enabled` in the state file (`disabled`, an empty
/// string when sched_ext is absent) is returned as-is. When enabled, the ops
/// file names the scheduler, or [`UNKNOWN_SCHEDULER`] if it reads empty.
pub fn current_scheduler(paths: &SchedPaths) -> String {
    let state = read_first_line(&paths.state);
    if state != STATE_ENABLED {
        return state;
    }
    let ops = read_first_line(&paths.ops);
    if ops.is_empty() {
        return UNKNOWN_SCHEDULER.to_string();
    }
    ops
}
