//! Preflight checks before touching the system.
//!
//! Validates that the host has the tools the mutating commands shell out to.
//! This turns a confusing spawn error halfway through a transaction into a
//! clear message up front.
//!
//! # Example
//!
//! ```rust
//! use kernel_manager::preflight::{command_exists, check_required_tools};
//!
//! // Check a single command
//! if !command_exists("pkexec") {
//!     println!("polkit not installed");
//! }
//!
//! // Check multiple tools
//! let tools = &[("pacman", "pacman"), ("systemctl", "systemd")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists on the host system.
///
/// Absolute paths are checked directly; bare names are looked up in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools needed to change installed kernels.
///
/// Each tuple is (command_name, package_name).
pub const KERNEL_TOOLS: &[(&str, &str)] = &[("pacman", "pacman"), ("pkexec", "polkit")];

/// Tools needed to switch sched_ext schedulers.
pub const SCHED_TOOLS: &[(&str, &str)] = &[
    ("systemctl", "systemd"),
    ("pkexec", "polkit"),
    ("bash", "bash"),
    ("sed", "sed"),
];

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'ls' should exist on any Unix system
        assert!(command_exists("ls"));
        // Random garbage should not exist
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("sh", "bash")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure() {
        let tools = &[("nonexistent_command_xyz", "fake-package"), ("ls", "coreutils")];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(!err.contains("coreutils"));
    }
}
