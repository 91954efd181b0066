//! Queries against the scx systemd unit.

use std::sync::Arc;

use crate::process::{exec, CommandRunner};

/// A systemd unit queried with `systemctl is-enabled` / `is-active`.
#[derive(Clone)]
pub struct ScxService {
    runner: Arc<dyn CommandRunner>,
    systemctl: String,
    unit: String,
}

impl ScxService {
    pub fn new(runner: Arc<dyn CommandRunner>, systemctl: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            runner,
            systemctl: systemctl.into(),
            unit: unit.into(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn systemctl(&self) -> &str {
        &self.systemctl
    }

    pub fn is_enabled(&self) -> bool {
        self.query("is-enabled") == "enabled"
    }

    pub fn is_active(&self) -> bool {
        self.query("is-active") == "active"
    }

    fn query(&self, verb: &str) -> String {
        exec(
            self.runner.as_ref(),
            &format!("{} {} {}", self.systemctl, verb, self.unit),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;

    #[test]
    fn test_enabled_and_active() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("systemctl is-enabled scx", 0, "enabled\n")
            .respond("systemctl is-active scx", 3, "inactive\n");
        let service = ScxService::new(runner.clone(), "systemctl", "scx");

        assert!(service.is_enabled());
        assert!(!service.is_active());
        assert_eq!(
            runner.lines(),
            vec!["systemctl is-enabled scx", "systemctl is-active scx"]
        );
    }

    #[test]
    fn test_static_is_not_enabled() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("systemctl is-enabled scx", 0, "static\n");
        let service = ScxService::new(runner, "systemctl", "scx");

        assert!(!service.is_enabled());
    }
}
