//! Scheduler extension controller.
//!
//! Holds what a scheduler picker shows (current scheduler, selection, flags,
//! button state) and performs the apply/disable actions. Actions run the
//! privileged helper synchronously and hand back its exit status; the
//! buttons are disabled only for that synchronous stretch.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use super::conf::{apply_script, flags_sed_expr, is_flags_commented, ScxConf};
use super::service::ScxService;
use super::{current_scheduler, SchedPaths, Scheduler};
use crate::config::Config;
use crate::files::read_whole_file;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, Privileged};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedMessage {
    Select(Scheduler),
    SetFlags(String),
    Tick,
    Apply,
    Disable,
}

/// What [`SchedExtController::disable`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableOutcome {
    /// `systemctl disable --now`, the unit was enabled.
    Disabled(CommandOutput),
    /// `systemctl stop`, the unit was running but not enabled.
    Stopped(CommandOutput),
    /// Neither enabled nor running.
    NothingToDo,
}

pub struct SchedExtController {
    runner: Arc<dyn CommandRunner>,
    privileged: Privileged,
    service: ScxService,
    paths: SchedPaths,
    conf_path: PathBuf,
    bash: String,
    poll_interval: Duration,
    current: String,
    selected: Scheduler,
    flags: String,
    buttons_enabled: bool,
}

impl SchedExtController {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>, privileged: Privileged) -> Self {
        let paths = SchedPaths::from(&config.sched_ext);
        let conf_path = config.sched_ext.scx_conf_path.clone();

        // preselect whatever the service is configured to run
        let conf = ScxConf::parse(&read_whole_file(&conf_path));
        let selected = conf
            .scheduler
            .as_deref()
            .and_then(|name| name.parse::<Scheduler>().ok())
            .unwrap_or_default();

        Self {
            service: ScxService::new(
                runner.clone(),
                config.commands.systemctl.clone(),
                config.sched_ext.service.clone(),
            ),
            runner,
            privileged,
            current: current_scheduler(&paths),
            paths,
            conf_path,
            bash: config.commands.bash.clone(),
            poll_interval: config.sched_ext.poll_interval(),
            selected,
            flags: conf.flags.unwrap_or_default(),
            buttons_enabled: true,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn selected(&self) -> Scheduler {
        self.selected
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn buttons_enabled(&self) -> bool {
        self.buttons_enabled
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn update(&mut self, message: SchedMessage) -> Result<()> {
        match message {
            SchedMessage::Select(scheduler) => self.selected = scheduler,
            SchedMessage::SetFlags(flags) => self.flags = flags,
            SchedMessage::Tick => {
                self.refresh();
            }
            SchedMessage::Apply => {
                self.apply()?;
            }
            SchedMessage::Disable => {
                self.disable()?;
            }
        }
        Ok(())
    }

    /// Re-read the active scheduler. Returns `true` if it changed.
    pub fn refresh(&mut self) -> bool {
        let current = current_scheduler(&self.paths);
        if current == self.current {
            return false;
        }
        self.current = current;
        true
    }

    /// Call `on_tick` with the current scheduler every poll interval, `ticks`
    /// times (forever when `None`).
    pub fn watch(&mut self, ticks: Option<u64>, mut on_tick: impl FnMut(&str, bool)) {
        let mut remaining = ticks;
        loop {
            if remaining == Some(0) {
                break;
            }
            let changed = self.refresh();
            on_tick(&self.current, changed);
            remaining = remaining.map(|n| n - 1);
            if remaining != Some(0) {
                thread::sleep(self.poll_interval);
            }
        }
    }

    /// Shell script [`apply`](Self::apply) would run for the current
    /// selection.
    pub fn apply_command(&self) -> String {
        let service_cmd = if self.service.is_enabled() {
            "restart"
        } else {
            "enable --now"
        };
        let flags_commented = is_flags_commented(&read_whole_file(&self.conf_path));
        let flags_expr = flags_sed_expr(self.flags.trim(), flags_commented);

        apply_script(
            self.selected.name(),
            flags_expr.as_deref(),
            &self.conf_path,
            self.service.systemctl(),
            service_cmd,
            self.service.unit(),
        )
    }

    /// Write the selection into the scx config and (re)start the service.
    pub fn apply(&mut self) -> Result<CommandOutput> {
        self.buttons_enabled = false;

        let script = self.apply_command();
        let cmd = self
            .privileged
            .wrap(CommandSpec::new(&self.bash).args(["-c", script.as_str()]));
        let result = self.runner.run(&cmd);
        info!("Applying scx {}", self.selected);
        if let Ok(out) = &result {
            if !out.success() {
                warn!("applying {} exited with {:?}", self.selected, out.code);
            }
        }

        self.buttons_enabled = true;
        result
    }

    /// Turn the scx service off: disable it if enabled, stop it if merely
    /// running.
    pub fn disable(&mut self) -> Result<DisableOutcome> {
        self.buttons_enabled = false;

        let systemctl = CommandSpec::new(self.service.systemctl());
        let result = if self.service.is_enabled() {
            info!("Disabling scx");
            let cmd = systemctl.args(["disable", "--now", self.service.unit()]);
            self.runner
                .run(&self.privileged.wrap(cmd))
                .map(DisableOutcome::Disabled)
        } else if self.service.is_active() {
            info!("Stopping scx");
            let cmd = systemctl.args(["stop", self.service.unit()]);
            self.runner
                .run(&self.privileged.wrap(cmd))
                .map(DisableOutcome::Stopped)
        } else {
            Ok(DisableOutcome::NothingToDo)
        };

        self.buttons_enabled = true;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        config: Config,
        runner: Arc<ScriptedRunner>,
    }

    fn fixture(conf: &str) -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.sched_ext.state_path = temp.path().join("state");
        config.sched_ext.ops_path = temp.path().join("ops");
        config.sched_ext.scx_conf_path = temp.path().join("scx");
        config.commands.systemctl = "systemctl".into();
        config.commands.bash = "bash".into();
        fs::write(&config.sched_ext.state_path, "enabled\n").unwrap();
        fs::write(&config.sched_ext.ops_path, "rusty_1.0.4\n").unwrap();
        fs::write(&config.sched_ext.scx_conf_path, conf).unwrap();
        Fixture {
            _temp: temp,
            config,
            runner: Arc::new(ScriptedRunner::new()),
        }
    }

    fn controller(fx: &Fixture) -> SchedExtController {
        SchedExtController::new(&fx.config, fx.runner.clone(), Privileged::new("pkexec"))
    }

    #[test]
    fn test_new_reads_state_and_conf() {
        let fx = fixture("SCX_SCHEDULER=scx_lavd\nSCX_FLAGS='--performance'\n");
        let ctl = controller(&fx);

        assert_eq!(ctl.current(), "rusty_1.0.4");
        assert_eq!(ctl.selected(), Scheduler::Lavd);
        assert_eq!(ctl.flags(), "--performance");
        assert!(ctl.buttons_enabled());
    }

    #[test]
    fn test_apply_enables_when_service_disabled() {
        let fx = fixture("SCX_SCHEDULER=scx_rusty\nSCX_FLAGS='-k'\n");
        fx.runner.respond("systemctl is-enabled scx", 1, "disabled\n");
        let mut ctl = controller(&fx);
        ctl.update(SchedMessage::Select(Scheduler::Bpfland)).unwrap();
        ctl.update(SchedMessage::SetFlags("  ".into())).unwrap();

        let out = ctl.apply().unwrap();
        assert!(out.success());
        assert!(ctl.buttons_enabled());

        let calls = fx.runner.calls.lock().unwrap();
        let last = calls.last().unwrap();
        assert_eq!(last.program, "pkexec");
        assert_eq!(last.args[0], "bash");
        assert_eq!(last.args[1], "-c");
        assert_eq!(
            last.args[2],
            format!(
                "sed -e 's/SCX_SCHEDULER=.*/SCX_SCHEDULER=scx_bpfland/' -e 's/SCX_FLAGS=/#SCX_FLAGS=/' -i {} && systemctl enable --now scx",
                fx.config.sched_ext.scx_conf_path.display()
            )
        );
    }

    #[test]
    fn test_apply_restarts_and_uncomments_flags() {
        let fx = fixture("SCX_SCHEDULER=scx_rusty\n#SCX_FLAGS=\n");
        fx.runner.respond("systemctl is-enabled scx", 0, "enabled\n");
        let mut ctl = controller(&fx);
        ctl.update(SchedMessage::SetFlags("--slice-us 5000".into())).unwrap();

        let script = ctl.apply_command();
        assert!(script.contains(r#"-e "s/.*SCX_FLAGS=.*/SCX_FLAGS='--slice-us 5000'/""#));
        assert!(script.ends_with("&& systemctl restart scx"));
    }

    #[test]
    fn test_apply_reports_failure_status() {
        let fx = fixture("SCX_SCHEDULER=scx_rusty\n");
        fx.runner.respond("pkexec bash", 126, "");
        let mut ctl = controller(&fx);

        let out = ctl.apply().unwrap();
        assert_eq!(out.code, Some(126));
        assert!(ctl.buttons_enabled());
    }

    #[test]
    fn test_disable_enabled_service() {
        let fx = fixture("");
        fx.runner.respond("systemctl is-enabled scx", 0, "enabled\n");
        let mut ctl = controller(&fx);

        let outcome = ctl.disable().unwrap();
        assert!(matches!(outcome, DisableOutcome::Disabled(_)));
        assert_eq!(
            fx.runner.lines().last().unwrap(),
            "pkexec systemctl disable --now scx"
        );
    }

    #[test]
    fn test_disable_active_service_stops() {
        let fx = fixture("");
        fx.runner
            .respond("systemctl is-enabled scx", 1, "disabled\n")
            .respond("systemctl is-active scx", 0, "active\n");
        let mut ctl = controller(&fx);

        let outcome = ctl.disable().unwrap();
        assert!(matches!(outcome, DisableOutcome::Stopped(_)));
        assert_eq!(fx.runner.lines().last().unwrap(), "pkexec systemctl stop scx");
    }

    #[test]
    fn test_disable_idle_service_does_nothing() {
        let fx = fixture("");
        fx.runner
            .respond("systemctl is-enabled scx", 1, "disabled\n")
            .respond("systemctl is-active scx", 3, "inactive\n");
        let mut ctl = controller(&fx);

        assert_eq!(ctl.disable().unwrap(), DisableOutcome::NothingToDo);
        assert!(!fx.runner.lines().iter().any(|l| l.starts_with("pkexec")));
    }

    #[test]
    fn test_tick_refreshes_current() {
        let fx = fixture("");
        let mut ctl = controller(&fx);
        assert!(!ctl.refresh());

        fs::write(&fx.config.sched_ext.state_path, "disabled\n").unwrap();
        ctl.update(SchedMessage::Tick).unwrap();
        assert_eq!(ctl.current(), "disabled");
    }

    #[test]
    fn test_watch_runs_requested_ticks() {
        let mut fx = fixture("");
        fx.config.sched_ext.poll_interval_ms = 1;
        let mut ctl = controller(&fx);

        let mut seen = Vec::new();
        ctl.watch(Some(3), |current, _| seen.push(current.to_string()));
        assert_eq!(seen, vec!["rusty_1.0.4"; 3]);
    }
}
