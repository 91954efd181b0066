use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kernel_manager::kernel::db::{shared, PacmanDb};
use kernel_manager::kernel::manager::{KernelManager, KernelMessage, NO_KERNELS_WARNING};
use kernel_manager::preflight::{check_required_tools, KERNEL_TOOLS, SCHED_TOOLS};
use kernel_manager::process::{CommandRunner, Privileged, SystemRunner};
use kernel_manager::sched::controller::{DisableOutcome, SchedExtController, SchedMessage};
use kernel_manager::sched::Scheduler;
use kernel_manager::Config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

fn usage() -> &'static str {
    "Usage:\n  kernel-manager [--config <path>] kernels list [--json]\n  kernel-manager [--config <path>] kernels apply <package>...\n  kernel-manager [--config <path>] sched status\n  kernel-manager [--config <path>] sched list\n  kernel-manager [--config <path>] sched watch [ticks]\n  kernel-manager [--config <path>] sched apply <scheduler> [flags...]\n  kernel-manager [--config <path>] sched disable"
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = take_config_flag(&mut args)?;
    let config = Config::load(config_path.as_deref())?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["kernels", "list"] => list_kernels(&config, runner, false),
        ["kernels", "list", "--json"] => list_kernels(&config, runner, true),
        ["kernels", "apply", packages @ ..] if !packages.is_empty() => {
            apply_kernels(&config, runner, packages)
        }
        ["sched", "status"] => {
            let controller = sched_controller(&config, runner);
            println!("{}", controller.current());
            Ok(())
        }
        ["sched", "list"] => {
            for scheduler in Scheduler::ALL {
                println!("{scheduler}");
            }
            Ok(())
        }
        ["sched", "watch"] => watch_sched(&config, runner, None),
        ["sched", "watch", ticks] => {
            let ticks = ticks
                .parse::<u64>()
                .with_context(|| format!("invalid tick count '{ticks}'"))?;
            watch_sched(&config, runner, Some(ticks))
        }
        ["sched", "apply", scheduler, flags @ ..] => {
            apply_sched(&config, runner, scheduler, &flags.join(" "))
        }
        ["sched", "disable"] => disable_sched(&config, runner),
        _ => bail!(usage()),
    }
}

fn take_config_flag(args: &mut Vec<String>) -> Result<Option<PathBuf>> {
    let Some(pos) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("--config requires a path\n\n{}", usage());
    }
    let path = PathBuf::from(args.remove(pos + 1));
    args.remove(pos);
    Ok(Some(path))
}

fn open_manager(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<KernelManager> {
    let db = PacmanDb::new(
        runner,
        Privileged::detect(config.commands.pkexec.clone()),
        config.commands.pacman.clone(),
        config.kernels.search_pattern.clone(),
    );
    KernelManager::new(shared(db)).context("loading kernel list")
}

fn list_kernels(config: &Config, runner: Arc<dyn CommandRunner>, json: bool) -> Result<()> {
    let manager = open_manager(config, runner)?;
    let rows = manager.rows();

    if json {
        let kernels: Vec<_> = rows.iter().map(|row| &row.kernel).collect();
        println!("{}", serde_json::to_string_pretty(&kernels)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{NO_KERNELS_WARNING}");
        return Ok(());
    }
    for row in rows {
        let kernel = &row.kernel;
        let mark = if row.checked { "[x]" } else { "[ ]" };
        let mut status = String::new();
        if kernel.is_installed() {
            status.push_str(" installed");
            if !row.immutable {
                status.push_str(&format!(" (from {})", kernel.installed_db()));
            }
        }
        if kernel.is_update_available() {
            status.push_str(", update available");
        }
        println!(
            "{mark} {:<32} {:<20} {:<10} {}",
            format!("{}/{}", kernel.repo(), kernel.raw()),
            kernel.version(),
            kernel.category(),
            status.trim_start()
        );
    }
    Ok(())
}

fn apply_kernels(config: &Config, runner: Arc<dyn CommandRunner>, packages: &[&str]) -> Result<()> {
    check_required_tools(KERNEL_TOOLS)?;
    let mut manager = open_manager(config, runner)?;

    for package in packages {
        let Some(index) = manager.find_row(package) else {
            bail!("'{}' is not a known kernel package", package);
        };
        manager.update(KernelMessage::Toggle(index))?;
        let row = &manager.rows()[index];
        let verb = if row.checked { "install" } else { "remove" };
        println!("[kernels] {} {}", verb, package);
    }

    if !manager.ok_enabled() {
        println!("[kernels] nothing to do");
        return Ok(());
    }
    manager.update(KernelMessage::Execute)?;
    let report = manager
        .wait_for_transaction(TRANSACTION_TIMEOUT)
        .context("transaction did not finish")?;

    for (name, message) in &report.failed {
        println!("[kernels] {} skipped: {}", name, message);
    }
    if let Some(error) = &report.commit_error {
        bail!("transaction failed: {}", error);
    }
    println!(
        "[kernels] done: {} installed, {} removed",
        report.installed.len(),
        report.removed.len()
    );
    Ok(())
}

fn sched_controller(config: &Config, runner: Arc<dyn CommandRunner>) -> SchedExtController {
    SchedExtController::new(
        config,
        runner,
        Privileged::detect(config.commands.pkexec.clone()),
    )
}

fn watch_sched(config: &Config, runner: Arc<dyn CommandRunner>, ticks: Option<u64>) -> Result<()> {
    let mut controller = sched_controller(config, runner);
    let mut first = true;
    controller.watch(ticks, |current, changed| {
        if first || changed {
            println!("{current}");
            first = false;
        }
    });
    Ok(())
}

fn apply_sched(
    config: &Config,
    runner: Arc<dyn CommandRunner>,
    scheduler: &str,
    flags: &str,
) -> Result<()> {
    check_required_tools(SCHED_TOOLS)?;
    let scheduler: Scheduler = scheduler.parse()?;
    let mut controller = sched_controller(config, runner);

    controller.update(SchedMessage::Select(scheduler))?;
    controller.update(SchedMessage::SetFlags(flags.to_string()))?;
    let out = controller.apply()?;
    if !out.success() {
        bail!(
            "applying {} failed (exit {:?}): {}",
            scheduler,
            out.code,
            out.stderr.trim()
        );
    }
    println!("[sched] {} applied", scheduler);
    Ok(())
}

fn disable_sched(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<()> {
    check_required_tools(SCHED_TOOLS)?;
    let mut controller = sched_controller(config, runner);

    let (verb, out) = match controller.disable()? {
        DisableOutcome::Disabled(out) => ("disabled", out),
        DisableOutcome::Stopped(out) => ("stopped", out),
        DisableOutcome::NothingToDo => {
            println!("[sched] scx service is not running");
            return Ok(());
        }
    };
    out.ensure_success("systemctl")?;
    println!("[sched] scx service {}", verb);
    Ok(())
}
