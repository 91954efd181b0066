//! Package database handle.
//!
//! [`PackageDb`] is the seam between the kernel controller and the system
//! package manager. The worker thread only ever queues installs/removals and
//! commits; listing happens on the controller side.

use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::{discover_kernels, parse_search_output, Kernel};
use crate::process::{CommandRunner, CommandSpec, Privileged};

/// Query/transaction interface to the system package database.
pub trait PackageDb: Send {
    /// Every kernel variant the sync databases offer.
    fn kernels(&mut self) -> Result<Vec<Kernel>>;

    /// Queue `name` for installation in the pending transaction.
    fn add_install(&mut self, name: &str) -> Result<()>;

    /// Queue `name` for removal in the pending transaction.
    fn add_remove(&mut self, name: &str) -> Result<()>;

    /// Run the pending transaction and clear it.
    fn commit(&mut self) -> Result<()>;

    /// Release the handle. Later operations fail.
    fn release(&mut self);
}

/// Handle shared between a controller and its worker thread.
pub type DbHandle = Arc<Mutex<dyn PackageDb>>;

pub fn shared<D: PackageDb + 'static>(db: D) -> DbHandle {
    Arc::new(Mutex::new(db))
}

/// Lock the handle even if a previous holder panicked.
pub(crate) fn lock(db: &DbHandle) -> MutexGuard<'_, dyn PackageDb + 'static> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`PackageDb`] driving the `pacman` command line.
///
/// Mutating commands go through the privileged helper; queries run as the
/// current user.
pub struct PacmanDb {
    runner: Arc<dyn CommandRunner>,
    privileged: Privileged,
    pacman: String,
    search_pattern: String,
    known: Vec<Kernel>,
    installs: Vec<String>,
    removals: Vec<String>,
    released: bool,
}

impl PacmanDb {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        privileged: Privileged,
        pacman: impl Into<String>,
        search_pattern: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            privileged,
            pacman: pacman.into(),
            search_pattern: search_pattern.into(),
            known: Vec::new(),
            installs: Vec::new(),
            removals: Vec::new(),
            released: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            bail!("package database handle already released");
        }
        Ok(())
    }

    fn ensure_known(&self, name: &str) -> Result<()> {
        if !self.known.iter().any(|k| k.raw() == name) {
            bail!("target not found: {}", name);
        }
        Ok(())
    }

    fn run_privileged(&self, flag: &str, targets: &[String]) -> Result<()> {
        let cmd = self.privileged.wrap(
            CommandSpec::new(&self.pacman)
                .args([flag, "--noconfirm"])
                .args(targets.iter().cloned()),
        );
        info!("{}", cmd);
        self.runner
            .run(&cmd)?
            .ensure_success(&format!("pacman {}", flag))?;
        Ok(())
    }
}

impl PackageDb for PacmanDb {
    fn kernels(&mut self) -> Result<Vec<Kernel>> {
        self.ensure_open()?;
        let cmd = CommandSpec::new(&self.pacman).args(["-Ss", self.search_pattern.as_str()]);
        let out = self
            .runner
            .run(&cmd)
            .with_context(|| format!("querying sync databases with '{}'", cmd))?;
        // pacman exits 1 when nothing matches
        if !out.success() && !out.stdout.trim().is_empty() {
            out.clone().ensure_success("pacman -Ss")?;
        }
        let kernels = discover_kernels(&parse_search_output(&out.stdout));
        debug!("found {} kernel packages", kernels.len());
        self.known = kernels.clone();
        Ok(kernels)
    }

    fn add_install(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.ensure_known(name)?;
        if !self.installs.iter().any(|n| n == name) {
            self.installs.push(name.to_string());
        }
        Ok(())
    }

    fn add_remove(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.ensure_known(name)?;
        if !self.known.iter().any(|k| k.raw() == name && k.is_installed()) {
            bail!("target not installed: {}", name);
        }
        if !self.removals.iter().any(|n| n == name) {
            self.removals.push(name.to_string());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let installs = std::mem::take(&mut self.installs);
        let removals = std::mem::take(&mut self.removals);

        let mut failures = Vec::new();
        if !installs.is_empty() {
            if let Err(e) = self.run_privileged("-S", &installs) {
                failures.push(format!("{:#}", e));
            }
        }
        if !removals.is_empty() {
            if let Err(e) = self.run_privileged("-Rns", &removals) {
                failures.push(format!("{:#}", e));
            }
        }

        if !failures.is_empty() {
            bail!("failed to commit transaction: {}", failures.join("; "));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.installs.clear();
        self.removals.clear();
    }
}
