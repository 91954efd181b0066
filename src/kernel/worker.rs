//! The single background thread that runs install/remove transactions.
//!
//! The controller and the worker share one [`WorkerState`] behind a mutex and
//! condition variable:
//!
//! ```text
//!            start()                 batch done
//!   Idle ───────────────▶ Running ───────────────▶ Idle
//!    │                       │
//!    │ shutdown()            │ shutdown()
//!    ▼                       ▼
//!  Stopping ◀────────────────┘   (loop exits at the next check)
//! ```
//!
//! A stop request is a state like any other, so the worker cannot miss it
//! and re-park forever.
//!
//! Failures are best effort: a package that cannot be queued is logged and
//! the rest of the batch still runs. There is no rollback.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::db::{self, DbHandle};
use super::Kernel;

const WORKER_THREAD_NAME: &str = "WorkerThread";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Remove,
}

/// One requested change, with the kernel of the row it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kernel: Kernel,
    pub action: Action,
}

impl Change {
    pub fn name(&self) -> &str {
        self.kernel.raw()
    }
}

/// Everything the worker needs, copied out of the controller at confirm time.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub changes: Vec<Change>,
}

/// Outcome of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReport {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    /// Packages that could not be queued, with the database's message.
    pub failed: Vec<(String, String)>,
    pub commit_error: Option<String>,
}

impl TransactionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.commit_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A transaction with this many changes began.
    Started(usize),
    Finished(TransactionReport),
}

struct Slot {
    state: WorkerState,
    pending: Option<Transaction>,
}

struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner side of the transaction thread.
pub struct TransactionWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    events: Receiver<WorkerEvent>,
}

impl TransactionWorker {
    pub fn spawn(db: DbHandle) -> Result<Self> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                state: WorkerState::Idle,
                pending: None,
            }),
            wake: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_loop(&worker_shared, &db, &tx))
            .context("spawning transaction worker thread")?;

        Ok(Self {
            shared,
            handle: Some(handle),
            events: rx,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    /// Hand a transaction to the worker.
    ///
    /// Returns `false` without doing anything if one is already running or
    /// the worker is stopping.
    pub fn start(&self, transaction: Transaction) -> bool {
        let mut slot = self.shared.lock();
        if slot.state != WorkerState::Idle {
            return false;
        }
        slot.pending = Some(transaction);
        slot.state = WorkerState::Running;
        self.shared.wake.notify_all();
        true
    }

    pub fn try_event(&self) -> Option<WorkerEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event. `None` on timeout or once the
    /// worker has exited.
    pub fn wait_event(&self, timeout: Duration) -> Option<WorkerEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Ask the worker to exit. A transaction in flight is not interrupted.
    ///
    /// With `wait`, blocks until the thread has exited; otherwise the thread
    /// is left to finish on its own.
    pub fn shutdown(&mut self, wait: bool) {
        {
            let mut slot = self.shared.lock();
            slot.state = WorkerState::Stopping;
            self.shared.wake.notify_all();
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        if wait && handle.join().is_err() {
            error!("transaction worker panicked");
        }
    }
}

impl Drop for TransactionWorker {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

fn run_loop(shared: &Shared, db: &DbHandle, events: &Sender<WorkerEvent>) {
    loop {
        let transaction = {
            let mut slot = shared.lock();
            debug!("Waiting...");
            while slot.state == WorkerState::Idle {
                slot = shared.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
            }
            if slot.state == WorkerState::Stopping {
                break;
            }
            slot.pending.take().unwrap_or_default()
        };

        let _ = events.send(WorkerEvent::Started(transaction.changes.len()));
        let report = apply(db, &transaction);

        // Idle must be visible by the time Finished is received
        {
            let mut slot = shared.lock();
            if slot.state == WorkerState::Running {
                slot.state = WorkerState::Idle;
            }
        }
        let _ = events.send(WorkerEvent::Finished(report));
    }
    debug!("transaction worker exiting");
}

/// Queue installs, then removals, then commit.
pub fn apply(db: &DbHandle, transaction: &Transaction) -> TransactionReport {
    let mut report = TransactionReport::default();
    install_packages(db, transaction, &mut report);
    remove_packages(db, transaction, &mut report);

    if report.installed.is_empty() && report.removed.is_empty() {
        return report;
    }

    info!(
        "committing transaction: {} to install, {} to remove",
        report.installed.len(),
        report.removed.len()
    );
    if let Err(e) = db::lock(db).commit() {
        error!("failed to commit transaction ({:#})", e);
        report.commit_error = Some(format!("{:#}", e));
    }
    report
}

fn install_packages(db: &DbHandle, transaction: &Transaction, report: &mut TransactionReport) {
    for change in transaction.changes.iter().filter(|c| c.action == Action::Install) {
        let kernel = &change.kernel;
        if kernel.is_installed() && !kernel.is_update_available() {
            continue;
        }
        match db::lock(db).add_install(kernel.raw()) {
            Ok(()) => report.installed.push(kernel.raw().to_string()),
            Err(e) => {
                warn!("failed to add package to be installed ({:#})", e);
                report.failed.push((kernel.raw().to_string(), format!("{:#}", e)));
            }
        }
    }
}

fn remove_packages(db: &DbHandle, transaction: &Transaction, report: &mut TransactionReport) {
    for change in transaction.changes.iter().filter(|c| c.action == Action::Remove) {
        let kernel = &change.kernel;
        if !kernel.is_installed() {
            continue;
        }
        match db::lock(db).add_remove(kernel.raw()) {
            Ok(()) => report.removed.push(kernel.raw().to_string()),
            Err(e) => {
                warn!("failed to add package to be removed ({:#})", e);
                report.failed.push((kernel.raw().to_string(), format!("{:#}", e)));
            }
        }
    }
}
