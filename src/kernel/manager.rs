//! Kernel manager controller.
//!
//! Owns the view state a kernel list UI renders (rows, change list, whether
//! the confirm action is enabled) and is driven by [`KernelMessage`]s.
//!
//! # Teardown
//!
//! [`KernelManager::close`] asks the worker to stop and releases the database
//! handle without waiting for a transaction that is already running. The
//! worker then finds a released handle for whatever it had left to do and
//! logs the failures. This is best effort: closing mid-transaction may leave
//! only part of the batch applied.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::change_list::ChangeList;
use super::db::{self, DbHandle};
use super::worker::{Action, Change, Transaction, TransactionReport, TransactionWorker, WorkerEvent};
use super::Kernel;

pub const NO_KERNELS_WARNING: &str = "No kernels found!\nPlease run `pacman -Sy` to update DB!\nThis is needed for the app to work properly";

/// One line of the kernel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRow {
    pub kernel: Kernel,
    pub checked: bool,
    /// Installed from this row's repository; unchecking means removal.
    pub immutable: bool,
    pub displayed: bool,
}

impl KernelRow {
    pub fn new(kernel: Kernel) -> Self {
        let immutable = kernel.is_installed_from_here();
        Self {
            kernel,
            checked: immutable,
            immutable,
            displayed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelMessage {
    Toggle(usize),
    SetChecked(usize, bool),
    Select(usize),
    Execute,
    Close,
}

pub struct KernelManager {
    db: DbHandle,
    rows: Vec<KernelRow>,
    changes: ChangeList,
    current: Option<usize>,
    worker: Option<TransactionWorker>,
    running: bool,
    released: bool,
    last_report: Option<TransactionReport>,
}

impl KernelManager {
    /// Load the kernel list and start the worker thread.
    pub fn new(db: DbHandle) -> Result<Self> {
        let kernels = db::lock(&db).kernels()?;
        if kernels.is_empty() {
            warn!("{}", NO_KERNELS_WARNING);
        }
        let worker = TransactionWorker::spawn(db.clone())?;

        Ok(Self {
            db,
            rows: kernels.into_iter().map(KernelRow::new).collect(),
            changes: ChangeList::new(),
            current: None,
            worker: Some(worker),
            running: false,
            released: false,
            last_report: None,
        })
    }

    pub fn rows(&self) -> &[KernelRow] {
        &self.rows
    }

    pub fn changes(&self) -> &ChangeList {
        &self.changes
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_closed(&self) -> bool {
        self.released
    }

    pub fn last_report(&self) -> Option<&TransactionReport> {
        self.last_report.as_ref()
    }

    /// Whether the confirm action should be clickable.
    pub fn ok_enabled(&self) -> bool {
        !self.running && !self.released && !self.changes.is_empty()
    }

    /// Index of the first row for `name`.
    pub fn find_row(&self, name: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.kernel.raw() == name)
    }

    pub fn update(&mut self, message: KernelMessage) -> Result<()> {
        match message {
            KernelMessage::Toggle(index) => {
                let checked = !self.row(index)?.checked;
                self.set_checked(index, checked)?;
            }
            KernelMessage::SetChecked(index, checked) => self.set_checked(index, checked)?,
            KernelMessage::Select(index) => {
                self.row(index)?;
                self.current = Some(index);
            }
            KernelMessage::Execute => {
                self.execute();
            }
            KernelMessage::Close => self.close(),
        }
        Ok(())
    }

    fn row(&self, index: usize) -> Result<&KernelRow> {
        match self.rows.get(index) {
            Some(row) => Ok(row),
            None => bail!("no kernel row at index {} ({} rows)", index, self.rows.len()),
        }
    }

    fn set_checked(&mut self, index: usize, checked: bool) -> Result<()> {
        self.row(index)?;
        let row = &mut self.rows[index];
        row.checked = checked;
        if checked {
            self.current = Some(index);
        }
        self.changes
            .record(index, row.kernel.raw(), row.checked, row.immutable);
        Ok(())
    }

    /// Hand the pending changes to the worker.
    ///
    /// Returns `false` when nothing was started: a transaction is already
    /// running, nothing is pending, or the manager is closed.
    pub fn execute(&mut self) -> bool {
        if self.running || self.released || self.changes.is_empty() {
            return false;
        }
        let Some(worker) = &self.worker else {
            return false;
        };

        let transaction = self.snapshot();
        if !worker.start(transaction) {
            return false;
        }
        self.running = true;
        true
    }

    fn snapshot(&self) -> Transaction {
        let changes = self
            .changes
            .rows()
            .filter_map(|index| {
                let row = self.rows.get(index)?;
                let action = if row.checked {
                    Action::Install
                } else {
                    Action::Remove
                };
                Some(Change {
                    kernel: row.kernel.clone(),
                    action,
                })
            })
            .collect();
        Transaction { changes }
    }

    /// Drain worker notifications. Returns the report of a transaction that
    /// finished since the last call, if any.
    pub fn poll_worker(&mut self) -> Option<TransactionReport> {
        let mut finished = None;
        while let Some(event) = self.worker.as_ref().and_then(|w| w.try_event()) {
            if let Some(report) = self.handle_event(event) {
                finished = Some(report);
            }
        }
        finished
    }

    /// Block until the running transaction finishes or `timeout` passes.
    pub fn wait_for_transaction(&mut self, timeout: Duration) -> Option<TransactionReport> {
        let deadline = Instant::now() + timeout;
        while self.running {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let event = self.worker.as_ref().and_then(|w| w.wait_event(remaining))?;
            if let Some(report) = self.handle_event(event) {
                return Some(report);
            }
        }
        None
    }

    fn handle_event(&mut self, event: WorkerEvent) -> Option<TransactionReport> {
        match event {
            WorkerEvent::Started(count) => {
                info!("applying {} kernel change(s)", count);
                None
            }
            WorkerEvent::Finished(report) => {
                self.running = false;
                self.changes.clear();
                self.reload();
                self.last_report = Some(report.clone());
                Some(report)
            }
        }
    }

    /// Re-read the kernel list after a transaction.
    fn reload(&mut self) {
        if self.released {
            return;
        }
        match db::lock(&self.db).kernels() {
            Ok(kernels) => {
                self.rows = kernels.into_iter().map(KernelRow::new).collect();
                self.current = self.current.filter(|&i| i < self.rows.len());
            }
            Err(e) => warn!("failed to refresh kernel list: {:#}", e),
        }
    }

    /// Stop the worker and release the database handle. Safe to call more
    /// than once; the handle is released only the first time.
    pub fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown(false);
        }
        if self.released {
            return;
        }
        if self.running {
            warn!("closing while a transaction is still running");
        }
        db::lock(&self.db).release();
        self.released = true;
    }
}

impl Drop for KernelManager {
    fn drop(&mut self) {
        self.close();
    }
}
