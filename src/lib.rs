//! Kernel package and sched_ext scheduler management.
//!
//! Two independent controllers make up the application:
//!
//! - **Kernel manager** - lists the kernel variants the package database
//!   offers, tracks which ones the user wants changed, and runs the
//!   install/remove transaction on a dedicated worker thread
//! - **Scheduler extension** - shows the active sched_ext scheduler and
//!   switches the `scx` service to another one through the privileged helper
//!
//! They share nothing but the helpers for running commands and reading files.
//!
//! # Architecture
//!
//! ```text
//! kernel-manager (binary)
//!     │
//!     ├── kernel::manager::KernelManager
//!     │       ├── kernel::change_list   (what the user toggled)
//!     │       ├── kernel::worker        (one thread, Idle/Running/Stopping)
//!     │       └── kernel::db::PackageDb (pacman)
//!     │
//!     └── sched::controller::SchedExtController
//!             ├── sched::current_scheduler (sysfs)
//!             ├── sched::conf              (/etc/default/scx)
//!             └── sched::service           (systemctl)
//!
//! process (CommandRunner, pkexec)   files (best-effort reads)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kernel_manager::kernel::db::{shared, PacmanDb};
//! use kernel_manager::kernel::manager::{KernelManager, KernelMessage};
//! use kernel_manager::process::{Privileged, SystemRunner};
//!
//! let db = PacmanDb::new(Arc::new(SystemRunner), Privileged::detect("pkexec"), "pacman", "^linux");
//! let mut manager = KernelManager::new(shared(db))?;
//! if let Some(index) = manager.find_row("linux-zen") {
//!     manager.update(KernelMessage::Toggle(index))?;
//!     manager.update(KernelMessage::Execute)?;
//! }
//! ```

pub mod config;
pub mod files;
pub mod kernel;
pub mod preflight;
pub mod process;
pub mod sched;

pub use config::Config;
pub use kernel::manager::{KernelManager, KernelMessage};
pub use sched::controller::{SchedExtController, SchedMessage};
