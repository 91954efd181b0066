use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use kernel_manager::kernel::db::{shared, PackageDb};
use kernel_manager::kernel::Kernel;
use kernel_manager::{KernelManager, KernelMessage};

#[derive(Default)]
struct MemoryDb {
    installed: Arc<Mutex<Vec<String>>>,
    pending: Vec<(bool, String)>,
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl MemoryDb {
    fn catalog() -> Vec<(&'static str, &'static str)> {
        vec![("linux", "core"), ("linux-lts", "core"), ("linux-zen", "extra")]
    }
}

impl PackageDb for MemoryDb {
    fn kernels(&mut self) -> Result<Vec<Kernel>> {
        let installed = self.installed.lock().unwrap();
        Ok(Self::catalog()
            .into_iter()
            .map(|(name, repo)| {
                let kernel = Kernel::new(name, "6.10.5", repo);
                if installed.iter().any(|n| n == name) {
                    kernel.with_installed(repo, false)
                } else {
                    kernel
                }
            })
            .collect())
    }

    fn add_install(&mut self, name: &str) -> Result<()> {
        if self.released {
            bail!("released");
        }
        self.pending.push((true, name.to_string()));
        Ok(())
    }

    fn add_remove(&mut self, name: &str) -> Result<()> {
        if self.released {
            bail!("released");
        }
        self.pending.push((false, name.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut installed = self.installed.lock().unwrap();
        for (install, name) in self.pending.drain(..) {
            if install {
                installed.push(name);
            } else {
                installed.retain(|n| *n != name);
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn swap_kernels_and_reload_rows() {
    let db = MemoryDb::default();
    db.installed.lock().unwrap().push("linux".to_string());
    let installed = db.installed.clone();
    let releases = db.releases.clone();

    let mut manager = KernelManager::new(shared(db)).unwrap();
    let linux = manager.find_row("linux").unwrap();
    let zen = manager.find_row("linux-zen").unwrap();
    assert!(manager.rows()[linux].immutable);

    manager.update(KernelMessage::Toggle(zen)).unwrap();
    manager.update(KernelMessage::Toggle(linux)).unwrap();
    manager.update(KernelMessage::Execute).unwrap();

    let report = manager
        .wait_for_transaction(Duration::from_secs(5))
        .expect("transaction finished");
    assert!(report.is_clean());
    assert_eq!(*installed.lock().unwrap(), vec!["linux-zen"]);

    // rows reflect the new state
    let rows = manager.rows();
    assert!(rows[zen].checked && rows[zen].immutable);
    assert!(!rows[linux].checked && !rows[linux].immutable);
    assert!(manager.changes().is_empty());

    manager.update(KernelMessage::Close).unwrap();
    drop(manager);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn untouched_rows_do_not_enable_confirm() {
    let db = MemoryDb::default();
    let mut manager = KernelManager::new(shared(db)).unwrap();
    let lts = manager.find_row("linux-lts").unwrap();

    manager.update(KernelMessage::Toggle(lts)).unwrap();
    manager.update(KernelMessage::Toggle(lts)).unwrap();

    assert!(!manager.ok_enabled());
    assert!(!manager.execute());
}
