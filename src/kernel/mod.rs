//! Kernel packages: model, discovery and the install/remove transaction.
//!
//! A kernel variant is any package `P` for which the sync databases also
//! carry `P-headers`. The same name may be offered by more than one
//! repository; each offer becomes its own [`Kernel`].
//!
//! # Modules
//!
//! - [`db`] - package database handle (`pacman` backed)
//! - [`change_list`] - which rows the user toggled
//! - [`worker`] - the single background transaction thread
//! - [`manager`] - the controller tying the above together

pub mod change_list;
pub mod db;
pub mod manager;
pub mod worker;

use serde::Serialize;
use std::collections::HashSet;

const HEADERS_SUFFIX: &str = "-headers";

/// One kernel package as offered by one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kernel {
    name: String,
    version: String,
    category: String,
    repo: String,
    installed: bool,
    update_available: bool,
    installed_db: String,
}

impl Kernel {
    pub fn new(name: impl Into<String>, version: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            category: "stable".to_string(),
            repo: repo.into(),
            installed: false,
            update_available: false,
            installed_db: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Mark as installed from `installed_db`, optionally with a newer version
    /// available in this kernel's repository.
    pub fn with_installed(mut self, installed_db: impl Into<String>, update_available: bool) -> Self {
        self.installed = true;
        self.installed_db = installed_db.into();
        self.update_available = update_available;
        self
    }

    /// Raw package name, e.g. `linux-cachyos-lts`.
    pub fn raw(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Repository offering this package.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_update_available(&self) -> bool {
        self.update_available
    }

    /// Repository the installed copy came from; empty when unknown.
    pub fn installed_db(&self) -> &str {
        &self.installed_db
    }

    /// Installed, and installed from this kernel's own repository.
    pub fn is_installed_from_here(&self) -> bool {
        self.installed && (self.installed_db.is_empty() || self.installed_db == self.repo)
    }
}

/// Category shown next to a kernel, guessed from its description.
pub fn category_from_description(description: &str) -> &'static str {
    let desc = description.to_ascii_lowercase();
    let words: Vec<&str> = desc
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |needle: &str| words.iter().any(|w| *w == needle);

    if has("lts") || desc.contains("long-term") || desc.contains("longterm") {
        "longterm"
    } else if has("hardened") || desc.contains("security-focused") {
        "hardened"
    } else if desc.contains("real-time") || has("realtime") || has("rt") {
        "realtime"
    } else if has("zen") {
        "zen"
    } else if has("lqx") || has("liquorix") {
        "liquorix"
    } else {
        "stable"
    }
}

/// Installation state reported by `pacman -Ss`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledMarker {
    /// `[installed]`: the local version equals this repository's.
    Current,
    /// `[installed: <local>]`: a different version is installed.
    Other(String),
}

/// One result block from `pacman -Ss`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub repo: String,
    pub name: String,
    pub version: String,
    pub installed: Option<InstalledMarker>,
    pub description: String,
}

/// Parse `pacman -Ss` output.
///
/// ```text
/// core/linux 6.10.5.arch1-1 [installed]
///     The Linux kernel and modules
/// cachyos/linux-cachyos 6.10.5-2 (cachyos-kernel) [installed: 6.10.4-1]
///     The Linux EEVDF-BORE + Cachy Sauce Kernel by CachyOS
/// ```
///
/// Lines that do not look like a result header are ignored.
pub fn parse_search_output(output: &str) -> Vec<SearchEntry> {
    let mut entries: Vec<SearchEntry> = Vec::new();

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            if let Some(last) = entries.last_mut() {
                let text = line.trim();
                if last.description.is_empty() {
                    last.description = text.to_string();
                } else if !text.is_empty() {
                    last.description.push(' ');
                    last.description.push_str(text);
                }
            }
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(qualified), Some(version)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((repo, name)) = qualified.split_once('/') else {
            continue;
        };

        entries.push(SearchEntry {
            repo: repo.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            installed: parse_installed_marker(line),
            description: String::new(),
        });
    }

    entries
}

fn parse_installed_marker(line: &str) -> Option<InstalledMarker> {
    let start = line.find("[installed")?;
    let rest = &line[start + "[installed".len()..];
    let end = rest.find(']')?;
    let inner = rest[..end].trim();
    match inner.strip_prefix(':') {
        Some(version) => Some(InstalledMarker::Other(version.trim().to_string())),
        None if inner.is_empty() => Some(InstalledMarker::Current),
        None => None,
    }
}

/// Pick the kernel variants out of a search listing.
///
/// Entries keep their listing order, which follows the repository order of
/// `pacman.conf`.
pub fn discover_kernels(entries: &[SearchEntry]) -> Vec<Kernel> {
    let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();

    entries
        .iter()
        .filter(|e| !e.name.ends_with(HEADERS_SUFFIX))
        .filter(|e| names.contains(format!("{}{}", e.name, HEADERS_SUFFIX).as_str()))
        .map(|entry| {
            let kernel = Kernel::new(&entry.name, &entry.version, &entry.repo)
                .with_category(category_from_description(&entry.description));
            match &entry.installed {
                None => kernel,
                Some(marker) => {
                    let update = matches!(marker, InstalledMarker::Other(_));
                    kernel.with_installed(installed_db_for(entries, &entry.name), update)
                }
            }
        })
        .collect()
}

/// Repository the installed copy of `name` most likely came from: the first
/// one whose version matches the installed version, else the first one that
/// reports it installed at all.
fn installed_db_for(entries: &[SearchEntry], name: &str) -> String {
    let mut offers = entries.iter().filter(|e| e.name == name && e.installed.is_some());
    let first = offers.clone().next();
    offers
        .find(|e| e.installed == Some(InstalledMarker::Current))
        .or(first)
        .map(|e| e.repo.clone())
        .unwrap_or_default()
}
