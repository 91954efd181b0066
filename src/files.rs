//! Best-effort file readers for sysfs and small config files.
//!
//! Both helpers swallow errors and return an empty string; the callers treat
//! "empty" as "unknown" and keep going.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Read the first line of `path`, without its line terminator.
///
/// Returns an empty string if the file cannot be opened. A file that opens
/// but yields no line (empty, or unreadable) is logged and also returns empty.
pub fn read_first_line(path: &Path) -> String {
    let Ok(file) = File::open(path) else {
        return String::new();
    };

    let mut line = String::new();
    match BufReader::new(file).read_line(&mut line) {
        Ok(0) | Err(_) => {
            warn!("Failed to read := '{}'", path.display());
            String::new()
        }
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            trimmed.to_string()
        }
    }
}

/// Read all of `path`, or an empty string on any failure.
pub fn read_whole_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_first_line_strips_newline() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state");
        fs::write(&path, "enabled\nsecond\n").unwrap();

        assert_eq!(read_first_line(&path), "enabled");
    }

    #[test]
    fn test_read_first_line_missing_file() {
        let temp = TempDir::new().unwrap();
        assert_eq!(read_first_line(&temp.path().join("nope")), "");
    }

    #[test]
    fn test_read_first_line_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ops");
        fs::write(&path, "").unwrap();

        assert_eq!(read_first_line(&path), "");
    }

    #[test]
    fn test_read_whole_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scx");
        fs::write(&path, "SCX_SCHEDULER=scx_rusty\n#SCX_FLAGS=\n").unwrap();

        assert_eq!(read_whole_file(&path), "SCX_SCHEDULER=scx_rusty\n#SCX_FLAGS=\n");
        assert_eq!(read_whole_file(&temp.path().join("missing")), "");
    }
}
