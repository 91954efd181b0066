//! The set of kernel rows the user asked to change.
//!
//! A row starts checked when its kernel is installed from that row's
//! repository ("immutable") and unchecked otherwise. A row is pending
//! exactly while it differs from that starting state: checked mutable rows
//! are installs, unchecked immutable rows are removals.
//!
//! Entries are keyed by row index. The same package name can appear once per
//! repository, and each of those rows is tracked on its own.

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    row: usize,
    name: String,
}

/// Ordered, duplicate-free list of rows awaiting a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeList {
    entries: Vec<Pending>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the new check state of row `row`.
    pub fn record(&mut self, row: usize, name: &str, checked: bool, immutable: bool) {
        if checked != immutable {
            if !self.contains_row(row) {
                self.entries.push(Pending {
                    row,
                    name: name.to_string(),
                });
            }
        } else {
            self.entries.retain(|p| p.row != row);
        }
    }

    /// Whether any pending row carries package `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|p| p.name == name)
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.entries.iter().any(|p| p.row == row)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pending row indices, in the order they were recorded.
    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|p| p.row)
    }

    /// Package names of the pending rows. A name repeats when rows from
    /// several repositories are pending.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_then_uncheck_mutable() {
        let mut list = ChangeList::new();
        list.record(1, "linux-zen", true, false);
        assert_eq!(list.names(), ["linux-zen"]);

        list.record(1, "linux-zen", false, false);
        assert!(list.is_empty());
    }

    #[test]
    fn test_uncheck_immutable_marks_removal() {
        let mut list = ChangeList::new();
        list.record(0, "linux", false, true);
        assert!(list.contains("linux"));

        // re-checking restores the installed state, nothing to do
        list.record(0, "linux", true, true);
        assert!(list.is_empty());
    }

    #[test]
    fn test_no_duplicates_and_order_kept() {
        let mut list = ChangeList::new();
        list.record(1, "b", true, false);
        list.record(0, "a", true, false);
        list.record(1, "b", true, false);
        assert_eq!(list.names(), ["b", "a"]);
        assert_eq!(list.rows().collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn test_same_name_rows_tracked_separately() {
        let mut list = ChangeList::new();
        // cachyos-v3 row checked, cachyos row (installed there) unchecked
        list.record(2, "linux-cachyos", true, false);
        list.record(3, "linux-cachyos", false, true);
        assert_eq!(list.len(), 2);

        list.record(2, "linux-cachyos", false, false);
        assert!(list.contains("linux-cachyos"));
        assert!(list.contains_row(3));
        assert!(!list.contains_row(2));
    }

    #[test]
    fn test_toggle_sequence_matches_checked_rows() {
        // (name, immutable) rows; every row starts in its initial state
        let rows = [
            ("linux", true),
            ("linux-zen", false),
            ("linux-lts", false),
            ("linux-rt", true),
            ("linux-zen", false),
        ];
        let mut checked: Vec<bool> = rows.iter().map(|(_, immutable)| *immutable).collect();
        let mut list = ChangeList::new();

        let toggles = [1, 2, 4, 1, 0, 3, 2, 2, 0, 1, 4, 3, 3];
        for (step, &index) in toggles.iter().enumerate() {
            checked[index] = !checked[index];
            let (name, immutable) = rows[index];
            list.record(index, name, checked[index], immutable);

            let mut expected: Vec<usize> = (0..rows.len())
                .filter(|&i| checked[i] != rows[i].1)
                .collect();
            let mut actual: Vec<usize> = list.rows().collect();
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(actual, expected, "after toggle #{step}");
        }
    }
}
