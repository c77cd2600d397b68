// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Label table with per-pass stability tracking.
//!
//! The pass driver rewrites every label address once per pass; convergence
//! requires that no address moved relative to the previous pass. Lookups of
//! labels not yet placed are tolerated mid-pass and must be retried on the
//! next pass.

use std::collections::{HashMap, HashSet};

/// Returns whether a label name is local (dot-prefixed).
pub fn is_local_label(name: &str) -> bool {
    name.starts_with('.')
}

/// Qualify a local label against its parent: `.loop` under `start` becomes
/// `start.loop`. Non-local names pass through unchanged.
pub fn qualify_label(parent: Option<&str>, name: &str) -> Option<String> {
    if !is_local_label(name) {
        return Some(name.to_string());
    }
    parent.map(|p| format!("{p}{name}"))
}

/// Mapping from symbol name to resolved absolute byte address.
#[derive(Debug, Default)]
pub struct LabelTable {
    addresses: HashMap<String, u32>,
    defined_this_pass: HashSet<String>,
    changed: bool,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pass: previous addresses remain visible for lookups,
    /// redefinition tracking and the change flag reset.
    pub fn begin_pass(&mut self) {
        self.defined_this_pass.clear();
        self.changed = false;
    }

    /// Record a label address for the current pass. Returns `false` when the
    /// name was already defined in this pass (a duplicate label).
    pub fn define(&mut self, name: &str, address: u32) -> bool {
        if !self.defined_this_pass.insert(name.to_string()) {
            return false;
        }
        match self.addresses.insert(name.to_string(), address) {
            Some(previous) if previous == address => {}
            _ => self.changed = true,
        }
        true
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.addresses.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.addresses.contains_key(name)
    }

    /// Whether any label moved (or appeared) during the current pass.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Labels sorted by address, for the symbol dump.
    pub fn sorted_entries(&self) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> = self
            .addresses
            .iter()
            .map(|(name, addr)| (name.clone(), *addr))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefinition_within_a_pass_is_rejected() {
        let mut table = LabelTable::new();
        table.begin_pass();
        assert!(table.define("start", 0));
        assert!(!table.define("start", 4));
    }

    #[test]
    fn redefinition_across_passes_is_expected() {
        let mut table = LabelTable::new();
        table.begin_pass();
        assert!(table.define("start", 10));
        table.begin_pass();
        assert!(table.define("start", 8));
        assert_eq!(table.lookup("start"), Some(8));
        assert!(table.changed());
    }

    #[test]
    fn stable_pass_reports_no_change() {
        let mut table = LabelTable::new();
        table.begin_pass();
        table.define("a", 2);
        table.begin_pass();
        table.define("a", 2);
        assert!(!table.changed());
    }

    #[test]
    fn local_labels_qualify_against_parent() {
        assert_eq!(
            qualify_label(Some("start"), ".loop").as_deref(),
            Some("start.loop")
        );
        assert_eq!(qualify_label(None, ".loop"), None);
        assert_eq!(qualify_label(None, "top").as_deref(), Some("top"));
    }
}
