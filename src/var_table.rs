// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Variable table for the translator: declaration order is runtime slot order.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum VarTableResult {
    Ok,
    Duplicate,
    TableFull,
}

/// Runtime slot ids are single bytes, so 256 variables is the hard ceiling.
pub const MAX_VARS: usize = 256;

#[derive(Debug, Default)]
pub struct VarTable {
    names: Vec<String>,
}

impl VarTable {
    #[must_use]
    pub fn new() -> Self {
        Self { names: Vec::new() }
    }

    /// Declare a name. Its slot id is its declaration position.
    pub fn declare(&mut self, name: &str) -> VarTableResult {
        if self.names.len() >= MAX_VARS {
            return VarTableResult::TableFull;
        }
        if self.contains(name) {
            return VarTableResult::Duplicate;
        }
        self.names.push(name.to_string());
        VarTableResult::Ok
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    /// Slot id of a declared name, if any. Names are compared exactly; the
    /// translator has already case-folded its input.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{VarTable, VarTableResult, MAX_VARS};

    #[test]
    fn slots_increase_in_declaration_order() {
        let mut table = VarTable::new();
        assert_eq!(table.declare("X"), VarTableResult::Ok);
        assert_eq!(table.declare("Y"), VarTableResult::Ok);
        assert_eq!(table.declare("Z"), VarTableResult::Ok);
        assert_eq!(table.slot("X"), Some(0));
        assert_eq!(table.slot("Y"), Some(1));
        assert_eq!(table.slot("Z"), Some(2));
        assert_eq!(table.slot("W"), None);
    }

    #[test]
    fn rejects_duplicates() {
        let mut table = VarTable::new();
        assert_eq!(table.declare("X"), VarTableResult::Ok);
        assert_eq!(table.declare("X"), VarTableResult::Duplicate);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn caps_at_256_entries() {
        let mut table = VarTable::new();
        for i in 0..MAX_VARS {
            assert_eq!(table.declare(&format!("V{i}")), VarTableResult::Ok);
        }
        assert_eq!(table.declare("OVERFLOW"), VarTableResult::TableFull);
    }
}
