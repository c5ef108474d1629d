// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The six ordered comparison kinds shared by code generation and assembly.
//!
//! Each relation has a stable numeric id (encoded into `JIF` arguments) and a
//! flag bit (the mask tested against the VM flags register after a `CMP`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    NotEqual,
}

pub const ALL_RELATIONS: [Relation; 6] = [
    Relation::Equal,
    Relation::Greater,
    Relation::GreaterEqual,
    Relation::Less,
    Relation::LessEqual,
    Relation::NotEqual,
];

impl Relation {
    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Relation::Equal => 0,
            Relation::Greater => 1,
            Relation::GreaterEqual => 2,
            Relation::Less => 3,
            Relation::LessEqual => 4,
            Relation::NotEqual => 5,
        }
    }

    /// The bit tested in the VM flags register for this relation.
    #[must_use]
    pub fn flag_bit(self) -> u8 {
        1 << self.id()
    }

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        ALL_RELATIONS.get(id as usize).copied()
    }

    #[must_use]
    pub fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "EQUAL" => Some(Relation::Equal),
            "GREATER" => Some(Relation::Greater),
            "GREATER_EQUAL" => Some(Relation::GreaterEqual),
            "LESS" => Some(Relation::Less),
            "LESS_EQUAL" => Some(Relation::LessEqual),
            "NOT_EQUAL" => Some(Relation::NotEqual),
            _ => None,
        }
    }

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Relation::Equal => "EQUAL",
            Relation::Greater => "GREATER",
            Relation::GreaterEqual => "GREATER_EQUAL",
            Relation::Less => "LESS",
            Relation::LessEqual => "LESS_EQUAL",
            Relation::NotEqual => "NOT_EQUAL",
        }
    }

    /// Source-language operator spelling.
    #[must_use]
    pub fn op_str(self) -> &'static str {
        match self {
            Relation::Equal => "==",
            Relation::Greater => ">",
            Relation::GreaterEqual => ">=",
            Relation::Less => "<",
            Relation::LessEqual => "<=",
            Relation::NotEqual => "!=",
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Relation::Equal => Relation::NotEqual,
            Relation::Greater => Relation::LessEqual,
            Relation::GreaterEqual => Relation::Less,
            Relation::Less => Relation::GreaterEqual,
            Relation::LessEqual => Relation::Greater,
            Relation::NotEqual => Relation::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Relation, ALL_RELATIONS};

    #[test]
    fn ids_are_stable_and_dense() {
        for (expected, rel) in ALL_RELATIONS.iter().enumerate() {
            assert_eq!(rel.id() as usize, expected);
            assert_eq!(Relation::from_id(rel.id()), Some(*rel));
        }
        assert_eq!(Relation::from_id(6), None);
    }

    #[test]
    fn flag_bits_match_vm_masks() {
        assert_eq!(Relation::Equal.flag_bit(), 1);
        assert_eq!(Relation::Greater.flag_bit(), 2);
        assert_eq!(Relation::GreaterEqual.flag_bit(), 4);
        assert_eq!(Relation::Less.flag_bit(), 8);
        assert_eq!(Relation::LessEqual.flag_bit(), 16);
        assert_eq!(Relation::NotEqual.flag_bit(), 32);
    }

    #[test]
    fn keyword_round_trip() {
        for rel in ALL_RELATIONS {
            assert_eq!(Relation::from_keyword(rel.keyword()), Some(rel));
        }
        assert_eq!(Relation::from_keyword("BOGUS"), None);
    }

    #[test]
    fn operator_spellings_are_distinct_and_fixed() {
        assert_eq!(Relation::Equal.op_str(), "==");
        assert_eq!(Relation::Greater.op_str(), ">");
        assert_eq!(Relation::GreaterEqual.op_str(), ">=");
        assert_eq!(Relation::Less.op_str(), "<");
        assert_eq!(Relation::LessEqual.op_str(), "<=");
        assert_eq!(Relation::NotEqual.op_str(), "!=");
        for rel in ALL_RELATIONS {
            let dupes = ALL_RELATIONS
                .iter()
                .filter(|other| other.op_str() == rel.op_str())
                .count();
            assert_eq!(dupes, 1, "{}", rel.op_str());
        }
    }

    #[test]
    fn opposites_invert() {
        for rel in ALL_RELATIONS {
            assert_eq!(rel.opposite().opposite(), rel);
            assert_ne!(rel.opposite(), rel);
        }
    }
}
