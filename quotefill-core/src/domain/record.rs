//! The per-symbol attribute record.
//!
//! A record is created blank over a fixed field set and can only be filled
//! for keys that already exist, so it is total over its field set at every
//! point of its life.

use std::collections::{BTreeMap, BTreeSet};

use super::kind::InstrumentKind;
use super::symbol::Symbol;

/// Placeholder written for any field that could not be resolved.
pub const BLANK: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    symbol: Symbol,
    kind: InstrumentKind,
    values: BTreeMap<&'static str, String>,
    /// Fields whose blank value means "leave the stored cell alone".
    keep_previous: BTreeSet<&'static str>,
}

impl Record {
    /// A record with every named field set to [`BLANK`].
    pub fn blank<I>(symbol: Symbol, kind: InstrumentKind, names: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let values = names.into_iter().map(|n| (n, BLANK.to_string())).collect();
        Self {
            symbol,
            kind,
            values,
            keep_previous: BTreeSet::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Set a field. Returns `false` (and changes nothing) if the field is not
    /// part of this record. Empty values are stored as [`BLANK`].
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        let Some(slot) = self.values.get_mut(name) else {
            return false;
        };
        let value = value.into();
        let trimmed = value.trim();
        *slot = if trimmed.is_empty() {
            BLANK.to_string()
        } else {
            trimmed.to_string()
        };
        true
    }

    /// Raw stored value, placeholder included.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Stored value, or `None` if the field is absent or blank.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| *v != BLANK)
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.get(name).map_or(true, |v| v == BLANK)
    }

    /// Mark a field so that a blank value keeps whatever the sink already
    /// holds. Returns `false` if the field is not part of this record.
    pub fn keep_previous_when_blank(&mut self, name: &str) -> bool {
        match self.values.get_key_value(name) {
            Some((key, _)) => {
                self.keep_previous.insert(*key);
                true
            }
            None => false,
        }
    }

    /// Marked fields that are currently blank.
    pub fn kept_blanks(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keep_previous
            .iter()
            .copied()
            .filter(|name| self.is_blank(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn blank_count(&self) -> usize {
        self.values.values().filter(|v| *v == BLANK).count()
    }

    pub fn is_all_blank(&self) -> bool {
        self.blank_count() == self.values.len()
    }
}
