//! Symbol identifiers and their canonical form.
//!
//! Listed codes are digits with an optional letter suffix (`0050`, `2317`,
//! `00679B`). The canonical form pads the numeric part to at least four
//! digits and upper-cases the suffix, so `50` and `0050` name the same
//! instrument.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::kind::InstrumentKind;

/// Minimum width of the numeric part of a canonical code.
pub const MIN_CODE_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("cannot parse symbol '{0}': expected digits with an optional letter suffix")]
    Malformed(String),
}

fn code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+)([A-Za-z]*)$").expect("static regex is valid"))
}

/// Normalize a raw code: zero-pad the digits to [`MIN_CODE_WIDTH`] and
/// upper-case the suffix. Codes already wider than the minimum are kept.
///
/// Idempotent: `normalize(&normalize(s)?) == normalize(s)`.
pub fn normalize(raw: &str) -> Result<String, SymbolError> {
    let trimmed = raw.trim();
    let caps = code_pattern()
        .captures(trimmed)
        .ok_or_else(|| SymbolError::Malformed(raw.to_string()))?;
    let digits = &caps[1];
    let suffix = caps[2].to_ascii_uppercase();
    Ok(format!("{digits:0>width$}{suffix}", width = MIN_CODE_WIDTH))
}

/// A tradable instrument identifier: the code as supplied plus its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    raw: String,
    canonical: String,
}

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let canonical = normalize(raw)?;
        Ok(Self {
            raw: raw.trim().to_string(),
            canonical,
        })
    }

    /// Canonical code, used for URLs, table names and record identity.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The code exactly as it appeared in the input list (trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// One input line of a run: the symbol and its kind, if already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub symbol: Symbol,
    pub kind: Option<InstrumentKind>,
}

impl SymbolEntry {
    pub fn new(symbol: Symbol, kind: Option<InstrumentKind>) -> Self {
        Self { symbol, kind }
    }

    /// Parse a list of raw codes with no kind information.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>, SymbolError> {
        raw.iter()
            .map(|code| Symbol::parse(code.as_ref()).map(|symbol| Self::new(symbol, None)))
            .collect()
    }
}
