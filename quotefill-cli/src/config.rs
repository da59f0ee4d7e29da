//! `quotefill.toml`: where symbols come from, where rows go, session tuning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use quotefill_core::{Endpoints, InstrumentKind, Symbol};
use quotefill_runner::{SessionConfig, SessionOverrides};
use serde::Deserialize;

fn default_primary_table() -> String {
    "data".to_string()
}

fn default_symbols_column() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Inline symbol list. Takes precedence over `symbols_file`.
    #[serde(default)]
    pub symbols: Vec<String>,

    /// CSV with a header row; codes are read from `symbols_column`.
    pub symbols_file: Option<PathBuf>,

    #[serde(default = "default_symbols_column")]
    pub symbols_column: usize,

    pub workbook_dir: PathBuf,

    #[serde(default = "default_primary_table")]
    pub primary_table: String,

    #[serde(default)]
    pub session: SessionOverrides,

    /// Classification cache, keyed by normalized code.
    #[serde(default)]
    pub kinds: BTreeMap<String, InstrumentKind>,

    #[serde(default)]
    pub endpoints: Endpoints,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("failed to parse config")?;
        Ok(config)
    }

    /// Load from `path`. Relative paths inside the file are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.workbook_dir = base.join(&config.workbook_dir);
            config.symbols_file = config.symbols_file.map(|f| base.join(f));
        }
        Ok(config)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(self.session.apply(SessionConfig::default())?)
    }

    /// The ordered input symbols.
    pub fn load_symbols(&self) -> Result<Vec<Symbol>> {
        let raw = if !self.symbols.is_empty() {
            self.symbols.clone()
        } else if let Some(file) = &self.symbols_file {
            read_symbol_column(file, self.symbols_column)?
        } else {
            bail!("config names no symbols: set `symbols` or `symbols_file`");
        };
        let symbols = raw
            .iter()
            .map(|code| Symbol::parse(code))
            .collect::<Result<Vec<_>, _>>()?;
        if symbols.is_empty() {
            bail!("symbol list is empty");
        }
        Ok(symbols)
    }
}

fn read_symbol_column(path: &Path, column: usize) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        match record.get(column).map(str::trim) {
            Some(code) if !code.is_empty() => codes.push(code.to_string()),
            _ => {}
        }
    }
    Ok(codes)
}

/// Replace the `[kinds]` table of the file at `path`, leaving every other
/// key as it was.
pub fn write_kinds(path: &Path, kinds: &BTreeMap<String, InstrumentKind>) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut doc: toml::Table = content
        .parse()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let table: toml::Table = kinds
        .iter()
        .map(|(code, kind)| (code.clone(), toml::Value::String(kind.as_str().to_string())))
        .collect();
    doc.insert("kinds".to_string(), toml::Value::Table(table));

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, toml::to_string_pretty(&doc)?)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
