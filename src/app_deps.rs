//! Collaborator interfaces around the engine: where rows come from, where
//! fetched items go, and where the credential comes from.

use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::item::{Item, Row};

pub trait RowSource: Send + Sync {
    fn read_rows(&self) -> Result<Vec<Row>>;
}

pub trait RowSink: Send + Sync {
    fn write_items(&self, items: &[Item]) -> Result<()>;
}

pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Result<String>;
}

/// Rows stored as a JSON array of records.
pub struct JsonRowFile {
    path: PathBuf,
}

impl JsonRowFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSource for JsonRowFile {
    fn read_rows(&self) -> Result<Vec<Row>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read rows file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse rows file: {}", self.path.display()))
    }
}

impl RowSink for JsonRowFile {
    fn write_items(&self, items: &[Item]) -> Result<()> {
        let rows: Vec<Row> = items.iter().map(Item::to_row).collect();
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize rows")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write rows file: {}", self.path.display()))
    }
}

/// Writes fetched rows as JSON to standard output.
pub struct StdoutSink;

impl RowSink for StdoutSink {
    fn write_items(&self, items: &[Item]) -> Result<()> {
        let rows: Vec<Row> = items.iter().map(Item::to_row).collect();
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &rows).context("Failed to write rows")?;
        writeln!(stdout)?;
        Ok(())
    }
}

/// Token from `--token`, falling back to `GITHUB_TOKEN`.
pub struct EnvCredentialProvider {
    explicit: Option<String>,
}

impl EnvCredentialProvider {
    pub fn new(explicit: Option<String>) -> Self {
        Self { explicit }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn token(&self) -> Result<String> {
        if let Some(token) = self.explicit.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.clone());
        }
        env::var("GITHUB_TOKEN").context("No GitHub token given (use --token or set GITHUB_TOKEN)")
    }
}
