//! Ticker universe: a newline-separated list of instrument identifiers.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("universe is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    tickers: Vec<String>,
}

impl Universe {
    /// Load a universe from a ticker file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|e| UniverseError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse one ticker per line. Blank lines and `#` comments are ignored,
    /// repeated tickers are kept once.
    pub fn parse(content: &str) -> Result<Self, UniverseError> {
        let mut tickers: Vec<String> = Vec::new();
        for line in content.lines() {
            let t = line.trim();
            if t.is_empty() || t.starts_with('#') {
                continue;
            }
            let t = t.to_uppercase();
            if !tickers.contains(&t) {
                tickers.push(t);
            }
        }
        if tickers.is_empty() {
            return Err(UniverseError::Empty);
        }
        Ok(Self { tickers })
    }

    pub fn from_tickers<I, S>(tickers: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = tickers.into_iter().map(|t| t.as_ref().to_string()).collect();
        Self::parse(&joined.join("\n"))
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
