//! Append-only log of graded prompts.
//!
//! One JSON object per line. The log is written after a grading succeeds
//! and read back by `promptos history`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use promptos_core::GradingResult;

/// Errors from reading or writing the history log.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt history entry at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode history entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One graded prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub result: GradingResult,
}

impl HistoryEntry {
    /// Stamp a result with the current time.
    pub fn now(provider: impl Into<String>, model: impl Into<String>, result: GradingResult) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: provider.into(),
            model: model.into(),
            result,
        }
    }
}

/// A JSONL prompt log at a fixed path.
#[derive(Debug, Clone)]
pub struct PromptLog {
    path: PathBuf,
}

impl PromptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append one entry, creating the file and its directory if needed.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "Appended history entry");
        Ok(())
    }

    /// Read every entry, oldest first. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|source| HistoryError::Corrupt {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.entries()?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}
