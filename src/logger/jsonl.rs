//! Append-only JSONL journal of monitor and delivery events.
//!
//! Degrades gracefully: the first write failure is logged and the journal
//! switches itself off; the daemon keeps running.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::errors::{BodewellError, Result};

/// Kind of journaled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Monitor installed.
    MonitorAdded,
    /// Monitor terminated and removed.
    MonitorRemoved,
    /// Alert rendered and sent.
    Alert,
    /// Recovery rendered and sent.
    Cleared,
    /// Sample outside threshold.
    Failure,
    /// Probe could not sample.
    SampleError,
    /// Dispatcher accepted a message.
    Delivered,
    /// No dispatcher for the contact's route.
    Undeliverable,
    /// Dispatcher rejected a message.
    DeliveryFailed,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Write time (UTC).
    pub ts: DateTime<Utc>,
    /// What happened.
    pub kind: RecordKind,
    /// Monitor name, when the record concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Contact address, when the record concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Rendered text or error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JournalRecord {
    /// Record of `kind` stamped now.
    #[must_use]
    pub fn new(kind: RecordKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
            monitor: None,
            contact: None,
            detail: None,
        }
    }

    /// Attach a monitor name.
    #[must_use]
    pub fn monitor(mut self, name: impl Into<String>) -> Self {
        self.monitor = Some(name.into());
        self
    }

    /// Attach a contact address.
    #[must_use]
    pub fn contact(mut self, id: impl Into<String>) -> Self {
        self.contact = Some(id.into());
        self
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// JSONL writer. A disabled journal accepts and discards records.
#[derive(Debug)]
pub struct Journal {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl Journal {
    /// Journal that writes nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
        }
    }

    /// Open (creating parent directories) for append.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| BodewellError::io(parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| BodewellError::io(path, err))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
        })
    }

    /// Whether records are still written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Append one line. The first failure disables the journal.
    pub fn record(&self, record: &JournalRecord) {
        let mut file = self.file.lock();
        let Some(handle) = file.as_mut() else {
            return;
        };
        if let Err(err) = write_line(handle, record) {
            warn!(
                path = ?self.path,
                error = %err,
                "journal write failed; disabling journal"
            );
            *file = None;
        }
    }
}

fn write_line(file: &mut File, record: &JournalRecord) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    file.write_all(&line)
        .map_err(|err| BodewellError::Runtime {
            details: format!("journal write: {err}"),
        })
}
