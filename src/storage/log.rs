//! Newline-delimited encrypted record log
//!
//! Each line is one JSON-encoded [`StorageRecord`] whose `data` field holds
//! the encrypted payload and metadata. Layout:
//!
//! ```text
//! <data_dir>/vault.log
//! {"id":-1,"data":"<base64>","deleted":false,"updated_at":1700000000000}
//! {"id":4,"data":"<base64>","deleted":true,"updated_at":1700000000500}
//! ```
//!
//! Restore is tolerant of partial corruption: a line that fails to parse or
//! decrypt is skipped with a warning and counted, and the rest still loads.

use super::codec::RecordCodec;
use crate::error::Result;
use crate::record::{Record, StorageRecord};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Outcome of scanning the log
#[derive(Debug, Clone, Default)]
pub struct LogRestore {
    /// Decoded records, one per id, ordered by id
    pub records: Vec<Record>,
    /// Non-empty lines that were read
    pub lines: usize,
    /// Lines skipped because they failed to parse or decrypt
    pub skipped: usize,
}

impl LogRestore {
    /// True when the log had content but nothing decoded, which almost
    /// always means the passphrase is wrong
    pub fn nothing_decoded(&self) -> bool {
        self.lines > 0 && self.skipped == self.lines
    }
}

/// Append/scan store for encrypted records
#[derive(Debug, Clone)]
pub struct EncryptedLog {
    path: PathBuf,
    codec: RecordCodec,
}

impl EncryptedLog {
    /// Open a log at `path`. The file is created lazily on first write.
    pub fn open(path: impl Into<PathBuf>, codec: RecordCodec) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a log already exists on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the full record set, replacing the previous log.
    ///
    /// Lines go to a sibling temporary file, each flushed as it is written;
    /// the file is synced and renamed over the log only once complete.
    /// Returns the number of records written.
    pub fn persist<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Result<usize> {
        self.ensure_parent()?;
        let tmp_path = self.tmp_path();

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;

        for record in records {
            let line = serde_json::to_string(&self.codec.seal(record)?)?;
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            written += 1;
        }

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!("Persisted {} records to {}", written, self.path.display());
        Ok(written)
    }

    /// Append one record to the end of the log and flush it
    pub fn append(&self, record: &Record) -> Result<()> {
        self.ensure_parent()?;
        let line = serde_json::to_string(&self.codec.seal(record)?)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Scan the log and decrypt every readable line.
    ///
    /// When an id appears on several lines the last one wins. A missing log
    /// restores as empty.
    pub fn restore(&self) -> Result<LogRestore> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogRestore::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut restore = LogRestore::default();
        let mut by_id = BTreeMap::new();

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    restore.lines += 1;
                    restore.skipped += 1;
                    tracing::warn!("Skipping unreadable log line {}: {}", line_no, e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            restore.lines += 1;

            let stored: StorageRecord = match serde_json::from_str(&line) {
                Ok(stored) => stored,
                Err(e) => {
                    restore.skipped += 1;
                    tracing::warn!("Skipping corrupt log line {}: {}", line_no, e);
                    continue;
                }
            };

            match self.codec.open(&stored) {
                Ok(record) => {
                    by_id.insert(record.id, record);
                }
                Err(e) => {
                    restore.skipped += 1;
                    tracing::warn!(
                        "Skipping undecryptable record {} on log line {}: {}",
                        stored.id,
                        line_no,
                        e
                    );
                }
            }
        }

        if restore.skipped > 0 {
            tracing::warn!(
                "Restored {} records from {}, skipped {} of {} lines",
                by_id.len(),
                self.path.display(),
                restore.skipped,
                restore.lines
            );
        }

        restore.records = by_id.into_values().collect();
        Ok(restore)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
