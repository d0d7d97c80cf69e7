//! Session CSV logging
//!
//! One file per session, `session_<YYYYmmdd_HHMMSS>.csv`, header first and
//! one [`LogRecord`] row per logging tick. An existing file is never
//! truncated: sessions started within the same second get `_1`, `_2`, ... Storage failures are never fatal:
//! the log warns and turns itself off until the next session.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gearsense_core::LogRecord;

/// Suffixes tried before giving up on a session start second
const MAX_NAME_ATTEMPTS: u32 = 100;

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
    unflushed: usize,
}

/// Appends session records to CSV files in one directory
pub struct SessionLog {
    dir: PathBuf,
    flush_every: usize,
    file: Option<OpenFile>,
}

impl SessionLog {
    /// Create a log writing into `dir`, flushing every `flush_every` rows
    pub fn new(dir: impl Into<PathBuf>, flush_every: usize) -> Self {
        Self {
            dir: dir.into(),
            flush_every: flush_every.max(1),
            file: None,
        }
    }

    /// File name for a session started at `started`
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use gearsense::storage::SessionLog;
    ///
    /// let started = Utc.with_ymd_and_hms(2024, 6, 9, 7, 5, 3).unwrap();
    /// assert_eq!(SessionLog::file_name(started), "session_20240609_070503.csv");
    /// ```
    pub fn file_name(started: DateTime<Utc>) -> String {
        format!("session_{}.csv", started.format("%Y%m%d_%H%M%S"))
    }

    /// Open a new session file and write the header.
    ///
    /// Any file still open is closed first. Returns the new path, or `None`
    /// when the directory is unavailable (storage stays off for this session).
    pub fn open(&mut self, started: DateTime<Utc>) -> Option<PathBuf> {
        self.close();
        match self.create(started) {
            Ok(file) => {
                tracing::info!(path = %file.path.display(), "Session log opened");
                let path = file.path.clone();
                self.file = Some(file);
                Some(path)
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Session log unavailable, continuing without storage"
                );
                None
            }
        }
    }

    fn create(&self, started: DateTime<Utc>) -> std::io::Result<OpenFile> {
        std::fs::create_dir_all(&self.dir)?;
        let (path, file) = self.create_unique(started)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", LogRecord::CSV_HEADER)?;
        writer.flush()?;
        Ok(OpenFile {
            path,
            writer,
            rows: 0,
            unflushed: 0,
        })
    }

    fn create_unique(&self, started: DateTime<Utc>) -> std::io::Result<(PathBuf, File)> {
        let base = Self::file_name(started);
        let stem = base.trim_end_matches(".csv");
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = match attempt {
                0 => base.clone(),
                n => format!("{}_{}.csv", stem, n),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {}", base),
        ))
    }

    /// Append one row. A write error disables storage for the rest of the session.
    pub fn append(&mut self, record: &LogRecord) {
        let flush_every = self.flush_every;
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let result = writeln!(file.writer, "{}", record.to_csv_row()).and_then(|_| {
            file.rows += 1;
            file.unflushed += 1;
            if file.unflushed >= flush_every {
                file.unflushed = 0;
                file.writer.flush()
            } else {
                Ok(())
            }
        });

        if let Err(e) = result {
            tracing::warn!(
                path = %file.path.display(),
                error = %e,
                "Session log write failed, storage disabled"
            );
            self.file = None;
        }
    }

    /// Flush and close the current file. Returns its path and row count.
    pub fn close(&mut self) -> Option<(PathBuf, u64)> {
        let mut file = self.file.take()?;
        if let Err(e) = file.writer.flush() {
            tracing::warn!(path = %file.path.display(), error = %e, "Failed to flush session log");
        }
        tracing::info!(path = %file.path.display(), rows = file.rows, "Session log closed");
        Some((file.path, file.rows))
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the open file
    pub fn current_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Rows written to the open file
    pub fn rows_written(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.rows)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        self.close();
    }
}
