// src/runner/session_log.rs
//! Tab-separated session log
//!
//! Layout:
//!
//! ```text
//! VERSION=2; DATE=2026-10-18 14:03:11
//! time	event	details
//! # {"prf_hz":5.0,...}
//! 0.000	session_start	mock
//! 0.001	pulse_on	#1
//! ```
//!
//! Every line is flushed as it is written so an interrupted session still
//! leaves a readable log behind.

use crate::config::constants::session_log::{COLUMNS, FORMAT_VERSION};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SessionLog {
    path: PathBuf,
    writer: LineWriter<File>,
    entries: usize,
}

impl SessionLog {
    /// Create `log-YYYY-MM-DD-HH.MM.SS.tsv` under `dir` and write the header
    ///
    /// `params` is rendered as a single JSON comment line.
    pub fn create(dir: &Path, params: &serde_json::Value) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let now = Local::now();
        let stem = format!("log-{}", now.format("%Y-%m-%d-%H.%M.%S"));

        let (path, file) = Self::create_unique(dir, &stem)?;
        let mut writer = LineWriter::new(file);
        writeln!(
            writer,
            "VERSION={}; DATE={}",
            FORMAT_VERSION,
            now.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "{}", COLUMNS.join("\t"))?;
        writeln!(writer, "# {}", params)?;

        Ok(Self {
            path,
            writer,
            entries: 0,
        })
    }

    // Two sessions started within the same second get -1, -2, ... suffixes
    fn create_unique(dir: &Path, stem: &str) -> io::Result<(PathBuf, File)> {
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{stem}.tsv")
            } else {
                format!("{stem}-{suffix}.tsv")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Append one event line
    pub fn event(&mut self, elapsed: Duration, event: &str, details: &str) -> io::Result<()> {
        // Tabs and newlines inside details would break the column layout
        let details = details.replace(['\t', '\n', '\r'], " ");
        writeln!(
            self.writer,
            "{:.3}\t{}\t{}",
            elapsed.as_secs_f64(),
            event,
            details
        )?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Event lines written so far, header excluded
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
