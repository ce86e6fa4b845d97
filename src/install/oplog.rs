//! Append-only operation log of one orchestrator run.
//!
//! Lines are timestamped, appended to a text file, kept in memory for the
//! run report and mirrored to the UI as [`RunEvent::Log`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use crossbeam::channel::Sender;
use log::{error, info, warn};

use super::RunEvent;
use crate::error::Result;

pub struct OperationLog {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    lines: Mutex<Vec<String>>,
    mirror: Option<Sender<RunEvent>>,
}

impl OperationLog {
    /// Opens `path` for appending, creating parent directories.
    pub fn open(path: &Path, mirror: Option<Sender<RunEvent>>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(OperationLog {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
            lines: Mutex::new(Vec::new()),
            mirror,
        })
    }

    /// Log that is only kept in memory and mirrored.
    pub fn in_memory(mirror: Option<Sender<RunEvent>>) -> Self {
        OperationLog {
            path: None,
            file: Mutex::new(None),
            lines: Mutex::new(Vec::new()),
            mirror,
        }
    }

    /// [`OperationLog::open`], falling back to [`OperationLog::in_memory`]
    /// when the file cannot be opened.
    pub fn open_or_memory(path: &Path, mirror: Option<Sender<RunEvent>>) -> Self {
        match Self::open(path, mirror.clone()) {
            Ok(log) => log,
            Err(e) => {
                warn!("Cannot open operation log {}: {}", path.display(), e);
                Self::in_memory(mirror)
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, message: &str) {
        info!("{}", message);
        self.record(message);
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", message);
        self.record(&format!("WARNING: {message}"));
    }

    pub fn error(&self, message: &str) {
        error!("{}", message);
        self.record(&format!("ERROR: {message}"));
    }

    /// Multi-line command output, one log line per non-empty line.
    pub fn output(&self, output: &str) {
        for line in output.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            self.append(line);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);

        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Failed to write operation log: {}", e);
                }
            }
        }

        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.clone());
        }

        if let Some(mirror) = &self.mirror {
            let _ = mirror.send(RunEvent::Log(line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn appends_timestamped_lines_to_file_and_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("install.log");
        let (tx, rx) = unbounded();

        let log = OperationLog::open(&path, Some(tx)).unwrap();
        log.append("Starting installation...");
        log.warn("Control Center executable not found");

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("Starting installation..."));
        assert!(lines[1].contains("WARNING: Control Center"));

        let mirrored: Vec<RunEvent> = rx.try_iter().collect();
        assert_eq!(mirrored.len(), 2);
        assert_eq!(log.lines().len(), 2);
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("install.log");

        OperationLog::open(&path, None).unwrap().append("first run");
        OperationLog::open(&path, None).unwrap().append("second run");

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first run"));
        assert!(content.contains("second run"));
    }

    #[test]
    fn command_output_is_split_into_lines() {
        let log = OperationLog::in_memory(None);
        log.output("one\r\n\r\ntwo\n");
        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("two"));
        assert!(log.path().is_none());
    }
}
