//! Append-only access log sink.
//!
//! One line per request in common log format:
//! `<client> - - [<time>] "<request line>" <status> -`.
//! Write failures are swallowed so logging never interrupts a request.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

pub struct AccessLog {
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
}

impl AccessLog {
    /// Open (or create) the log file in append mode, creating parent directories.
    pub async fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { file: Mutex::new(Some(file)), path: Some(path) })
    }

    /// A sink that drops every line.
    pub fn disabled() -> Self {
        Self { file: Mutex::new(None), path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn record(&self, client: &str, request_line: &str, status: u16) {
        let line = format_line(client, Utc::now(), request_line, status);
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            let _ = file.write_all(line.as_bytes()).await;
            let _ = file.flush().await;
        }
    }
}

pub fn format_line(client: &str, at: DateTime<Utc>, request_line: &str, status: u16) -> String {
    format!(
        "{client} - - [{}] \"{request_line}\" {status} -\n",
        at.format("%d/%b/%Y:%H:%M:%S %z")
    )
}
