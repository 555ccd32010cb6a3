//! Append-only line log on disk
//!
//! Each record is `<local ISO-8601 timestamp> - <message>\n`. Applications use
//! it for routing misses; diagnostic output goes through `tracing`.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// A single append-only log file shared by every connection task
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub async fn append(&self, message: &str) -> io::Result<()> {
        let line = format_line(&chrono::Local::now(), message);

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Append one record, reporting failures through `tracing` only
    pub async fn record(&self, message: &str) {
        if let Err(e) = self.append(message).await {
            tracing::warn!(path = %self.path.display(), "Failed to write log record: {}", e);
        }
    }

    /// Remove the file if it exists but holds no record separator at all.
    ///
    /// Returns whether the file was removed.
    pub async fn discard_if_corrupt(&self) -> io::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if contents.contains(&b'-') {
            return Ok(false);
        }

        fs::remove_file(&self.path).await?;
        tracing::debug!(path = %self.path.display(), "Discarded log file without records");
        Ok(true)
    }
}

fn format_line<Tz>(timestamp: &chrono::DateTime<Tz>, message: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} - {}\n",
        timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
        message
    )
}
