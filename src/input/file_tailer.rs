use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::detection::EventClassifier;
use crate::models::{Event, LogSource};

/// Producer side of the shared event queue
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Wait between polls when no new data is available
const IDLE_DELAY: Duration = Duration::from_millis(100);
/// Wait after the file could not be reopened
const REOPEN_BACKOFF: Duration = Duration::from_secs(5);
/// Wait after a read error on an open handle
const READ_ERROR_DELAY: Duration = Duration::from_secs(1);

/// Errors that can occur while tailing a log file
#[derive(Error, Debug)]
pub enum TailError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Follows one log file across truncation and rename-style rotation
///
/// The offset only ever counts bytes of complete lines, so a line
/// still being written is re-read once its newline arrives.
pub struct LogTailer {
    source: LogSource,
    reader: BufReader<File>,
    offset: u64,
}

impl LogTailer {
    /// Open the source and position at its current end
    pub async fn open(source: LogSource) -> Result<Self, TailError> {
        let file = File::open(&source.path)
            .await
            .map_err(|e| open_error(&source, e))?;
        let mut reader = BufReader::new(file);
        let offset = reader
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| io_error(&source, e))?;

        Ok(LogTailer {
            source,
            reader,
            offset,
        })
    }

    pub fn source(&self) -> &LogSource {
        &self.source
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next complete line
    ///
    /// Returns `Ok(None)` at end of stream, after the file has been
    /// reopened at the stored offset (or at 0 if it shrank).
    pub async fn poll_line(&mut self) -> Result<Option<String>, TailError> {
        let mut buf = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| io_error(&self.source, e))?;

        if read > 0 && buf.ends_with(b"\n") {
            self.offset += read as u64;
            while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                buf.pop();
            }
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }

        if !buf.is_empty() {
            // partial line; rewind so it is read whole later
            self.reader
                .seek(SeekFrom::Start(self.offset))
                .await
                .map_err(|e| io_error(&self.source, e))?;
        }

        self.reopen().await?;
        Ok(None)
    }

    async fn reopen(&mut self) -> Result<(), TailError> {
        let file = File::open(&self.source.path)
            .await
            .map_err(|e| open_error(&self.source, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| io_error(&self.source, e))?
            .len();

        if size < self.offset {
            log::info!(
                "Rotation detected for {} (size {} < offset {}), reading from start",
                self.source.path.display(),
                size,
                self.offset
            );
            self.offset = 0;
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| io_error(&self.source, e))?;
        self.reader = reader;
        Ok(())
    }

    /// Tail until `stop` turns true, pushing classified events to `events`
    ///
    /// The stop flag is checked between reads. The file handle is
    /// released when this returns.
    pub async fn run(
        mut self,
        classifier: Arc<EventClassifier>,
        events: EventSender,
        mut stop: watch::Receiver<bool>,
    ) {
        log::info!("Started tailing {}", self.source.path.display());

        loop {
            if *stop.borrow() {
                break;
            }

            let delay = match self.poll_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = classifier.classify(&line, &self.source).await {
                        if events.send(event).is_err() {
                            log::info!("Event queue closed, stopping tailer");
                            break;
                        }
                    }
                    continue;
                }
                Ok(None) => IDLE_DELAY,
                Err(e @ TailError::Open { .. }) => {
                    log::warn!("{}; retrying in {:?}", e, REOPEN_BACKOFF);
                    REOPEN_BACKOFF
                }
                Err(e) => {
                    log::error!("Error reading log file: {}", e);
                    READ_ERROR_DELAY
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        log::info!("Stopped tailing {}", self.source.path.display());
    }
}

fn open_error(source: &LogSource, e: std::io::Error) -> TailError {
    TailError::Open {
        path: source.path.clone(),
        source: e,
    }
}

fn io_error(source: &LogSource, e: std::io::Error) -> TailError {
    TailError::Io {
        path: source.path.clone(),
        source: e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoConfig;
    use crate::detection::EventGate;
    use crate::geolocation::GeoLocator;
    use crate::models::{EventType, LogType};
    use std::io::Write;
    use std::path::Path;
    use tokio::time::timeout;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn source_for(path: &Path) -> LogSource {
        LogSource::new(LogType::Fail2ban, path, &["Ban", "Found"])
    }

    fn offline_classifier() -> Arc<EventClassifier> {
        let geo = GeoLocator::new(&GeoConfig {
            enabled: false,
            ..GeoConfig::default()
        })
        .unwrap();
        Arc::new(EventClassifier::new(EventGate::all(), Arc::new(geo)))
    }

    #[tokio::test]
    async fn test_starts_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail2ban.log");
        std::fs::write(&path, "old Ban 1.2.3.4\n").unwrap();

        let mut tailer = LogTailer::open(source_for(&path)).await.unwrap();
        assert_eq!(tailer.offset(), 16);
        assert_eq!(tailer.poll_line().await.unwrap(), None);

        append(&path, "new Ban 5.6.7.8\r\n");
        assert_eq!(
            tailer.poll_line().await.unwrap().as_deref(),
            Some("new Ban 5.6.7.8")
        );
        assert_eq!(tailer.offset(), 33);
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogTailer::open(source_for(&dir.path().join("absent.log"))).await;
        assert!(matches!(result, Err(TailError::Open { .. })));
    }

    #[tokio::test]
    async fn test_truncation_resets_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.log");
        std::fs::write(&path, "x".repeat(99) + "\n").unwrap();

        let mut tailer = LogTailer::open(source_for(&path)).await.unwrap();
        assert_eq!(tailer.offset(), 100);

        std::fs::write(&path, "fresh\n").unwrap();
        assert_eq!(tailer.poll_line().await.unwrap(), None);
        assert_eq!(tailer.offset(), 0);
        assert_eq!(tailer.poll_line().await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_rename_rotation_follows_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail2ban.log");
        std::fs::write(&path, "a long line that was there before rotation\n").unwrap();

        let mut tailer = LogTailer::open(source_for(&path)).await.unwrap();
        std::fs::rename(&path, dir.path().join("fail2ban.log.1")).unwrap();
        std::fs::write(&path, "first\nsecond\n").unwrap();

        assert_eq!(tailer.poll_line().await.unwrap(), None);
        assert_eq!(tailer.poll_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(tailer.poll_line().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail2ban.log");
        std::fs::write(&path, "").unwrap();

        let mut tailer = LogTailer::open(source_for(&path)).await.unwrap();
        append(&path, "Ban 10.");
        assert_eq!(tailer.poll_line().await.unwrap(), None);
        assert_eq!(tailer.offset(), 0);

        append(&path, "0.0.9\n");
        assert_eq!(tailer.poll_line().await.unwrap().as_deref(), Some("Ban 10.0.0.9"));
        assert_eq!(tailer.offset(), 13);
    }

    #[tokio::test]
    async fn test_run_forwards_events_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail2ban.log");
        std::fs::write(&path, "").unwrap();

        let tailer = LogTailer::open(source_for(&path)).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(tailer.run(offline_classifier(), tx, stop_rx));

        append(&path, "NOTICE [sshd] Unban ignored\n");
        append(&path, "NOTICE [sshd] Ban 192.0.2.1\n");
        append(&path, "NOTICE [sshd] Found 192.0.2.2\n");

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_type, EventType::Ban);
        assert_eq!(first.address, "192.0.2.1");
        assert_eq!(second.event_type, EventType::Fail);

        stop_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        // the tailer dropped its sender
        assert!(rx.recv().await.is_none());
    }
}
