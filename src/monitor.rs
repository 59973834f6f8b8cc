//! Pipeline orchestration
//!
//! A [`Monitor`] runs the pipeline in generations. Each generation owns a
//! fresh event queue, one tailer task per started source, and a
//! dispatcher task draining the queue. A generation ends on shutdown or
//! at the daily restart time: stop is broadcast, every tailer is joined,
//! and the dispatcher drains what is left before the next generation
//! starts from scratch.

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::alerting::{ChannelRegistry, DispatchError, NotificationDispatcher};
use crate::config::{Config, ConfigError};
use crate::detection::{EventClassifier, EventGate};
use crate::geolocation::{GeoError, GeoLocator};
use crate::input::LogTailer;

/// Errors that stop the monitor from running
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No log source could be started; check source paths and enabled events")]
    NothingToMonitor,

    #[error("Notifier setup failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Geolocation setup failed: {0}")]
    Geo(#[from] GeoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

struct Generation {
    stop: watch::Sender<bool>,
    tailers: Vec<JoinHandle<()>>,
    dispatcher: JoinHandle<()>,
}

impl Generation {
    /// Stop every tailer, wait for all of them, then let the dispatcher drain
    async fn shutdown(self) {
        let _ = self.stop.send(true);
        for tailer in self.tailers {
            if let Err(e) = tailer.await {
                log::error!("Tailer task failed: {}", e);
            }
        }
        if let Err(e) = self.dispatcher.await {
            log::error!("Dispatcher task failed: {}", e);
        }
    }
}

/// Owns the tailers, the shared queue and the dispatcher
pub struct Monitor {
    config: Arc<Config>,
    classifier: Arc<EventClassifier>,
    dispatcher: Arc<NotificationDispatcher>,
    restart_at: NaiveTime,
}

impl Monitor {
    pub fn new(config: Arc<Config>, registry: &ChannelRegistry) -> Result<Self, MonitorError> {
        let geo = Arc::new(GeoLocator::new(&config.geo)?);
        let classifier = Arc::new(EventClassifier::new(EventGate::from_config(&config), geo));
        let dispatcher = Arc::new(NotificationDispatcher::new(&config, registry)?);
        let restart_at = config.restart.time()?;

        Ok(Monitor {
            config,
            classifier,
            dispatcher,
            restart_at,
        })
    }

    /// Run until `shutdown` turns true
    ///
    /// Returns [`MonitorError::NothingToMonitor`] when no source can be
    /// started and no scheduled restart would retry.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), MonitorError> {
        self.run_with_restarts(shutdown, || self.wait_for_restart()).await
    }

    /// Generation loop; each future from `restart` completing triggers one restart
    async fn run_with_restarts<R, F>(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut restart: R,
    ) -> Result<(), MonitorError>
    where
        R: FnMut() -> F,
        F: Future<Output = ()>,
    {
        loop {
            let generation = match self.start_generation().await {
                Ok(generation) => Some(generation),
                Err(MonitorError::NothingToMonitor) if self.config.restart.enabled => {
                    log::warn!("No log source could be started; retrying at the next scheduled restart");
                    None
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    log::info!("Shutting down monitor");
                    if let Some(generation) = generation {
                        generation.shutdown().await;
                    }
                    log::info!("Monitor stopped");
                    return Ok(());
                }
                _ = restart() => {
                    log::info!("Performing scheduled restart");
                    if let Some(generation) = generation {
                        generation.shutdown().await;
                    }
                }
            }
        }
    }

    async fn start_generation(&self) -> Result<Generation, MonitorError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gate = self.classifier.gate();

        let mut tailers = Vec::new();
        for source in &self.config.sources {
            if !source.enabled {
                log::debug!("Source {} is disabled", source.path.display());
                continue;
            }
            if !gate.monitors(source.log_type) {
                log::info!(
                    "Skipping {}: no enabled events for {} logs",
                    source.path.display(),
                    source.log_type
                );
                continue;
            }

            match LogTailer::open(source.clone()).await {
                Ok(tailer) => tailers.push(tokio::spawn(tailer.run(
                    Arc::clone(&self.classifier),
                    events_tx.clone(),
                    stop_rx.clone(),
                ))),
                Err(e) => log::warn!("Cannot monitor {}: {}", source.path.display(), e),
            }
        }

        if tailers.is_empty() {
            return Err(MonitorError::NothingToMonitor);
        }

        log::info!("Monitoring {} log source(s)", tailers.len());
        let dispatcher = tokio::spawn(Arc::clone(&self.dispatcher).run(events_rx));

        Ok(Generation {
            stop: stop_tx,
            tailers,
            dispatcher,
        })
    }

    async fn wait_for_restart(&self) {
        if !self.config.restart.enabled {
            return std::future::pending().await;
        }

        let now = Local::now();
        let next = next_restart(&now, self.restart_at);
        let wait = (next - now).to_std().unwrap_or_default();
        log::info!(
            "Next scheduled restart at {} ({:.2} hours from now)",
            next.format("%Y-%m-%d %H:%M:%S"),
            wait.as_secs_f64() / 3600.0
        );
        tokio::time::sleep(wait).await;
    }
}

/// The first occurrence of wall-clock time `at` strictly after `now`
pub fn next_restart<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    // a local time can be skipped by a DST jump, so look a few days ahead
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    now.clone() + chrono::Duration::days(1)
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
