//! Periodic maintenance timers.
//!
//! The refresh timer only publishes [`Event::RefreshDue`]; the refresh itself
//! runs in the orchestrator. The update timer starts a short-lived check task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bus::{Event, EventSender};
use crate::error::TetherError;

/// Upper bound on one update check, including installation.
pub const DEFAULT_UPDATE_TASK_LIMIT: Duration = Duration::from_secs(10 * 60);

/// Result of probing for a new firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available {
        validator: Option<String>,
        size: Option<u64>,
    },
}

/// Checks for (and applies) an update. Image layout is the implementor's concern.
#[async_trait]
pub trait UpdateChecker: Send + Sync {
    async fn check_and_apply(&self) -> Result<UpdateStatus, TetherError>;
}

/// Installs a downloaded image.
#[async_trait]
pub trait UpdateInstaller: Send + Sync {
    async fn install(&self, image_url: &str, status: &UpdateStatus) -> Result<(), TetherError>;
}

/// Installer for hosts that cannot flash: reports and accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInstaller;

#[async_trait]
impl UpdateInstaller for LogInstaller {
    async fn install(&self, image_url: &str, status: &UpdateStatus) -> Result<(), TetherError> {
        tracing::info!(url = %image_url, status = ?status, "firmware update available");
        Ok(())
    }
}

/// Probes the image URL with `HEAD` and compares its validator (ETag, or
/// Last-Modified) with the last installed one.
pub struct HttpUpdateChecker {
    http: reqwest::Client,
    image_url: String,
    installer: Arc<dyn UpdateInstaller>,
    installed: Mutex<Option<String>>,
}

impl HttpUpdateChecker {
    pub fn new(image_url: impl Into<String>, installer: Arc<dyn UpdateInstaller>) -> Self {
        Self {
            http: reqwest::Client::new(),
            image_url: image_url.into(),
            installer,
            installed: Mutex::new(None),
        }
    }

    /// Seed the validator of the image currently running.
    pub fn with_installed_validator(mut self, validator: impl Into<String>) -> Self {
        self.installed = Mutex::new(Some(validator.into()));
        self
    }

    pub async fn probe(&self) -> Result<UpdateStatus, TetherError> {
        let resp = self.http.head(&self.image_url).send().await?;
        if !resp.status().is_success() {
            return Err(TetherError::http(
                resp.status().as_u16(),
                "update image probe failed",
            ));
        }
        let headers = resp.headers();
        let validator = headers
            .get(ETAG)
            .or_else(|| headers.get(LAST_MODIFIED))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        let installed = self
            .installed
            .lock()
            .map_err(|_| TetherError::InvalidState("update state lock poisoned".into()))?
            .clone();
        if validator.is_some() && validator == installed {
            return Ok(UpdateStatus::UpToDate);
        }
        Ok(UpdateStatus::Available { validator, size })
    }
}

#[async_trait]
impl UpdateChecker for HttpUpdateChecker {
    async fn check_and_apply(&self) -> Result<UpdateStatus, TetherError> {
        let status = self.probe().await?;
        if let UpdateStatus::Available { validator, .. } = &status {
            self.installer.install(&self.image_url, &status).await?;
            if let Ok(mut guard) = self.installed.lock() {
                *guard = validator.clone();
            }
        }
        Ok(status)
    }
}

/// Periods for the two maintenance timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    pub refresh_period: Duration,
    pub update_period: Duration,
    /// Run one update check right away, before the first period elapses.
    pub check_on_start: bool,
    pub update_task_limit: Duration,
}

impl Scheduler {
    pub fn new(refresh_period: Duration, update_period: Duration) -> Self {
        Self {
            refresh_period,
            update_period,
            check_on_start: true,
            update_task_limit: DEFAULT_UPDATE_TASK_LIMIT,
        }
    }

    /// Start both timers. They run until `shutdown` is cancelled.
    pub fn spawn(
        self,
        events: EventSender,
        updater: Arc<dyn UpdateChecker>,
        shutdown: CancellationToken,
    ) -> SchedulerHandle {
        let refresh = tokio::spawn(run_refresh_timer(
            self.refresh_period,
            events,
            shutdown.clone(),
        ));
        let update = tokio::spawn(run_update_timer(self, updater, shutdown));
        SchedulerHandle { refresh, update }
    }
}

/// Join handles of the running timers.
pub struct SchedulerHandle {
    refresh: JoinHandle<()>,
    update: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn join(self) {
        let _ = self.refresh.await;
        let _ = self.update.await;
    }

    pub fn abort(&self) {
        self.refresh.abort();
        self.update.abort();
    }
}

async fn run_refresh_timer(period: Duration, events: EventSender, shutdown: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                tracing::debug!("refresh timer fired");
                if !events.publish(Event::RefreshDue).await.is_delivered() {
                    tracing::warn!("refresh tick dropped");
                }
            }
        }
    }
}

async fn run_update_timer(
    scheduler: Scheduler,
    updater: Arc<dyn UpdateChecker>,
    shutdown: CancellationToken,
) {
    let mut running: Option<JoinHandle<()>> = None;
    if scheduler.check_on_start {
        running = Some(spawn_update_check(updater.clone(), scheduler.update_task_limit));
    }
    let period = scheduler.update_period;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if running.as_ref().is_some_and(|task| !task.is_finished()) {
                    tracing::debug!("previous update check still running, skipping");
                    continue;
                }
                running = Some(spawn_update_check(updater.clone(), scheduler.update_task_limit));
            }
        }
    }
}

fn spawn_update_check(updater: Arc<dyn UpdateChecker>, limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        match time::timeout(limit, updater.check_and_apply()).await {
            Ok(Ok(status)) => tracing::info!(status = ?status, "update check finished"),
            Ok(Err(err)) => tracing::warn!(error = %err, "update check failed"),
            Err(_) => tracing::warn!(limit_secs = limit.as_secs(), "update check timed out"),
        }
    })
}
