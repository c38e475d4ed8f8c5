//! One repeating timer per enabled endpoint.
//!
//! Each tick spawns the probe pipeline without waiting for the previous one, so a probe that
//! outlives its interval overlaps with the next. Cancelling a timer stops future ticks only;
//! probes already in flight still record their outcome.
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::executor::ProbeExecutor;
use crate::clock::Clock;
use crate::db::models::{Endpoint, Host};
use crate::db::{MonitorRepository, ResultSink};
use crate::notifications::service::NotificationService;

/// Longest accepted interval (one year).
pub const MAX_INTERVAL_SECONDS: i64 = 366 * 24 * 60 * 60;

#[derive(Debug)]
struct SchedulerTask {
    interval_seconds: i64,
    /// `None` while paused.
    timer: Option<JoinHandle<()>>,
    last_execution_ms: Option<i64>,
}

impl SchedulerTask {
    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub endpoint_id: i32,
    pub interval_seconds: i64,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub next_execution_time: Option<DateTime<Utc>>,
}

struct SchedulerInner {
    repository: Arc<dyn MonitorRepository>,
    executor: Arc<ProbeExecutor>,
    results: Arc<dyn ResultSink>,
    notifications: Arc<NotificationService>,
    clock: Arc<dyn Clock>,
    tasks: DashMap<i32, SchedulerTask>,
}

pub struct MonitorScheduler {
    inner: Arc<SchedulerInner>,
}

impl MonitorScheduler {
    pub fn new(
        repository: Arc<dyn MonitorRepository>,
        executor: Arc<ProbeExecutor>,
        results: Arc<dyn ResultSink>,
        notifications: Arc<NotificationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                repository,
                executor,
                results,
                notifications,
                clock,
                tasks: DashMap::new(),
            }),
        }
    }

    /// Schedules an endpoint and runs its first probe before returning.
    ///
    /// Returns false (and leaves the endpoint unscheduled) when the endpoint or its host is
    /// missing or disabled, or the resolved interval is not within `1..=MAX_INTERVAL_SECONDS`.
    pub async fn add_endpoint(&self, endpoint_id: i32, interval_seconds: Option<i64>) -> bool {
        let Some((endpoint, host)) = self.inner.load_schedulable(endpoint_id).await else {
            self.cancel_and_forget(endpoint_id);
            return false;
        };

        let Some(interval) = interval_seconds
            .or_else(|| endpoint.effective_interval(&host))
            .filter(|seconds| (1..=MAX_INTERVAL_SECONDS).contains(seconds))
        else {
            warn!(endpoint_id, requested = ?interval_seconds, "No valid interval for endpoint; not scheduling.");
            self.cancel_and_forget(endpoint_id);
            return false;
        };

        self.cancel_and_forget(endpoint_id);
        let timer = self.inner.spawn_timer(endpoint.clone(), host.clone(), interval);
        self.inner.tasks.insert(
            endpoint_id,
            SchedulerTask {
                interval_seconds: interval,
                timer: Some(timer),
                last_execution_ms: None,
            },
        );
        info!(endpoint_id, interval_seconds = interval, "Scheduled endpoint.");

        self.inner.run_probe(&endpoint, &host).await;
        true
    }

    /// Idempotent: unknown ids are ignored.
    pub fn remove_endpoint(&self, endpoint_id: i32) -> bool {
        let removed = self.cancel_and_forget(endpoint_id);
        if removed {
            info!(endpoint_id, "Unscheduled endpoint.");
        }
        removed
    }

    /// Picks up the endpoint's current configuration.
    pub async fn update_endpoint(&self, endpoint_id: i32) -> bool {
        self.cancel_and_forget(endpoint_id);
        self.add_endpoint(endpoint_id, None).await
    }

    /// Stops ticking but remembers the interval for [`resume_endpoint`](Self::resume_endpoint).
    pub fn pause_endpoint(&self, endpoint_id: i32) -> bool {
        match self.inner.tasks.get_mut(&endpoint_id) {
            Some(mut task) => {
                task.cancel();
                info!(endpoint_id, "Paused endpoint.");
                true
            }
            None => false,
        }
    }

    pub async fn resume_endpoint(&self, endpoint_id: i32) -> bool {
        let interval = self.inner.tasks.get(&endpoint_id).map(|t| t.interval_seconds);
        match interval {
            Some(interval) => self.add_endpoint(endpoint_id, Some(interval)).await,
            None => {
                debug!(endpoint_id, "Resume requested for unknown endpoint.");
                false
            }
        }
    }

    /// Schedules every enabled endpoint. Returns how many were scheduled.
    pub async fn start_all(&self) -> usize {
        let endpoints = match self.inner.repository.list_enabled_endpoints().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, "Failed to list enabled endpoints.");
                return 0;
            }
        };

        info!(count = endpoints.len(), "Starting monitors for enabled endpoints.");
        let scheduled = join_all(
            endpoints
                .iter()
                .map(|(endpoint, host)| self.add_endpoint(endpoint.id, endpoint.effective_interval(host))),
        )
        .await
        .into_iter()
        .filter(|scheduled| *scheduled)
        .count();
        info!(scheduled, "Monitors started.");
        scheduled
    }

    pub fn stop_all(&self) {
        let count = self.inner.tasks.len();
        self.inner.tasks.iter_mut().for_each(|mut task| task.cancel());
        self.inner.tasks.clear();
        info!(count, "Stopped all monitors.");
    }

    /// Active (not paused) tasks, ordered by endpoint id.
    pub fn get_status(&self) -> Vec<TaskStatus> {
        let mut statuses: Vec<TaskStatus> = self
            .inner
            .tasks
            .iter()
            .filter(|task| task.timer.is_some())
            .map(|task| {
                let next_ms = task.last_execution_ms.and_then(|last| {
                    task.interval_seconds
                        .checked_mul(1000)
                        .and_then(|period_ms| last.checked_add(period_ms))
                });
                TaskStatus {
                    endpoint_id: *task.key(),
                    interval_seconds: task.interval_seconds,
                    last_execution_time: task.last_execution_ms.and_then(from_epoch_ms),
                    next_execution_time: next_ms.and_then(from_epoch_ms),
                }
            })
            .collect();
        statuses.sort_by_key(|s| s.endpoint_id);
        statuses
    }

    pub fn is_scheduled(&self, endpoint_id: i32) -> bool {
        self.inner
            .tasks
            .get(&endpoint_id)
            .is_some_and(|task| task.timer.is_some())
    }

    fn cancel_and_forget(&self, endpoint_id: i32) -> bool {
        match self.inner.tasks.remove(&endpoint_id) {
            Some((_, mut task)) => {
                task.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        self.inner.tasks.iter_mut().for_each(|mut task| task.cancel());
    }
}

impl SchedulerInner {
    async fn load_schedulable(&self, endpoint_id: i32) -> Option<(Endpoint, Host)> {
        let endpoint = match self.repository.get_endpoint(endpoint_id).await {
            Ok(Some(endpoint)) if endpoint.enabled => endpoint,
            Ok(Some(_)) => {
                debug!(endpoint_id, "Endpoint disabled; not scheduling.");
                return None;
            }
            Ok(None) => {
                debug!(endpoint_id, "Endpoint not found; not scheduling.");
                return None;
            }
            Err(e) => {
                error!(endpoint_id, error = %e, "Failed to load endpoint.");
                return None;
            }
        };

        match self.repository.get_host(endpoint.host_id).await {
            Ok(Some(host)) if host.enabled => Some((endpoint, host)),
            Ok(_) => {
                debug!(endpoint_id, host_id = endpoint.host_id, "Host missing or disabled; not scheduling.");
                None
            }
            Err(e) => {
                error!(endpoint_id, host_id = endpoint.host_id, error = %e, "Failed to load host.");
                None
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>, endpoint: Endpoint, host: Host, interval_seconds: i64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let period = Duration::from_secs(interval_seconds as u64);
        let endpoint = Arc::new(endpoint);
        let host = Arc::new(host);

        tokio::spawn(async move {
            // The immediate probe is run by `add_endpoint`; the first tick is one period out.
            let Some(first_tick) = time::Instant::now().checked_add(period) else {
                error!(endpoint_id = endpoint.id, interval_seconds, "Interval out of range; timer not started.");
                return;
            };
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let inner = Arc::clone(&inner);
                let endpoint = Arc::clone(&endpoint);
                let host = Arc::clone(&host);
                tokio::spawn(async move {
                    inner.run_probe(&endpoint, &host).await;
                });
            }
        })
    }

    #[instrument(skip_all, fields(endpoint_id = endpoint.id, host_id = host.id))]
    async fn run_probe(&self, endpoint: &Endpoint, host: &Host) {
        let outcome = self.executor.execute(endpoint, host).await;
        if let Some(mut task) = self.tasks.get_mut(&endpoint.id) {
            task.last_execution_ms = Some(self.clock.now_epoch_ms());
        }
        debug!(
            success = outcome.success,
            status_code = ?outcome.status_code,
            response_time_ms = outcome.response_time_ms,
            "Probe finished."
        );

        if let Err(e) = self.results.record_probe_outcome(&outcome).await {
            error!(error = %e, "Failed to record probe outcome.");
        }
        self.notifications.process_outcome(&outcome, endpoint, host).await;
    }
}

fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
