//! Per-tenant background job scheduling.
//!
//! Every tenant runs two periodic jobs (the storage accountant and the tree
//! reconciler). [`TenantService`](crate::tenant::TenantService) starts and
//! stops them through the [`Scheduler`] trait:
//!
//! - [`TokioScheduler`] drives jobs from `tokio::time::interval` timers.
//! - [`ManualScheduler`] only records calls; tests tick jobs by hand.
//!
//! A job's ticks never overlap: the loop awaits the whole tick before it waits
//! for the next timer, and missed ticks are delayed rather than bunched up.
//! Stopping a tenant lets an in-flight tick finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// A periodic unit of work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run one tick. Errors are handled inside the job.
    async fn tick(&self);
}

/// A job and its period.
#[derive(Clone)]
pub struct ScheduledJob {
    pub job: Arc<dyn Job>,
    pub period: Duration,
}

impl ScheduledJob {
    pub fn new(job: Arc<dyn Job>, period: Duration) -> Self {
        Self { job, period }
    }
}

impl std::fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("job", &self.job.name())
            .field("period", &self.period)
            .finish()
    }
}

/// Scheduling capability injected into the tenant service.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start `jobs` for a tenant, replacing any jobs it already runs.
    async fn start(&self, tenant_id: &str, jobs: Vec<ScheduledJob>);

    /// Stop a tenant's jobs. Returns once no tick of theirs is running.
    async fn stop(&self, tenant_id: &str);

    /// Whether a tenant currently has jobs scheduled.
    fn is_running(&self, tenant_id: &str) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct RunningJobs {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Scheduler driving jobs on tokio timers.
#[derive(Default)]
pub struct TokioScheduler {
    running: Mutex<HashMap<String, RunningJobs>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every tenant's jobs.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = lock(&self.running).keys().cloned().collect();
        for id in ids {
            self.stop(&id).await;
        }
    }

    async fn shutdown(tenant_id: &str, jobs: RunningJobs) {
        let _ = jobs.stop.send(true);
        for handle in jobs.handles {
            if let Err(e) = handle.await {
                warn!("job task for tenant {} ended abnormally: {}", tenant_id, e);
            }
        }
    }
}

/// Span wrapping one tick of a tenant's job.
fn tick_span(tenant_id: &str, job: &'static str) -> Span {
    info_span!("tick", tenant = %tenant_id, job)
}

async fn run_job(tenant_id: String, scheduled: ScheduledJob, mut stop: watch::Receiver<bool>) {
    let mut timer = interval(scheduled.period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = timer.tick() => {
                debug!("tenant {}: {} tick", tenant_id, scheduled.job.name());
                scheduled
                    .job
                    .tick()
                    .instrument(tick_span(&tenant_id, scheduled.job.name()))
                    .await;
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    debug!("tenant {}: {} stopped", tenant_id, scheduled.job.name());
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn start(&self, tenant_id: &str, jobs: Vec<ScheduledJob>) {
        let previous = lock(&self.running).remove(tenant_id);
        if let Some(previous) = previous {
            Self::shutdown(tenant_id, previous).await;
        }

        let (stop, _) = watch::channel(false);
        let handles = jobs
            .into_iter()
            .map(|job| tokio::spawn(run_job(tenant_id.to_string(), job, stop.subscribe())))
            .collect();

        info!("Started background jobs for tenant {}", tenant_id);
        lock(&self.running).insert(tenant_id.to_string(), RunningJobs { stop, handles });
    }

    async fn stop(&self, tenant_id: &str) {
        let jobs = lock(&self.running).remove(tenant_id);
        if let Some(jobs) = jobs {
            Self::shutdown(tenant_id, jobs).await;
            info!("Stopped background jobs for tenant {}", tenant_id);
        }
    }

    fn is_running(&self, tenant_id: &str) -> bool {
        lock(&self.running).contains_key(tenant_id)
    }
}

/// A start or stop call seen by [`ManualScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Started(String),
    Stopped(String),
}

/// Scheduler that never runs anything on its own.
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<HashMap<String, Vec<ScheduledJob>>>,
    events: Mutex<Vec<SchedulerEvent>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every start/stop call so far, in order.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        lock(&self.events).clone()
    }

    /// Tenants with scheduled jobs, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.jobs).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one tick of every job of a tenant. Returns how many jobs ran.
    pub async fn tick(&self, tenant_id: &str) -> usize {
        let jobs = lock(&self.jobs).get(tenant_id).cloned().unwrap_or_default();
        for scheduled in &jobs {
            scheduled
                .job
                .tick()
                .instrument(tick_span(tenant_id, scheduled.job.name()))
                .await;
        }
        jobs.len()
    }

    /// Run one tick of the named job of a tenant.
    pub async fn tick_job(&self, tenant_id: &str, name: &str) -> bool {
        let job = lock(&self.jobs)
            .get(tenant_id)
            .and_then(|jobs| jobs.iter().find(|j| j.job.name() == name).cloned());
        match job {
            Some(scheduled) => {
                scheduled
                    .job
                    .tick()
                    .instrument(tick_span(tenant_id, scheduled.job.name()))
                    .await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn start(&self, tenant_id: &str, jobs: Vec<ScheduledJob>) {
        lock(&self.jobs).insert(tenant_id.to_string(), jobs);
        lock(&self.events).push(SchedulerEvent::Started(tenant_id.to_string()));
    }

    async fn stop(&self, tenant_id: &str) {
        lock(&self.jobs).remove(tenant_id);
        lock(&self.events).push(SchedulerEvent::Stopped(tenant_id.to_string()));
    }

    fn is_running(&self, tenant_id: &str) -> bool {
        lock(&self.jobs).contains_key(tenant_id)
    }
}
