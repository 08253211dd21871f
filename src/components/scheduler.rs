//! Scheduled-job component.
//!
//! Jobs are either fixed-period (`every`) or cron expressions with a seconds
//! field (`cron`). Each job gets its own dispatch loop once the scheduler is
//! started; stopping signals every loop and waits for in-flight runs.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info};

use crate::error::{LegoError, Result};

/// Type alias for async job functions.
pub type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Registration callback replayed against a fresh scheduler on every init.
pub type CrontabTask = Arc<dyn Fn(&Scheduler) -> Result<()> + Send + Sync>;

enum Trigger {
    Every(Duration),
    Cron {
        expr: String,
        schedule: Box<cron::Schedule>,
    },
}

impl Trigger {
    fn next_delay(&self) -> Option<Duration> {
        match self {
            Trigger::Every(period) => Some(*period),
            Trigger::Cron { schedule, .. } => {
                let next = schedule.upcoming(Utc).next()?;
                Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Trigger::Every(period) => format!("every {:?}", period),
            Trigger::Cron { expr, .. } => expr.clone(),
        }
    }
}

struct Job {
    name: String,
    trigger: Trigger,
    func: JobFn,
}

/// Fixed-period and cron job scheduler.
pub struct Scheduler {
    jobs: RwLock<Vec<Arc<Job>>>,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Registered job names, in registration order.
    pub fn job_names(&self) -> Vec<String> {
        self.jobs.read().iter().map(|job| job.name.clone()).collect()
    }

    /// Registers a job run every `period`, first after one period.
    pub fn every<F, Fut>(&self, name: impl Into<String>, period: Duration, func: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(LegoError::config("job period must be greater than zero"));
        }
        self.add(name.into(), Trigger::Every(period), func);
        Ok(())
    }

    /// Registers a job driven by a cron expression
    /// (`sec min hour day-of-month month day-of-week [year]`).
    pub fn cron<F, Fut>(&self, name: impl Into<String>, expr: &str, func: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let schedule = cron::Schedule::from_str(expr).map_err(|e| {
            LegoError::config_with_source(format!("invalid cron expression '{}'", expr), e)
        })?;
        let trigger = Trigger::Cron {
            expr: expr.to_string(),
            schedule: Box::new(schedule),
        };
        self.add(name.into(), trigger, func);
        Ok(())
    }

    /// Applies registration callbacks in order, stopping at the first error.
    pub fn add_task_func<I, F>(&self, callbacks: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&Scheduler) -> Result<()>,
    {
        for callback in callbacks {
            callback(self)?;
        }
        Ok(())
    }

    fn add<F, Fut>(&self, name: String, trigger: Trigger, func: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let func: JobFn = Arc::new(move || Box::pin(func()));
        let job = Arc::new(Job {
            name,
            trigger,
            func,
        });
        info!(job = %job.name, trigger = %job.trigger.describe(), "registered scheduled job");

        let shutdown_tx = self.shutdown_tx.lock();
        self.jobs.write().push(Arc::clone(&job));

        // Jobs added to a live scheduler start right away.
        if let Some(tx) = shutdown_tx.as_ref() {
            let handle = tokio::spawn(drive(job, tx.subscribe()).with_current_subscriber());
            self.handles.lock().push(handle);
        }
    }

    /// Spawns one dispatch loop per job. Must be called inside a tokio
    /// runtime; a second call while running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("scheduler already running");
            return;
        }

        let mut shutdown_tx = self.shutdown_tx.lock();
        let (tx, _) = watch::channel(false);
        let jobs = self.jobs.read().clone();
        let spawned: Vec<JoinHandle<()>> = jobs
            .into_iter()
            .map(|job| tokio::spawn(drive(job, tx.subscribe()).with_current_subscriber()))
            .collect();
        let count = spawned.len();
        self.handles.lock().extend(spawned);
        *shutdown_tx = Some(tx);

        info!(jobs = count, "scheduler started");
    }

    /// Signals every loop and waits for in-flight runs to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(true);
        }

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduled job task failed");
            }
        }

        info!("scheduler stopped");
    }

    /// Removes every registered job. Loops already running continue until
    /// `stop`.
    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.job_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.get_mut().take() {
            let _ = tx.send(true);
        }
    }
}

async fn drive(job: Arc<Job>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }
        let Some(delay) = job.trigger.next_delay() else {
            debug!(job = %job.name, "schedule exhausted");
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }

        debug!(job = %job.name, "running scheduled job");
        (job.func)().await;
    }
}
