//! Named timer jobs
//!
//! The controller uses a [`Scheduler`] for the startup delay, the removal
//! of a suspension, delayed re-evaluations and the `as_cycle` trigger.
//! Scheduling a name that is already scheduled replaces the old job.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Callback run by a scheduler
pub type Job = Box<dyn FnMut() + Send>;

/// Timer facility used by the controllers
pub trait Scheduler: Send + Sync {
    /// Run `job` once at `at`
    fn schedule(&self, name: &str, at: DateTime<Utc>, job: Job) -> EngineResult<()>;

    /// Run `job` every `period`, starting one period from now
    fn schedule_every(&self, name: &str, period: Duration, job: Job) -> EngineResult<()>;

    /// Remove a job; returns `false` if nothing was scheduled under `name`
    fn cancel(&self, name: &str) -> bool;

    fn is_scheduled(&self, name: &str) -> bool;
}

type JobMap = Arc<DashMap<String, (u64, JoinHandle<()>)>>;

/// Scheduler running every job as a tokio task
#[derive(Default)]
pub struct TokioScheduler {
    jobs: JobMap,
    generation: AtomicU64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<F>(&self, name: &str, task: impl FnOnce(JobMap, String, u64) -> F) -> EngineResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = Handle::try_current()
            .map_err(|e| EngineError::Scheduler(format!("{}: {}", name, e)))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let future = task(Arc::clone(&self.jobs), name.to_string(), generation);
        let join = handle.spawn(future);
        if let Some((_, old)) = self.jobs.insert(name.to_string(), (generation, join)) {
            trace!(job = name, "Replacing scheduled job");
            old.abort();
        }
        Ok(())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, name: &str, at: DateTime<Utc>, mut job: Job) -> EngineResult<()> {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(job = name, ?delay, "Scheduling job");
        self.spawn(name, move |jobs, name, generation| async move {
            tokio::time::sleep(delay).await;
            jobs.remove_if(&name, |_, (current, _)| *current == generation);
            job();
        })
    }

    fn schedule_every(&self, name: &str, period: Duration, mut job: Job) -> EngineResult<()> {
        debug!(job = name, ?period, "Scheduling periodic job");
        self.spawn(name, move |_, _, _| async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                job();
            }
        })
    }

    fn cancel(&self, name: &str) -> bool {
        match self.jobs.remove(name) {
            Some((_, (_, join))) => {
                debug!(job = name, "Cancelling job");
                join.abort();
                true
            }
            None => false,
        }
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .get(name)
            .is_some_and(|entry| !entry.1.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for entry in self.jobs.iter() {
            entry.1.abort();
        }
    }
}

struct ManualJob {
    at: DateTime<Utc>,
    period: Option<chrono::Duration>,
    job: Job,
}

/// Scheduler whose jobs only run when [`ManualScheduler::fire_due`] is
/// called
///
/// Used with a [`crate::FixedClock`] to drive time in tests.
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<BTreeMap<String, ManualJob>>,
    now: Mutex<Option<DateTime<Utc>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base time for periodic jobs scheduled from now on
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    /// Names and due times of all pending jobs
    pub fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        self.lock()
            .iter()
            .map(|(name, job)| (name.clone(), job.at))
            .collect()
    }

    /// Due time of a pending job
    pub fn due(&self, name: &str) -> Option<DateTime<Utc>> {
        self.lock().get(name).map(|job| job.at)
    }

    /// Run every job due at `now`, earliest first; returns how many ran
    ///
    /// Jobs may schedule or cancel jobs while running. A periodic job is
    /// put back one period later unless it was replaced meanwhile.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<(DateTime<Utc>, String)> = self
            .lock()
            .iter()
            .filter(|(_, job)| job.at <= now)
            .map(|(name, job)| (job.at, name.clone()))
            .collect();
        due.sort();

        let mut fired = 0;
        for (_, name) in due {
            let Some(mut entry) = self.lock().remove(&name) else {
                continue;
            };
            trace!(job = %name, "Firing job");
            (entry.job)();
            fired += 1;
            if let Some(period) = entry.period {
                entry.at += period;
                self.lock().entry(name).or_insert(entry);
            }
        }
        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ManualJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, name: &str, at: DateTime<Utc>, job: Job) -> EngineResult<()> {
        self.lock().insert(
            name.to_string(),
            ManualJob {
                at,
                period: None,
                job,
            },
        );
        Ok(())
    }

    fn schedule_every(&self, name: &str, period: Duration, job: Job) -> EngineResult<()> {
        let period = chrono::Duration::from_std(period)
            .map_err(|e| EngineError::Scheduler(format!("{}: {}", name, e)))?;
        let base = *self.now.lock().unwrap_or_else(PoisonError::into_inner);
        let now = base.unwrap_or_else(Utc::now);
        self.lock().insert(
            name.to_string(),
            ManualJob {
                at: now + period,
                period: Some(period),
                job,
            },
        );
        Ok(())
    }

    fn cancel(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Job) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_manual_fire_due() {
        let scheduler = ManualScheduler::new();
        let start = Utc::now();
        let (count, job) = counter();
        scheduler.schedule("a", start + chrono::Duration::seconds(10), job).unwrap();

        assert_eq!(scheduler.fire_due(start), 0);
        assert!(scheduler.is_scheduled("a"));
        assert_eq!(scheduler.fire_due(start + chrono::Duration::seconds(10)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("a"));
    }

    #[test]
    fn test_manual_periodic_and_cancel() {
        let scheduler = ManualScheduler::new();
        let start = Utc::now();
        scheduler.set_now(start);
        let (count, job) = counter();
        scheduler.schedule_every("cycle", Duration::from_secs(60), job).unwrap();

        assert_eq!(scheduler.fire_due(start + chrono::Duration::seconds(60)), 1);
        assert_eq!(
            scheduler.due("cycle"),
            Some(start + chrono::Duration::seconds(120))
        );
        assert!(scheduler.cancel("cycle"));
        assert!(!scheduler.cancel("cycle"));
        assert_eq!(scheduler.fire_due(start + chrono::Duration::seconds(600)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_replace() {
        let scheduler = ManualScheduler::new();
        let start = Utc::now();
        let (first, job) = counter();
        scheduler.schedule("a", start, job).unwrap();
        let (second, job) = counter();
        scheduler.schedule("a", start, job).unwrap();
        scheduler.fire_due(start);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_schedule_and_cancel() {
        let scheduler = TokioScheduler::new();
        let (count, job) = counter();
        scheduler
            .schedule("once", Utc::now() + chrono::Duration::seconds(5), job)
            .unwrap();
        let (cancelled, job) = counter();
        scheduler
            .schedule("never", Utc::now() + chrono::Duration::seconds(5), job)
            .unwrap();
        assert!(scheduler.is_scheduled("once"));
        assert!(scheduler.cancel("never"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_scheduled("once"));
    }

    #[test]
    fn test_tokio_requires_runtime() {
        let scheduler = TokioScheduler::new();
        let (_, job) = counter();
        let result = scheduler.schedule("x", Utc::now(), job);
        assert!(matches!(result, Err(EngineError::Scheduler(_))));
    }
}
