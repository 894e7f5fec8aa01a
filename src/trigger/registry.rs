//! Trigger registry for managing scheduled entry points.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::{Schedule, Trigger, TriggerError};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata about a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    /// Job UUID.
    pub id: uuid::Uuid,
    /// Trigger name.
    pub name: String,
    /// Schedule description.
    pub schedule: String,
}

/// Registry for the scheduled entry points.
///
/// Uses `tokio-cron-scheduler` for job scheduling. Every trigger carries its
/// own in-flight flag so overlapping firings of one trigger are skipped.
pub struct TriggerRegistry {
    scheduler: JobScheduler,
    jobs: Arc<RwLock<HashMap<uuid::Uuid, JobInfo>>>,
}

impl TriggerRegistry {
    /// Create a new trigger registry.
    pub async fn new() -> Result<Self, TriggerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field(
                "job_count",
                &self.jobs.try_read().map(|j| j.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl TriggerRegistry {
    /// Register a trigger.
    pub async fn spawn<T: Trigger>(&self, trigger: T) -> Result<uuid::Uuid, TriggerError> {
        let name = trigger.name().to_string();
        let schedule_desc = trigger.schedule().to_string();

        let job = create_job(Arc::new(trigger)).inspect_err(
            |e| tracing::error!(trigger = %name, schedule = %schedule_desc, error = %e, "Failed to create job"),
        )?;

        let job_id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))
            .inspect_err(
                |e| tracing::error!(trigger = %name, error = %e, "Failed to register job"),
            )?;

        self.jobs.write().await.insert(
            job_id,
            JobInfo {
                id: job_id,
                name: name.clone(),
                schedule: schedule_desc.clone(),
            },
        );

        tracing::info!(trigger = %name, schedule = %schedule_desc, job_id = %job_id, "Trigger registered");
        Ok(job_id)
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), TriggerError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))?;
        tracing::info!("Trigger scheduler started");
        Ok(())
    }

    /// List all registered jobs.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Gracefully shutdown the scheduler with default timeout.
    pub async fn shutdown(self) -> Result<(), TriggerError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown with custom timeout.
    pub async fn shutdown_with_timeout(mut self, timeout: Duration) -> Result<(), TriggerError> {
        let job_count = self.jobs.read().await.len();
        let shutdown_result = tokio::time::timeout(timeout, async {
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| TriggerError::Scheduler(e.to_string()))
        })
        .await;

        match shutdown_result {
            Ok(Ok(())) => {
                tracing::info!(job_count, "Trigger scheduler shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(job_count, error = %e, "Trigger scheduler shutdown failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(job_count, "Trigger scheduler shutdown timed out");
                Ok(())
            }
        }
    }
}

fn create_job<T: Trigger>(trigger: Arc<T>) -> Result<Job, TriggerError> {
    let schedule = trigger.schedule().clone();
    let in_flight = Arc::new(AtomicBool::new(false));

    let make_callback = move || {
        let (trigger, in_flight) = (Arc::clone(&trigger), Arc::clone(&in_flight));
        move |_: uuid::Uuid, _: JobScheduler| {
            let (trigger, in_flight) = (Arc::clone(&trigger), Arc::clone(&in_flight));
            Box::pin(async move {
                run_single_flight(trigger.as_ref(), &in_flight).await;
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        }
    };

    match &schedule {
        Schedule::Interval(d) => Job::new_repeated_async(*d, make_callback()),
        Schedule::Cron(expr) => Job::new_cron_job_async(expr, make_callback()),
    }
    .map_err(|e| TriggerError::Scheduler(e.to_string()))
}

/// Clears the in-flight flag when a run ends, even by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fire `trigger` unless a previous firing is still running.
///
/// Returns `false` when the firing was skipped.
async fn run_single_flight<T: Trigger + ?Sized>(trigger: &T, in_flight: &AtomicBool) -> bool {
    if in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::warn!(trigger = %trigger.name(), "Previous run still in progress, skipping");
        return false;
    }
    let _guard = InFlight(in_flight);

    let start = std::time::Instant::now();
    tracing::debug!(trigger = %trigger.name(), "Trigger fired");
    trigger.fire().await;
    tracing::debug!(
        trigger = %trigger.name(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Trigger run finished"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTrigger {
        schedule: Schedule,
        runs: Arc<AtomicUsize>,
        hold: Duration,
    }

    impl CountingTrigger {
        fn new(hold: Duration) -> Self {
            Self {
                schedule: Schedule::interval(Duration::from_secs(60)),
                runs: Arc::new(AtomicUsize::new(0)),
                hold,
            }
        }
    }

    #[async_trait::async_trait]
    impl Trigger for CountingTrigger {
        fn name(&self) -> &str {
            "counting"
        }

        fn schedule(&self) -> &Schedule {
            &self.schedule
        }

        async fn fire(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
        }
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = TriggerRegistry::new().await.unwrap();

        let job_id = registry
            .spawn(CountingTrigger::new(Duration::ZERO))
            .await
            .unwrap();

        let jobs = registry.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job_id);
        assert_eq!(jobs[0].name, "counting");
        assert_eq!(jobs[0].schedule, "every 1m");

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_firing_is_skipped() {
        let trigger = CountingTrigger::new(Duration::from_millis(100));
        let in_flight = AtomicBool::new(false);

        let (first, second) = tokio::join!(
            run_single_flight(&trigger, &in_flight),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                run_single_flight(&trigger, &in_flight).await
            }
        );

        assert!(first);
        assert!(!second);
        assert_eq!(trigger.runs.load(Ordering::SeqCst), 1);

        assert!(run_single_flight(&trigger, &in_flight).await);
        assert_eq!(trigger.runs.load(Ordering::SeqCst), 2);
    }
}
