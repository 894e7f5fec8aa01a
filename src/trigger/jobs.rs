//! Adapters binding the entry points to the trigger registry.

use std::sync::Arc;

use super::{Schedule, Trigger};
use crate::collection::CollectionScheduler;
use crate::delivery::DeliveryDispatcher;
use crate::reaper::RetentionReaper;

/// Fires a collection cycle.
#[derive(Debug)]
pub struct CollectTrigger {
    scheduler: CollectionScheduler,
    schedule: Schedule,
}

impl CollectTrigger {
    pub fn new(scheduler: CollectionScheduler, schedule: Schedule) -> Self {
        Self {
            scheduler,
            schedule,
        }
    }
}

#[async_trait::async_trait]
impl Trigger for CollectTrigger {
    fn name(&self) -> &str {
        "collect"
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn fire(&self) {
        self.scheduler.collect().await;
    }
}

/// Fires a delivery cycle.
#[derive(Debug)]
pub struct SendTrigger {
    dispatcher: Arc<DeliveryDispatcher>,
    schedule: Schedule,
}

impl SendTrigger {
    pub fn new(dispatcher: Arc<DeliveryDispatcher>, schedule: Schedule) -> Self {
        Self {
            dispatcher,
            schedule,
        }
    }
}

#[async_trait::async_trait]
impl Trigger for SendTrigger {
    fn name(&self) -> &str {
        "send"
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn fire(&self) {
        self.dispatcher.dispatch().await;
    }
}

/// Fires a retention cycle.
#[derive(Debug)]
pub struct CleanTrigger {
    reaper: RetentionReaper,
    schedule: Schedule,
}

impl CleanTrigger {
    pub fn new(reaper: RetentionReaper, schedule: Schedule) -> Self {
        Self { reaper, schedule }
    }
}

#[async_trait::async_trait]
impl Trigger for CleanTrigger {
    fn name(&self) -> &str {
        "clean"
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn fire(&self) {
        self.reaper.clean().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewReading, StagingStore, StorageBuilder};
    use crate::trigger::TriggerRegistry;
    use std::time::Duration;

    #[tokio::test]
    async fn test_clean_trigger_fires_reaper() {
        let store: Arc<dyn StagingStore> =
            Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap());
        store
            .insert(
                NewReading::new("a", "p", "u", "old")
                    .with_created_at(chrono::Utc::now() - chrono::Duration::hours(2)),
            )
            .await
            .unwrap();

        let trigger = CleanTrigger::new(
            RetentionReaper::new(Arc::clone(&store), 60),
            Schedule::interval(Duration::from_secs(3600)),
        );
        assert_eq!(trigger.name(), "clean");
        trigger.fire().await;
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_triggers_register_under_their_names() {
        let store: Arc<dyn StagingStore> =
            Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap());
        let registry = TriggerRegistry::new().await.unwrap();
        registry
            .spawn(CleanTrigger::new(
                RetentionReaper::new(store, 1440),
                Schedule::cron("0 0 3 * * *").unwrap(),
            ))
            .await
            .unwrap();

        let jobs = registry.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "clean");
        assert_eq!(jobs[0].schedule, "cron: 0 0 3 * * *");
        registry.shutdown().await.unwrap();
    }
}
