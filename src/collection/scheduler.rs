//! Collection scheduler: entry point of the `collect` trigger.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{TaskReport, TaskRunner};
use crate::instrument::Instrument;

/// Aggregate counts of one collection cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionSummary {
    pub instruments: usize,
    pub tasks: usize,
    pub succeeded: usize,
    pub exhausted: usize,
    /// Per-task reports in instrument order, then task order.
    pub reports: Vec<TaskReport>,
}

impl CollectionSummary {
    fn push(&mut self, report: TaskReport) {
        self.tasks += 1;
        if report.succeeded() {
            self.succeeded += 1;
        } else {
            self.exhausted += 1;
        }
        self.reports.push(report);
    }
}

/// Runs every collectable task of every active instrument.
#[derive(Debug, Clone)]
pub struct CollectionScheduler {
    runner: Arc<TaskRunner>,
    instruments: Arc<Vec<Instrument>>,
    concurrency: usize,
}

impl CollectionScheduler {
    pub fn new(runner: Arc<TaskRunner>, instruments: Vec<Instrument>) -> Self {
        Self {
            runner,
            instruments: Arc::new(instruments),
            concurrency: 1,
        }
    }

    /// Number of instruments collected in parallel (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Run one collection cycle.
    ///
    /// Tasks of one instrument always run sequentially. Failures are
    /// reported in the summary and never abort the cycle.
    pub async fn collect(&self) -> CollectionSummary {
        let selected: Vec<usize> = self
            .instruments
            .iter()
            .enumerate()
            .filter(|(_, instrument)| instrument.is_collectable())
            .map(|(index, _)| index)
            .collect();

        let mut summary = CollectionSummary {
            instruments: selected.len(),
            ..Default::default()
        };

        if selected.is_empty() {
            info!("No collectable instruments");
            return summary;
        }

        let per_instrument = if self.concurrency <= 1 {
            let mut results = Vec::with_capacity(selected.len());
            for index in selected {
                results.push(collect_instrument(&self.runner, &self.instruments[index]).await);
            }
            results
        } else {
            self.collect_parallel(selected).await
        };

        for report in per_instrument.into_iter().flatten() {
            summary.push(report);
        }

        info!(
            instruments = summary.instruments,
            tasks = summary.tasks,
            succeeded = summary.succeeded,
            exhausted = summary.exhausted,
            "Collection cycle finished"
        );
        summary
    }

    async fn collect_parallel(&self, selected: Vec<usize>) -> Vec<Vec<TaskReport>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (slot, index) in selected.iter().copied().enumerate() {
            let runner = Arc::clone(&self.runner);
            let instruments = Arc::clone(&self.instruments);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (slot, collect_instrument(&runner, &instruments[index]).await)
            });
        }

        let mut results: Vec<Vec<TaskReport>> = vec![Vec::new(); selected.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, reports)) => results[slot] = reports,
                Err(e) => error!(error = %e, "Instrument collection task panicked"),
            }
        }
        results
    }
}

async fn collect_instrument(runner: &TaskRunner, instrument: &Instrument) -> Vec<TaskReport> {
    let mut reports = Vec::new();
    for task in instrument.collectable_tasks() {
        reports.push(runner.run(instrument, task).await);
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BackendRegistry;
    use crate::device::sim::{SimBackend, SimOp};
    use crate::executor::Method;
    use crate::instrument::{Command, Task};
    use crate::storage::{StagingStore, StorageBuilder};

    async fn scheduler(
        instruments: Vec<Instrument>,
    ) -> (SimBackend, Arc<dyn StagingStore>, CollectionScheduler) {
        let sim = SimBackend::new();
        let mut backends = BackendRegistry::new();
        backends.register(sim.clone());
        let store: Arc<dyn StagingStore> =
            Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap());
        let runner = Arc::new(TaskRunner::new(Arc::new(backends), Arc::clone(&store)));
        (sim, store, CollectionScheduler::new(runner, instruments))
    }

    fn query_task(id: &str, message: &str) -> Task {
        Task::new(id, id).with_command(Command::new(1, Method::Query).with_message(message))
    }

    fn fleet() -> Vec<Instrument> {
        vec![
            Instrument::new("a", "ASRL1::INSTR")
                .with_task(query_task("t1", "A1?"))
                .with_task(query_task("t2", "A2?").with_active(false))
                .with_task(Task::new("empty", "none")),
            Instrument::new("b", "ASRL2::INSTR")
                .with_active(false)
                .with_task(query_task("t1", "B1?")),
            Instrument::new("c", "ASRL3::INSTR")
                .with_task(query_task("t1", "C1?"))
                .with_task(query_task("t2", "C2?")),
        ]
    }

    #[tokio::test]
    async fn test_selects_active_instruments_and_tasks_in_order() {
        let (sim, store, scheduler) = scheduler(fleet()).await;
        let summary = scheduler.collect().await;

        assert_eq!(summary.instruments, 2);
        assert_eq!(summary.tasks, 3);
        assert_eq!(summary.succeeded, 3);
        let order: Vec<_> = summary
            .reports
            .iter()
            .map(|r| format!("{}/{}", r.instrument_id, r.task_id))
            .collect();
        assert_eq!(order, vec!["a/t1", "c/t1", "c/t2"]);

        assert_eq!(sim.device("ASRL2::INSTR").count(SimOp::Open), 0);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failing_task_does_not_stop_cycle() {
        let (sim, store, scheduler) = scheduler(fleet()).await;
        sim.device("ASRL1::INSTR").fail_always(SimOp::Query);

        let summary = scheduler.collect().await;
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(store.instrument_ids().await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_parallel_collection_keeps_report_order() {
        let (_sim, store, scheduler) = scheduler(fleet()).await;
        let summary = scheduler.with_concurrency(4).collect().await;

        let order: Vec<_> = summary
            .reports
            .iter()
            .map(|r| format!("{}/{}", r.instrument_id, r.task_id))
            .collect();
        assert_eq!(order, vec!["a/t1", "c/t1", "c/t2"]);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_nothing_to_collect() {
        let (_sim, store, scheduler) = scheduler(vec![Instrument::new("x", "r")]).await;
        let summary = scheduler.collect().await;
        assert_eq!(summary.instruments, 0);
        assert_eq!(summary.tasks, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
