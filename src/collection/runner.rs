//! Task runner with whole-task retry.
//!
//! An attempt executes the task's enabled commands in sequence order on a
//! freshly opened device. Any non-success outcome discards the attempt; the
//! next attempt starts again from the first command. At most `retries + 1`
//! attempts run, and a successful attempt stages exactly one reading.
//!
//! Write commands are re-issued on retry. Commands carry no idempotency key,
//! so a retried sequence may repeat side effects on the device.

use std::sync::Arc;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{BackendRegistry, DeviceGate, DeviceHandle, OpenOptions};
use crate::executor::{CommandExecutor, OutcomeState, apply_attributes};
use crate::instrument::{Command, Instrument, Task};
use crate::storage::{NewReading, StagingStore, StorageError};

/// Terminal state of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    ExhaustedRetries,
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("task has no enabled commands")]
    NoEnabledCommands,

    #[error("{state}: {reason}")]
    Instrument { state: OutcomeState, reason: String },

    #[error("command {command} finished with {state}")]
    Command { command: String, state: OutcomeState },

    #[error("failed to stage reading: {0}")]
    Staging(#[from] StorageError),
}

impl AttemptFailure {
    /// Outcome state behind the failure, if it came from the device.
    pub fn state(&self) -> Option<OutcomeState> {
        match self {
            Self::Instrument { state, .. } | Self::Command { state, .. } => Some(*state),
            _ => None,
        }
    }
}

/// Result of running one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub instrument_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    /// Attempts actually executed.
    pub attempts: u32,
    /// Id of the staged reading on success.
    pub reading_id: Option<i64>,
    /// Outcome state of the last failed attempt, if any.
    pub last_failure: Option<OutcomeState>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Runs tasks against devices and stages their readings.
pub struct TaskRunner {
    backends: Arc<BackendRegistry>,
    gate: DeviceGate,
    store: Arc<dyn StagingStore>,
    executor: CommandExecutor,
    open_options: OpenOptions,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("backends", &self.backends)
            .field("open_options", &self.open_options)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    pub fn new(backends: Arc<BackendRegistry>, store: Arc<dyn StagingStore>) -> Self {
        Self {
            backends,
            gate: DeviceGate::new(),
            store,
            executor: CommandExecutor::new(),
            open_options: OpenOptions::default(),
        }
    }

    /// Share a device gate with other runners in the process.
    pub fn with_gate(mut self, gate: DeviceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_open_options(mut self, options: OpenOptions) -> Self {
        self.open_options = options;
        self
    }

    /// Run `task` of `instrument` until it succeeds or its budget is spent.
    ///
    /// Never fails: every error is logged and reflected in the report.
    pub async fn run(&self, instrument: &Instrument, task: &Task) -> TaskReport {
        let budget = task.attempt_budget();
        let mut last_failure = None;

        for attempt in 1..=budget {
            debug!(
                instrument = %instrument.id,
                task = %task.id,
                attempt,
                budget,
                "Starting task attempt"
            );

            match self.attempt(instrument, task).await {
                Ok(reading_id) => {
                    info!(
                        instrument = %instrument.id,
                        task = %task.id,
                        attempt,
                        reading_id,
                        "Task succeeded"
                    );
                    return TaskReport {
                        instrument_id: instrument.id.clone(),
                        task_id: task.id.clone(),
                        status: TaskStatus::Succeeded,
                        attempts: attempt,
                        reading_id: Some(reading_id),
                        last_failure: None,
                    };
                }
                Err(failure) => {
                    warn!(
                        instrument = %instrument.id,
                        task = %task.id,
                        attempt,
                        budget,
                        error = %failure,
                        "Task attempt failed"
                    );
                    last_failure = failure.state();
                }
            }
        }

        warn!(
            instrument = %instrument.id,
            task = %task.id,
            attempts = budget,
            "Task exhausted retries"
        );
        TaskReport {
            instrument_id: instrument.id.clone(),
            task_id: task.id.clone(),
            status: TaskStatus::ExhaustedRetries,
            attempts: budget,
            reading_id: None,
            last_failure,
        }
    }

    /// One full-sequence execution. Returns the staged reading id.
    async fn attempt(&self, instrument: &Instrument, task: &Task) -> Result<i64, AttemptFailure> {
        let commands = task.enabled_commands();
        if commands.is_empty() {
            return Err(AttemptFailure::NoEnabledCommands);
        }

        let content = {
            let _slot = self.gate.acquire(&instrument.resource).await;

            let backend = self.backends.get(&instrument.backend).ok_or_else(|| {
                AttemptFailure::Instrument {
                    state: OutcomeState::NoBackendError,
                    reason: format!("no backend registered as '{}'", instrument.backend),
                }
            })?;

            let mut device = backend
                .open(&instrument.resource, &self.open_options)
                .await
                .map_err(|e| AttemptFailure::Instrument {
                    state: OutcomeState::OpenInstrumentError,
                    reason: e.to_string(),
                })?;

            let result = self
                .run_commands(device.as_mut(), instrument, &commands)
                .await;

            if let Err(e) = device.close().await {
                warn!(instrument = %instrument.id, error = %e, "Failed to close device");
            }
            result?
        };

        let reading = NewReading::new(&instrument.id, &task.parameter, &task.user, content);
        Ok(self.store.insert(reading).await?)
    }

    /// Verify instrument attributes, then run commands in order.
    ///
    /// Returns the last command's result.
    async fn run_commands(
        &self,
        device: &mut dyn DeviceHandle,
        instrument: &Instrument,
        commands: &[&Command],
    ) -> Result<String, AttemptFailure> {
        apply_attributes(device, &instrument.attributes)
            .await
            .map_err(|e| AttemptFailure::Instrument {
                state: OutcomeState::AttributeVerifyError,
                reason: e.to_string(),
            })?;

        let mut last = String::new();
        for command in commands {
            let outcome = self.executor.execute(device, command).await;
            if !outcome.is_success() {
                return Err(AttemptFailure::Command {
                    command: command.label(),
                    state: outcome.state,
                });
            }
            last = outcome.result;
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AttributeSetting;
    use crate::device::sim::{SimBackend, SimOp};
    use crate::executor::Method;
    use crate::storage::StorageBuilder;

    const RESOURCE: &str = "ASRL1::INSTR";

    struct Fixture {
        sim: SimBackend,
        store: Arc<dyn StagingStore>,
        runner: TaskRunner,
    }

    async fn fixture() -> Fixture {
        let sim = SimBackend::new();
        let mut backends = BackendRegistry::new();
        backends.register(sim.clone());
        let store: Arc<dyn StagingStore> =
            Arc::new(StorageBuilder::new("sqlite::memory:").build().await.unwrap());
        let runner = TaskRunner::new(Arc::new(backends), Arc::clone(&store));
        Fixture { sim, store, runner }
    }

    fn two_step_task(retries: u32) -> Task {
        Task::new("temp", "temperature")
            .with_user("lab")
            .with_retries(retries)
            .with_command(Command::new(1, Method::Write).with_message("CONF:TEMP"))
            .with_command(Command::new(2, Method::Query).with_message("TEMP?"))
    }

    #[tokio::test]
    async fn test_all_attempts_fail_exhausts_budget() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        device.fail_always(SimOp::Query);

        let instrument = Instrument::new("thermo-1", RESOURCE);
        let report = f.runner.run(&instrument, &two_step_task(3)).await;

        assert_eq!(report.status, TaskStatus::ExhaustedRetries);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.last_failure, Some(OutcomeState::QueryError));
        assert_eq!(device.count(SimOp::Open), 4);
        assert_eq!(device.count(SimOp::Write), 4);
        assert_eq!(device.count(SimOp::Close), 4);
        assert_eq!(f.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_success_after_failures_stages_one_reading() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        device.respond_to("TEMP?", "21.5");
        device.fail_next(SimOp::Query, 2);

        let instrument = Instrument::new("thermo-1", RESOURCE);
        let report = f.runner.run(&instrument, &two_step_task(3)).await;

        assert!(report.succeeded());
        assert_eq!(report.attempts, 3);
        assert_eq!(device.count(SimOp::Write), 3);

        let staged = f.store.list_for_instrument("thermo-1").await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].content, "21.5");
        assert_eq!(staged[0].parameter, "temperature");
        assert_eq!(staged[0].user, "lab");
        assert_eq!(Some(staged[0].id), report.reading_id);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        device.fail_next(SimOp::Write, 1);

        let instrument = Instrument::new("thermo-1", RESOURCE);
        let report = f.runner.run(&instrument, &two_step_task(0)).await;

        assert_eq!(report.status, TaskStatus::ExhaustedRetries);
        assert_eq!(report.attempts, 1);
        assert_eq!(device.count(SimOp::Query), 0);
    }

    #[tokio::test]
    async fn test_no_enabled_commands_consumes_budget() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        let task = Task::new("idle", "temperature")
            .with_retries(2)
            .with_command(Command::new(1, Method::Read).with_enabled(false));

        let instrument = Instrument::new("thermo-1", RESOURCE);
        let report = f.runner.run(&instrument, &task).await;

        assert_eq!(report.status, TaskStatus::ExhaustedRetries);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.last_failure, None);
        assert_eq!(device.count(SimOp::Open), 0);
        assert_eq!(f.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commands_run_in_sequence_order() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        let task = Task::new("raw", "pressure")
            .with_command(Command::new(2, Method::ReadRaw).with_size(2))
            .with_command(Command::new(1, Method::WriteRaw).with_message("c0ffee"));

        let instrument = Instrument::new("gauge", RESOURCE);
        let report = f.runner.run(&instrument, &task).await;

        assert!(report.succeeded());
        let staged = f.store.list_for_instrument("gauge").await.unwrap();
        assert_eq!(staged[0].content, "c0ff");
        assert_eq!(device.count(SimOp::ReadRaw), 1);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let f = fixture().await;
        let instrument = Instrument::new("thermo-1", RESOURCE).with_backend("visa");
        let report = f.runner.run(&instrument, &two_step_task(1)).await;

        assert_eq!(report.status, TaskStatus::ExhaustedRetries);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.last_failure, Some(OutcomeState::NoBackendError));
    }

    #[tokio::test]
    async fn test_open_failure_is_retried() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        device.fail_next(SimOp::Open, 1);

        let instrument = Instrument::new("thermo-1", RESOURCE);
        let report = f.runner.run(&instrument, &two_step_task(1)).await;

        assert!(report.succeeded());
        assert_eq!(report.attempts, 2);
        assert_eq!(device.count(SimOp::Open), 2);
    }

    #[tokio::test]
    async fn test_instrument_attribute_mismatch_fails_attempt() {
        let f = fixture().await;
        let device = f.sim.device(RESOURCE);
        device.pin_attribute("baud_rate", 4800_i64);

        let instrument = Instrument::new("thermo-1", RESOURCE)
            .with_attribute(AttributeSetting::new("baud_rate", 9600_i64));
        let report = f.runner.run(&instrument, &two_step_task(0)).await;

        assert_eq!(report.last_failure, Some(OutcomeState::AttributeVerifyError));
        assert_eq!(device.count(SimOp::Write), 0);
        assert_eq!(device.count(SimOp::Close), 1);
    }
}
