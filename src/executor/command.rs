//! Per-command execution protocol.

use thiserror::Error;
use tracing::{debug, warn};

use super::{Outcome, OutcomeState};
use crate::device::{AttributeSetting, AttributeValue, DeviceError, DeviceHandle};
use crate::instrument::Command;

/// Failure while applying attribute settings.
#[derive(Debug, Error)]
pub enum AttributeVerifyError {
    #[error("device refused attribute '{0}'")]
    Refused(String),

    #[error("attribute '{name}' read back {actual}, expected {expected}")]
    Mismatch {
        name: String,
        expected: AttributeValue,
        actual: AttributeValue,
    },

    #[error("attribute '{name}': {source}")]
    Device {
        name: String,
        #[source]
        source: DeviceError,
    },
}

/// Set each attribute and read it back, stopping at the first mismatch.
pub async fn apply_attributes(
    device: &mut dyn DeviceHandle,
    settings: &[AttributeSetting],
) -> Result<(), AttributeVerifyError> {
    for setting in settings {
        let device_err = |source: DeviceError| AttributeVerifyError::Device {
            name: setting.name.clone(),
            source,
        };

        let accepted = device
            .set_attribute(&setting.name, &setting.value)
            .await
            .map_err(device_err)?;
        if !accepted {
            return Err(AttributeVerifyError::Refused(setting.name.clone()));
        }

        let actual = device
            .get_attribute(&setting.name)
            .await
            .map_err(device_err)?;
        if !setting.value.matches(&actual) {
            return Err(AttributeVerifyError::Mismatch {
                name: setting.name.clone(),
                expected: setting.value.clone(),
                actual,
            });
        }
    }
    Ok(())
}

/// Runs commands against an open handle.
///
/// Never returns an error: every failure is classified into the returned
/// [`Outcome`]. A lock taken for a command is released on every exit path.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, device: &mut dyn DeviceHandle, command: &Command) -> Outcome {
        let resource = device.resource().to_string();
        let label = command.label();
        debug!(
            resource = %resource,
            command = %label,
            method = %command.method,
            lock = %command.lock,
            "Executing command"
        );

        if let Err(e) = apply_attributes(device, &command.attributes).await {
            warn!(resource = %resource, command = %label, error = %e, "Attribute override failed");
            return Outcome::failure(OutcomeState::AttributeVerifyError);
        }

        let locked = command.lock.is_locking();
        if locked {
            if let Err(e) = device.lock(command.lock).await {
                warn!(resource = %resource, command = %label, error = %e, "Failed to acquire lock");
                return Outcome::failure(OutcomeState::LockError);
            }
        }

        let op = command.method.op();
        let outcome = match op.perform(device, command).await {
            Ok(result) => Outcome::success(result),
            Err(e) => {
                let state = op.classify(&e);
                warn!(
                    resource = %resource,
                    command = %label,
                    state = %state,
                    error = %e,
                    "Command failed"
                );
                Outcome::failure(state)
            }
        };

        if locked {
            if let Err(e) = device.unlock().await {
                warn!(resource = %resource, command = %label, error = %e, "Failed to release lock");
                return Outcome {
                    state: OutcomeState::UnlockError,
                    result: outcome.result,
                };
            }
        }

        outcome
    }
}
