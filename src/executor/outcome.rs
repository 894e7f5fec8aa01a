//! Command outcome classification.

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Classification of a command execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OutcomeState {
    Success,
    LockError,
    UnlockError,
    WriteError,
    ReadError,
    QueryError,
    AttributeNotFoundError,
    GetAttributeError,
    AttributeVerifyError,
    OpenInstrumentError,
    NoBackendError,
}

impl OutcomeState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of executing one command.
///
/// `result` is the textual data produced by a successful method (empty for
/// failures unless the method succeeded and only the unlock failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub state: OutcomeState,
    pub result: String,
}

impl Outcome {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            state: OutcomeState::Success,
            result: result.into(),
        }
    }

    pub fn failure(state: OutcomeState) -> Self {
        Self {
            state,
            result: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}
