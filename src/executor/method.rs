//! Device methods and the enum-keyed operation registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use super::OutcomeState;
use super::codec::{decode_hex, encode_hex};
use crate::device::{DeviceError, DeviceHandle};
use crate::instrument::Command;

/// Device operation performed by a command.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    Query,
    QueryRaw,
    Write,
    WriteRaw,
    Read,
    ReadRaw,
    #[serde(alias = "get_visa_attribute")]
    #[strum(to_string = "get_attribute", serialize = "get_visa_attribute")]
    GetAttribute,
}

impl Method {
    /// Resolve the operation implementing this method.
    pub fn op(self) -> &'static dyn MethodOp {
        match self {
            Self::Query => &QueryOp,
            Self::QueryRaw => &QueryRawOp,
            Self::Write => &WriteOp,
            Self::WriteRaw => &WriteRawOp,
            Self::Read => &ReadOp,
            Self::ReadRaw => &ReadRawOp,
            Self::GetAttribute => &GetAttributeOp,
        }
    }
}

/// One device operation variant.
#[async_trait]
pub trait MethodOp: Send + Sync {
    /// Error kind reported when the device operation fails.
    fn error_state(&self) -> OutcomeState;

    /// Map a device error to an outcome state.
    fn classify(&self, _error: &DeviceError) -> OutcomeState {
        self.error_state()
    }

    /// Run the operation and return its textual result.
    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError>;
}

struct QueryOp;

#[async_trait]
impl MethodOp for QueryOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::QueryError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        device.query(&command.message, command.delay).await
    }
}

struct QueryRawOp;

#[async_trait]
impl MethodOp for QueryRawOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::QueryError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        let bytes = decode_hex(&command.message)?;
        device.write_raw(&bytes).await?;
        if !command.delay.is_zero() {
            tokio::time::sleep(command.delay).await;
        }
        let response = device.read_raw(Some(command.size)).await?;
        Ok(encode_hex(&response))
    }
}

struct WriteOp;

#[async_trait]
impl MethodOp for WriteOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::WriteError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        let written = device
            .write(&command.message, &command.termination, &command.encoding)
            .await?;
        Ok(written.to_string())
    }
}

struct WriteRawOp;

#[async_trait]
impl MethodOp for WriteRawOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::WriteError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        let bytes = decode_hex(&command.message)?;
        let written = device.write_raw(&bytes).await?;
        Ok(written.to_string())
    }
}

struct ReadOp;

#[async_trait]
impl MethodOp for ReadOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::ReadError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        device.read(&command.termination, &command.encoding).await
    }
}

struct ReadRawOp;

#[async_trait]
impl MethodOp for ReadRawOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::ReadError
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        let bytes = device.read_raw(Some(command.size)).await?;
        Ok(encode_hex(&bytes))
    }
}

struct GetAttributeOp;

#[async_trait]
impl MethodOp for GetAttributeOp {
    fn error_state(&self) -> OutcomeState {
        OutcomeState::GetAttributeError
    }

    fn classify(&self, error: &DeviceError) -> OutcomeState {
        match error {
            DeviceError::AttributeNotFound(_) => OutcomeState::AttributeNotFoundError,
            _ => self.error_state(),
        }
    }

    async fn perform(
        &self,
        device: &mut dyn DeviceHandle,
        command: &Command,
    ) -> Result<String, DeviceError> {
        let name = command.name.as_deref().unwrap_or_default();
        let value = device.get_attribute(name).await?;
        Ok(value.to_string())
    }
}
