//! Core device capability traits and types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::{AttributeValue, DeviceError};

/// Default connection-level timeout applied when a device is opened.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Cooperative device-level lock held for the duration of one operation.
///
/// Also accepts the legacy names `lock`, `lock_context` and `lock_excl`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LockMode {
    #[default]
    #[serde(alias = "")]
    #[strum(to_string = "none", serialize = "")]
    None,
    #[serde(alias = "lock")]
    #[strum(to_string = "shared", serialize = "lock")]
    Shared,
    #[serde(alias = "lock_context")]
    #[strum(to_string = "context", serialize = "lock_context")]
    Context,
    #[serde(alias = "lock_excl")]
    #[strum(to_string = "exclusive", serialize = "lock_excl")]
    Exclusive,
}

impl LockMode {
    /// Whether this mode requires acquiring a lock at all.
    pub fn is_locking(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Options passed to [`DeviceBackend::open`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Connection-level timeout for every I/O on the handle.
    pub timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// A driver able to open device handles for resource identifiers.
#[async_trait::async_trait]
pub trait DeviceBackend: Send + Sync + 'static {
    /// Backend identifier referenced by instrument configuration.
    fn name(&self) -> &str;

    /// Open a handle to the given resource.
    async fn open(
        &self,
        resource: &str,
        options: &OpenOptions,
    ) -> Result<Box<dyn DeviceHandle>, DeviceError>;
}

/// An open connection to one instrument.
///
/// Handles are used by exactly one task execution at a time; exclusivity
/// across executions is enforced by [`super::DeviceGate`].
#[async_trait::async_trait]
pub trait DeviceHandle: Send {
    /// Resource identifier this handle is connected to.
    fn resource(&self) -> &str;

    /// Set an attribute. Returns `false` if the device refused the value.
    async fn set_attribute(
        &mut self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<bool, DeviceError>;

    /// Read an attribute.
    async fn get_attribute(&mut self, name: &str) -> Result<AttributeValue, DeviceError>;

    async fn lock(&mut self, mode: LockMode) -> Result<(), DeviceError>;

    async fn unlock(&mut self) -> Result<(), DeviceError>;

    /// Write raw bytes. Returns the number of bytes written.
    async fn write_raw(&mut self, bytes: &[u8]) -> Result<usize, DeviceError>;

    /// Read raw bytes, at most `size` when given.
    async fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>, DeviceError>;

    /// Write a terminated, encoded string. Returns the number of bytes written.
    async fn write(
        &mut self,
        text: &str,
        termination: &str,
        encoding: &str,
    ) -> Result<usize, DeviceError>;

    /// Read a terminated, encoded string.
    async fn read(&mut self, termination: &str, encoding: &str) -> Result<String, DeviceError>;

    /// Write then read in one round trip, waiting `delay` in between.
    async fn query(&mut self, text: &str, delay: Duration) -> Result<String, DeviceError>;

    async fn close(&mut self) -> Result<(), DeviceError>;
}
