//! Simulated in-process device backend.
//!
//! Each resource id maps to one [`SimDevice`] whose state outlives the
//! handles opened on it. Writes are echoed back by reads, queries answer with
//! a configured response (or echo the query), and attributes live in a map.
//!
//! Tests use the [`SimDevice`] controller to inject failures per operation,
//! pin an attribute's read-back value and inspect the recorded call log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{AttributeValue, DeviceBackend, DeviceError, DeviceHandle, LockMode, OpenOptions};

/// Backend identifier of the simulated backend.
pub const SIM_BACKEND: &str = "sim";

/// Operation kinds that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Open,
    SetAttribute,
    GetAttribute,
    Lock,
    Unlock,
    WriteRaw,
    ReadRaw,
    Write,
    Read,
    Query,
    Close,
}

/// One recorded call on a simulated device.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Open,
    SetAttribute(String, AttributeValue),
    GetAttribute(String),
    Lock(LockMode),
    Unlock,
    WriteRaw(Vec<u8>),
    ReadRaw(Option<usize>),
    Write(String),
    Read,
    Query(String),
    Close,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Times(u32),
    Always,
}

#[derive(Debug, Default)]
struct DeviceState {
    attributes: HashMap<String, AttributeValue>,
    pinned: HashMap<String, AttributeValue>,
    responses: HashMap<String, String>,
    last_written: Vec<u8>,
    failures: HashMap<SimOp, Failure>,
    calls: Vec<SimCall>,
    locked: bool,
}

impl DeviceState {
    /// Record a call and consume a pending injected failure, if any.
    fn enter(&mut self, op: SimOp, call: SimCall) -> bool {
        self.calls.push(call);
        match self.failures.get_mut(&op) {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Controller and shared state of one simulated resource.
#[derive(Debug, Clone)]
pub struct SimDevice {
    resource: String,
    state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Make the next `n` calls of `op` fail.
    pub fn fail_next(&self, op: SimOp, n: u32) -> &Self {
        self.state().failures.insert(op, Failure::Times(n));
        self
    }

    /// Make every call of `op` fail until cleared.
    pub fn fail_always(&self, op: SimOp) -> &Self {
        self.state().failures.insert(op, Failure::Always);
        self
    }

    pub fn clear_failures(&self) -> &Self {
        self.state().failures.clear();
        self
    }

    /// Force the read-back value of an attribute regardless of what is set.
    pub fn pin_attribute(&self, name: impl Into<String>, value: impl Into<AttributeValue>) -> &Self {
        self.state().pinned.insert(name.into(), value.into());
        self
    }

    /// Preset an attribute value, as if the device reported it natively.
    pub fn set_native_attribute(
        &self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> &Self {
        self.state().attributes.insert(name.into(), value.into());
        self
    }

    /// Answer `query` with `response`.
    pub fn respond_to(&self, query: impl Into<String>, response: impl Into<String>) -> &Self {
        self.state().responses.insert(query.into(), response.into());
        self
    }

    /// Preload the bytes returned by the next raw read.
    pub fn load_read_buffer(&self, bytes: impl Into<Vec<u8>>) -> &Self {
        self.state().last_written = bytes.into();
        self
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: SimOp) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call_op(call) == op)
            .count()
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.state().attributes.get(name).cloned()
    }
}

fn call_op(call: &SimCall) -> SimOp {
    match call {
        SimCall::Open => SimOp::Open,
        SimCall::SetAttribute(..) => SimOp::SetAttribute,
        SimCall::GetAttribute(_) => SimOp::GetAttribute,
        SimCall::Lock(_) => SimOp::Lock,
        SimCall::Unlock => SimOp::Unlock,
        SimCall::WriteRaw(_) => SimOp::WriteRaw,
        SimCall::ReadRaw(_) => SimOp::ReadRaw,
        SimCall::Write(_) => SimOp::Write,
        SimCall::Read => SimOp::Read,
        SimCall::Query(_) => SimOp::Query,
        SimCall::Close => SimOp::Close,
    }
}

fn injected(op: SimOp) -> DeviceError {
    DeviceError::Io(format!("injected {op:?} failure"))
}

/// Simulated backend registered as `sim`.
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    devices: Arc<Mutex<HashMap<String, SimDevice>>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller for `resource`, created on first use.
    pub fn device(&self, resource: &str) -> SimDevice {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices
            .entry(resource.to_string())
            .or_insert_with(|| SimDevice::new(resource))
            .clone()
    }
}

#[async_trait::async_trait]
impl DeviceBackend for SimBackend {
    fn name(&self) -> &str {
        SIM_BACKEND
    }

    async fn open(
        &self,
        resource: &str,
        options: &OpenOptions,
    ) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let device = self.device(resource);
        if device.state().enter(SimOp::Open, SimCall::Open) {
            return Err(DeviceError::Open {
                resource: resource.to_string(),
                reason: "injected open failure".to_string(),
            });
        }
        tracing::trace!(resource, timeout = ?options.timeout, "Simulated device opened");
        Ok(Box::new(SimHandle {
            device,
            closed: false,
        }))
    }
}

/// Open handle on a [`SimDevice`].
#[derive(Debug)]
pub struct SimHandle {
    device: SimDevice,
    closed: bool,
}

impl SimHandle {
    fn guard(&self) -> Result<MutexGuard<'_, DeviceState>, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        Ok(self.device.state())
    }
}

#[async_trait::async_trait]
impl DeviceHandle for SimHandle {
    fn resource(&self) -> &str {
        self.device.resource()
    }

    async fn set_attribute(
        &mut self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<bool, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(
            SimOp::SetAttribute,
            SimCall::SetAttribute(name.to_string(), value.clone()),
        ) {
            return Ok(false);
        }
        state.attributes.insert(name.to_string(), value.clone());
        Ok(true)
    }

    async fn get_attribute(&mut self, name: &str) -> Result<AttributeValue, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::GetAttribute, SimCall::GetAttribute(name.to_string())) {
            return Err(injected(SimOp::GetAttribute));
        }
        state
            .pinned
            .get(name)
            .or_else(|| state.attributes.get(name))
            .cloned()
            .ok_or_else(|| DeviceError::AttributeNotFound(name.to_string()))
    }

    async fn lock(&mut self, mode: LockMode) -> Result<(), DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::Lock, SimCall::Lock(mode)) {
            return Err(DeviceError::Lock("injected lock failure".to_string()));
        }
        state.locked = true;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::Unlock, SimCall::Unlock) {
            return Err(DeviceError::Lock("injected unlock failure".to_string()));
        }
        state.locked = false;
        Ok(())
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<usize, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::WriteRaw, SimCall::WriteRaw(bytes.to_vec())) {
            return Err(injected(SimOp::WriteRaw));
        }
        state.last_written = bytes.to_vec();
        Ok(bytes.len())
    }

    async fn read_raw(&mut self, size: Option<usize>) -> Result<Vec<u8>, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::ReadRaw, SimCall::ReadRaw(size)) {
            return Err(injected(SimOp::ReadRaw));
        }
        let mut bytes = state.last_written.clone();
        if let Some(size) = size {
            bytes.truncate(size);
        }
        Ok(bytes)
    }

    async fn write(
        &mut self,
        text: &str,
        termination: &str,
        encoding: &str,
    ) -> Result<usize, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::Write, SimCall::Write(text.to_string())) {
            return Err(injected(SimOp::Write));
        }
        if encoding.eq_ignore_ascii_case("ascii") && !text.is_ascii() {
            return Err(DeviceError::Encoding(format!(
                "message is not representable in {encoding}"
            )));
        }
        let mut bytes = text.as_bytes().to_vec();
        bytes.extend_from_slice(termination.as_bytes());
        let written = bytes.len();
        state.last_written = bytes;
        Ok(written)
    }

    async fn read(&mut self, termination: &str, _encoding: &str) -> Result<String, DeviceError> {
        let mut state = self.guard()?;
        if state.enter(SimOp::Read, SimCall::Read) {
            return Err(injected(SimOp::Read));
        }
        let text = String::from_utf8_lossy(&state.last_written).into_owned();
        Ok(text
            .strip_suffix(termination)
            .map(str::to_string)
            .unwrap_or(text))
    }

    async fn query(&mut self, text: &str, delay: Duration) -> Result<String, DeviceError> {
        let response = {
            let mut state = self.guard()?;
            if state.enter(SimOp::Query, SimCall::Query(text.to_string())) {
                return Err(injected(SimOp::Query));
            }
            state
                .responses
                .get(text)
                .cloned()
                .unwrap_or_else(|| text.to_string())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        let failed = self.guard()?.enter(SimOp::Close, SimCall::Close);
        self.closed = true;
        if failed {
            return Err(injected(SimOp::Close));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_echoes() {
        let backend = SimBackend::new();
        let mut handle = backend
            .open("ASRL1::INSTR", &OpenOptions::default())
            .await
            .unwrap();

        handle.write("MEAS?", "\r\n", "ascii").await.unwrap();
        assert_eq!(handle.read("\r\n", "ascii").await.unwrap(), "MEAS?");

        handle.write_raw(&[0x01, 0x02, 0x03]).await.unwrap();
        assert_eq!(handle.read_raw(Some(2)).await.unwrap(), vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let backend = SimBackend::new();
        let device = backend.device("ASRL1::INSTR");
        device.fail_next(SimOp::Query, 1);

        let mut handle = backend
            .open("ASRL1::INSTR", &OpenOptions::default())
            .await
            .unwrap();
        assert!(handle.query("*IDN?", Duration::ZERO).await.is_err());
        assert_eq!(handle.query("*IDN?", Duration::ZERO).await.unwrap(), "*IDN?");
        assert_eq!(device.count(SimOp::Query), 2);
    }

    #[tokio::test]
    async fn test_pinned_attribute_overrides_read_back() {
        let backend = SimBackend::new();
        let device = backend.device("ASRL1::INSTR");
        device.pin_attribute("baud_rate", 4800_i64);

        let mut handle = backend
            .open("ASRL1::INSTR", &OpenOptions::default())
            .await
            .unwrap();
        assert!(handle.set_attribute("baud_rate", &AttributeValue::Int(9600)).await.unwrap());
        assert_eq!(
            handle.get_attribute("baud_rate").await.unwrap(),
            AttributeValue::Int(4800)
        );
        assert!(matches!(
            handle.get_attribute("parity").await,
            Err(DeviceError::AttributeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_io() {
        let backend = SimBackend::new();
        let mut handle = backend
            .open("ASRL1::INSTR", &OpenOptions::default())
            .await
            .unwrap();
        handle.close().await.unwrap();
        assert!(matches!(
            handle.write_raw(&[0x00]).await,
            Err(DeviceError::Closed)
        ));
    }
}
