//! Instrument, task and command definitions.
//!
//! These are read-only inputs to collection. They are usually loaded from the
//! YAML configuration (see [`crate::config`]) but can be built in code.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{AttributeSetting, LockMode, sim::SIM_BACKEND};
use crate::executor::Method;

/// Default byte budget for raw reads.
pub const DEFAULT_READ_SIZE: usize = 20_480;

/// Default line termination for text I/O.
pub const DEFAULT_TERMINATION: &str = "\r\n";

/// Default text encoding.
pub const DEFAULT_ENCODING: &str = "ascii";

fn default_true() -> bool {
    true
}

fn default_backend() -> String {
    SIM_BACKEND.to_string()
}

fn default_size() -> usize {
    DEFAULT_READ_SIZE
}

fn default_termination() -> String {
    DEFAULT_TERMINATION.to_string()
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

/// A connected instrument and the tasks that collect from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique instrument identifier, also used as `instrumentName` on delivery.
    pub id: String,
    /// Connection descriptor handed to the backend (e.g. `ASRL1::INSTR`).
    pub resource: String,
    /// Backend identifier (default: `sim`).
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Only active instruments are collected (default: true).
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Attributes set and verified every time the device is opened.
    #[serde(default)]
    pub attributes: Vec<AttributeSetting>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Instrument {
    pub fn new(id: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            backend: default_backend(),
            active: true,
            description: None,
            attributes: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_attribute(mut self, setting: AttributeSetting) -> Self {
        self.attributes.push(setting);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Active tasks that have at least one command, in declaration order.
    pub fn collectable_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.active && !t.commands.is_empty())
    }

    /// Whether a collection cycle has anything to do for this instrument.
    pub fn is_collectable(&self) -> bool {
        self.active && self.collectable_tasks().next().is_some()
    }

    /// Check identifiers and command payloads.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("instrument id cannot be empty".to_string());
        }
        if self.resource.trim().is_empty() {
            return Err(format!("instrument '{}': resource cannot be empty", self.id));
        }
        check_attributes(&self.attributes)
            .map_err(|e| format!("instrument '{}': {}", self.id, e))?;

        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(format!(
                    "instrument '{}': duplicate task id '{}'",
                    self.id, task.id
                ));
            }
            task.validate()
                .map_err(|e| format!("instrument '{}': {}", self.id, e))?;
        }
        Ok(())
    }
}

/// An ordered command sequence producing one reading per successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier, unique within its instrument.
    pub id: String,
    /// Parameter name attached to every reading (e.g. `temperature`).
    pub parameter: String,
    /// User label attached to every reading.
    #[serde(default)]
    pub user: String,
    /// Additional full-sequence attempts after the first failure.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl Task {
    pub fn new(id: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameter: parameter.into(),
            user: String::new(),
            retries: 0,
            active: true,
            description: None,
            commands: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Total number of full-sequence executions allowed.
    pub fn attempt_budget(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Enabled commands sorted by sequence number.
    pub fn enabled_commands(&self) -> Vec<&Command> {
        let mut commands: Vec<_> = self.commands.iter().filter(|c| c.enabled).collect();
        commands.sort_by_key(|c| c.seq);
        commands
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("task id cannot be empty".to_string());
        }
        if self.parameter.trim().is_empty() {
            return Err(format!("task '{}': parameter cannot be empty", self.id));
        }

        let mut seqs = HashSet::new();
        for command in &self.commands {
            if !seqs.insert(command.seq) {
                return Err(format!(
                    "task '{}': duplicate sequence number {}",
                    self.id, command.seq
                ));
            }
            command
                .validate()
                .map_err(|e| format!("task '{}': command #{}: {}", self.id, command.seq, e))?;
        }
        Ok(())
    }
}

/// One device operation within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Sequence number, unique within the task.
    pub seq: u32,
    /// Optional human-readable identifier used in logs.
    #[serde(default)]
    pub id: Option<String>,
    pub method: Method,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Text for text methods, hex string for raw methods.
    #[serde(default)]
    pub message: String,
    /// Maximum bytes for raw reads (default: 20480).
    #[serde(default = "default_size")]
    pub size: usize,
    /// Wait between write and read for queries (default: 0s).
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,
    #[serde(default = "default_termination")]
    pub termination: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub lock: LockMode,
    /// Attribute name for `get_attribute`.
    #[serde(default)]
    pub name: Option<String>,
    /// Attributes set and verified right before the command runs.
    #[serde(default)]
    pub attributes: Vec<AttributeSetting>,
}

impl Command {
    pub fn new(seq: u32, method: Method) -> Self {
        Self {
            seq,
            id: None,
            method,
            enabled: true,
            message: String::new(),
            size: DEFAULT_READ_SIZE,
            delay: Duration::ZERO,
            termination: default_termination(),
            encoding: default_encoding(),
            lock: LockMode::None,
            name: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_lock(mut self, lock: LockMode) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, setting: AttributeSetting) -> Self {
        self.attributes.push(setting);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Label for logs: the id when present, otherwise `#seq`.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("#{}", self.seq),
        }
    }

    fn validate(&self) -> Result<(), String> {
        check_attributes(&self.attributes)?;
        match self.method {
            Method::GetAttribute if self.name.as_deref().is_none_or(str::is_empty) => {
                Err("get_attribute requires an attribute name".to_string())
            }
            Method::WriteRaw | Method::QueryRaw => crate::executor::decode_hex(&self.message)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            _ => Ok(()),
        }
    }
}

/// Attribute values must survive verify-after-write.
fn check_attributes(settings: &[AttributeSetting]) -> Result<(), String> {
    match settings.iter().find(|s| !s.value.is_finite()) {
        Some(setting) => Err(format!(
            "attribute '{}' must be a finite number, got {}",
            setting.name, setting.value
        )),
        None => Ok(()),
    }
}
