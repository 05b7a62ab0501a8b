//! In-memory device that records every command, for unit tests.

use super::traits::{DeviceCommands, DeviceResult, Drive, MediaSource, Runner};
use crate::error::DeviceCommandError;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    DriveOn(Drive),
    Mount(Drive, MediaSource),
    Reboot,
    Reset,
    Pause,
    Resume,
    ReadMemory(u16, u16),
    WriteMemory(u16, Vec<u8>),
    Run(Runner, MediaSource, Option<u16>),
    GetConfig(String, String),
    SetConfig(String, String, String),
    BatchSetConfig(String, Vec<(String, String)>),
}

#[derive(Default)]
pub(crate) struct RecordingDevice {
    pub calls: RefCell<Vec<Call>>,
    pub config: RefCell<BTreeMap<(String, String), String>>,
    /// Scripted read results; an empty script reads as zeros
    pub reads: RefCell<VecDeque<Vec<u8>>>,
    /// Operations that fail until removed
    pub failures: RefCell<HashMap<&'static str, DeviceCommandError>>,
    /// When set, reboot waits for a notification
    pub reboot_gate: RefCell<Option<Rc<Notify>>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(entries: &[(&str, &str, &str)]) -> Self {
        let device = Self::new();
        for (category, item, value) in entries {
            device.set(category, item, value);
        }
        device
    }

    pub fn set(&self, category: &str, item: &str, value: &str) {
        self.config
            .borrow_mut()
            .insert((category.to_string(), item.to_string()), value.to_string());
    }

    pub fn value(&self, category: &str, item: &str) -> Option<String> {
        self.config
            .borrow()
            .get(&(category.to_string(), item.to_string()))
            .cloned()
    }

    pub fn fail(&self, operation: &'static str, error: DeviceCommandError) {
        self.failures.borrow_mut().insert(operation, error);
    }

    pub fn heal(&self, operation: &'static str) {
        self.failures.borrow_mut().remove(operation);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, operation: &'static str, call: Call) -> DeviceResult<()> {
        self.calls.borrow_mut().push(call);
        match self.failures.borrow().get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

pub(crate) fn timeout(operation: &str) -> DeviceCommandError {
    DeviceCommandError::Timeout {
        operation: operation.to_string(),
    }
}

impl DeviceCommands for RecordingDevice {
    async fn drive_on(&self, drive: Drive) -> DeviceResult<()> {
        self.record("drive_on", Call::DriveOn(drive))
    }

    async fn mount(&self, drive: Drive, image: &MediaSource) -> DeviceResult<()> {
        self.record("mount", Call::Mount(drive, image.clone()))
    }

    async fn reboot(&self) -> DeviceResult<()> {
        let gate = self.reboot_gate.borrow().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record("reboot", Call::Reboot)
    }

    async fn reset(&self) -> DeviceResult<()> {
        self.record("reset", Call::Reset)
    }

    async fn pause(&self) -> DeviceResult<()> {
        self.record("pause", Call::Pause)
    }

    async fn resume(&self) -> DeviceResult<()> {
        self.record("resume", Call::Resume)
    }

    async fn read_memory(&self, address: u16, length: u16) -> DeviceResult<Vec<u8>> {
        self.record("read_memory", Call::ReadMemory(address, length))?;
        Ok(self
            .reads
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| vec![0; length as usize]))
    }

    async fn write_memory(&self, address: u16, bytes: &[u8]) -> DeviceResult<()> {
        self.record("write_memory", Call::WriteMemory(address, bytes.to_vec()))
    }

    async fn run(&self, runner: Runner, media: &MediaSource, song: Option<u16>) -> DeviceResult<()> {
        self.record("run", Call::Run(runner, media.clone(), song))
    }

    async fn get_config(&self, category: &str, item: &str) -> DeviceResult<String> {
        self.record(
            "get_config",
            Call::GetConfig(category.to_string(), item.to_string()),
        )?;
        self.value(category, item)
            .ok_or_else(|| DeviceCommandError::Status {
                operation: format!("GET {}/{}", category, item),
                status: 404,
                message: "no such item".to_string(),
            })
    }

    async fn set_config(&self, category: &str, item: &str, value: &str) -> DeviceResult<()> {
        self.record(
            "set_config",
            Call::SetConfig(category.to_string(), item.to_string(), value.to_string()),
        )?;
        self.set(category, item, value);
        Ok(())
    }

    async fn batch_set_config(&self, category: &str, items: &[(String, String)]) -> DeviceResult<()> {
        self.record(
            "batch_set_config",
            Call::BatchSetConfig(category.to_string(), items.to_vec()),
        )?;
        for (item, value) in items {
            self.set(category, item, value);
        }
        Ok(())
    }
}
