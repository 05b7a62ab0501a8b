//! Runs play plans against the device, one step at a time.
//!
//! The executor lives on a single thread (`LocalSet`), so the shared pieces are
//! `Rc`s: a generation counter for supersession and an async mutex that keeps
//! two plans from interleaving their steps on the device.

use super::plan::{PlanStep, PlayPlan};
use super::traits::{DeviceCommands, DeviceResult, MediaSource};
use crate::error::{DeviceCommandError, PlayError};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Identifies one run. Only the most recently issued token is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    /// A newer run started; whatever this run did is to be ignored
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Wait after reboot/reset for the machine to come up
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(50),
            poll_attempts: 200,
        }
    }
}

pub struct PlanExecutor<D> {
    device: Rc<D>,
    generation: Rc<Cell<u64>>,
    lane: Rc<Mutex<()>>,
    settings: ExecutorSettings,
}

impl<D> Clone for PlanExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            device: Rc::clone(&self.device),
            generation: Rc::clone(&self.generation),
            lane: Rc::clone(&self.lane),
            settings: self.settings.clone(),
        }
    }
}

impl<D: DeviceCommands> PlanExecutor<D> {
    pub fn new(device: Rc<D>, settings: ExecutorSettings) -> Self {
        Self {
            device,
            generation: Rc::new(Cell::new(0)),
            lane: Rc::new(Mutex::new(())),
            settings,
        }
    }

    pub fn device(&self) -> &Rc<D> {
        &self.device
    }

    /// Start a new run; every older token is superseded from here on
    pub fn begin(&self) -> SessionToken {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        SessionToken(next)
    }

    /// Token of the latest run, for plans that must not supersede it
    pub fn current(&self) -> SessionToken {
        SessionToken(self.generation.get())
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.generation.get() == token.0
    }

    /// Run every step in order. The first failure aborts the plan; nothing is
    /// rolled back. A superseded run stops at the next step boundary and its
    /// result (success or failure) is reported as `Superseded`.
    pub async fn execute(&self, token: SessionToken, plan: &PlayPlan) -> Result<ExecutionOutcome, PlayError> {
        let _lane = self.lane.lock().await;

        info!(
            token = token.0,
            category = ?plan.category(),
            steps = plan.steps().len(),
            "Executing play plan"
        );

        for (index, step) in plan.steps().iter().enumerate() {
            if !self.is_current(token) {
                debug!(token = token.0, index, "Run superseded before step");
                return Ok(ExecutionOutcome::Superseded);
            }

            debug!(token = token.0, index, step = step.name(), "Running step");
            if let Err(source) = self.run_step(step).await {
                if !self.is_current(token) {
                    return Ok(ExecutionOutcome::Superseded);
                }
                return Err(PlayError::Step {
                    index,
                    step: step.name(),
                    source,
                });
            }
        }

        if self.is_current(token) {
            Ok(ExecutionOutcome::Completed)
        } else {
            Ok(ExecutionOutcome::Superseded)
        }
    }

    async fn run_step(&self, step: &PlanStep) -> DeviceResult<()> {
        let device = &self.device;
        match step {
            PlanStep::SelectDrive(drive) => device.drive_on(*drive).await,
            PlanStep::MountImage { drive, image } => device.mount(*drive, image).await,
            PlanStep::Reboot => {
                device.reboot().await?;
                tokio::time::sleep(self.settings.settle_delay).await;
                Ok(())
            }
            PlanStep::Reset => {
                device.reset().await?;
                tokio::time::sleep(self.settings.settle_delay).await;
                Ok(())
            }
            PlanStep::Pause => device.pause().await,
            PlanStep::Resume => device.resume().await,
            PlanStep::ReadMemory { address, length } => self.poll_until_zero(*address, *length).await,
            PlanStep::WriteMemory { address, bytes } => device.write_memory(*address, bytes).await,
            PlanStep::UploadAndRun {
                runner,
                name,
                bytes,
                song,
            } => {
                let media = MediaSource::Upload {
                    name: name.clone(),
                    bytes: bytes.clone(),
                };
                device.run(*runner, &media, *song).await
            }
            PlanStep::RunRemote { runner, path, song } => {
                device.run(*runner, &MediaSource::Remote(path.clone()), *song).await
            }
        }
    }

    /// Read until the first byte is zero. A failed read is returned as-is.
    async fn poll_until_zero(&self, address: u16, length: u16) -> DeviceResult<()> {
        let attempts = self.settings.poll_attempts.max(1);
        for attempt in 1..=attempts {
            let bytes = self.device.read_memory(address, length).await?;
            match bytes.first() {
                Some(0) => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(DeviceCommandError::Protocol {
                        operation: format!("readmem ${:04X}", address),
                        message: "empty response".to_string(),
                    })
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        Err(DeviceCommandError::NotReady { address, attempts })
    }
}
