//! Play plans: the ordered device commands behind one "play this" request.

use super::autostart;
use super::classify::{classify, PlayCategory};
use super::traits::{Drive, MediaSource, Runner};
use crate::error::{ClassificationError, PlayError};
use serde::{Deserialize, Serialize};

/// How disk images are started after mount + reboot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutostartMode {
    /// Type `LOAD"*",8,1:RUN` into the keyboard buffer and let BASIC do the rest
    #[default]
    Classic,
    /// Decode the image and write the program straight into RAM
    Dma,
}

impl std::str::FromStr for AutostartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "kernal" => Ok(AutostartMode::Classic),
            "dma" => Ok(AutostartMode::Dma),
            other => Err(format!("Unknown autostart mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// File lives on this machine; bytes are uploaded
    Local,
    /// File lives on the device's filesystem
    Remote,
}

/// One play attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub origin: Origin,
    pub path: String,
    pub bytes: Option<Vec<u8>>,
    pub song: Option<u16>,
    pub duration_override_ms: Option<u64>,
}

impl PlayRequest {
    pub fn local(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            origin: Origin::Local,
            path: path.into(),
            bytes: Some(bytes),
            song: None,
            duration_override_ms: None,
        }
    }

    pub fn remote(path: impl Into<String>) -> Self {
        Self {
            origin: Origin::Remote,
            path: path.into(),
            bytes: None,
            song: None,
            duration_override_ms: None,
        }
    }

    pub fn with_song(mut self, song: Option<u16>) -> Self {
        self.song = song;
        self
    }

    pub fn with_duration_override(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_override_ms = duration_ms;
        self
    }

    /// Attach image bytes fetched for a remote file (used by DMA autostart)
    pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(&['/', '\\'][..])
            .next()
            .unwrap_or(&self.path)
    }

    pub fn category(&self) -> PlayCategory {
        classify(&self.path)
    }

    fn media(&self) -> Result<MediaSource, PlayError> {
        match self.origin {
            Origin::Remote => Ok(MediaSource::Remote(self.path.clone())),
            Origin::Local => {
                let bytes = self.bytes.clone().ok_or_else(|| PlayError::MissingBytes {
                    path: self.path.clone(),
                })?;
                Ok(MediaSource::Upload {
                    name: self.file_name().to_string(),
                    bytes,
                })
            }
        }
    }
}

/// Settings supplied by the settings store at call time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub autostart: AutostartMode,
    pub drive: Drive,
    pub default_duration_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            autostart: AutostartMode::Classic,
            drive: Drive::A,
            default_duration_ms: crate::player::queue::DEFAULT_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    SelectDrive(Drive),
    MountImage { drive: Drive, image: MediaSource },
    Reboot,
    Reset,
    Pause,
    Resume,
    /// Poll window: read until the first byte reads zero
    ReadMemory { address: u16, length: u16 },
    WriteMemory { address: u16, bytes: Vec<u8> },
    UploadAndRun {
        runner: Runner,
        name: String,
        bytes: Vec<u8>,
        song: Option<u16>,
    },
    RunRemote {
        runner: Runner,
        path: String,
        song: Option<u16>,
    },
}

impl PlanStep {
    pub fn name(&self) -> &'static str {
        match self {
            PlanStep::SelectDrive(_) => "select-drive",
            PlanStep::MountImage { .. } => "mount",
            PlanStep::Reboot => "reboot",
            PlanStep::Reset => "reset",
            PlanStep::Pause => "pause",
            PlanStep::Resume => "resume",
            PlanStep::ReadMemory { .. } => "read-memory",
            PlanStep::WriteMemory { .. } => "write-memory",
            PlanStep::UploadAndRun { .. } => "upload-and-run",
            PlanStep::RunRemote { .. } => "run-remote",
        }
    }
}

/// Ordered steps for one attempt. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayPlan {
    /// `None` for transport mini-plans (stop, pause, resume)
    category: Option<PlayCategory>,
    steps: Vec<PlanStep>,
}

impl PlayPlan {
    fn new(category: Option<PlayCategory>, steps: Vec<PlanStep>) -> Self {
        Self { category, steps }
    }

    pub fn category(&self) -> Option<PlayCategory> {
        self.category
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(PlanStep::name).collect()
    }

    /// User-initiated stop: a reset, never a reboot
    pub fn stop() -> Self {
        Self::new(None, vec![PlanStep::Reset])
    }

    pub fn pause() -> Self {
        Self::new(None, vec![PlanStep::Pause])
    }

    pub fn resume() -> Self {
        Self::new(None, vec![PlanStep::Resume])
    }
}

fn run_step(runner: Runner, request: &PlayRequest, song: Option<u16>) -> Result<PlanStep, PlayError> {
    Ok(match request.media()? {
        MediaSource::Remote(path) => PlanStep::RunRemote { runner, path, song },
        MediaSource::Upload { name, bytes } => PlanStep::UploadAndRun {
            runner,
            name,
            bytes,
            song,
        },
    })
}

/// Turn a request into its plan. Pure: no device access, no I/O.
pub fn build_plan(request: &PlayRequest, settings: &PlaybackSettings) -> Result<PlayPlan, PlayError> {
    let category = request.category();

    let steps = match category {
        PlayCategory::Sid => vec![run_step(Runner::SidPlay, request, request.song)?],
        PlayCategory::Prg => vec![run_step(Runner::RunPrg, request, None)?],
        PlayCategory::Module => vec![run_step(Runner::ModPlay, request, None)?],
        // Cartridges need the machine to re-enumerate attached hardware
        PlayCategory::Crt => vec![PlanStep::Reset, run_step(Runner::RunCrt, request, None)?],
        PlayCategory::DiskImage => {
            let drive = settings.drive;
            let mut steps = vec![
                PlanStep::SelectDrive(drive),
                PlanStep::MountImage {
                    drive,
                    image: request.media()?,
                },
                PlanStep::Reboot,
            ];
            steps.extend(autostart::steps(settings.autostart, request, drive));
            steps
        }
        PlayCategory::Unsupported => {
            return Err(PlayError::Classification(ClassificationError {
                file_name: request.file_name().to_string(),
            }))
        }
    };

    Ok(PlayPlan::new(Some(category), steps))
}
