pub mod audio;
pub mod autostart;
pub mod classify;
pub mod controller;
pub mod disk;
pub mod executor;
pub mod memory;
pub mod plan;
pub mod queue;
pub mod session;
pub mod songlengths;
pub mod traits;

#[cfg(test)]
pub(crate) mod fake;

pub use audio::{AudioChannelSnapshot, AudioSession, AudioSettings, MixerChannel};
pub use classify::{classify, PlayCategory};
pub use controller::{get_device, UltimateDevice};
pub use memory::dump_memory;
pub use executor::{ExecutionOutcome, ExecutorSettings, PlanExecutor, SessionToken};
pub use plan::{build_plan, AutostartMode, Origin, PlanStep, PlayPlan, PlayRequest, PlaybackSettings};
pub use queue::{QueueEngine, QueueItem, DEFAULT_DURATION_MS};
pub use session::{Finished, PendingPlan, PlanKind, PlaybackSession};
pub use traits::{DeviceCommands, Drive, MediaSource, PlayerState, Runner};
