//! The playback coordinator: queue → plan builder → executor, with the audio
//! session intercepting pause and resume.
//!
//! All state lives here behind `&mut self`. Plans are handed out as
//! [`PendingPlan`]s so the caller can run them on a local task and report back
//! through [`PlaybackSession::finish`]; results from superseded runs are dropped.

use super::audio::{self, AudioChannelSnapshot, AudioSession, AudioSettings};
use super::classify::{filter_supported, PlayCategory};
use super::executor::{ExecutionOutcome, ExecutorSettings, PlanExecutor, SessionToken};
use super::plan::{build_plan, Origin, PlayPlan, PlayRequest, PlaybackSettings};
use super::queue::{Advance, PersistedQueue, QueueEngine, QueueTotals};
use super::songlengths::SongLengths;
use super::traits::{DeviceCommands, PlayerState};
use crate::error::{AudioSyncError, PlayError};
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Play(usize),
    Stop,
    Pause,
    Resume,
}

/// A plan ready to run, tagged with the run it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlan {
    pub token: SessionToken,
    pub kind: PlanKind,
    pub plan: PlayPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Applied(PlanKind),
    /// A newer run took over; nothing was changed
    Discarded,
}

/// Result of adding paths to the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Added {
    pub ids: Vec<u64>,
    pub skipped: Vec<String>,
}

pub struct PlaybackSession<D> {
    executor: PlanExecutor<D>,
    queue: QueueEngine,
    audio: AudioSession,
    settings: PlaybackSettings,
    songlengths: Option<SongLengths>,
}

impl<D: DeviceCommands> PlaybackSession<D> {
    pub fn new(
        device: Rc<D>,
        settings: PlaybackSettings,
        executor_settings: ExecutorSettings,
        audio_settings: AudioSettings,
    ) -> Self {
        Self {
            executor: PlanExecutor::new(device, executor_settings),
            queue: QueueEngine::new(settings.default_duration_ms),
            audio: AudioSession::new(audio_settings),
            settings,
            songlengths: None,
        }
    }

    pub fn with_songlengths(mut self, songlengths: SongLengths) -> Self {
        self.songlengths = Some(songlengths);
        self
    }

    /// Pick up a queue, transport and pause snapshot saved by an earlier process
    pub fn restore_state(
        &mut self,
        queue: PersistedQueue,
        transport: PlayerState,
        snapshot: Option<Vec<AudioChannelSnapshot>>,
    ) {
        self.queue = QueueEngine::from_persisted(queue, self.settings.default_duration_ms);
        if self.queue.current_index().is_some() {
            self.queue.set_transport(transport);
        }
        if let Some(snapshot) = snapshot {
            self.audio.import(snapshot);
        }
    }

    pub fn persisted_queue(&self) -> PersistedQueue {
        self.queue.persisted()
    }

    pub fn audio_snapshot(&self) -> Option<Vec<AudioChannelSnapshot>> {
        self.audio.export()
    }

    pub fn executor(&self) -> PlanExecutor<D> {
        self.executor.clone()
    }

    pub fn queue(&self) -> &QueueEngine {
        &self.queue
    }

    pub fn audio(&self) -> &AudioSession {
        &self.audio
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn totals(&self) -> QueueTotals {
        self.queue.totals()
    }

    // --- Queue editing ---

    /// Queue every supported path; the rest are skipped without error
    pub fn add_paths(&mut self, paths: &[String], origin: Origin, song: Option<u16>) -> Added {
        self.add_paths_with_duration(paths, origin, song, None)
    }

    /// Like `add_paths`, with a duration used for items that have no songlength
    pub fn add_paths_with_duration(
        &mut self,
        paths: &[String],
        origin: Origin,
        song: Option<u16>,
        duration_override_ms: Option<u64>,
    ) -> Added {
        let supported = filter_supported(paths.iter().cloned(), |p| p.as_str());
        let skipped = paths
            .iter()
            .filter(|p| !supported.iter().any(|(s, _)| s == *p))
            .cloned()
            .collect();

        let mut ids = Vec::with_capacity(supported.len());
        for (path, category) in supported {
            let request = match origin {
                Origin::Local => PlayRequest {
                    bytes: None,
                    ..PlayRequest::local(path, Vec::new())
                },
                Origin::Remote => PlayRequest::remote(path),
            }
            .with_song(song)
            .with_duration_override(duration_override_ms);

            let id = self.queue.add(&request, None);
            if category == PlayCategory::Sid {
                self.apply_songlength(self.queue.len() - 1);
            }
            ids.push(id);
        }

        Added { ids, skipped }
    }

    fn apply_songlength(&mut self, index: usize) {
        let found = self
            .songlengths
            .as_ref()
            .zip(self.queue.items().get(index))
            .and_then(|(db, item)| db.lookup(&item.path, item.song));

        if let Some(ms) = found {
            debug!(index, ms, "Songlength found");
            let _ = self.queue.set_duration(index, Some(ms));
        }
    }

    /// Remove an item. Removing the playing one returns a stop plan.
    pub async fn remove(&mut self, index: usize) -> Result<Option<PendingPlan>, PlayError> {
        let playing = self.queue.transport() != PlayerState::Stopped;
        let removal = self.queue.remove(index)?;
        if removal.was_current && playing {
            return Ok(Some(self.stop().await));
        }
        Ok(None)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let enabled = !self.queue.state().shuffle;
        self.queue.set_shuffle(enabled);
        enabled
    }

    pub fn toggle_repeat(&mut self) -> bool {
        let enabled = !self.queue.state().repeat;
        self.queue.set_repeat(enabled);
        enabled
    }

    pub fn toggle_filter(&mut self, category: PlayCategory) -> bool {
        self.queue.toggle_filter(category)
    }

    // --- Navigation ---

    /// Build the plan that starts item `index`
    pub async fn play(&mut self, index: usize) -> Result<PendingPlan, PlayError> {
        self.queue.select(index)?;
        self.start_current(index).await
    }

    async fn start_current(&mut self, index: usize) -> Result<PendingPlan, PlayError> {
        // A new item starts audible
        if self.audio.is_muted() {
            let device = Rc::clone(self.executor.device());
            audio::report(self.audio.restore(device.as_ref()).await, "restore before play");
        }

        let request = match self.request_for(index).await {
            Ok(request) => request,
            Err(e) => {
                self.queue.set_transport(PlayerState::Stopped);
                return Err(e);
            }
        };
        let plan = match build_plan(&request, &self.settings) {
            Ok(plan) => plan,
            Err(e) => {
                self.queue.set_transport(PlayerState::Stopped);
                return Err(e);
            }
        };

        info!(index, path = %request.path, category = ?plan.category(), "Starting item");
        Ok(PendingPlan {
            token: self.executor.begin(),
            kind: PlanKind::Play(index),
            plan,
        })
    }

    async fn request_for(&self, index: usize) -> Result<PlayRequest, PlayError> {
        let item = self
            .queue
            .items()
            .get(index)
            .ok_or(PlayError::NoSuchItem(index))?;
        let request = item.to_request();

        match item.origin {
            Origin::Remote => Ok(request),
            Origin::Local => {
                let bytes = tokio::fs::read(&item.path).await.map_err(|e| PlayError::Io {
                    path: item.path.clone(),
                    message: e.to_string(),
                })?;
                Ok(request.with_bytes(bytes))
            }
        }
    }

    async fn advance(&mut self, advance: Advance) -> Result<Option<PendingPlan>, PlayError> {
        match advance {
            Advance::Play(index) => self.start_current(index).await.map(Some),
            Advance::Stopped => Ok(Some(self.stop().await)),
            Advance::Unchanged => Ok(None),
        }
    }

    pub async fn next(&mut self) -> Result<Option<PendingPlan>, PlayError> {
        let advance = self.queue.next();
        self.advance(advance).await
    }

    pub async fn previous(&mut self) -> Result<Option<PendingPlan>, PlayError> {
        let advance = self.queue.previous();
        self.advance(advance).await
    }

    /// Advance the clock; auto-advances when the current item ends
    pub async fn tick(&mut self, delta_ms: u64) -> Result<Option<PendingPlan>, PlayError> {
        if self.queue.tick(delta_ms) {
            debug!("Item finished, advancing");
            return self.next().await;
        }
        Ok(None)
    }

    // --- Transport ---

    /// Reset the machine. Restores muted audio first.
    pub async fn stop(&mut self) -> PendingPlan {
        if self.audio.is_muted() {
            let device = Rc::clone(self.executor.device());
            audio::report(self.audio.restore(device.as_ref()).await, "restore on stop");
        }
        self.queue.set_transport(PlayerState::Stopped);

        PendingPlan {
            token: self.executor.begin(),
            kind: PlanKind::Stop,
            plan: PlayPlan::stop(),
        }
    }

    /// Mute, then freeze the machine. Does nothing when stopped or already paused.
    pub async fn pause(&mut self) -> Option<PendingPlan> {
        match self.queue.transport() {
            PlayerState::Stopped => return None,
            PlayerState::Paused if self.audio.is_muted() => return None,
            _ => {}
        }
        let device = Rc::clone(self.executor.device());
        audio::report(self.audio.mute(device.as_ref()).await, "mute on pause");
        self.queue.set_transport(PlayerState::Paused);

        Some(PendingPlan {
            token: self.executor.current(),
            kind: PlanKind::Pause,
            plan: PlayPlan::pause(),
        })
    }

    /// Thaw the machine; audio comes back once the plan completes.
    /// Does nothing when already playing unmuted. When stopped there is no
    /// machine to thaw, so only a pending snapshot is written back.
    pub async fn resume(&mut self) -> Option<PendingPlan> {
        match self.queue.transport() {
            PlayerState::Stopped => {
                if self.audio.is_muted() {
                    let device = Rc::clone(self.executor.device());
                    audio::report(self.audio.restore(device.as_ref()).await, "restore while stopped");
                }
                return None;
            }
            PlayerState::Playing if !self.audio.is_muted() => return None,
            _ => {}
        }
        self.queue.set_transport(PlayerState::Playing);

        Some(PendingPlan {
            token: self.executor.current(),
            kind: PlanKind::Resume,
            plan: PlayPlan::resume(),
        })
    }

    /// Apply a finished run. Stale results are dropped; errors of the
    /// current run are returned.
    pub async fn finish(
        &mut self,
        pending: &PendingPlan,
        result: Result<ExecutionOutcome, PlayError>,
    ) -> Result<Finished, PlayError> {
        let stale = !self.executor.is_current(pending.token);
        match result {
            Ok(ExecutionOutcome::Superseded) => Ok(Finished::Discarded),
            _ if stale => {
                debug!(kind = ?pending.kind, "Dropping result of superseded run");
                Ok(Finished::Discarded)
            }
            Ok(ExecutionOutcome::Completed) => {
                if pending.kind == PlanKind::Resume {
                    let device = Rc::clone(self.executor.device());
                    audio::report(self.audio.restore(device.as_ref()).await, "restore on resume");
                }
                Ok(Finished::Applied(pending.kind))
            }
            Err(e) => {
                warn!(kind = ?pending.kind, error = %e, "Plan failed");
                match pending.kind {
                    PlanKind::Play(_) => self.queue.set_transport(PlayerState::Stopped),
                    // The machine is still frozen
                    PlanKind::Resume => self.queue.set_transport(PlayerState::Paused),
                    PlanKind::Pause | PlanKind::Stop => {}
                }
                Err(e)
            }
        }
    }

    /// Run a pending plan to completion on the current task
    pub async fn run(&mut self, pending: PendingPlan) -> Result<Finished, PlayError> {
        let result = self.executor.execute(pending.token, &pending.plan).await;
        self.finish(&pending, result).await
    }

    /// Run whatever a navigation call produced
    pub async fn run_optional(&mut self, pending: Option<PendingPlan>) -> Result<Option<Finished>, PlayError> {
        match pending {
            Some(pending) => self.run(pending).await.map(Some),
            None => Ok(None),
        }
    }

    // --- Mixer ---

    pub async fn set_volume(&mut self, channel: &str, value: &str) -> Result<(), AudioSyncError> {
        let device = Rc::clone(self.executor.device());
        self.audio.set_volume(device.as_ref(), channel, value).await
    }

    pub async fn set_solo(&mut self, channel: Option<&str>) -> Result<(), AudioSyncError> {
        let device = Rc::clone(self.executor.device());
        self.audio.set_solo(device.as_ref(), channel).await
    }

    /// Drop a stale pause snapshot without writing it back
    pub fn forget_audio(&mut self) {
        self.audio.abandon();
    }
}
