//! Session coordination and the engine public surface
//!
//! [`PlayerEngine`] is what hosts hold: it owns the sink, the append
//! surface, the adapter factory and all core subsystems, wires sink and
//! adapter events into them, and executes recovery plans. A source
//! session lives from one `load()` to the next; a monotonic load id lets
//! later loads supersede earlier ones at every suspension point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::abr::{AbrController, LevelSwitch};
use crate::adapter::{Adapter, AdapterEvent, AdapterFactory};
use crate::buffer::BufferAccountant;
use crate::config::PlayerConfig;
use crate::errors::{ErrorCause, ErrorCode, PlayerError, PlayerResult, classify};
use crate::events::{EventBus, PlayerEvent, PlayerEventKind, Subscription};
use crate::models::{PlayerSnapshot, SourceConfig, TrackKind};
use crate::player::{PlayerState, PlayerStateMachine, StateAction, Transition};
use crate::queue::{AppendSurface, CompletionHandle, OperationQueue};
use crate::recovery::{ErrorController, RecoveryAction};
use crate::retry::RetryPolicySet;
use crate::sink::{SinkEvent, SinkPlayError, VideoSink};

/// Everything owned for the lifetime of one `load()`.
struct SourceSession {
    adapter: Arc<dyn Adapter>,
    load_id: u64,
    queue: Arc<OperationQueue>,
    cancel: CancellationToken,
    event_task: JoinHandle<()>,
}

struct EngineInner {
    /// Self-handle for spawning tasks that must not keep the engine alive.
    weak_self: Weak<EngineInner>,
    config: PlayerConfig,
    bus: Arc<EventBus>,
    sink: Arc<dyn VideoSink>,
    surface: Arc<dyn AppendSurface>,
    factory: Arc<dyn AdapterFactory>,
    state: Mutex<PlayerStateMachine>,
    buffer: Mutex<BufferAccountant>,
    abr: Mutex<AbrController>,
    errors: Mutex<ErrorController>,
    session: Mutex<Option<SourceSession>>,
    current_source: Mutex<Option<SourceConfig>>,
    last_error: Mutex<Option<PlayerError>>,
    load_id: AtomicU64,
    destroyed: CancellationToken,
    sink_task: Mutex<Option<JoinHandle<()>>>,
}

/// The adaptive playback engine.
///
/// Construction requires a tokio runtime: the engine spawns its sink
/// dispatch task immediately. All callbacks and internal work run on
/// that runtime; the public surface is safe to call from anywhere.
#[derive(Clone)]
pub struct PlayerEngine {
    inner: Arc<EngineInner>,
}

impl PlayerEngine {
    pub fn new(
        sink: Arc<dyn VideoSink>,
        surface: Arc<dyn AppendSurface>,
        factory: Arc<dyn AdapterFactory>,
        config: PlayerConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let limits = config.buffer.resolve(config.platform);
        let inner = Arc::new_cyclic(|weak| EngineInner {
            weak_self: weak.clone(),
            bus: bus.clone(),
            state: Mutex::new(PlayerStateMachine::new()),
            buffer: Mutex::new(BufferAccountant::new(limits, bus.clone())),
            abr: Mutex::new(AbrController::new(&config.abr, config.platform)),
            errors: Mutex::new(ErrorController::new(
                RetryPolicySet::new(&config.retry),
                bus.clone(),
            )),
            session: Mutex::new(None),
            current_source: Mutex::new(None),
            last_error: Mutex::new(None),
            load_id: AtomicU64::new(0),
            destroyed: CancellationToken::new(),
            sink_task: Mutex::new(None),
            sink,
            surface,
            factory,
            config,
        });

        inner
            .sink
            .set_volume(inner.config.playback.volume.clamp(0.0, 1.0));
        inner.sink.set_muted(inner.config.playback.muted);

        let task = tokio::spawn(sink_event_loop(
            Arc::downgrade(&inner),
            inner.sink.subscribe(),
            inner.destroyed.clone(),
        ));
        *inner.sink_task.lock().expect("engine lock poisoned") = Some(task);

        Self { inner }
    }

    /// The engine's outgoing event bus.
    pub fn bus(&self) -> Arc<EventBus> {
        self.inner.bus.clone()
    }

    /// Subscribe to one outgoing event kind.
    pub fn on<F>(&self, kind: PlayerEventKind, handler: F) -> Subscription
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(kind, handler)
    }

    pub fn off(&self, subscription: &Subscription) -> bool {
        self.inner.bus.unsubscribe(subscription)
    }

    /// Start (or restart) playback of `source`, superseding any load in
    /// progress.
    pub async fn load(&self, source: SourceConfig) -> PlayerResult<()> {
        self.inner.load_impl(source).await
    }

    /// Re-run `load` for the current source after an error.
    pub async fn retry(&self) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        let source = self
            .inner
            .current_source
            .lock()
            .expect("engine lock poisoned")
            .clone()
            .ok_or_else(|| PlayerError::load("retry() without a current source"))?;
        self.inner.load_impl(source).await
    }

    /// Begin playback. Accepted from `Ready`, `Paused`, `Ended` or while
    /// already playing; a platform autoplay refusal is retried muted.
    pub async fn play(&self) -> PlayerResult<()> {
        self.inner.play_impl().await
    }

    /// Idempotent pause; the sink is only touched while playing or
    /// buffering.
    pub fn pause(&self) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        let state = self.inner.state.lock().expect("engine lock poisoned").state();
        if matches!(state, PlayerState::Playing | PlayerState::Buffering) {
            self.inner.sink.pause();
        }
        Ok(())
    }

    /// Seek to `target` seconds, clamped to the sink's duration (live
    /// streams clamp only at zero).
    pub fn seek(&self, target: f64) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        let duration = self.inner.sink.duration();
        let clamped = if duration.is_finite() {
            target.clamp(0.0, duration)
        } else {
            target.max(0.0)
        };
        self.inner
            .bus
            .emit(&PlayerEvent::Seeking { target: clamped });
        self.inner.sink.set_current_time(clamped);
        Ok(())
    }

    pub fn set_volume(&self, volume: f64) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        self.inner.sink.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn set_muted(&self, muted: bool) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        if self.inner.sink.muted() != muted {
            self.inner.sink.set_muted(muted);
        }
        Ok(())
    }

    pub fn set_playback_rate(&self, rate: f64) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        self.inner.sink.set_playback_rate(rate);
        Ok(())
    }

    /// Pin a quality level (`Some(i)`) or re-enter automatic selection
    /// (`None`).
    pub fn set_quality(&self, index: Option<usize>) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        match index {
            Some(index) => {
                let outcome = {
                    let mut abr = self.inner.abr.lock().expect("engine lock poisoned");
                    let switch = abr.set_manual(index)?;
                    (switch, switch.and_then(|s| abr.levels().get(s.to).cloned()), abr.snapshot())
                };
                if let Some(adapter) = self.inner.current_adapter() {
                    adapter.set_quality_level(Some(index));
                }
                if let (Some(switch), Some(level)) = (outcome.0, outcome.1) {
                    self.inner.bus.emit(&PlayerEvent::QualityChange {
                        level,
                        auto: switch.auto,
                    });
                    self.inner.bus.emit(&PlayerEvent::AbrUpdate(outcome.2));
                }
                Ok(())
            }
            None => self.set_auto_quality(true),
        }
    }

    /// Toggle automatic quality selection.
    pub fn set_auto_quality(&self, enabled: bool) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        if enabled {
            if let Some(adapter) = self.inner.current_adapter() {
                adapter.set_quality_level(None);
            }
            self.inner
                .apply_abr_switch(|abr| abr.set_auto(Instant::now()));
        } else {
            let current = {
                let abr = self.inner.abr.lock().expect("engine lock poisoned");
                if abr.levels().is_empty() {
                    return Ok(());
                }
                abr.current_index()
            };
            return self.set_quality(Some(current));
        }
        Ok(())
    }

    pub fn set_subtitle_track(&self, id: Option<&str>) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        if let Some(adapter) = self.inner.current_adapter() {
            adapter.set_subtitle_track(id);
        }
        self.inner.bus.emit(&PlayerEvent::SubtitleTrackChange {
            track_id: id.map(str::to_owned),
        });
        Ok(())
    }

    /// Host visibility hint; hidden sessions clamp their buffer targets.
    pub fn set_hidden(&self, hidden: bool) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        self.inner
            .buffer
            .lock()
            .expect("engine lock poisoned")
            .set_hidden(hidden);
        Ok(())
    }

    /// Host-pushed cumulative dropped-frame counter (see the ABR
    /// controller's 1 Hz sampling contract).
    pub fn record_dropped_frames(&self, total: u64) -> PlayerResult<()> {
        self.inner.ensure_alive()?;
        self.inner
            .apply_abr_switch(|abr| abr.record_dropped_frames(total, Instant::now()));
        Ok(())
    }

    /// Enqueue a media append against the session's append surface.
    /// Adapter-facing: this is the only way bytes reach the surface.
    pub fn append_media(
        &self,
        track: TrackKind,
        data: Bytes,
        timestamp_offset: Option<f64>,
    ) -> PlayerResult<CompletionHandle> {
        self.inner.ensure_alive()?;
        let queue = self
            .inner
            .current_queue()
            .ok_or_else(|| PlayerError::load("append without an active source session"))?;
        Ok(queue.append(track, data, timestamp_offset))
    }

    /// Enqueue a buffered-range removal.
    pub fn remove_media(
        &self,
        track: TrackKind,
        start: f64,
        end: f64,
    ) -> PlayerResult<CompletionHandle> {
        self.inner.ensure_alive()?;
        let queue = self
            .inner
            .current_queue()
            .ok_or_else(|| PlayerError::load("remove without an active source session"))?;
        Ok(queue.remove(track, start, end))
    }

    /// Point-in-time view of the whole engine.
    pub fn snapshot(&self) -> PlayerResult<PlayerSnapshot> {
        self.inner.ensure_alive()?;
        let state = self.inner.state.lock().expect("engine lock poisoned").state();
        let (quality_levels, current_quality, abr_enabled) = {
            let abr = self.inner.abr.lock().expect("engine lock poisoned");
            (
                abr.levels().to_vec(),
                abr.current_level().cloned(),
                abr.is_auto(),
            )
        };
        let (subtitle_tracks, current_subtitle_track) = match self.inner.current_adapter() {
            Some(adapter) => (adapter.subtitle_tracks(), adapter.current_subtitle_track()),
            None => (Vec::new(), None),
        };
        let duration = self.inner.sink.duration();
        Ok(PlayerSnapshot {
            state,
            current_time: self.inner.sink.current_time(),
            duration,
            buffered: crate::buffer::normalize_ranges(self.inner.sink.buffered()),
            volume: self.inner.sink.volume(),
            muted: self.inner.sink.muted(),
            playback_rate: self.inner.sink.playback_rate(),
            is_live: !duration.is_finite(),
            quality_levels,
            current_quality,
            abr_enabled,
            error: self
                .inner
                .last_error
                .lock()
                .expect("engine lock poisoned")
                .clone(),
            subtitle_tracks,
            current_subtitle_track,
        })
    }

    /// Tear the engine down. After this every method returns
    /// `PlayerDestroyed` and no further events are emitted past
    /// `destroyed`.
    pub async fn destroy(&self) {
        if self.inner.destroyed.is_cancelled() {
            return;
        }
        info!(target = "player.session", "destroying engine");
        let task = self
            .inner
            .sink_task
            .lock()
            .expect("engine lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.inner.teardown_session().await;
        self.inner.destroyed.cancel();
        self.inner.bus.emit(&PlayerEvent::Destroyed);
        self.inner.bus.remove_all(None);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.is_cancelled()
    }
}

impl EngineInner {
    fn ensure_alive(&self) -> PlayerResult<()> {
        if self.destroyed.is_cancelled() {
            return Err(PlayerError::destroyed());
        }
        Ok(())
    }

    fn superseded(&self, my_id: u64) -> bool {
        self.load_id.load(Ordering::SeqCst) != my_id || self.destroyed.is_cancelled()
    }

    fn current_adapter(&self) -> Option<Arc<dyn Adapter>> {
        self.session
            .lock()
            .expect("engine lock poisoned")
            .as_ref()
            .map(|s| s.adapter.clone())
    }

    fn current_queue(&self) -> Option<Arc<OperationQueue>> {
        self.session
            .lock()
            .expect("engine lock poisoned")
            .as_ref()
            .map(|s| s.queue.clone())
    }

    fn emit_transition(&self, transition: Transition) {
        self.bus.emit(&PlayerEvent::StateChange {
            from: transition.from,
            to: transition.to,
            action: transition.action,
        });
    }

    /// Validated transition; illegal sink-driven mappings are dropped.
    fn try_transition(&self, to: PlayerState, action: StateAction) {
        let result = {
            let mut state = self.state.lock().expect("engine lock poisoned");
            state.transition_to(to, Some(action))
        };
        match result {
            Ok(Some(transition)) => self.emit_transition(transition),
            Ok(None) => {}
            Err(_) => {
                debug!(
                    target = "player.session",
                    to = %to,
                    "dropping sink event that would violate the state machine"
                );
            }
        }
    }

    /// Run a closure against the ABR controller and apply/publish any
    /// resulting switch.
    fn apply_abr_switch<F>(&self, f: F) -> Option<LevelSwitch>
    where
        F: FnOnce(&mut AbrController) -> Option<LevelSwitch>,
    {
        let (switch, level, snapshot) = {
            let mut abr = self.abr.lock().expect("engine lock poisoned");
            let switch = f(&mut abr);
            (
                switch,
                switch.and_then(|s| abr.levels().get(s.to).cloned()),
                abr.snapshot(),
            )
        };
        let (switch, level) = match (switch, level) {
            (Some(switch), Some(level)) => (switch, level),
            _ => return None,
        };
        if switch.auto {
            if let Some(adapter) = self.current_adapter() {
                adapter.set_quality_level(Some(switch.to));
            }
        }
        self.bus.emit(&PlayerEvent::QualityChange {
            level,
            auto: switch.auto,
        });
        self.bus.emit(&PlayerEvent::AbrUpdate(snapshot));
        Some(switch)
    }

    async fn load_impl(&self, source: SourceConfig) -> PlayerResult<()> {
        self.ensure_alive()?;
        let my_id = self.load_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(target = "player.session", url = %source.url, load_id = my_id, "load");

        self.teardown_session().await;
        if self.superseded(my_id) {
            return Ok(());
        }

        let transition = {
            let mut state = self.state.lock().expect("engine lock poisoned");
            state.transition_to(PlayerState::Loading, Some(StateAction::Load))?
        };
        if let Some(transition) = transition {
            self.emit_transition(transition);
        }
        *self
            .current_source
            .lock()
            .expect("engine lock poisoned") = Some(source.clone());
        *self.last_error.lock().expect("engine lock poisoned") = None;

        match self.load_steps(my_id, &source).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if self.superseded(my_id) {
                    // a newer load owns the state machine now
                    return Ok(());
                }
                let transition = {
                    let mut state = self.state.lock().expect("engine lock poisoned");
                    state.force_transition(PlayerState::Error, Some(StateAction::Error))
                };
                if let Some(transition) = transition {
                    self.emit_transition(transition);
                }
                *self.last_error.lock().expect("engine lock poisoned") = Some(error.clone());
                self.bus.emit(&PlayerEvent::Error {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn load_steps<'a>(
        &'a self,
        my_id: u64,
        source: &'a SourceConfig,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = PlayerResult<()>> + Send + 'a>> {
        Box::pin(self.load_steps_impl(my_id, source))
    }

    async fn load_steps_impl(&self, my_id: u64, source: &SourceConfig) -> PlayerResult<()> {
        let adapter = self.factory.create(source).ok_or_else(|| {
            PlayerError::load(format!("no adapter handles source '{}'", source.url))
        })?;

        adapter.attach(self.sink.clone()).await?;
        if self.superseded(my_id) {
            adapter.destroy().await;
            return Ok(());
        }

        // Wire adapter events before load so nothing is missed.
        let session_cancel = CancellationToken::new();
        let event_task = tokio::spawn(adapter_event_loop(
            self.weak_self.clone(),
            adapter.subscribe(),
            my_id,
            session_cancel.clone(),
        ));

        if let Err(error) = adapter.load(source).await {
            session_cancel.cancel();
            adapter.destroy().await;
            return Err(error);
        }
        if self.superseded(my_id) {
            session_cancel.cancel();
            adapter.destroy().await;
            return Ok(());
        }

        // Fresh session state for the buffer accountant and the ABR.
        self.buffer.lock().expect("engine lock poisoned").reset();
        let levels = {
            let mut abr = self.abr.lock().expect("engine lock poisoned");
            abr.reset();
            abr.set_levels(adapter.quality_levels());
            abr.levels().to_vec()
        };
        if !levels.is_empty() {
            let start = self
                .abr
                .lock()
                .expect("engine lock poisoned")
                .current_index();
            adapter.set_quality_level(Some(start));
        }

        let queue = Arc::new(OperationQueue::new(self.surface.clone()));
        *self.session.lock().expect("engine lock poisoned") = Some(SourceSession {
            adapter,
            load_id: my_id,
            queue,
            cancel: session_cancel,
            event_task,
        });

        self.bus.emit(&PlayerEvent::QualityLevels { levels });
        let transition = {
            let mut state = self.state.lock().expect("engine lock poisoned");
            state.transition_to(PlayerState::Ready, Some(StateAction::Loaded))?
        };
        if let Some(transition) = transition {
            self.emit_transition(transition);
        }
        self.bus.emit(&PlayerEvent::Loaded {
            url: source.url.clone(),
        });

        if self.config.playback.autoplay {
            if let Err(error) = self.play_impl().await {
                warn!(target = "player.session", %error, "autoplay failed");
            }
        }
        Ok(())
    }

    async fn play_impl(&self) -> PlayerResult<()> {
        self.ensure_alive()?;
        {
            let state = self.state.lock().expect("engine lock poisoned");
            if !(state.is_playable() || state.is_playing()) {
                return Err(PlayerError::state(format!(
                    "play() not accepted in state {}",
                    state.state()
                )));
            }
        }
        match self.sink.play().await {
            Ok(()) => Ok(()),
            Err(SinkPlayError::NotAllowed) => {
                // autoplay policy refusal: mute and retry once
                debug!(
                    target = "player.session",
                    "unmuted play refused; retrying muted"
                );
                self.sink.set_muted(true);
                self.sink
                    .play()
                    .await
                    .map_err(|e| classify(ErrorCause::Message(e.to_string())))
            }
            Err(error) => Err(classify(ErrorCause::Message(error.to_string()))),
        }
    }

    /// Destroy the active session (if any) and return all session-scoped
    /// state to its initial shape.
    async fn teardown_session(&self) {
        let session = self.session.lock().expect("engine lock poisoned").take();
        let had_session = session.is_some();
        if let Some(session) = session {
            debug!(
                target = "player.session",
                load_id = session.load_id,
                "tearing down source session"
            );
            session.cancel.cancel();
            session.event_task.abort();
            session.queue.destroy();
            session.adapter.destroy().await;
        }
        if had_session {
            self.sink.pause();
            self.sink.set_src(None);
            self.sink.load();
        }
        self.abr.lock().expect("engine lock poisoned").reset();
        self.errors
            .lock()
            .expect("engine lock poisoned")
            .clear_retry_states();
        self.buffer.lock().expect("engine lock poisoned").reset();
        let transition = { self.state.lock().expect("engine lock poisoned").reset() };
        if let Some(transition) = transition {
            self.emit_transition(transition);
        }
    }

    fn should_interrupt(error: &PlayerError) -> bool {
        use crate::errors::ErrorCategory;
        error.is_fatal()
            || matches!(
                error.category,
                ErrorCategory::MediaSourceFailure | ErrorCategory::KeySystem
            )
    }

    /// Try to free room on the append surface after a quota-exceeded
    /// append. Returns true only once every queued remove has completed,
    /// in which case the error is marked recovered; anything short of
    /// that (nothing evictable, no session, a failed remove) leaves the
    /// attempt counted so repeated quota errors can exhaust the budget.
    async fn evict_for_quota(&self, error: &PlayerError) -> bool {
        let evictions = {
            let buffer = self.buffer.lock().expect("engine lock poisoned");
            buffer.publish_eviction()
        };
        if evictions.is_empty() {
            return false;
        }
        let Some(queue) = self.current_queue() else {
            return false;
        };
        let mut pending = Vec::with_capacity(evictions.len() * 2);
        for range in &evictions {
            for track in [TrackKind::Video, TrackKind::Audio] {
                pending.push(queue.remove(track, range.start, range.end));
            }
        }
        for handle in pending {
            if let Err(remove_error) = handle.wait().await {
                warn!(
                    target = "player.session",
                    %remove_error,
                    "quota eviction remove failed"
                );
                return false;
            }
        }
        let mut errors = self.errors.lock().expect("engine lock poisoned");
        errors.mark_recovered(error);
        true
    }

    /// Funnel for every classified error entering the core.
    async fn handle_error(&self, error: PlayerError) {
        *self.last_error.lock().expect("engine lock poisoned") = Some(error.clone());
        let plan = {
            let mut errors = self.errors.lock().expect("engine lock poisoned");
            errors.handle(&error)
        };

        // Quota pressure is answered with an eviction pass while the
        // retry budget lasts; an exhausted budget (`None`) falls through
        // and interrupts playback like any other media failure.
        if error.code == ErrorCode::MseQuotaExceeded
            && plan.action != RecoveryAction::None
            && self.evict_for_quota(&error).await
        {
            return;
        }

        match plan.action {
            RecoveryAction::None => {
                if Self::should_interrupt(&error) {
                    let transition = {
                        let mut state = self.state.lock().expect("engine lock poisoned");
                        state.force_transition(PlayerState::Error, Some(StateAction::Error))
                    };
                    if let Some(transition) = transition {
                        self.emit_transition(transition);
                    }
                }
            }
            // the adapter re-requests on its own for these
            RecoveryAction::Retry | RecoveryAction::SkipSegment => {}
            RecoveryAction::QualityFallback => {
                self.apply_abr_switch(|abr| abr.force_drop(Instant::now()));
            }
            RecoveryAction::ReinitSource => {
                let Some(inner) = self.weak_self.upgrade() else {
                    return;
                };
                let delay = plan.delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if inner.destroyed.is_cancelled() {
                        return;
                    }
                    let source = inner
                        .current_source
                        .lock()
                        .expect("engine lock poisoned")
                        .clone();
                    if let Some(source) = source {
                        info!(target = "player.session", url = %source.url, "re-initializing source");
                        if let Err(error) = inner.load_impl(source).await {
                            warn!(target = "player.session", %error, "source re-init failed");
                        }
                    }
                });
            }
        }
    }

    async fn dispatch_sink_event(&self, event: SinkEvent) {
        match event {
            SinkEvent::Playing => self.try_transition(PlayerState::Playing, StateAction::Play),
            SinkEvent::Pause => self.try_transition(PlayerState::Paused, StateAction::Pause),
            SinkEvent::Waiting => {
                self.try_transition(PlayerState::Buffering, StateAction::Stall);
                self.bus.emit(&PlayerEvent::Waiting);
            }
            SinkEvent::CanPlay => {
                let buffering = {
                    let state = self.state.lock().expect("engine lock poisoned");
                    state.state() == PlayerState::Buffering
                };
                if buffering {
                    self.try_transition(PlayerState::Playing, StateAction::Resume);
                }
                self.bus.emit(&PlayerEvent::CanPlay);
            }
            SinkEvent::Ended => {
                if self.config.playback.loop_playback {
                    self.sink.set_current_time(0.0);
                    if let Err(error) = self.sink.play().await {
                        warn!(target = "player.session", %error, "loop restart failed");
                    }
                    return;
                }
                self.try_transition(PlayerState::Ended, StateAction::End);
                self.bus.emit(&PlayerEvent::Ended);
            }
            SinkEvent::TimeUpdate {
                current_time,
                buffered,
            } => {
                let info = {
                    let mut buffer = self.buffer.lock().expect("engine lock poisoned");
                    buffer.update(current_time, buffered)
                };
                {
                    let mut abr = self.abr.lock().expect("engine lock poisoned");
                    abr.update_forward_buffer(info.forward_buffer);
                }
                self.bus.emit(&PlayerEvent::TimeUpdate { current_time });
            }
            SinkEvent::Progress { buffered } => {
                let current_time = self.sink.current_time();
                let info = {
                    let mut buffer = self.buffer.lock().expect("engine lock poisoned");
                    buffer.update(current_time, buffered)
                };
                let mut abr = self.abr.lock().expect("engine lock poisoned");
                abr.update_forward_buffer(info.forward_buffer);
            }
            SinkEvent::DurationChange { duration } => {
                self.bus.emit(&PlayerEvent::DurationChange { duration });
            }
            // the engine emits `seeking` itself when instructing the sink
            SinkEvent::Seeking { .. } => {}
            SinkEvent::Seeked { position } => {
                self.bus.emit(&PlayerEvent::Seeked { position });
            }
            SinkEvent::VolumeChange { volume, muted } => {
                self.bus.emit(&PlayerEvent::VolumeChange { volume, muted });
            }
            SinkEvent::RateChange { rate } => {
                self.bus.emit(&PlayerEvent::RateChange { rate });
            }
            SinkEvent::LoadedMetadata => {}
            SinkEvent::Error { cause } => {
                let error = classify(cause);
                self.handle_error(error).await;
            }
        }
    }
}

/// Engine-lifetime task translating sink events into core actions.
async fn sink_event_loop(
    inner: Weak<EngineInner>,
    mut rx: broadcast::Receiver<SinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target = "player.session", missed, "sink event stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        inner.dispatch_sink_event(event).await;
    }
}

/// Session-lifetime task translating adapter events into core actions.
/// Exits as soon as its load id is superseded so no stale-session event
/// can escape.
async fn adapter_event_loop(
    inner: Weak<EngineInner>,
    mut rx: broadcast::Receiver<AdapterEvent>,
    my_load_id: u64,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target = "player.session", missed, "adapter event stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        if inner.load_id.load(Ordering::SeqCst) != my_load_id {
            break;
        }
        match event {
            AdapterEvent::SegmentLoaded(timing) => {
                inner.apply_abr_switch(|abr| {
                    abr.record_segment(timing);
                    abr.select_level(Instant::now())
                });
            }
            AdapterEvent::Error(error) => {
                inner.handle_error(error).await;
            }
            AdapterEvent::SubtitleTracksChanged(tracks) => {
                inner.bus.emit(&PlayerEvent::SubtitleTracks { tracks });
            }
        }
    }
}
