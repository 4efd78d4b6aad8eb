//! Scripted sink/adapter/surface doubles for engine integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;

use adaptive_player::adapter::{Adapter, AdapterEvent, AdapterFactory};
use adaptive_player::errors::PlayerResult;
use adaptive_player::events::{PlayerEvent, PlayerEventKind};
use adaptive_player::models::{
    BufferedRange, QualityLevel, SourceConfig, SubtitleTrack, TrackKind,
};
use adaptive_player::queue::{AppendSurface, SurfaceError};
use adaptive_player::session::PlayerEngine;
use adaptive_player::sink::{SinkEvent, SinkPlayError, VideoSink};

/// Two-level ladder used across the scenarios.
pub fn test_levels() -> Vec<QualityLevel> {
    vec![
        QualityLevel {
            index: 0,
            bitrate: 500_000,
            width: 426,
            height: 240,
            codec: None,
            frame_rate: None,
            label: "240p".into(),
        },
        QualityLevel {
            index: 1,
            bitrate: 2_000_000,
            width: 1280,
            height: 720,
            codec: None,
            frame_rate: None,
            label: "720p".into(),
        },
    ]
}

struct SinkState {
    current_time: f64,
    duration: f64,
    paused: bool,
    ended: bool,
    volume: f64,
    muted: bool,
    rate: f64,
    src: Option<String>,
}

/// Scripted video sink. Setters mutate state and emit the matching sink
/// events the way a real media element would.
pub struct MockSink {
    state: Mutex<SinkState>,
    tx: broadcast::Sender<SinkEvent>,
    play_results: Mutex<VecDeque<Result<(), SinkPlayError>>>,
    pub play_calls: AtomicUsize,
    pub pause_calls: AtomicUsize,
    pub muted_calls: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(SinkState {
                current_time: 0.0,
                duration: 600.0,
                paused: true,
                ended: false,
                volume: 1.0,
                muted: false,
                rate: 1.0,
                src: None,
            }),
            tx,
            play_results: Mutex::new(VecDeque::new()),
            play_calls: AtomicUsize::new(0),
            pause_calls: AtomicUsize::new(0),
            muted_calls: AtomicUsize::new(0),
        })
    }

    pub fn script_play_result(&self, result: Result<(), SinkPlayError>) {
        self.play_results.lock().unwrap().push_back(result);
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().unwrap().duration = duration;
    }

    pub fn emit(&self, event: SinkEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a timeupdate with a single buffered range.
    pub fn emit_time(&self, current_time: f64, range: (f64, f64)) {
        self.state.lock().unwrap().current_time = current_time;
        self.emit(SinkEvent::TimeUpdate {
            current_time,
            buffered: vec![BufferedRange::new(range.0, range.1)],
        });
    }

    pub fn src(&self) -> Option<String> {
        self.state.lock().unwrap().src.clone()
    }
}

#[async_trait]
impl VideoSink for MockSink {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }
    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }
    fn paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }
    fn ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }
    fn ready_state(&self) -> u8 {
        4
    }
    fn buffered(&self) -> Vec<BufferedRange> {
        Vec::new()
    }
    fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }
    fn muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }
    fn playback_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }

    async fn play(&self) -> Result<(), SinkPlayError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.play_results.lock().unwrap().pop_front();
        match scripted.unwrap_or(Ok(())) {
            Ok(()) => {
                self.state.lock().unwrap().paused = false;
                self.emit(SinkEvent::Playing);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn pause(&self) {
        self.pause_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if !state.paused {
            state.paused = true;
            drop(state);
            self.emit(SinkEvent::Pause);
        }
    }

    fn load(&self) {}

    fn set_current_time(&self, t: f64) {
        self.state.lock().unwrap().current_time = t;
        self.emit(SinkEvent::Seeked { position: t });
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().unwrap().volume = volume;
        let (volume, muted) = {
            let state = self.state.lock().unwrap();
            (state.volume, state.muted)
        };
        self.emit(SinkEvent::VolumeChange { volume, muted });
    }

    fn set_muted(&self, muted: bool) {
        self.muted_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().muted = muted;
        let volume = self.state.lock().unwrap().volume;
        self.emit(SinkEvent::VolumeChange { volume, muted });
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().unwrap().rate = rate;
        self.emit(SinkEvent::RateChange { rate });
    }

    fn set_src(&self, src: Option<String>) {
        self.state.lock().unwrap().src = src;
    }

    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }
}

/// Scripted source adapter with configurable await points.
pub struct MockAdapter {
    levels: Vec<QualityLevel>,
    tx: broadcast::Sender<AdapterEvent>,
    pub destroyed: AtomicBool,
    pub attach_delay: Duration,
    pub load_delay: Duration,
    load_error: Mutex<Option<adaptive_player::PlayerError>>,
    quality: Mutex<Option<usize>>,
    pub quality_sets: Mutex<Vec<Option<usize>>>,
    subtitles: Vec<SubtitleTrack>,
    current_subtitle: Mutex<Option<String>>,
}

impl MockAdapter {
    fn build(levels: Vec<QualityLevel>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            levels,
            tx,
            destroyed: AtomicBool::new(false),
            attach_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            load_error: Mutex::new(None),
            quality: Mutex::new(None),
            quality_sets: Mutex::new(Vec::new()),
            subtitles: Vec::new(),
            current_subtitle: Mutex::new(None),
        }
    }

    pub fn new(levels: Vec<QualityLevel>) -> Arc<Self> {
        Arc::new(Self::build(levels))
    }

    pub fn with_attach_delay(levels: Vec<QualityLevel>, delay: Duration) -> Arc<Self> {
        let mut adapter = Self::build(levels);
        adapter.attach_delay = delay;
        Arc::new(adapter)
    }

    pub fn script_load_error(&self, error: adaptive_player::PlayerError) {
        *self.load_error.lock().unwrap() = Some(error);
    }

    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.tx.send(event);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn attach(&self, _sink: Arc<dyn VideoSink>) -> PlayerResult<()> {
        if !self.attach_delay.is_zero() {
            tokio::time::sleep(self.attach_delay).await;
        }
        Ok(())
    }

    async fn load(&self, _source: &SourceConfig) -> PlayerResult<()> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        match self.load_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn quality_levels(&self) -> Vec<QualityLevel> {
        self.levels.clone()
    }

    fn set_quality_level(&self, index: Option<usize>) {
        *self.quality.lock().unwrap() = index;
        self.quality_sets.lock().unwrap().push(index);
    }

    fn current_quality_level(&self) -> Option<usize> {
        *self.quality.lock().unwrap()
    }

    fn subtitle_tracks(&self) -> Vec<SubtitleTrack> {
        self.subtitles.clone()
    }

    fn set_subtitle_track(&self, id: Option<&str>) {
        *self.current_subtitle.lock().unwrap() = id.map(str::to_owned);
    }

    fn current_subtitle_track(&self) -> Option<String> {
        self.current_subtitle.lock().unwrap().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.tx.subscribe()
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out a scripted queue of adapters, one per `create`.
pub struct MockFactory {
    adapters: Mutex<VecDeque<Arc<MockAdapter>>>,
}

impl MockFactory {
    pub fn new(adapters: Vec<Arc<MockAdapter>>) -> Arc<Self> {
        Arc::new(Self {
            adapters: Mutex::new(adapters.into()),
        })
    }
}

impl AdapterFactory for MockFactory {
    fn create(&self, _source: &SourceConfig) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .lock()
            .unwrap()
            .pop_front()
            .map(|a| a as Arc<dyn Adapter>)
    }
}

/// Append surface that records operations and always succeeds.
pub struct MockSurface {
    pub ops: Mutex<Vec<String>>,
    pub releases: AtomicUsize,
}

impl MockSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AppendSurface for MockSurface {
    fn is_updating(&self) -> bool {
        false
    }

    async fn append(
        &self,
        track: TrackKind,
        data: Bytes,
        _timestamp_offset: Option<f64>,
    ) -> Result<(), SurfaceError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("append:{track:?}:{}", data.len()));
        Ok(())
    }

    async fn remove(&self, track: TrackKind, start: f64, end: f64) -> Result<(), SurfaceError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("remove:{track:?}:{start}:{end}"));
        Ok(())
    }

    fn abort(&self) {}

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Compact, order-preserving tags for every event the engine emits.
pub fn record_all_events(engine: &PlayerEngine) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in PlayerEventKind::iter() {
        let log = log.clone();
        engine.on(kind, move |event| {
            log.lock().unwrap().push(tag(event));
        });
    }
    log
}

fn tag(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::StateChange { from, to, .. } => format!("statechange:{from}->{to}"),
        PlayerEvent::TimeUpdate { .. } => "timeupdate".into(),
        PlayerEvent::DurationChange { .. } => "durationchange".into(),
        PlayerEvent::BufferUpdate(_) => "bufferupdate".into(),
        PlayerEvent::BufferLow { .. } => "bufferlow".into(),
        PlayerEvent::BufferSufficient => "buffersufficient".into(),
        PlayerEvent::BufferEvicted { start, end } => format!("bufferevicted:{start}-{end}"),
        PlayerEvent::QualityLevels { levels } => format!("qualitylevels:{}", levels.len()),
        PlayerEvent::QualityChange { level, auto } => {
            format!("qualitychange:{}:auto={auto}", level.index)
        }
        PlayerEvent::AbrUpdate(_) => "abrupdate".into(),
        PlayerEvent::RateChange { .. } => "ratechange".into(),
        PlayerEvent::VolumeChange { .. } => "volumechange".into(),
        PlayerEvent::Seeking { target } => format!("seeking:{target}"),
        PlayerEvent::Seeked { .. } => "seeked".into(),
        PlayerEvent::Waiting => "waiting".into(),
        PlayerEvent::CanPlay => "canplay".into(),
        PlayerEvent::Ended => "ended".into(),
        PlayerEvent::Loaded { url } => format!("loaded:{url}"),
        PlayerEvent::Error { error } => format!("error:{}", error.code),
        PlayerEvent::Fatal { error } => format!("fatal:{}", error.code),
        PlayerEvent::Recovery { attempt, .. } => format!("recovery:{attempt}"),
        PlayerEvent::Recovered { code, .. } => format!("recovered:{code}"),
        PlayerEvent::Destroyed => "destroyed".into(),
        PlayerEvent::SubtitleTracks { tracks } => format!("subtitletracks:{}", tracks.len()),
        PlayerEvent::SubtitleTrackChange { track_id } => {
            format!("subtitletrackchange:{track_id:?}")
        }
    }
}

/// Let the engine's dispatch tasks run (paused-clock friendly).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
