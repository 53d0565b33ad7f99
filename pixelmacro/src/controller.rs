use crate::actuator::InputActuator;
use crate::capture::ScreenSampler;
use crate::error::{MacroError, Result};
use crate::events::{EventStore, MacroEvent, Schema};
use crate::hotkeys::{HotkeyConfig, MacroCommand};
use crate::locator::LocatorConfig;
use crate::replay::{ReplayEngine, ReplayOptions, ReplayStats};
use crate::session::{RawInput, RecordingConfig, RecordingSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::Stream;
use tracing::{info, warn};

/// What the tool is currently doing. Recording and playback are mutually
/// exclusive; transitions go through the controller only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Recording,
    Playing,
}

/// A cancellation handle for a running playback
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<ReplayStats>,
}

impl PlaybackHandle {
    /// Request a stop; playback halts within a second
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for playback to end and return its stats
    pub async fn wait(self) -> ReplayStats {
        self.task.await.unwrap_or_default()
    }
}

/// Orchestrates recording and playback over one shared event store.
///
/// Raw input flows in through [`MacroController::run_dispatch_loop`]: hotkey
/// presses become control commands, everything else feeds the recording
/// session while one is active.
pub struct MacroController {
    state: Arc<Mutex<EngineState>>,
    store: Arc<Mutex<EventStore>>,
    session: Mutex<RecordingSession>,
    sampler: ScreenSampler,
    actuator: Arc<dyn InputActuator>,
    hotkeys: HotkeyConfig,
    locator_config: LocatorConfig,
    replay_options: Mutex<ReplayOptions>,
    playback_stop: Mutex<Option<Arc<AtomicBool>>>,
    event_tx: broadcast::Sender<MacroEvent>,
}

impl MacroController {
    pub fn new(
        sampler: ScreenSampler,
        actuator: Arc<dyn InputActuator>,
        mut recording: RecordingConfig,
        hotkeys: HotkeyConfig,
    ) -> Self {
        recording.excluded_keys.extend(hotkeys.excluded_keys());

        let store = Arc::new(Mutex::new(EventStore::new()));
        let (event_tx, _) = broadcast::channel(100);
        let mut session =
            RecordingSession::new(recording, Some(sampler.clone()), Arc::clone(&store));
        session.set_event_sender(event_tx.clone());

        Self {
            state: Arc::new(Mutex::new(EngineState::Idle)),
            store,
            session: Mutex::new(session),
            sampler,
            actuator,
            hotkeys,
            locator_config: LocatorConfig::default(),
            replay_options: Mutex::new(ReplayOptions::default()),
            playback_stop: Mutex::new(None),
            event_tx,
        }
    }

    pub fn with_locator_config(mut self, config: LocatorConfig) -> Self {
        self.locator_config = config;
        self
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    /// A snapshot of the current event store
    pub fn events(&self) -> EventStore {
        self.store.lock().unwrap().clone()
    }

    /// Replace the event store wholesale, e.g. after loading from disk
    pub fn load_events(&self, events: EventStore) -> Result<()> {
        if self.state() != EngineState::Idle {
            return Err(MacroError::StateError(
                "Cannot replace events while recording or playing".to_string(),
            ));
        }
        self.store.lock().unwrap().replace(events.events);
        Ok(())
    }

    /// Pacing options used when playback starts from a hotkey
    pub fn set_replay_options(&self, options: ReplayOptions) {
        *self.replay_options.lock().unwrap() = options;
    }

    /// Live stream of events as they are recorded
    pub fn event_stream(&self) -> impl Stream<Item = MacroEvent> {
        let mut rx = self.event_tx.subscribe();
        Box::pin(async_stream::stream! {
            while let Ok(event) = rx.recv().await {
                yield event;
            }
        })
    }

    /// Begin recording into a cleared store
    pub fn start_recording(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != EngineState::Idle {
            return Err(MacroError::StateError(format!(
                "Cannot start recording while {:?}",
                *state
            )));
        }
        *state = EngineState::Recording;
        drop(state);

        self.session.lock().unwrap().start();
        info!("Recording started");
        Ok(())
    }

    /// End recording and return a snapshot of what was captured
    pub fn stop_recording(&self) -> Result<EventStore> {
        let mut state = self.state.lock().unwrap();
        if *state != EngineState::Recording {
            return Err(MacroError::StateError(
                "No recording in progress".to_string(),
            ));
        }
        *state = EngineState::Idle;
        drop(state);

        self.session.lock().unwrap().stop();
        let snapshot = self.events();
        info!("Recording stopped with {} events", snapshot.len());
        Ok(snapshot)
    }

    /// Start replaying a snapshot of events on a background task
    pub fn start_playback(
        &self,
        events: EventStore,
        options: ReplayOptions,
    ) -> Result<PlaybackHandle> {
        let mut state = self.state.lock().unwrap();
        if *state != EngineState::Idle {
            return Err(MacroError::StateError(format!(
                "Cannot start playback while {:?}",
                *state
            )));
        }
        *state = EngineState::Playing;
        drop(state);

        let stop = Arc::new(AtomicBool::new(false));
        *self.playback_stop.lock().unwrap() = Some(Arc::clone(&stop));

        let engine = ReplayEngine::new(self.sampler.clone(), Arc::clone(&self.actuator))
            .with_locator_config(self.locator_config.clone());
        let state = Arc::clone(&self.state);
        let task_stop = Arc::clone(&stop);

        info!("Playback starting with {} events", events.len());
        let task = tokio::spawn(async move {
            let stats = engine.run(&events.events, &options, &task_stop).await;
            info!(
                "Playback finished: {} played, {} failed, cancelled: {}",
                stats.events_played, stats.events_failed, stats.cancelled
            );
            *state.lock().unwrap() = EngineState::Idle;
            stats
        });

        Ok(PlaybackHandle { stop, task })
    }

    /// Cancel a playback started through this controller
    pub fn stop_playback(&self, handle: &PlaybackHandle) {
        handle.cancel();
    }

    /// Cancel whatever playback is currently running, if any
    pub fn stop_current_playback(&self) {
        if let Some(stop) = self.playback_stop.lock().unwrap().as_ref() {
            stop.store(true, Ordering::Relaxed);
        }
    }

    /// Convert a store between the two persisted schemas. The unified event
    /// model makes the source schema evident from the anchors themselves, so
    /// only the target drives the conversion; anchors re-key live through
    /// the controller's sampler.
    pub fn convert_format(&self, store: &EventStore, from: Schema, to: Schema) -> EventStore {
        info!("Converting {} events from {:?} to {:?}", store.len(), from, to);
        store.convert_to(to, Some(&self.sampler))
    }

    /// Consume raw input until the channel closes, dispatching hotkeys to
    /// commands and everything else to the recording session
    pub async fn run_dispatch_loop(&self, mut rx: UnboundedReceiver<RawInput>) {
        while let Some(raw) = rx.recv().await {
            self.handle_input(raw);
        }
    }

    /// Route one raw input event
    pub fn handle_input(&self, raw: RawInput) {
        if let RawInput::KeyPress { key, .. } = &raw {
            if let Some(command) = self.hotkeys.command_for(key) {
                self.run_command(command);
                return;
            }
        }
        if let RawInput::KeyRelease { key, .. } = &raw {
            if self.hotkeys.command_for(key).is_some() {
                return;
            }
        }
        if self.state() == EngineState::Recording {
            if let Ok(mut session) = self.session.lock() {
                session.handle(raw);
            }
        }
    }

    fn run_command(&self, command: MacroCommand) {
        match command {
            MacroCommand::StartRecording => {
                if let Err(e) = self.start_recording() {
                    warn!("Ignoring start-recording hotkey: {}", e);
                }
            }
            MacroCommand::StopRecording => {
                if let Err(e) = self.stop_recording() {
                    warn!("Ignoring stop-recording hotkey: {}", e);
                }
            }
            MacroCommand::StartPlayback => {
                let events = self.events();
                let options = self.replay_options.lock().unwrap().clone();
                match self.start_playback(events, options) {
                    // The task runs detached; the stop flag stays reachable
                    // through stop_current_playback.
                    Ok(_handle) => {}
                    Err(e) => warn!("Ignoring start-playback hotkey: {}", e),
                }
            }
            MacroCommand::StopPlayback => self.stop_current_playback(),
        }
    }
}
