use pixelmacro::*;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelmacro=debug".into()),
        )
        .try_init();
}

/// Actuator double that records the calls replay makes
#[derive(Default)]
struct SpyActuator {
    calls: Mutex<Vec<String>>,
}

impl SpyActuator {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl InputActuator for SpyActuator {
    fn move_to(&self, pos: Position) -> Result<()> {
        self.log(format!("move {},{}", pos.x, pos.y));
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        self.log(format!("down {:?}", button));
        Ok(())
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        self.log(format!("up {:?}", button));
        Ok(())
    }

    fn key_down(&self, key: &str) -> Result<()> {
        self.log(format!("key_down {key}"));
        Ok(())
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.log(format!("key_up {key}"));
        Ok(())
    }
}

fn test_sampler() -> ScreenSampler {
    ScreenSampler::new(Arc::new(BufferScreen::solid(300, 300, (30, 30, 30))))
}

fn press(x: i32, y: i32, t: f64) -> RawInput {
    RawInput::ButtonPress {
        button: MouseButton::Left,
        pos: Position::new(x, y),
        timestamp: t,
    }
}

fn release(x: i32, y: i32, t: f64) -> RawInput {
    RawInput::ButtonRelease {
        button: MouseButton::Left,
        pos: Position::new(x, y),
        timestamp: t,
    }
}

fn pointer_move(x: i32, y: i32, t: f64) -> RawInput {
    RawInput::PointerMove {
        pos: Position::new(x, y),
        timestamp: t,
    }
}

#[test]
fn quick_tap_records_exactly_one_click() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(Mutex::new(EventStore::new()));
    let mut session = RecordingSession::new(
        RecordingConfig {
            anchor_mode: AnchorMode::None,
            ..Default::default()
        },
        None,
        Arc::clone(&store),
    );
    session.start();

    session.handle(press(10, 10, 5.0));
    session.handle(release(10, 10, 5.05));
    session.stop();

    let store = store.lock().unwrap();
    assert_eq!(store.len(), 1);
    match &store.events[0] {
        MacroEvent::Click { pos, delay, .. } => {
            assert_eq!(*pos, Position::new(10, 10));
            assert_eq!(*delay, 0.0);
        }
        other => panic!("expected a click, got {:?}", other),
    }
    Ok(())
}

#[test]
fn horizontal_sweep_records_one_drag_with_samples() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(Mutex::new(EventStore::new()));
    let mut session = RecordingSession::new(
        RecordingConfig {
            anchor_mode: AnchorMode::None,
            ..Default::default()
        },
        None,
        Arc::clone(&store),
    );
    session.start();

    session.handle(press(10, 10, 5.0));
    session.handle(pointer_move(20, 10, 5.1));
    session.handle(pointer_move(40, 10, 5.2));
    session.handle(pointer_move(60, 10, 5.25));
    session.handle(release(60, 10, 5.3));

    let store = store.lock().unwrap();
    assert_eq!(store.len(), 1);
    match &store.events[0] {
        MacroEvent::Drag {
            start,
            end,
            samples,
            ..
        } => {
            assert_eq!(*start, Position::new(10, 10));
            assert_eq!(*end, Position::new(60, 10));
            assert!(samples.len() >= 2, "got {} samples", samples.len());
            assert_eq!(samples[0], DragSample { dx: 0, dy: 0, dt: 0.0 });
        }
        other => panic!("expected a drag, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn replay_waits_out_inter_event_delays_but_not_before_the_first() {
    init_tracing();
    let actuator = Arc::new(SpyActuator::default());
    let engine = ReplayEngine::new(test_sampler(), Arc::clone(&actuator) as Arc<dyn InputActuator>);

    let events: Vec<MacroEvent> = [0.0, 0.05, 0.10]
        .iter()
        .enumerate()
        .map(|(i, delay)| MacroEvent::KeyPress {
            key: "a".into(),
            timestamp: i as f64,
            delay: *delay,
        })
        .collect();

    let started = Instant::now();
    let stats = engine.play_once(&events, &AtomicBool::new(false)).await;
    let elapsed = started.elapsed();

    assert_eq!(stats.events_played, 3);
    assert!(
        elapsed >= Duration::from_millis(150),
        "replay finished too fast: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(600),
        "replay slept before the first event: {:?}",
        elapsed
    );
    assert_eq!(actuator.calls().len(), 3);
}

#[tokio::test]
async fn stopping_during_the_repeat_wait_halts_within_a_second() {
    init_tracing();
    let sampler = test_sampler();
    let actuator: Arc<dyn InputActuator> = Arc::new(SpyActuator::default());
    let controller = MacroController::new(
        sampler,
        actuator,
        RecordingConfig {
            anchor_mode: AnchorMode::None,
            ..Default::default()
        },
        HotkeyConfig::default(),
    );

    let mut store = EventStore::new();
    store.push(MacroEvent::KeyPress {
        key: "a".into(),
        timestamp: 0.0,
        delay: 0.0,
    });

    let handle = controller
        .start_playback(
            store,
            ReplayOptions {
                start_delay_secs: 0,
                repeat_minutes: Some(5),
            },
        )
        .unwrap();

    // Let the first pass finish and the repeat wait begin, then stop.
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.stop_playback(&handle);

    let waited = Instant::now();
    let stats = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("playback must halt promptly after cancellation");
    assert!(waited.elapsed() < Duration::from_millis(1500));
    assert!(stats.cancelled);
    assert_eq!(stats.runs_completed, 1);
    assert_eq!(controller.state(), EngineState::Idle);
}

#[tokio::test]
async fn record_save_load_replay_pipeline() -> anyhow::Result<()> {
    init_tracing();

    // Record: one click and one drag against a synthetic screen.
    let mut screen = BufferScreen::solid(300, 300, (30, 30, 30));
    screen.put_pixel(Position::new(51, 51), (250, 10, 10));
    let sampler = ScreenSampler::new(Arc::new(screen));

    let store = Arc::new(Mutex::new(EventStore::new()));
    let mut session = RecordingSession::new(
        RecordingConfig {
            anchor_mode: AnchorMode::Color,
            ..Default::default()
        },
        Some(sampler.clone()),
        Arc::clone(&store),
    );
    session.start();
    session.handle(press(51, 51, 1.0));
    session.handle(release(51, 51, 1.05));
    session.handle(press(51, 51, 2.0));
    session.handle(pointer_move(80, 51, 2.1));
    session.handle(pointer_move(101, 51, 2.2));
    session.handle(release(101, 51, 2.3));
    session.stop();
    let recorded = store.lock().unwrap().clone();
    assert_eq!(recorded.len(), 2);

    // Persist and reload.
    let dir = tempfile::tempdir()?;
    let storage = MacroStorage::new(dir.path())?;
    let path = storage.save(&recorded, "pipeline")?;
    let loaded = storage.load(&path)?;
    assert_eq!(loaded.len(), recorded.len());
    assert_eq!(loaded, recorded);

    // Replay against the same screen: the anchors resolve in place.
    let actuator = Arc::new(SpyActuator::default());
    let engine = ReplayEngine::new(sampler, Arc::clone(&actuator) as Arc<dyn InputActuator>);
    let stats = engine
        .play_once(&loaded.events, &AtomicBool::new(false))
        .await;

    assert_eq!(stats.events_played, 2);
    assert_eq!(stats.events_failed, 0);
    let calls = actuator.calls();
    assert!(calls.contains(&"move 51,51".to_string()));
    assert!(calls.iter().any(|c| c.starts_with("down")));
    assert!(calls.iter().any(|c| c.starts_with("up")));
    Ok(())
}

#[tokio::test]
async fn event_stream_delivers_recorded_events() {
    init_tracing();
    let controller = Arc::new(MacroController::new(
        test_sampler(),
        Arc::new(SpyActuator::default()) as Arc<dyn InputActuator>,
        RecordingConfig {
            anchor_mode: AnchorMode::None,
            ..Default::default()
        },
        HotkeyConfig::default(),
    ));

    let mut stream = controller.event_stream();
    controller.start_recording().unwrap();
    controller.handle_input(press(10, 10, 1.0));
    controller.handle_input(release(10, 10, 1.05));

    let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("an event should arrive")
        .expect("stream should stay open");
    assert!(matches!(event, MacroEvent::Click { .. }));
    controller.stop_recording().unwrap();
}

#[test]
fn schema_conversion_round_trip_is_lossy_only_one_way() {
    let mut store = EventStore::new();
    store.push(MacroEvent::Click {
        pos: Position::new(5, 5),
        button: MouseButton::Left,
        anchor: None,
        timestamp: 1.0,
        delay: 0.0,
    });
    store.push(MacroEvent::Click {
        pos: Position::new(6, 6),
        button: MouseButton::Right,
        anchor: None,
        timestamp: 2.0,
        delay: 1.0,
    });
    store.push(MacroEvent::KeyPress {
        key: "x".into(),
        timestamp: 3.0,
        delay: 1.0,
    });

    let template = store.convert_to(Schema::TemplateAnchor, None);
    assert_eq!(template.len(), 3);

    let color = store.convert_to(Schema::ColorAnchor, None);
    assert_eq!(color.len(), 1);
    assert!(matches!(
        &color.events[0],
        MacroEvent::Click {
            button: MouseButton::Left,
            ..
        }
    ));
}
