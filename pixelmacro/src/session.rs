use crate::capture::ScreenSampler;
use crate::classifier::{classify, ClassifierConfig, Gesture, GestureShape};
use crate::events::{Anchor, EventStore, MacroEvent, MouseButton, Position, Rect, TrackPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How the session captures a relocation anchor at button press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// No anchor; replay acts at the recorded coordinates
    None,
    /// Capture the pixel color under the press position
    Color,
    /// Capture a square image patch centered on the press position
    Template { size: u32 },
}

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Whether to record mouse gestures
    pub record_mouse: bool,

    /// Whether to record keyboard events
    pub record_keyboard: bool,

    /// Whether to record right/middle-button gestures
    pub record_secondary_buttons: bool,

    /// How to capture relocation anchors at press time
    pub anchor_mode: AnchorMode,

    /// Minimum time between buffered pointer samples (seconds)
    pub min_sample_interval: f64,

    /// Click/drag classification thresholds
    pub classifier: ClassifierConfig,

    /// Key names excluded from the captured stream (the control hotkeys)
    pub excluded_keys: HashSet<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            record_mouse: true,
            record_keyboard: true,
            record_secondary_buttons: true,
            anchor_mode: AnchorMode::Template { size: 40 },
            min_sample_interval: 0.005,
            classifier: ClassifierConfig::default(),
            excluded_keys: HashSet::new(),
        }
    }
}

/// A raw input notification from the OS listener thread
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    ButtonPress {
        button: MouseButton,
        pos: Position,
        timestamp: f64,
    },
    ButtonRelease {
        button: MouseButton,
        pos: Position,
        timestamp: f64,
    },
    PointerMove {
        pos: Position,
        timestamp: f64,
    },
    KeyPress {
        key: String,
        timestamp: f64,
    },
    KeyRelease {
        key: String,
        timestamp: f64,
    },
}

struct GestureInProgress {
    button: MouseButton,
    press: TrackPoint,
    samples: Vec<TrackPoint>,
    anchor: Option<Anchor>,
    last_sample_ts: f64,
}

/// Folds raw input into classified macro events.
///
/// Owns the per-gesture sub-state between a press and the matching release
/// on the same button; an in-flight gesture is discarded, not stored, when
/// the session stops.
pub struct RecordingSession {
    config: RecordingConfig,
    sampler: Option<ScreenSampler>,
    store: Arc<Mutex<EventStore>>,
    event_tx: Option<broadcast::Sender<MacroEvent>>,
    gesture: Option<GestureInProgress>,
    last_event_time: Option<f64>,
}

impl RecordingSession {
    pub fn new(
        config: RecordingConfig,
        sampler: Option<ScreenSampler>,
        store: Arc<Mutex<EventStore>>,
    ) -> Self {
        Self {
            config,
            sampler,
            store,
            event_tx: None,
            gesture: None,
            last_event_time: None,
        }
    }

    /// Broadcast every appended event to live subscribers
    pub fn set_event_sender(&mut self, tx: broadcast::Sender<MacroEvent>) {
        self.event_tx = Some(tx);
    }

    /// Begin a fresh recording: clears the store and resets timing state
    pub fn start(&mut self) {
        if let Ok(mut store) = self.store.lock() {
            store.clear();
        }
        self.gesture = None;
        self.last_event_time = None;
    }

    /// End the recording, discarding any gesture still awaiting its release
    pub fn stop(&mut self) {
        if self.gesture.take().is_some() {
            debug!("Discarding in-flight gesture at recording stop");
        }
    }

    /// Process one raw input notification
    pub fn handle(&mut self, input: RawInput) {
        match input {
            RawInput::ButtonPress {
                button,
                pos,
                timestamp,
            } => self.on_press(button, pos, timestamp),
            RawInput::ButtonRelease {
                button,
                pos,
                timestamp,
            } => self.on_release(button, pos, timestamp),
            RawInput::PointerMove { pos, timestamp } => self.on_move(pos, timestamp),
            RawInput::KeyPress { key, timestamp } => self.on_key(key, timestamp, true),
            RawInput::KeyRelease { key, timestamp } => self.on_key(key, timestamp, false),
        }
    }

    fn on_press(&mut self, button: MouseButton, pos: Position, timestamp: f64) {
        if !self.config.record_mouse {
            return;
        }
        if button != MouseButton::Left && !self.config.record_secondary_buttons {
            return;
        }
        if self.gesture.is_some() {
            warn!("Button press while a gesture was already in progress; replacing it");
        }
        let press = TrackPoint { pos, timestamp };
        self.gesture = Some(GestureInProgress {
            button,
            press,
            samples: vec![press],
            anchor: self.capture_anchor(pos),
            last_sample_ts: timestamp,
        });
    }

    fn on_move(&mut self, pos: Position, timestamp: f64) {
        if let Some(gesture) = &mut self.gesture {
            if timestamp - gesture.last_sample_ts >= self.config.min_sample_interval {
                gesture.samples.push(TrackPoint { pos, timestamp });
                gesture.last_sample_ts = timestamp;
            }
        }
    }

    fn on_release(&mut self, button: MouseButton, pos: Position, timestamp: f64) {
        let Some(gesture) = &self.gesture else {
            return;
        };
        // Only a release on the pressed button completes the gesture.
        if gesture.button != button {
            return;
        }
        let gesture = self.gesture.take().expect("gesture checked above");

        let shape = classify(
            &Gesture {
                press: gesture.press,
                release: TrackPoint { pos, timestamp },
                samples: gesture.samples,
            },
            &self.config.classifier,
        );

        let delay = self.delay_since_last(timestamp);
        let event = match shape {
            GestureShape::Click { pos } => MacroEvent::Click {
                pos,
                button: gesture.button,
                anchor: gesture.anchor,
                timestamp,
                delay,
            },
            GestureShape::Drag {
                start,
                end,
                duration,
                samples,
            } => MacroEvent::Drag {
                start,
                end,
                button: gesture.button,
                anchor: gesture.anchor,
                timestamp,
                delay,
                duration,
                samples,
            },
        };
        self.append(event);
        self.last_event_time = Some(timestamp);
    }

    fn on_key(&mut self, key: String, timestamp: f64, is_press: bool) {
        if !self.config.record_keyboard {
            return;
        }
        if self.config.excluded_keys.contains(&key) {
            return;
        }
        if is_press {
            let delay = self.delay_since_last(timestamp);
            self.append(MacroEvent::KeyPress {
                key,
                timestamp,
                delay,
            });
            self.last_event_time = Some(timestamp);
        } else {
            // Releases pace with their press, so they carry no delay and do
            // not advance the inter-event clock.
            self.append(MacroEvent::KeyRelease {
                key,
                timestamp,
                delay: 0.0,
            });
        }
    }

    fn delay_since_last(&self, now: f64) -> f64 {
        self.last_event_time
            .map(|t| (now - t).max(0.0))
            .unwrap_or(0.0)
    }

    fn capture_anchor(&self, pos: Position) -> Option<Anchor> {
        let sampler = self.sampler.as_ref()?;
        match self.config.anchor_mode {
            AnchorMode::None => None,
            AnchorMode::Color => match sampler.pixel_color(pos) {
                Ok(rgb) => Some(Anchor::Color { rgb }),
                Err(e) => {
                    warn!("Color anchor capture failed at {:?}: {}", pos, e);
                    None
                }
            },
            AnchorMode::Template { size } => {
                let rect = Rect::centered(pos, size / 2);
                match sampler.capture_region(rect) {
                    Ok(image) => Some(Anchor::Template {
                        path: None,
                        origin: pos,
                        image: Some(image),
                    }),
                    Err(e) => {
                        warn!("Template anchor capture failed at {:?}: {}", pos, e);
                        None
                    }
                }
            }
        }
    }

    fn append(&self, event: MacroEvent) {
        debug!("Recorded {} event", event.kind());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event.clone());
        }
        if let Ok(mut store) = self.store.lock() {
            store.push(event);
        }
    }
}
