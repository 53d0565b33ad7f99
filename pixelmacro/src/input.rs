use crate::error::{MacroError, Result};
use crate::events::{MouseButton, Position};
use crate::keymap;
use crate::session::RawInput;
use rdev::{listen, Event, EventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Global input listener backed by rdev.
///
/// Runs `rdev::listen` on a dedicated thread and forwards raw input over a
/// channel. rdev's listen loop cannot be torn down once started, so
/// `stop()` silences forwarding; the thread itself lives until process
/// exit. Button events carry no position, so the listener tracks the last
/// pointer position itself.
pub struct RdevListener {
    forwarding: Arc<AtomicBool>,
}

impl RdevListener {
    /// Start listening and forward every raw input event into `tx`
    pub fn spawn(tx: UnboundedSender<RawInput>) -> Result<Self> {
        let forwarding = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&forwarding);

        thread::Builder::new()
            .name("pixelmacro-input".to_string())
            .spawn(move || {
                info!("Input listener thread started");
                let mut last_pos = Position::new(0, 0);
                let result = listen(move |event: Event| {
                    if let EventType::MouseMove { x, y } = event.event_type {
                        last_pos = Position::new(x as i32, y as i32);
                    }
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(raw) = to_raw_input(&event, last_pos) {
                        let _ = tx.send(raw);
                    }
                });
                if let Err(e) = result {
                    error!("Input listener failed: {:?}", e);
                }
            })
            .map_err(|e| {
                MacroError::InitializationError(format!("Could not spawn listener thread: {}", e))
            })?;

        Ok(Self { forwarding })
    }

    /// Stop forwarding events. Idempotent.
    pub fn stop(&self) {
        self.forwarding.store(false, Ordering::Relaxed);
    }

    /// Resume forwarding after a `stop()`
    pub fn resume(&self) {
        self.forwarding.store(true, Ordering::Relaxed);
    }
}

fn to_raw_input(event: &Event, last_pos: Position) -> Option<RawInput> {
    let timestamp = unix_time(event.time);
    match event.event_type {
        EventType::MouseMove { x, y } => Some(RawInput::PointerMove {
            pos: Position::new(x as i32, y as i32),
            timestamp,
        }),
        EventType::ButtonPress(button) => Some(RawInput::ButtonPress {
            button: map_button(button)?,
            pos: last_pos,
            timestamp,
        }),
        EventType::ButtonRelease(button) => Some(RawInput::ButtonRelease {
            button: map_button(button)?,
            pos: last_pos,
            timestamp,
        }),
        EventType::KeyPress(key) => Some(RawInput::KeyPress {
            key: key_label(event, key)?,
            timestamp,
        }),
        EventType::KeyRelease(key) => Some(RawInput::KeyRelease {
            key: keymap::name_for_key(key)?,
            timestamp,
        }),
        EventType::Wheel { .. } => None,
    }
}

fn map_button(button: rdev::Button) -> Option<MouseButton> {
    match button {
        rdev::Button::Left => Some(MouseButton::Left),
        rdev::Button::Right => Some(MouseButton::Right),
        rdev::Button::Middle => Some(MouseButton::Middle),
        rdev::Button::Unknown(_) => None,
    }
}

/// The stored name for a pressed key: the event's unicode text when it is a
/// single printable character (folded through [`keymap::char_name`] so the
/// press matches its release), otherwise the vocabulary name
fn key_label(event: &Event, key: rdev::Key) -> Option<String> {
    if let Some(name) = &event.name {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() && !c.is_whitespace() {
                return Some(keymap::char_name(c));
            }
        }
    }
    keymap::name_for_key(key)
}

fn unix_time(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(key: rdev::Key, name: Option<&str>) -> Event {
        Event {
            event_type: EventType::KeyPress(key),
            time: SystemTime::now(),
            name: name.map(|s| s.to_string()),
        }
    }

    #[test]
    fn printable_text_wins_over_the_key_table() {
        let event = key_event(rdev::Key::KeyA, Some("A"));
        assert_eq!(key_label(&event, rdev::Key::KeyA).as_deref(), Some("a"));
    }

    #[test]
    fn control_keys_use_the_vocabulary_name() {
        let event = key_event(rdev::Key::Return, Some("\r"));
        assert_eq!(key_label(&event, rdev::Key::Return).as_deref(), Some("enter"));
        let event = key_event(rdev::Key::F2, None);
        assert_eq!(key_label(&event, rdev::Key::F2).as_deref(), Some("f2"));
    }

    #[test]
    fn shifted_symbols_record_the_key_that_produced_them() {
        // Shift+1 reports "!" as its unicode text but the release only
        // carries Num1; both sides must store the same replayable name.
        let event = key_event(rdev::Key::Num1, Some("!"));
        assert_eq!(key_label(&event, rdev::Key::Num1).as_deref(), Some("1"));
        assert_eq!(keymap::name_for_key(rdev::Key::Num1).as_deref(), Some("1"));
    }

    #[test]
    fn button_events_carry_the_tracked_pointer_position() {
        let event = Event {
            event_type: EventType::ButtonPress(rdev::Button::Left),
            time: SystemTime::now(),
            name: None,
        };
        match to_raw_input(&event, Position::new(12, 34)) {
            Some(RawInput::ButtonPress { button, pos, .. }) => {
                assert_eq!(button, MouseButton::Left);
                assert_eq!(pos, Position::new(12, 34));
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
