use crate::error::{MacroError, Result};
use crate::events::{MouseButton, Position};
use crate::keymap;
use rdev::{simulate, EventType};
use tracing::trace;

/// OS-level input injection, kept behind a trait so replay can run against
/// a recording double in tests
pub trait InputActuator: Send + Sync {
    fn move_to(&self, pos: Position) -> Result<()>;
    fn button_down(&self, button: MouseButton) -> Result<()>;
    fn button_up(&self, button: MouseButton) -> Result<()>;
    fn key_down(&self, key: &str) -> Result<()>;
    fn key_up(&self, key: &str) -> Result<()>;

    /// Move to a position and click there
    fn click(&self, pos: Position, button: MouseButton) -> Result<()> {
        self.move_to(pos)?;
        self.button_down(button)?;
        self.button_up(button)
    }
}

/// Injects input through rdev
pub struct RdevActuator;

impl RdevActuator {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, event_type: &EventType) -> Result<()> {
        trace!("simulate {:?}", event_type);
        simulate(event_type)
            .map_err(|e| MacroError::ActuatorError(format!("simulate failed: {:?}", e)))
    }
}

impl Default for RdevActuator {
    fn default() -> Self {
        Self::new()
    }
}

fn rdev_button(button: MouseButton) -> rdev::Button {
    match button {
        MouseButton::Left => rdev::Button::Left,
        MouseButton::Right => rdev::Button::Right,
        MouseButton::Middle => rdev::Button::Middle,
    }
}

fn rdev_key(key: &str) -> Result<rdev::Key> {
    keymap::key_for_name(key)
        .ok_or_else(|| MacroError::ActuatorError(format!("Unknown key name '{}'", key)))
}

impl InputActuator for RdevActuator {
    fn move_to(&self, pos: Position) -> Result<()> {
        self.send(&EventType::MouseMove {
            x: pos.x as f64,
            y: pos.y as f64,
        })
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        self.send(&EventType::ButtonPress(rdev_button(button)))
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        self.send(&EventType::ButtonRelease(rdev_button(button)))
    }

    fn key_down(&self, key: &str) -> Result<()> {
        self.send(&EventType::KeyPress(rdev_key(key)?))
    }

    fn key_up(&self, key: &str) -> Result<()> {
        self.send(&EventType::KeyRelease(rdev_key(key)?))
    }
}
