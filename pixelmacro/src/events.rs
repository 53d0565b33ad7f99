use crate::capture::ScreenSampler;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// A screen position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance(&self, other: Position) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// The position shifted by the given offset
    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Position { x, y }
    }
}

impl From<Position> for (i32, i32) {
    fn from(pos: Position) -> Self {
        (pos.x, pos.y)
    }
}

/// A rectangular screen region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A square region of the given radius centered on `center`
    pub fn centered(center: Position, radius: u32) -> Self {
        Self {
            x: center.x - radius as i32,
            y: center.y - radius as i32,
            width: radius * 2 + 1,
            height: radius * 2 + 1,
        }
    }
}

/// A mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A visual reference captured at record time, used at replay time to
/// re-locate the target position on the live screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    /// The pixel color under the press position
    Color { rgb: (u8, u8, u8) },

    /// A rectangular image patch centered on the press position
    Template {
        /// Where the patch image persists on disk, if it has been saved
        path: Option<PathBuf>,

        /// The screen position the patch was captured around
        origin: Position,

        /// In-memory pixel data; never serialized, stripped before save
        #[serde(skip)]
        image: Option<RgbaImage>,
    },
}

/// An absolute pointer sample buffered while a gesture is in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub pos: Position,
    pub timestamp: f64,
}

/// A stored drag sample: offset from the first sample's position, plus the
/// time delta from the previous sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragSample {
    pub dx: i32,
    pub dy: i32,
    pub dt: f64,
}

/// A recorded macro event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MacroEvent {
    Click {
        pos: Position,
        button: MouseButton,
        anchor: Option<Anchor>,
        timestamp: f64,
        delay: f64,
    },
    Drag {
        start: Position,
        end: Position,
        button: MouseButton,
        anchor: Option<Anchor>,
        timestamp: f64,
        delay: f64,
        duration: f64,
        samples: Vec<DragSample>,
    },
    KeyPress {
        key: String,
        timestamp: f64,
        delay: f64,
    },
    KeyRelease {
        key: String,
        timestamp: f64,
        delay: f64,
    },
}

impl MacroEvent {
    /// Seconds to wait before dispatching this event during replay
    pub fn delay(&self) -> f64 {
        match self {
            MacroEvent::Click { delay, .. }
            | MacroEvent::Drag { delay, .. }
            | MacroEvent::KeyPress { delay, .. }
            | MacroEvent::KeyRelease { delay, .. } => *delay,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            MacroEvent::Click { timestamp, .. }
            | MacroEvent::Drag { timestamp, .. }
            | MacroEvent::KeyPress { timestamp, .. }
            | MacroEvent::KeyRelease { timestamp, .. } => *timestamp,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            MacroEvent::Click { .. } => "click",
            MacroEvent::Drag { .. } => "drag",
            MacroEvent::KeyPress { .. } => "key_press",
            MacroEvent::KeyRelease { .. } => "key_release",
        }
    }
}

/// Which anchor vocabulary a stored macro uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// Pixel-color anchors only; left clicks and drags only, no keyboard
    ColorAnchor,
    /// Image-patch anchors; all buttons and keyboard events
    TemplateAnchor,
}

/// The ordered record of one macro: append-only while recording, replaced
/// wholesale on load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventStore {
    pub events: Vec<MacroEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MacroEvent) {
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Replace the whole sequence, e.g. after loading from disk
    pub fn replace(&mut self, events: Vec<MacroEvent>) {
        self.events = events;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MacroEvent> {
        self.events.iter()
    }

    /// Convert this store's events into the given schema.
    ///
    /// Converting into [`Schema::ColorAnchor`] is intentionally lossy: that
    /// schema has no concept of button identity beyond left and no keyboard
    /// events, so right/middle-button gestures and all key events are
    /// dropped, and anchors are re-keyed to a pixel color (captured live
    /// through `sampler` when one is provided). Converting into
    /// [`Schema::TemplateAnchor`] keeps every event; color anchors become
    /// empty since no patch was ever captured for them.
    pub fn convert_to(&self, schema: Schema, sampler: Option<&ScreenSampler>) -> EventStore {
        let mut out = EventStore::new();
        for event in &self.events {
            match schema {
                Schema::ColorAnchor => {
                    let (pos, button) = match event {
                        MacroEvent::Click { pos, button, .. } => (*pos, *button),
                        MacroEvent::Drag { start, button, .. } => (*start, *button),
                        MacroEvent::KeyPress { .. } | MacroEvent::KeyRelease { .. } => continue,
                    };
                    if button != MouseButton::Left {
                        continue;
                    }
                    let anchor = match event_anchor(event) {
                        Some(Anchor::Color { rgb }) => Some(Anchor::Color { rgb: *rgb }),
                        _ => sampler
                            .and_then(|s| match s.pixel_color(pos) {
                                Ok(rgb) => Some(Anchor::Color { rgb }),
                                Err(e) => {
                                    warn!("Could not capture color anchor at {:?}: {}", pos, e);
                                    None
                                }
                            }),
                    };
                    out.push(with_anchor(event.clone(), anchor));
                }
                Schema::TemplateAnchor => {
                    let anchor = match event_anchor(event) {
                        Some(anchor @ Anchor::Template { .. }) => Some(anchor.clone()),
                        _ => None,
                    };
                    out.push(with_anchor(event.clone(), anchor));
                }
            }
        }
        out
    }
}

fn event_anchor(event: &MacroEvent) -> Option<&Anchor> {
    match event {
        MacroEvent::Click { anchor, .. } | MacroEvent::Drag { anchor, .. } => anchor.as_ref(),
        _ => None,
    }
}

fn with_anchor(event: MacroEvent, new_anchor: Option<Anchor>) -> MacroEvent {
    match event {
        MacroEvent::Click {
            pos,
            button,
            timestamp,
            delay,
            ..
        } => MacroEvent::Click {
            pos,
            button,
            anchor: new_anchor,
            timestamp,
            delay,
        },
        MacroEvent::Drag {
            start,
            end,
            button,
            timestamp,
            delay,
            duration,
            samples,
            ..
        } => MacroEvent::Drag {
            start,
            end,
            button,
            anchor: new_anchor,
            timestamp,
            delay,
            duration,
            samples,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(x: i32, y: i32, button: MouseButton) -> MacroEvent {
        MacroEvent::Click {
            pos: Position::new(x, y),
            button,
            anchor: Some(Anchor::Color { rgb: (1, 2, 3) }),
            timestamp: 100.0,
            delay: 0.5,
        }
    }

    #[test]
    fn position_serializes_as_pair() {
        let json = serde_json::to_string(&Position::new(10, 20)).unwrap();
        assert_eq!(json, "[10,20]");
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Position::new(10, 20));
    }

    #[test]
    fn store_serializes_as_array() {
        let mut store = EventStore::new();
        store.push(click(1, 2, MouseButton::Left));
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.starts_with('['), "store should be a JSON array: {json}");
        let back: EventStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn color_schema_drops_non_left_and_keys() {
        let mut store = EventStore::new();
        store.push(click(1, 1, MouseButton::Left));
        store.push(click(2, 2, MouseButton::Right));
        store.push(MacroEvent::KeyPress {
            key: "a".into(),
            timestamp: 101.0,
            delay: 0.1,
        });
        let converted = store.convert_to(Schema::ColorAnchor, None);
        assert_eq!(converted.len(), 1);
        assert!(matches!(
            &converted.events[0],
            MacroEvent::Click {
                button: MouseButton::Left,
                ..
            }
        ));
    }

    #[test]
    fn template_schema_keeps_everything() {
        let mut store = EventStore::new();
        store.push(click(1, 1, MouseButton::Right));
        store.push(MacroEvent::KeyPress {
            key: "a".into(),
            timestamp: 101.0,
            delay: 0.1,
        });
        let converted = store.convert_to(Schema::TemplateAnchor, None);
        assert_eq!(converted.len(), 2);
        // A color anchor carries no patch, so it converts to no anchor.
        assert!(matches!(
            &converted.events[0],
            MacroEvent::Click { anchor: None, .. }
        ));
    }
}
