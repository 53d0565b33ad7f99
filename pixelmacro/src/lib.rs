//! Desktop input-automation macro recorder
//!
//! This crate records mouse clicks, drags, and keyboard input with timing,
//! then replays them through an input actuator. At replay time, targets are
//! re-located on the live screen via pixel-color or image-template matching
//! so macros survive small UI drift. Recorded macros persist as JSON files.

pub mod actuator;
pub mod capture;
pub mod classifier;
pub mod controller;
pub mod error;
pub mod events;
pub mod hotkeys;
pub mod input;
pub mod keymap;
pub mod locator;
pub mod replay;
pub mod session;
pub mod storage;

pub use actuator::*;
pub use capture::*;
pub use classifier::*;
pub use controller::*;
pub use error::*;
pub use events::*;
pub use hotkeys::*;
pub use input::*;
pub use locator::*;
pub use replay::*;
pub use session::*;
pub use storage::*;
