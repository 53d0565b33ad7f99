use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A control action triggered by a hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroCommand {
    StartRecording,
    StopRecording,
    StartPlayback,
    StopPlayback,
}

/// Key names driving the tool itself. These keys never enter a recorded
/// macro.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub start_recording: String,
    pub stop_recording: String,
    pub start_playback: String,
    pub stop_playback: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            start_recording: "f2".to_string(),
            stop_recording: "f4".to_string(),
            start_playback: "f8".to_string(),
            stop_playback: "f10".to_string(),
        }
    }
}

impl HotkeyConfig {
    /// The command bound to a key name, if any
    pub fn command_for(&self, key: &str) -> Option<MacroCommand> {
        if key == self.start_recording {
            Some(MacroCommand::StartRecording)
        } else if key == self.stop_recording {
            Some(MacroCommand::StopRecording)
        } else if key == self.start_playback {
            Some(MacroCommand::StartPlayback)
        } else if key == self.stop_playback {
            Some(MacroCommand::StopPlayback)
        } else {
            None
        }
    }

    /// The key names the recording session must filter out
    pub fn excluded_keys(&self) -> HashSet<String> {
        [
            self.start_recording.clone(),
            self.stop_recording.clone(),
            self.start_playback.clone(),
            self.stop_playback.clone(),
        ]
        .into_iter()
        .collect()
    }
}
