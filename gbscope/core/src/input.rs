//! Normalized input-event replay.
//!
//! The profiler consumes one format only: an ordered list of
//! `{frame, press, release}` records. Converters for recorder formats live
//! with the host.

use crate::emu::{Button, Emulator};
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputEvent {
    pub frame: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub press: Vec<Button>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release: Vec<Button>,
}

/// A validated, frame-ordered input script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputScript {
    events: Vec<InputEvent>,
}

impl InputScript {
    pub fn new(events: Vec<InputEvent>) -> Result<InputScript> {
        for pair in events.windows(2) {
            if pair[1].frame < pair[0].frame {
                return Err(CoreError::InvalidInput(format!(
                    "events out of order: frame {} follows frame {}",
                    pair[1].frame, pair[0].frame
                )));
            }
        }
        Ok(InputScript { events })
    }

    pub fn empty() -> InputScript {
        InputScript::default()
    }

    pub fn from_json(text: &str) -> Result<InputScript> {
        let events: Vec<InputEvent> = serde_json::from_str(text)?;
        InputScript::new(events)
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.events.last().map(|e| e.frame)
    }

    /// Feed this frame's events to the emulator, releases before presses.
    pub fn apply_frame<E: Emulator>(&self, frame: u32, emu: &mut E) {
        for event in self.events.iter().filter(|e| e.frame == frame) {
            for &button in &event.release {
                emu.set_button(button, false);
            }
        }
        for event in self.events.iter().filter(|e| e.frame == frame) {
            for &button in &event.press {
                emu.set_button(button, true);
            }
        }
    }
}
