//! Contracts between the profiling engine and its emulator host.
//!
//! The engine never owns CPU/PPU state. It implements [`ExecHooks`] and the
//! host's emulator invokes those hooks once per executed instruction and once
//! per interrupt dispatch, while the frame driver calls back into the
//! [`Emulator`] for frame advance, input injection, and framebuffer captures.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Joypad buttons, named as they appear in normalized input scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

/// One of the five hardware interrupt vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn from_index(index: u8) -> Option<Interrupt> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Interrupt::VBlank => 0,
            Interrupt::LcdStat => 1,
            Interrupt::Timer => 2,
            Interrupt::Serial => 3,
            Interrupt::Joypad => 4,
        }
    }

    /// Fixed entry point jumped to on dispatch.
    pub fn vector_addr(self) -> u16 {
        0x40 + 8 * self.index() as u16
    }

    pub fn label(self) -> &'static str {
        match self {
            Interrupt::VBlank => "VBL",
            Interrupt::LcdStat => "LCD",
            Interrupt::Timer => "TIM",
            Interrupt::Serial => "SIO",
            Interrupt::Joypad => "JOY",
        }
    }

    /// Name used for the vector's entry in the symbol map.
    pub fn symbol_name(self) -> String {
        format!("[INTERRUPT] {}", self.label())
    }
}

/// Bit set of interrupt vectors the emulator keeps masked off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterruptMask(u8);

impl InterruptMask {
    pub const NONE: InterruptMask = InterruptMask(0);

    pub fn from_indices<I: IntoIterator<Item = u8>>(indices: I) -> InterruptMask {
        let mut mask = InterruptMask::NONE;
        for index in indices {
            if let Some(int) = Interrupt::from_index(index) {
                mask = mask.with(int);
            }
        }
        mask
    }

    #[must_use]
    pub fn with(self, int: Interrupt) -> InterruptMask {
        InterruptMask(self.0 | 1 << int.index())
    }

    pub fn contains(self, int: Interrupt) -> bool {
        self.0 & (1 << int.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Per-instruction callbacks the emulator drives into the profiler.
///
/// `frame_cycle` is the emulator's cycle counter relative to the start of the
/// current video frame; the engine folds it into the global cycle clock.
pub trait ExecHooks {
    /// Called after every executed instruction with the post-execution PC.
    fn after_instruction(&mut self, pc: u16, opcode: u8, rom_bank: u8, frame_cycle: u32);

    /// Called when the CPU dispatches to an interrupt vector.
    fn interrupt(&mut self, vector: Interrupt, frame_cycle: u32);
}

/// The emulator collaborator as the frame driver sees it.
///
/// Static dispatch on purpose: `run_frame` sits on the hot path and is
/// invoked once per video frame with the engine as its hook sink.
pub trait Emulator {
    /// Advance exactly one video frame, invoking `hooks` per instruction and
    /// per interrupt dispatch.
    fn run_frame<H: ExecHooks>(&mut self, hooks: &mut H);

    fn set_button(&mut self, button: Button, pressed: bool);

    fn set_disabled_interrupts(&mut self, mask: InterruptMask);

    /// Ask the host for a framebuffer capture. Returns an opaque reference
    /// (path or URL), or `None` when the host declines.
    fn capture_framebuffer(&mut self, frame_index: u32) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_addresses_are_fixed() {
        let addrs: Vec<u16> = Interrupt::ALL.iter().map(|i| i.vector_addr()).collect();
        assert_eq!(addrs, vec![0x40, 0x48, 0x50, 0x58, 0x60]);
    }

    #[test]
    fn vector_symbol_names_match_map_entries() {
        assert_eq!(Interrupt::VBlank.symbol_name(), "[INTERRUPT] VBL");
        assert_eq!(Interrupt::Joypad.symbol_name(), "[INTERRUPT] JOY");
    }

    #[test]
    fn mask_from_indices_ignores_out_of_range() {
        let mask = InterruptMask::from_indices([0, 2, 9]);
        assert!(mask.contains(Interrupt::VBlank));
        assert!(mask.contains(Interrupt::Timer));
        assert!(!mask.contains(Interrupt::LcdStat));
        assert_eq!(mask.bits(), 0b101);
    }

    #[test]
    fn buttons_deserialize_from_uppercase_names() {
        let buttons: Vec<Button> =
            serde_json::from_str(r#"["START", "A", "LEFT"]"#).expect("parse buttons");
        assert_eq!(buttons, vec![Button::Start, Button::A, Button::Left]);
    }
}
