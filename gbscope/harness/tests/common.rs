//! Shared harness pieces: a scripted emulator that replays a fixed PC stream
//! into the engine hooks, and trace invariant checkers.

#![allow(dead_code)]

use gbscope_core::{
    Button, Emulator, EventKind, ExecHooks, Interrupt, InterruptMask, Result, TraceEvent,
};
use std::collections::HashMap;

/// One scripted emulator action within a frame.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Instruction boundary: post-execution PC, opcode 0x00.
    At(u16),
    /// Instruction boundary with an explicit opcode (e.g. RETI).
    Op(u16, u8),
    /// Map a different ROM bank.
    Bank(u8),
    /// Dispatch an interrupt vector.
    Irq(Interrupt),
    /// Let `n` cycles pass without an instruction boundary.
    Skip(u32),
}

/// Deterministic emulator stand-in: each frame replays its scripted steps,
/// advancing an in-frame cycle counter by four per instruction.
#[derive(Default)]
pub struct ScriptedEmu {
    pub frames: Vec<Vec<Step>>,
    pub button_log: Vec<(Button, bool)>,
    pub mask: InterruptMask,
    pub capture_count: u32,
    next_frame: usize,
    rom_bank: u8,
}

impl ScriptedEmu {
    pub fn new(frames: Vec<Vec<Step>>) -> ScriptedEmu {
        ScriptedEmu {
            frames,
            rom_bank: 1,
            ..ScriptedEmu::default()
        }
    }
}

impl Emulator for ScriptedEmu {
    fn run_frame<H: ExecHooks>(&mut self, hooks: &mut H) {
        let steps = self
            .frames
            .get(self.next_frame)
            .cloned()
            .unwrap_or_default();
        self.next_frame += 1;
        let mut cycle: u32 = 0;
        for step in steps {
            match step {
                Step::At(pc) => {
                    hooks.after_instruction(pc, 0x00, self.rom_bank, cycle);
                    cycle += 4;
                }
                Step::Op(pc, opcode) => {
                    hooks.after_instruction(pc, opcode, self.rom_bank, cycle);
                    cycle += 4;
                }
                Step::Bank(bank) => self.rom_bank = bank,
                Step::Irq(vector) => hooks.interrupt(vector, cycle),
                Step::Skip(n) => cycle += n,
            }
        }
    }

    fn set_button(&mut self, button: Button, pressed: bool) {
        self.button_log.push((button, pressed));
    }

    fn set_disabled_interrupts(&mut self, mask: InterruptMask) {
        self.mask = mask;
    }

    fn capture_framebuffer(&mut self, frame_index: u32) -> Result<Option<String>> {
        self.capture_count += 1;
        Ok(Some(format!("frame-{frame_index}.png")))
    }
}

/// Walk a finalized event stream with a per-symbol LIFO and assert it is a
/// balanced sequence modulo trailing unmatched opens.
pub fn assert_balanced(events: &[TraceEvent]) {
    let mut open: HashMap<usize, Vec<u64>> = HashMap::new();
    let mut last_at = 0u64;
    for event in events {
        assert!(
            event.at >= last_at,
            "timestamps must be non-decreasing, got {} after {last_at}",
            event.at
        );
        last_at = event.at;
        match event.kind {
            EventKind::Open => open.entry(event.frame).or_default().push(event.at),
            EventKind::Close => {
                let opened_at = open
                    .get_mut(&event.frame)
                    .and_then(Vec::pop)
                    .unwrap_or_else(|| panic!("unmatched close for frame {}", event.frame));
                assert!(
                    event.at >= opened_at,
                    "close at {} precedes its open at {opened_at}",
                    event.at
                );
            }
        }
    }
}
