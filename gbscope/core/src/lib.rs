pub mod callstack;
pub mod driver;
pub mod emu;
pub mod input;
pub mod regions;
pub mod symbols;
pub mod trace;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use callstack::{CallStackEngine, EngineCounters, RETI_OPCODE};
pub use driver::ProfileSession;
pub use emu::{Button, Emulator, ExecHooks, Interrupt, InterruptMask};
pub use input::{InputEvent, InputScript};
pub use regions::{PcResolver, Region, RegionTable, BANKED_BASE, BANK0_END, BANKED_END};
pub use symbols::{MapStats, Symbol, SymbolMap};
pub use trace::{Capture, EventKind, TraceBuilder, TraceDocument, TraceEvent};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid input script: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Other(String),
}

/// Machine cycles in one video frame (DMG timing, ~59.7 Hz).
pub const CYCLES_PER_FRAME: u64 = 70_256;

/// When framebuffer captures are requested during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Capture every profiled frame and record it in the trace.
    All,
    /// Capture only once, after the final frame; nothing is recorded.
    Exit,
    /// Never capture.
    None,
}

/// Host-facing configuration for one profiling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Frames to run before profile capture starts.
    #[serde(default)]
    pub start_frame: u32,
    /// Profiled frame count; the run lasts `start_frame + frames` frames.
    pub frames: u32,
    #[serde(default = "default_capture_mode")]
    pub capture_mode: CaptureMode,
    /// Interrupt vectors (bits 0..=4) the emulator should keep masked.
    #[serde(default)]
    pub disabled_interrupts: InterruptMask,
    #[serde(default)]
    pub verbose: bool,
}

fn default_capture_mode() -> CaptureMode {
    CaptureMode::None
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            start_frame: 0,
            frames: 60,
            capture_mode: CaptureMode::None,
            disabled_interrupts: InterruptMask::NONE,
            verbose: false,
        }
    }
}
