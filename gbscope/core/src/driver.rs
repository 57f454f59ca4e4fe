//! The frame driver: owns one profiling run end to end.
//!
//! Strictly sequential: the emulator, the per-instruction hooks, and this
//! loop all share one thread. The only suspension points are the frame
//! boundaries, where the host may perform capture I/O.

use crate::callstack::CallStackEngine;
use crate::emu::Emulator;
use crate::input::InputScript;
use crate::symbols::SymbolMap;
use crate::trace::TraceBuilder;
use crate::{CaptureMode, ProfileConfig, Result, CYCLES_PER_FRAME};

pub struct ProfileSession<E: Emulator> {
    emu: E,
    engine: CallStackEngine,
    script: InputScript,
    config: ProfileConfig,
    frames_elapsed: u64,
    capture_start: Option<u64>,
}

impl<E: Emulator> ProfileSession<E> {
    pub fn new(
        mut emu: E,
        map: &SymbolMap,
        script: InputScript,
        config: ProfileConfig,
        profile_name: &str,
    ) -> ProfileSession<E> {
        emu.set_disabled_interrupts(config.disabled_interrupts);
        let engine = CallStackEngine::new(map, profile_name, config.verbose);
        ProfileSession {
            emu,
            engine,
            script,
            config,
            frames_elapsed: 0,
            capture_start: None,
        }
    }

    pub fn engine(&self) -> &CallStackEngine {
        &self.engine
    }

    pub fn emulator(&self) -> &E {
        &self.emu
    }

    pub fn frames_elapsed(&self) -> u64 {
        self.frames_elapsed
    }

    /// Run `start_frame + frames` frames, then close remaining frames and
    /// finalize the trace against the first profiled frame's start cycle.
    pub fn run(&mut self, mut progress: impl FnMut(u32, u32)) -> Result<()> {
        let total = self.config.start_frame + self.config.frames;
        for i in 0..total {
            self.script.apply_frame(i, &mut self.emu);
            self.engine.set_frame_base(self.frames_elapsed);
            let frame_start = self.frames_elapsed * CYCLES_PER_FRAME;
            self.emu.run_frame(&mut self.engine);
            self.frames_elapsed += 1;
            progress(i + 1, total);

            if i >= self.config.start_frame {
                if self.capture_start.is_none() {
                    self.capture_start = Some(frame_start);
                }
                match self.config.capture_mode {
                    CaptureMode::All => {
                        if let Some(src) = self.emu.capture_framebuffer(i)? {
                            self.engine.trace_mut().capture(src, frame_start, i);
                        }
                    }
                    CaptureMode::Exit => {
                        if i + 1 == total {
                            self.emu.capture_framebuffer(i)?;
                        }
                    }
                    CaptureMode::None => {}
                }
            }
        }

        let end = self.frames_elapsed * CYCLES_PER_FRAME;
        self.engine.finish(end);
        self.engine
            .trace_mut()
            .finalize(self.capture_start.unwrap_or(0));
        if self.config.verbose {
            let c = self.engine.counters();
            eprintln!(
                "[run] frames={total} opens={} closes={} interrupts={} spurious={} unresolved={}",
                c.opens, c.closes, c.interrupts, c.spurious, c.unresolved
            );
        }
        Ok(())
    }

    pub fn into_trace(self) -> TraceBuilder {
        self.engine.into_trace()
    }
}
