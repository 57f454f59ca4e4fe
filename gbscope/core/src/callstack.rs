//! Shadow call-stack reconstruction from per-instruction PC samples.
//!
//! The engine is never told when a call or return happens. It watches the
//! post-execution PC of every instruction, resolves it to a symbol region,
//! and decides between push, pop-to, and ignore. Interrupt entry arrives as
//! an explicit dispatch notification; interrupt return is the one opcode the
//! engine does inspect (RETI), because a handler's final jump is otherwise
//! indistinguishable from a tail call into the interrupted function.

use crate::emu::{ExecHooks, Interrupt};
use crate::regions::{PcResolver, Region, RegionTable, BANKED_BASE};
use crate::symbols::SymbolMap;
use crate::trace::TraceBuilder;
use crate::CYCLES_PER_FRAME;

/// Return-from-interrupt opcode.
pub const RETI_OPCODE: u8 = 0xD9;

/// Symbols whose regions are never attributed: GBDK's interrupt-handler
/// registration shims and the display-off helper run with the stack in a
/// state that breaks PC-range attribution.
const IGNORED_SYMBOLS: [&str; 3] = [".add_VBL", ".add_int", "_display_off"];

#[derive(Debug, Clone, Copy)]
struct StackFrame {
    sym: usize,
    entry_cycle: u64,
    indent: usize,
}

/// Saturating event counters for host reporting and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub opens: u64,
    pub closes: u64,
    pub interrupts: u64,
    pub unwinds: u64,
    /// Mid-region landings in bank 0 outside any interrupt.
    pub spurious: u64,
    /// Instructions whose PC resolved to no region.
    pub unresolved: u64,
}

pub struct CallStackEngine {
    table: RegionTable,
    resolver: PcResolver,
    stack: Vec<StackFrame>,
    /// Positions into `stack` of the interrupt frames currently in flight,
    /// innermost last. Positions, not symbols: a pop-to that crosses an
    /// interrupt frame must retire its in-flight entry too.
    interrupt_frames: Vec<usize>,
    ignored: Vec<usize>,
    trace: TraceBuilder,
    base_cycle: u64,
    last_cycle: u64,
    verbose: bool,
    counters: EngineCounters,
}

impl CallStackEngine {
    pub fn new(map: &SymbolMap, profile_name: &str, verbose: bool) -> CallStackEngine {
        let table = RegionTable::build(map);
        let ignored = IGNORED_SYMBOLS
            .iter()
            .filter_map(|name| map.index_of(name))
            .collect();
        let names = map.symbols().iter().map(|s| s.name.clone()).collect();
        CallStackEngine {
            table,
            resolver: PcResolver::default(),
            stack: Vec::new(),
            interrupt_frames: Vec::new(),
            ignored,
            trace: TraceBuilder::new(profile_name, names),
            base_cycle: 0,
            last_cycle: 0,
            verbose,
            counters: EngineCounters::default(),
        }
    }

    /// Rebase the global cycle clock at a frame boundary.
    pub fn set_frame_base(&mut self, frames_elapsed: u64) {
        self.base_cycle = frames_elapsed.saturating_mul(CYCLES_PER_FRAME);
    }

    fn global_cycle(&mut self, frame_cycle: u32) -> u64 {
        let at = self.base_cycle + u64::from(frame_cycle);
        // The clock never runs backwards even if the emulator's per-frame
        // counter resets mid-frame.
        self.last_cycle = self.last_cycle.max(at);
        self.last_cycle
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn interrupt_depth(&self) -> usize {
        self.interrupt_frames.len()
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn trace(&self) -> &TraceBuilder {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut TraceBuilder {
        &mut self.trace
    }

    pub fn into_trace(self) -> TraceBuilder {
        self.trace
    }

    /// Close every remaining frame in LIFO order at shutdown.
    pub fn finish(&mut self, at: u64) {
        let at = self.last_cycle.max(at);
        while !self.stack.is_empty() {
            self.pop_frame(at);
        }
        self.interrupt_frames.clear();
        self.resolver.clear();
    }

    fn push_region(&mut self, region: Region, at: u64) {
        self.push_sym(region.sym, at);
        self.resolver.set_current(Some(region));
    }

    fn push_sym(&mut self, sym: usize, at: u64) {
        let indent = self.stack.len();
        self.stack.push(StackFrame {
            sym,
            entry_cycle: at,
            indent,
        });
        self.trace.open(sym, at);
        self.counters.opens = self.counters.opens.saturating_add(1);
        if self.verbose {
            eprintln!(
                "[call] {:indent$}-> {} @{at}",
                "",
                self.trace.frame_name(sym),
                indent = indent * 2
            );
        }
    }

    fn pop_frame(&mut self, at: u64) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        self.trace.close(frame.sym, at, frame.entry_cycle);
        self.counters.closes = self.counters.closes.saturating_add(1);
        if self.verbose {
            eprintln!(
                "[call] {:indent$}<- {} @{at}",
                "",
                self.trace.frame_name(frame.sym),
                indent = frame.indent * 2
            );
        }
    }

    /// Unwind the topmost in-flight interrupt: close everything stacked above
    /// it, then the interrupt frame itself. A RETI with no interrupt in
    /// flight is a host inconsistency and is silently ignored.
    fn unwind_one_interrupt(&mut self, at: u64) {
        let Some(&pos) = self.interrupt_frames.last() else {
            return;
        };
        debug_assert!(pos < self.stack.len(), "interrupt frame position out of range");
        while self.stack.len() > pos {
            self.pop_frame(at);
        }
        self.interrupt_frames.pop();
        self.counters.unwinds = self.counters.unwinds.saturating_add(1);
        // Back in the interrupted function; let the next sample re-resolve.
        self.resolver.clear();
    }

    /// Close the target's callees but leave the target frame open, then drop
    /// any in-flight interrupt entries whose frames just closed.
    fn pop_to_frame(&mut self, depth: usize, at: u64) {
        while self.stack.len() > depth + 1 {
            self.pop_frame(at);
        }
        let len = self.stack.len();
        self.interrupt_frames.retain(|&pos| pos < len);
    }

    fn frame_depth_of(&self, sym: usize) -> Option<usize> {
        self.stack.iter().rposition(|frame| frame.sym == sym)
    }
}

impl ExecHooks for CallStackEngine {
    fn after_instruction(&mut self, pc: u16, opcode: u8, rom_bank: u8, frame_cycle: u32) {
        let at = self.global_cycle(frame_cycle);
        if opcode == RETI_OPCODE {
            self.unwind_one_interrupt(at);
        }

        let Some(region) = self.resolver.lookup(&self.table, pc, rom_bank) else {
            self.resolver.clear();
            self.counters.unresolved = self.counters.unresolved.saturating_add(1);
            return;
        };
        if self.ignored.contains(&region.sym) {
            return;
        }
        if self.resolver.current() == Some(region) {
            return;
        }

        if pc == region.addr {
            // Entering the function at its entry point.
            self.push_region(region, at);
        } else if let Some(depth) = self.frame_depth_of(region.sym) {
            // Jumped back into an ancestor (tail call, loop dispatcher).
            self.pop_to_frame(depth, at);
            self.resolver.set_current(Some(region));
        } else if !self.interrupt_frames.is_empty() {
            // Mid-function landing inside an unknown interrupt context:
            // do not synthesize a frame, do not touch the cache.
        } else if pc >= BANKED_BASE {
            // Banked code reached mid-function, typically through a
            // trampoline the map has no symbol for.
            self.push_region(region, at);
        } else {
            self.counters.spurious = self.counters.spurious.saturating_add(1);
        }
    }

    fn interrupt(&mut self, vector: Interrupt, frame_cycle: u32) {
        let at = self.global_cycle(frame_cycle);
        self.counters.interrupts = self.counters.interrupts.saturating_add(1);

        // A fresh dispatch means every interrupt still marked in flight was
        // left behind by a handler that never hit RETI; unwind them all so
        // the new one starts from a clean context.
        while !self.interrupt_frames.is_empty() {
            self.unwind_one_interrupt(at);
        }

        // Vector entries are prepended to the map, so the symbol index is
        // the vector index itself.
        let sym = vector.index();
        self.push_sym(sym, at);
        self.interrupt_frames.push(self.stack.len() - 1);
        self.resolver
            .set_current(self.table.find(0, vector.vector_addr()));
    }
}
