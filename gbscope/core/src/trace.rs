//! Speedscope evented trace: event buffer, frame captures, and the post-hoc
//! capture-start filter.
//!
//! Events are appended in emission order and keyed by symbol index; only the
//! shared frame table carries names, so hot-path comparisons stay integer
//! equality. `finalize` re-establishes sort order, pairs opens with closes,
//! and drops pairs that ended before profiling was supposed to start.

use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const SPEEDSCOPE_SCHEMA: &str = "https://www.speedscope.app/file-format-schema.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "C")]
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub at: u64,
    /// Symbol index into the shared frame table.
    pub frame: usize,
    /// For closes, the cycle of the paired open.
    #[serde(rename = "openAt", skip_serializing_if = "Option::is_none")]
    pub open_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub src: String,
    pub at: u64,
    #[serde(rename = "frameNumber")]
    pub frame_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedFrames {
    pub frames: Vec<FrameName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventedProfile {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub unit: String,
    #[serde(rename = "startValue")]
    pub start_value: u64,
    #[serde(rename = "endValue")]
    pub end_value: u64,
    pub events: Vec<TraceEvent>,
}

/// The full document as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct TraceDocument {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub shared: SharedFrames,
    pub profiles: Vec<EventedProfile>,
    pub captures: Vec<Capture>,
    #[serde(rename = "activeProfileIndex")]
    pub active_profile_index: u32,
    pub exporter: String,
}

#[derive(Debug, Clone)]
pub struct TraceBuilder {
    profile_name: String,
    frame_names: Vec<String>,
    events: Vec<TraceEvent>,
    captures: Vec<Capture>,
    end_value: u64,
}

impl TraceBuilder {
    pub fn new(profile_name: impl Into<String>, frame_names: Vec<String>) -> TraceBuilder {
        TraceBuilder {
            profile_name: profile_name.into(),
            frame_names,
            events: Vec::new(),
            captures: Vec::new(),
            end_value: 0,
        }
    }

    pub fn frame_name(&self, sym: usize) -> &str {
        &self.frame_names[sym]
    }

    pub fn open(&mut self, sym: usize, at: u64) {
        self.events.push(TraceEvent {
            kind: EventKind::Open,
            at,
            frame: sym,
            open_at: None,
        });
    }

    /// Close timestamps never run backwards past their open.
    pub fn close(&mut self, sym: usize, at: u64, open_at: u64) {
        self.events.push(TraceEvent {
            kind: EventKind::Close,
            at: at.max(open_at),
            frame: sym,
            open_at: Some(open_at),
        });
    }

    pub fn capture(&mut self, src: impl Into<String>, at: u64, frame_number: u32) {
        self.captures.push(Capture {
            src: src.into(),
            at,
            frame_number,
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }

    pub fn end_value(&self) -> u64 {
        self.end_value
    }

    /// Sort events, pair opens with closes, and drop every pair that closed
    /// before `capture_start`. Unmatched trailing opens survive (still-open
    /// frames are useful when reading a truncated run); unmatched closes do
    /// not. Safe to call more than once with the same cutoff.
    pub fn finalize(&mut self, capture_start: u64) {
        self.events
            .sort_by_key(|e| (e.at, matches!(e.kind, EventKind::Close) as u8));

        let mut keep = vec![false; self.events.len()];
        let mut open_stacks: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, event) in self.events.iter().enumerate() {
            match event.kind {
                EventKind::Open => open_stacks.entry(event.frame).or_default().push(i),
                EventKind::Close => {
                    let matched = open_stacks.get_mut(&event.frame).and_then(Vec::pop);
                    if let Some(j) = matched {
                        if event.at >= capture_start {
                            keep[i] = true;
                            keep[j] = true;
                        }
                    }
                }
            }
        }
        for stack in open_stacks.values() {
            for &j in stack {
                keep[j] = true;
            }
        }

        let mut idx = 0;
        self.events.retain(|_| {
            let kept = keep[idx];
            idx += 1;
            kept
        });
        self.end_value = self.events.iter().map(|e| e.at).max().unwrap_or(0);
    }

    pub fn document(&self) -> TraceDocument {
        TraceDocument {
            schema: SPEEDSCOPE_SCHEMA.to_string(),
            shared: SharedFrames {
                frames: self
                    .frame_names
                    .iter()
                    .map(|name| FrameName { name: name.clone() })
                    .collect(),
            },
            profiles: vec![EventedProfile {
                kind: "evented".to_string(),
                name: self.profile_name.clone(),
                unit: "none".to_string(),
                start_value: 0,
                end_value: self.end_value,
                events: self.events.clone(),
            }],
            captures: self.captures.clone(),
            active_profile_index: 0,
            exporter: "gbscope".to_string(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.document())?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
