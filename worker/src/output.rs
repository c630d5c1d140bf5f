// ==============================================================================
// output.rs - Live Analysis Output Buffer
// ==============================================================================
// Description: Per-analysis line buffer polled by the web UI while Exomiser
//              runs, evicted a while after the run finishes
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RunOutput {
    generation: u64,
    lines: Vec<String>,
}

/// Shared store of captured process output keyed by analysis id.
///
/// Each `start` hands out a generation number; an eviction carrying an older
/// generation is ignored, so a delayed cleanup from a previous run never
/// removes the buffer of the run that replaced it.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    runs: RwLock<HashMap<i64, RunOutput>>,
    next_generation: AtomicU64,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_runs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, RunOutput>> {
        match self.runs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Output buffer lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn read_runs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, RunOutput>> {
        match self.runs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Output buffer lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Reset the buffer for a new run and return its generation
    pub fn start(&self, analysis_id: i64) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        self.write_runs().insert(
            analysis_id,
            RunOutput {
                generation,
                lines: Vec::new(),
            },
        );
        debug!("Output buffer for analysis {} started (generation {})", analysis_id, generation);
        generation
    }

    /// Append one line of output; blank lines are dropped
    pub fn append(&self, analysis_id: i64, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.write_runs()
            .entry(analysis_id)
            .or_default()
            .lines
            .push(line.to_string());
    }

    /// Snapshot of captured lines; unknown ids yield an empty list
    pub fn get(&self, analysis_id: i64) -> Vec<String> {
        self.read_runs()
            .get(&analysis_id)
            .map(|run| run.lines.clone())
            .unwrap_or_default()
    }

    /// Remove the buffer if it still belongs to `generation`
    pub fn evict(&self, analysis_id: i64, generation: u64) -> bool {
        let mut runs = self.write_runs();
        if runs.get(&analysis_id).map(|run| run.generation) != Some(generation) {
            return false;
        }
        runs.remove(&analysis_id);
        debug!("Evicted output buffer for analysis {}", analysis_id);
        true
    }

    /// Remove the buffer regardless of generation (rerun, delete)
    pub fn discard(&self, analysis_id: i64) {
        self.write_runs().remove(&analysis_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_trims_and_skips_blank_lines() {
        let buffer = OutputBuffer::new();
        buffer.start(1);
        buffer.append(1, "  Loading phenopacket  ");
        buffer.append(1, "   ");
        buffer.append(1, "");
        buffer.append(1, "Done\r");

        assert_eq!(buffer.get(1), vec!["Loading phenopacket", "Done"]);
    }

    #[test]
    fn test_unknown_id_is_empty() {
        let buffer = OutputBuffer::new();
        assert!(buffer.get(42).is_empty());
    }

    #[test]
    fn test_stale_eviction_keeps_newer_run() {
        let buffer = OutputBuffer::new();
        let first = buffer.start(7);
        buffer.append(7, "first run");

        let second = buffer.start(7);
        buffer.append(7, "second run");
        assert!(second > first);

        assert!(!buffer.evict(7, first));
        assert_eq!(buffer.get(7), vec!["second run"]);

        assert!(buffer.evict(7, second));
        assert!(buffer.get(7).is_empty());
    }

    #[test]
    fn test_discard() {
        let buffer = OutputBuffer::new();
        buffer.start(3);
        buffer.append(3, "line");
        buffer.discard(3);
        assert!(buffer.get(3).is_empty());
    }
}
