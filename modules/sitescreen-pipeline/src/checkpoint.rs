//! Resumable progress ledger keyed by opaque item ids.
//!
//! The manager knows nothing about businesses or pipelines; it records
//! which ids finished and a counter per outcome label, and persists the
//! state atomically so a crash can never leave a torn file.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use sitescreen_common::CheckpointState;

pub struct Checkpoint {
    path: PathBuf,
    state: CheckpointState,
    processed: HashSet<String>,
}

impl Checkpoint {
    /// Load prior state when resuming and a valid file exists; otherwise
    /// start fresh. A file that fails to parse on resume is logged and
    /// discarded rather than aborting the run.
    pub fn load(path: impl Into<PathBuf>, resume: bool) -> Self {
        let path = path.into();

        let state = if resume {
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<CheckpointState>(&raw) {
                    Ok(state) => {
                        info!(
                            path = %path.display(),
                            processed = state.processed_ids.len(),
                            "Loaded checkpoint"
                        );
                        state
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Checkpoint unreadable, starting fresh");
                        CheckpointState::new()
                    }
                },
                Err(_) => CheckpointState::new(),
            }
        } else {
            CheckpointState::new()
        };

        let processed = state.processed_ids.iter().cloned().collect();
        Self {
            path,
            state,
            processed,
        }
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    /// Record a completed item. An id is only ever appended once, so
    /// `processed_ids` stays a set even across redundant calls.
    pub fn record(&mut self, id: &str, outcome: &str) {
        if self.processed.insert(id.to_string()) {
            self.state.processed_ids.push(id.to_string());
        }
        *self.state.counters.entry(outcome.to_string()).or_insert(0) += 1;
        self.state.updated_at = Utc::now();
    }

    /// Atomically persist the state: write to a temp file in the target
    /// directory, then rename over the destination.
    pub fn persist(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create checkpoint temp file")?;
        serde_json::to_writer_pretty(&mut tmp, &self.state)
            .context("Failed to serialize checkpoint")?;
        tmp.flush().context("Failed to flush checkpoint")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to persist checkpoint to {}", self.path.display()))?;

        Ok(())
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn counter(&self, outcome: &str) -> u64 {
        self.state.counters.get(outcome).copied().unwrap_or(0)
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Remove the checkpoint file, for fresh (non-resume) runs.
    pub fn remove_file(path: &Path) {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove stale checkpoint");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpoint::load(dir.path().join("state.json"), true);
        assert_eq!(cp.processed_count(), 0);
    }

    #[test]
    fn record_then_persist_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut cp = Checkpoint::load(&path, false);
        cp.record("a", "verified");
        cp.record("b", "rejected");
        cp.record("c", "verified");
        cp.persist().unwrap();

        let reloaded = Checkpoint::load(&path, true);
        assert_eq!(reloaded.processed_count(), 3);
        assert!(reloaded.is_processed("a"));
        assert!(reloaded.is_processed("b"));
        assert!(!reloaded.is_processed("z"));
        assert_eq!(reloaded.counter("verified"), 2);
        assert_eq!(reloaded.counter("rejected"), 1);
    }

    #[test]
    fn ids_are_recorded_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = Checkpoint::load(dir.path().join("state.json"), false);
        cp.record("a", "verified");
        cp.record("a", "verified");
        assert_eq!(cp.processed_count(), 1);
        assert_eq!(cp.state().processed_ids.len(), 1);
        // The counter still reflects both calls; callers only record once.
        assert_eq!(cp.counter("verified"), 2);
    }

    #[test]
    fn without_resume_prior_state_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut cp = Checkpoint::load(&path, false);
        cp.record("a", "verified");
        cp.persist().unwrap();

        let fresh = Checkpoint::load(&path, false);
        assert_eq!(fresh.processed_count(), 0);
    }

    #[test]
    fn corrupt_file_on_resume_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let cp = Checkpoint::load(&path, true);
        assert_eq!(cp.processed_count(), 0);
    }

    #[test]
    fn persist_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut cp = Checkpoint::load(&path, false);
        cp.record("a", "enriched");
        cp.persist().unwrap();
        cp.record("b", "error");
        cp.persist().unwrap();

        let reloaded = Checkpoint::load(&path, true);
        assert_eq!(reloaded.processed_count(), 2);
        // No stray temp files left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
