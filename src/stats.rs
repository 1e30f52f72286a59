//! Processing statistics.
//!
//! Tracks counters over the agent's event processing without retaining any
//! record content. Counters persist across runs via a small JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current run.
#[derive(Debug)]
pub struct ProcessingStats {
    /// Radio decodings handed to the state machine
    decodings_processed: AtomicU64,
    /// Sessions created (initiations and reinitiations)
    sessions_started: AtomicU64,
    /// Snapshots emitted to subscribers
    emissions: AtomicU64,
    /// Records that produced no session and no emission
    records_dropped: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
    /// Path for persisting counters
    persist_path: Option<PathBuf>,
}

impl ProcessingStats {
    /// Create a new stats tracker.
    pub fn new() -> Self {
        Self {
            decodings_processed: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            emissions: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a stats tracker with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        // Try to load existing counters
        if let Err(e) = stats.load() {
            eprintln!("Note: Could not load previous processing stats: {e}");
        }

        stats
    }

    /// Record a decoding handed to the state machine.
    pub fn record_decoding(&self) {
        self.decodings_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a created session.
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an emitted snapshot.
    pub fn record_emission(&self) {
        self.emissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped record.
    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current totals.
    pub fn totals(&self) -> ProcessingTotals {
        ProcessingTotals {
            decodings_processed: self.decodings_processed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            emissions: self.emissions.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let totals = self.totals();
        format!(
            "Processing Statistics:\n\
             - Decodings processed: {}\n\
             - Sessions started: {}\n\
             - Snapshots emitted: {}\n\
             - Records dropped: {}\n\
             - Uptime: {} seconds",
            totals.decodings_processed,
            totals.sessions_started,
            totals.emissions,
            totals.records_dropped,
            totals.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let totals = self.totals();
            let persisted = PersistedTotals {
                decodings_processed: totals.decodings_processed,
                sessions_started: totals.sessions_started,
                emissions: totals.emissions,
                records_dropped: totals.records_dropped,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load counters from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedTotals =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.decodings_processed
                    .store(persisted.decodings_processed, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.emissions.store(persisted.emissions, Ordering::Relaxed);
                self.records_dropped
                    .store(persisted.records_dropped, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.decodings_processed.store(0, Ordering::Relaxed);
        self.sessions_started.store(0, Ordering::Relaxed);
        self.emissions.store(0, Ordering::Relaxed);
        self.records_dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of processing totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTotals {
    pub decodings_processed: u64,
    pub sessions_started: u64,
    pub emissions: u64,
    pub records_dropped: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Totals format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTotals {
    decodings_processed: u64,
    sessions_started: u64,
    emissions: u64,
    records_dropped: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats tracker.
pub type SharedProcessingStats = Arc<ProcessingStats>;

/// Create a new shared stats tracker.
pub fn create_shared_stats() -> SharedProcessingStats {
    Arc::new(ProcessingStats::new())
}

/// Create a new shared stats tracker with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedProcessingStats {
    Arc::new(ProcessingStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counting() {
        let stats = ProcessingStats::new();

        stats.record_decoding();
        stats.record_decoding();
        stats.record_session_started();
        stats.record_emission();
        stats.record_dropped();

        let totals = stats.totals();
        assert_eq!(totals.decodings_processed, 2);
        assert_eq!(totals.sessions_started, 1);
        assert_eq!(totals.emissions, 1);
        assert_eq!(totals.records_dropped, 1);
    }

    #[test]
    fn test_stats_reset() {
        let stats = ProcessingStats::new();

        stats.record_decoding();
        stats.record_emission();
        stats.reset();

        let totals = stats.totals();
        assert_eq!(totals.decodings_processed, 0);
        assert_eq!(totals.emissions, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = ProcessingStats::new();
        let summary = stats.summary();

        assert!(summary.contains("Decodings processed"));
        assert!(summary.contains("Sessions started"));
        assert!(summary.contains("Snapshots emitted"));
    }
}
