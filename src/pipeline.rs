//! End-to-end wiring: state machine, stats, log sink, and subscribers.
//!
//! The pipeline is how the binary, the replay command, and the HTTP server
//! drive the state machine. One record in, zero-or-one snapshot out; the
//! snapshot is fanned out to subscribers and, when enabled, the session log
//! sink. Callers process records one at a time, which preserves the state
//! machine's no-re-entrancy contract.

use crate::config::{Config, ConfigError};
use crate::decoding::RadioDecoding;
use crate::emitter::EventBus;
use crate::session::{Outcome, SessionMachine, SessionSnapshot};
use crate::sink::SessionLogSink;
use crate::stats::{create_shared_stats, SharedProcessingStats};
use crossbeam_channel::Receiver;

/// Owns the state machine and everything downstream of an emission.
pub struct SessionPipeline {
    machine: SessionMachine,
    bus: EventBus,
    sink: Option<SessionLogSink>,
    stats: SharedProcessingStats,
}

impl SessionPipeline {
    /// Build a pipeline from a validated configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_stats(config, create_shared_stats())
    }

    /// Build a pipeline that records into an existing stats tracker.
    pub fn with_stats(
        config: &Config,
        stats: SharedProcessingStats,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sink = if config.session_logging_enabled {
            match SessionLogSink::new(config.log_path.clone()) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    // Diagnostic only: a broken log sink must not stop
                    // event processing.
                    eprintln!("Warning: session logging disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            machine: SessionMachine::new(config),
            bus: EventBus::new(),
            sink,
            stats,
        })
    }

    /// Register a subscriber for emitted snapshots.
    pub fn subscribe(&mut self) -> Receiver<SessionSnapshot> {
        self.bus.subscribe()
    }

    /// Process one record at the current wall-clock time.
    pub fn process(&mut self, raddec: RadioDecoding) -> Option<SessionSnapshot> {
        self.stats.record_decoding();
        let outcome = self.machine.handle_event(raddec);
        self.finish(outcome)
    }

    /// Process one record at an explicit time (replay and tests).
    pub fn process_at(&mut self, raddec: RadioDecoding, now: u64) -> Option<SessionSnapshot> {
        self.stats.record_decoding();
        let outcome = self.machine.handle_event_at(raddec, now);
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Outcome) -> Option<SessionSnapshot> {
        let new_session = outcome.is_new_session();
        match outcome.into_snapshot() {
            Some(snapshot) => {
                if new_session {
                    self.stats.record_session_started();
                }
                self.stats.record_emission();
                if let Some(sink) = &self.sink {
                    sink.record(&snapshot, new_session);
                }
                self.bus.publish(&snapshot);
                Some(snapshot)
            }
            None => {
                self.stats.record_dropped();
                None
            }
        }
    }

    /// Read-only view of the state machine.
    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Shared stats tracker.
    pub fn stats(&self) -> &SharedProcessingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::ReceiverSighting;

    fn raddec(signature: &str, rssi: i16, time: u64) -> RadioDecoding {
        RadioDecoding {
            transmitter_signature: signature.to_string(),
            rssi_signature: vec![ReceiverSighting::new("receiver-1", 1, rssi)],
            packets: Vec::new(),
            initial_time: time,
        }
    }

    #[test]
    fn test_pipeline_rejects_invalid_config() {
        let config = Config {
            session_id_length: 0,
            ..Config::default()
        };
        assert!(SessionPipeline::new(&config).is_err());
    }

    #[test]
    fn test_subscriber_receives_emissions() {
        let mut pipeline = SessionPipeline::new(&Config::default()).expect("valid config");
        let emissions = pipeline.subscribe();

        let snapshot = pipeline
            .process_at(raddec("x/2", -42, 1000), 1000)
            .expect("session started");

        assert_eq!(emissions.recv().unwrap(), snapshot);
    }

    #[test]
    fn test_stats_track_outcomes() {
        let mut pipeline = SessionPipeline::new(&Config::default()).expect("valid config");

        pipeline.process_at(raddec("x/2", -42, 1000), 1000); // started
        pipeline.process_at(raddec("x/2", -45, 2000), 2000); // continued
        pipeline.process_at(raddec("y/2", -80, 3000), 3000); // dropped

        let totals = pipeline.stats().totals();
        assert_eq!(totals.decodings_processed, 3);
        assert_eq!(totals.sessions_started, 1);
        assert_eq!(totals.emissions, 2);
        assert_eq!(totals.records_dropped, 1);
    }

    #[test]
    fn test_session_log_files_written() {
        let log_dir = std::env::temp_dir().join(format!(
            "presence-session-pipeline-test-{}",
            uuid::Uuid::new_v4()
        ));
        let config = Config {
            session_logging_enabled: true,
            log_path: log_dir.clone(),
            ..Config::default()
        };

        let mut pipeline = SessionPipeline::new(&config).expect("valid config");
        let snapshot = pipeline
            .process_at(raddec("x/2", -42, 1000), 1000)
            .expect("session started");
        drop(pipeline); // joins the sink worker

        let path = log_dir.join(format!("{}.csv", snapshot.session_id));
        let content = std::fs::read_to_string(path).expect("log file exists");
        assert!(content.starts_with("time,timestamp,instanceId"));
        assert!(content.contains("x/2"));

        let _ = std::fs::remove_dir_all(&log_dir);
    }
}
