//! Session lifecycle state machine.
//!
//! The single entry point is [`SessionMachine::handle_event`]: one incoming
//! radio decoding either starts a session, continues an existing one,
//! supersedes one past its holdoff (reinitiation), or is dropped. Each call
//! runs to completion before the next record is accepted; the registry is
//! owned here and never mutated from outside.

use crate::config::{Config, FilterSpec};
use crate::decoding::{AdvertisementDecoder, PacketDecoder, RadioDecoding, ReceiverSighting};
use crate::session::registry::{Session, SessionRegistry};
use crate::session::resolver;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Emitted view of a session after a create or update transition.
///
/// Field names on the wire (`sessionId`, `instanceId`, `nearest`,
/// `timestamp`) are a compatibility contract with subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session token
    pub session_id: String,
    /// Identity the session is keyed by
    pub instance_id: String,
    /// Receiver list of the most recently updated device, strongest-first
    pub nearest: Vec<ReceiverSighting>,
    /// Timestamp of the triggering record's first observation (epoch ms)
    pub timestamp: u64,
}

impl SessionSnapshot {
    fn of(session: &Session, timestamp: u64) -> Self {
        Self {
            session_id: session.session_id.clone(),
            instance_id: session.instance_id.clone(),
            nearest: session.nearest().to_vec(),
            timestamp,
        }
    }
}

/// Why a record produced no emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Below threshold with no session to continue
    BelowThreshold,
    /// Above threshold but neither whitelisted nor admitted by the filter
    NotAdmitted,
}

/// Result of processing one radio decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A new session was created (first initiation or reinitiation)
    Started(SessionSnapshot),
    /// An existing session was continued or its tracking updated
    Updated(SessionSnapshot),
    /// The record produced no session and no emission
    Dropped(DropReason),
}

impl Outcome {
    /// The emitted snapshot, if the record produced one.
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Outcome::Started(snapshot) | Outcome::Updated(snapshot) => Some(snapshot),
            Outcome::Dropped(_) => None,
        }
    }

    /// Consume the outcome, yielding the emitted snapshot if any.
    pub fn into_snapshot(self) -> Option<SessionSnapshot> {
        match self {
            Outcome::Started(snapshot) | Outcome::Updated(snapshot) => Some(snapshot),
            Outcome::Dropped(_) => None,
        }
    }

    /// Whether this outcome created a session.
    pub fn is_new_session(&self) -> bool {
        matches!(self, Outcome::Started(_))
    }
}

/// The session identity-resolution and lifecycle state machine.
pub struct SessionMachine {
    rssi_threshold: i16,
    reinitiation_holdoff_ms: u64,
    session_id_length: usize,
    whitelist: Vec<String>,
    filter: FilterSpec,
    registry: SessionRegistry,
    decoder: Box<dyn PacketDecoder>,
}

impl SessionMachine {
    /// Create a machine with the default advertisement decoder.
    pub fn new(config: &Config) -> Self {
        Self::with_decoder(config, Box::new(AdvertisementDecoder::new()))
    }

    /// Create a machine with a custom payload decoder.
    pub fn with_decoder(config: &Config, decoder: Box<dyn PacketDecoder>) -> Self {
        Self {
            rssi_threshold: config.rssi_threshold,
            reinitiation_holdoff_ms: config.reinitiation_holdoff_ms,
            session_id_length: config.session_id_length,
            whitelist: config.whitelisted_device_ids.clone(),
            filter: config.filter.clone(),
            registry: SessionRegistry::new(),
            decoder,
        }
    }

    /// Process one radio decoding at the current wall-clock time.
    pub fn handle_event(&mut self, raddec: RadioDecoding) -> Outcome {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.handle_event_at(raddec, now)
    }

    /// Process one radio decoding at an explicit time. Time only matters for
    /// the holdoff comparison and the journey refresh; emission timestamps
    /// always come from the record itself.
    pub fn handle_event_at(&mut self, raddec: RadioDecoding, now: u64) -> Outcome {
        let timestamp = raddec.initial_time;
        // Missing receivers read as below threshold.
        let above_threshold = raddec
            .nearest()
            .is_some_and(|sighting| sighting.rssi >= self.rssi_threshold);

        let resolution = resolver::resolve(
            self.decoder.decode(&raddec.packets),
            &self.whitelist,
            &self.filter,
        );

        // Resolve an existing session, whitelisted identity first. A
        // whitelisted match re-links the current signature so a cycled
        // broadcast address reattaches to the identity's session.
        let mut resolved: Option<(String, String)> = None;
        if let Some(whitelisted_id) = resolution.whitelisted_id.as_deref() {
            if let Some(session_id) = self.registry.session_id_for_instance(whitelisted_id) {
                let session_id = session_id.to_string();
                self.registry
                    .link_signature(&raddec.transmitter_signature, &session_id);
                resolved = Some((session_id, whitelisted_id.to_string()));
            }
        }
        if resolved.is_none() {
            if let Some(session_id) = self
                .registry
                .session_id_for_signature(&raddec.transmitter_signature)
            {
                resolved = Some((
                    session_id.to_string(),
                    raddec.transmitter_signature.clone(),
                ));
            }
        }

        if !above_threshold {
            return match resolved {
                // Tracking update: devices refreshed, journey untouched.
                Some((session_id, _)) => match self.registry.get_mut(&session_id) {
                    Some(session) => {
                        session.upsert_device(raddec);
                        Outcome::Updated(SessionSnapshot::of(session, timestamp))
                    }
                    None => Outcome::Dropped(DropReason::BelowThreshold),
                },
                None => Outcome::Dropped(DropReason::BelowThreshold),
            };
        }

        if let Some((session_id, instance_id)) = resolved {
            let within_holdoff = self
                .registry
                .get(&session_id)
                .map(|s| now.saturating_sub(s.journey_start_time) <= self.reinitiation_holdoff_ms)
                .unwrap_or(false);

            if within_holdoff {
                if let Some(session) = self.registry.get_mut(&session_id) {
                    // Continuing initiation.
                    session.refresh_journey(now);
                    session.upsert_device(raddec);
                    return Outcome::Updated(SessionSnapshot::of(session, timestamp));
                }
            }

            // Holdoff elapsed: hard reinitiation. The old session and every
            // pointer to it are swept, then the replacement takes its place.
            let replacement = Session::new(self.generate_session_id(), instance_id, raddec, now);
            let snapshot = SessionSnapshot::of(&replacement, timestamp);
            self.registry.replace(&session_id, replacement);
            return Outcome::Started(snapshot);
        }

        // No session found: initiation requires a whitelisted identity or a
        // filter pass.
        let instance_id = match resolution.whitelisted_id {
            Some(whitelisted_id) => whitelisted_id,
            None if resolution.passes_filter => raddec.transmitter_signature.clone(),
            None => return Outcome::Dropped(DropReason::NotAdmitted),
        };

        let session = Session::new(self.generate_session_id(), instance_id, raddec, now);
        let snapshot = SessionSnapshot::of(&session, timestamp);
        self.registry.insert(session);
        Outcome::Started(snapshot)
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Active session currently associated with a transmitter signature.
    pub fn session_for_signature(&self, signature: &str) -> Option<&Session> {
        self.registry
            .session_id_for_signature(signature)
            .and_then(|id| self.registry.get(id))
    }

    /// Active session currently associated with an instance identity.
    pub fn session_for_instance(&self, instance_id: &str) -> Option<&Session> {
        self.registry
            .session_id_for_instance(instance_id)
            .and_then(|id| self.registry.get(id))
    }

    /// Hex token from `session_id_length` cryptographically random bytes.
    /// Collisions are treated as practically impossible and not retried.
    fn generate_session_id(&self) -> String {
        let mut bytes = vec![0u8; self.session_id_length];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
