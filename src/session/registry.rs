//! In-memory session registry.
//!
//! Holds the active sessions and the two association maps (transmitter
//! signature to session, instance identity to session). The registry is
//! owned exclusively by the state machine; its mutating methods keep the
//! maps consistent: every signature or instance key always refers to a
//! session currently present, and a replaced session's pointers are all
//! rewritten within one call.
//!
//! Sessions are never expired on a timer. A session persists until a
//! reinitiation for the same identity or signature supersedes it; an idle
//! session stays resident indefinitely.

use crate::decoding::{RadioDecoding, ReceiverSighting};
use serde::Serialize;
use std::collections::HashMap;

/// One ephemeral presence session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Opaque random token, unique while the session is active
    pub session_id: String,
    /// Identity key: a whitelisted device id or the transmitter signature
    pub instance_id: String,
    /// Most recent decoding per transmitter signature within this session
    pub devices: HashMap<String, RadioDecoding>,
    /// Signature of the most recently inserted or updated device
    pub latest_signature: String,
    /// When the session was created (epoch ms)
    pub creation_time: u64,
    /// Last initiation refresh; non-decreasing while the session is active
    pub journey_start_time: u64,
}

impl Session {
    pub(crate) fn new(
        session_id: String,
        instance_id: String,
        raddec: RadioDecoding,
        now: u64,
    ) -> Self {
        let signature = raddec.transmitter_signature.clone();
        let mut devices = HashMap::new();
        devices.insert(signature.clone(), raddec);
        Self {
            session_id,
            instance_id,
            devices,
            latest_signature: signature,
            creation_time: now,
            journey_start_time: now,
        }
    }

    /// Store the latest decoding for its transmitter signature and make that
    /// device the one reported as nearest.
    pub(crate) fn upsert_device(&mut self, raddec: RadioDecoding) {
        self.latest_signature = raddec.transmitter_signature.clone();
        self.devices
            .insert(raddec.transmitter_signature.clone(), raddec);
    }

    /// Refresh the initiation time. Kept non-decreasing so a skewed clock
    /// cannot move the journey start backwards.
    pub(crate) fn refresh_journey(&mut self, now: u64) {
        self.journey_start_time = self.journey_start_time.max(now);
    }

    /// Receiver list of the most recently updated device, strongest-first.
    pub fn nearest(&self) -> &[ReceiverSighting] {
        self.devices
            .get(&self.latest_signature)
            .map(|d| d.rssi_signature.as_slice())
            .unwrap_or(&[])
    }
}

/// Registry of active sessions and their association maps.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// sessionId -> Session
    sessions: HashMap<String, Session>,
    /// transmitterSignature -> sessionId
    by_signature: HashMap<String, String>,
    /// instanceId -> sessionId
    by_instance: HashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub(crate) fn get_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Session id currently associated with a transmitter signature.
    pub fn session_id_for_signature(&self, signature: &str) -> Option<&str> {
        self.by_signature.get(signature).map(String::as_str)
    }

    /// Session id currently associated with an instance identity.
    pub fn session_id_for_instance(&self, instance_id: &str) -> Option<&str> {
        self.by_instance.get(instance_id).map(String::as_str)
    }

    /// Insert a session, registering its identity and every device signature.
    pub(crate) fn insert(&mut self, session: Session) {
        for signature in session.devices.keys() {
            self.by_signature
                .insert(signature.clone(), session.session_id.clone());
        }
        self.by_instance
            .insert(session.instance_id.clone(), session.session_id.clone());
        self.sessions.insert(session.session_id.clone(), session);
    }

    /// Point a transmitter signature at an existing session. Used when a
    /// whitelisted identity reappears under a new broadcast address.
    pub(crate) fn link_signature(&mut self, signature: &str, session_id: &str) {
        if self.sessions.contains_key(session_id) {
            self.by_signature
                .insert(signature.to_string(), session_id.to_string());
        }
    }

    /// Remove a session and every pointer referencing it, then insert its
    /// replacement. One call, so no observer ever sees a dangling pointer.
    pub(crate) fn replace(&mut self, old_session_id: &str, replacement: Session) {
        self.remove(old_session_id);
        self.insert(replacement);
    }

    fn remove(&mut self, session_id: &str) {
        if self.sessions.remove(session_id).is_none() {
            return;
        }
        self.by_signature.retain(|_, id| id != session_id);
        self.by_instance.retain(|_, id| id != session_id);
    }
}
