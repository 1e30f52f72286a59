//! Presence Session Agent - correlates radio decodings into presence sessions.
//!
//! This library turns a live stream of radio-decoding events — each reporting
//! that some broadcasting device was heard by one or more receivers — into
//! ephemeral sessions: contiguous episodes during which a device (or a
//! whitelisted identity that persists across address cycling) is present
//! above a signal-strength threshold.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Presence Session Agent                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Decoding   │──▶│  Resolver   │──▶│   Session   │       │
//! │  │  (packets)  │   │ (identity)  │   │   Machine   │       │
//! │  └─────────────┘   └─────────────┘   └──────┬──────┘       │
//! │                                             │              │
//! │                    ┌─────────────┐   ┌──────▼──────┐       │
//! │                    │  CSV Log    │◀──│  Emission   │       │
//! │                    │    Sink     │   │  (fan-out)  │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The state machine is the only component with timing logic and identity
//! continuity rules: per incoming record it decides whether to start a new
//! session, continue an existing one, supersede one past its holdoff, or
//! drop the record. Sessions are never expired on a timer; an idle session
//! stays resident until a reinitiation for the same identity supersedes it.
//!
//! # Example
//!
//! ```no_run
//! use presence_session_agent::{Config, SessionPipeline};
//!
//! let config = Config::default();
//! let mut pipeline = SessionPipeline::new(&config).expect("valid config");
//! let emissions = pipeline.subscribe();
//!
//! // Records arrive one at a time from the transport layer:
//! // pipeline.process(raddec);
//! // Emitted snapshots can be received from `emissions`.
//! ```

pub mod config;
pub mod decoding;
pub mod emitter;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod stats;

#[cfg(feature = "forward")]
pub mod forward;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{AcceptedValues, Config, ConfigError, FilterSpec};
pub use decoding::{
    AdvertisementDecoder, DecodeError, DecodedProperties, PacketDecoder, PropertyValue,
    RadioDecoding, ReceiverSighting,
};
pub use emitter::EventBus;
pub use pipeline::SessionPipeline;
pub use session::{
    DropReason, Outcome, Session, SessionMachine, SessionRegistry, SessionSnapshot,
};
pub use sink::SessionLogSink;
pub use stats::{ProcessingStats, ProcessingTotals, SharedProcessingStats};

// Forwarder re-exports (when enabled)
#[cfg(feature = "forward")]
pub use forward::{BlockingForwarder, ForwardResponse, Forwarder, ForwarderConfig, ForwarderError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
