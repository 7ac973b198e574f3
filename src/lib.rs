//! A Named Data Networking forwarding core.
//!
//! Faces hand packets to a [`Forwarder`], which aggregates Interests in the
//! [`Pit`], routes them through the [`Fib`] under a per-namespace [`Strategy`],
//! and returns Data along the recorded reverse path.

pub mod sequence;

pub mod clock;

pub mod tlv;

pub mod name;

pub mod hash;

pub mod packet;

pub mod face;

pub mod fib;

pub mod pit;

pub mod cs;

pub mod strategy;

pub mod scheduler;

pub mod config;

pub mod forwarder;

pub mod platform;

pub use clock::{Clock, ManualClock, Timestamp};
pub use config::ForwarderConfig;
pub use cs::ContentStore;
pub use face::{Face, FaceError, FaceId, FaceState, FaceTable};
pub use fib::Fib;
pub use forwarder::{DataOutcome, Forwarder, ForwarderError, InterestOutcome};
pub use name::{Name, NameComponent};
pub use packet::{Data, DecodeError, Interest, Packet};
pub use pit::Pit;
pub use sequence::{SequenceBlock, SequenceGenerator};
pub use strategy::{Action, BestRouteStrategy, MulticastStrategy, Strategy, StrategyChoice};
