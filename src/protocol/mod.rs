//! Message model, wire codec and mailbox names

pub mod address;
pub mod message;
pub mod wire;

pub use message::{Content, Envelope, Performative, PriorityLevel};
pub use wire::{ProtocolError, DEFAULT_INTER_SITE_PRIORITY};
