//! Wire-level types for Telelink telemetry streams.
//!
//! An [`Event`] is one received message, a [`Command`] is one outbound
//! message, and a [`Codec`] converts between them and raw payload bytes.

pub mod codec;
pub mod command;
pub mod constants;
pub mod event;

// Re-export primary types for convenience.
pub use codec::{Codec, DecodeError, JsonCodec};
pub use command::Command;
pub use event::{Envelope, Event, Payload};
