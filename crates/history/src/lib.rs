//! Bounded event history.
//!
//! [`RingBuffer`] is the plain FIFO container; [`EventBuffer`] wraps it for
//! shared use between a receive loop and readers.

pub mod buffer;
pub mod events;

pub use buffer::RingBuffer;
pub use events::EventBuffer;
