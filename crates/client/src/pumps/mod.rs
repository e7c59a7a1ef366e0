//! Per-link tasks: the read pump runs on the supervisor task, the write and
//! ping pumps are spawned next to it and stop with the link's token.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
