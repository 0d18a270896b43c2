//! UDP burst generator and receive logger.
//!
//! `sender` runs one-shot transmit sessions on a jittered periodic schedule;
//! `server` hosts the background receive-and-log loop; `types` carries the
//! CLI surface, errors, and the shared log sink.

pub mod sender;
pub mod server;
pub mod types;
