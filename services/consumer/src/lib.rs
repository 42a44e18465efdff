//! Library half of the consumer binary, split out the way the
//! teacher's `forwarder` crate is (`[lib]` + `[[bin]]` in the same
//! package) so integration tests under `tests/` can drive config
//! loading and worker wiring directly instead of spawning a process.

pub mod config;
pub mod handler;
pub mod worker;
