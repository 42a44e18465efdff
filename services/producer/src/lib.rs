//! Library half of the producer binary, split out the way the
//! teacher's `forwarder` crate is (`[lib]` + `[[bin]]` in the same
//! package) so integration tests under `tests/` can drive config
//! loading directly instead of spawning a process.

pub mod config;
