//! The producer stream engine: serves one replication stream per
//! connected consumer worker. See spec.md §4.2.

pub mod aux;
pub mod emission;
pub mod engine;
pub mod replay;
pub mod ws;

pub use aux::{event_timestamp, load_event};
pub use engine::{drive, EngineError};
pub use ws::{handler as ws_handler, ProducerState};
