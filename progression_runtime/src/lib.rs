#![forbid(unsafe_code)]

//! Progression runtime.
//!
//! Wraps the pure kernel with SQLite persistence, schema migrations,
//! snapshots, replay and drift helpers, a protobuf history archive, and
//! the orchestration API.
//!
//! No scoring logic lives here: every fold is delegated to the kernel.

pub mod error;
pub mod config;
pub mod schema;
pub mod store;
pub mod snapshot;
pub mod replay;
pub mod drift;
pub mod proto_types;
pub mod proto_bridge;
pub mod archive;
pub mod engine;

pub use config::{EngineConfig, ReplayStrategy, StorageLocation};
pub use drift::{DriftReport, RuleDrift};
pub use engine::{ProgressionEngine, SharedEngine};
pub use error::{EngineError, StorageError};
pub use snapshot::{verify_snapshot_hash, Snapshot};
pub use store::{MetaEntry, ProgressStore};
