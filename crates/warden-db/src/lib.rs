//! Postgres-backed persistence for harness checkpoints.
//!
//! This crate owns the primary durable-store backend: connection pooling,
//! migrations, and the query layer over the `harness_checkpoints` table. It
//! has no knowledge of harness semantics beyond the schema-versioned JSON
//! payload it stores -- interpreting that payload is `warden-core`'s job.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;

pub use config::DbConfig;
pub use models::{HarnessCheckpointRow, HarnessStatus, HarnessSummaryRow};
