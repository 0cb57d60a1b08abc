//! Core runtime for `warden`: the agent harness lifecycle state machine,
//! tool-call mediation, execution plans, human-in-loop gates, and the
//! durable store bridge that lets a harness survive a process restart.

pub mod config;
pub mod events;
pub mod executor;
pub mod gate;
pub mod manager;
pub mod plan;
pub mod store;
pub mod supervisor;
pub mod token;
pub mod toolcall;
