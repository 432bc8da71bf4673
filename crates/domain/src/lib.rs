//! `ad-domain`: shared types for the agent-dispatch workspace.
//!
//! Holds the crate-wide error type, the configuration tree, the task and
//! unit state machines, and small helpers (keyword serialisation, wall
//! clock conversion) that more than one crate needs.

pub mod clock;
pub mod config;
pub mod error;
pub mod keywords;
pub mod mcp;
pub mod state;

pub use error::{Error, Result};
pub use mcp::{McpServerInfo, McpServerInfos};
pub use state::{ChatRole, TaskState, UnitState};
