//! Metapop Distributed Graph Substrate
//!
//! This crate provides the environment the epidemic core runs on: a graph
//! of agents partitioned across workers, where any agent may be owned by a
//! worker other than the one executing a behavior.
//!
//! # Core Concept: Handles and Scoped Holds
//!
//! Agents are reached through opaque [`Handle`]s. A handle never exposes
//! the state directly; a behavior must open a scoped hold:
//! - `lock` - exclusive hold (writes commit only on local agents)
//! - `acquire` - exclusive read-modify-write, committed on release
//! - `read` - shared fresh read
//! - `ghost` - possibly stale snapshot, refreshed by synchronization
//!
//! Holds are closures, so release happens on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use metapop_env::{GraphContext, SharedGraph, SyncStats, WorkerId};
//!
//! let graph = SharedGraph::new(4, Arc::new(SyncStats::new()));
//! let root = graph.worker(WorkerId::ROOT)?;
//! let agent = root.add_agent(state);
//!
//! root.acquire(&agent, |state| state.bump()).await?;
//! ```

mod context;
mod error;
mod graph;
mod network;
mod stats;
mod tokio_impl;
mod types;

pub use context::{AgentState, GraphContext};
pub use error::EnvError;
pub use graph::{Handle, SharedGraph};
pub use network::{gather_json, ChannelCommunicator, Communicator};
pub use stats::{SyncStats, SyncStatsSnapshot};
pub use tokio_impl::TokioWorker;
pub use types::{AgentId, Envelope, LayerId, WorkerId};
