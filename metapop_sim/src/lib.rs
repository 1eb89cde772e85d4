//! Metapopulation SIR simulation harness
//!
//! Runs the [`metapop_core`] model over several workers sharing one
//! [`metapop_env::SharedGraph`]. Each step executes a fixed phase sequence:
//!
//! ```text
//! ┌────────────────┐   ┌───────────┐   ┌─────────┐   ┌─────────────────┐   ┌────────┐
//! │ LoadBalancing  │──►│ Migration │──►│ Disease │──►│ Synchronization │──►│ Output │
//! │ (step 0 / lb_  │   │ city::act │   │ RK4 per │   │ refresh ghosts  │   │ gather │
//! │  period)       │   │           │   │ city    │   │                 │   │ → CSV  │
//! └────────────────┘   └───────────┘   └─────────┘   └─────────────────┘   └────────┘
//! ```
//!
//! Agent phases run one tokio task per worker over the agents that worker
//! owns, and end when every task has joined.
//!
//! # Usage
//!
//! ```ignore
//! use metapop_sim::{SimConfig, SimRunner};
//!
//! let config = SimConfig {
//!     city_count: 100,
//!     workers: 4,
//!     ..Default::default()
//! };
//!
//! let summary = SimRunner::new(config).with_output("output.csv").run().await?;
//! ```

pub mod balancer;
pub mod error;
pub mod output;
pub mod runner;
pub mod scheduler;
mod world;

pub use balancer::{BlockBalancer, LbMethod, LoadBalancer, RandomBalancer};
pub use error::{ConfigError, SimError};
pub use output::{PopulationOutput, RecordSink, StepRecord};
pub use runner::{RunSummary, SimRunner};
pub use scheduler::{Phase, Schedule};
pub use world::{generate_topology, GraphMode, SimConfig, SimWorld, StepReport};
