//! # Metapop Core
//!
//! SIR metapopulation model running on the [`metapop_env`] substrate.
//!
//! ## Agents
//!
//! - **City**: holds a [`Population`] and pushes part of it to each
//!   city-to-city neighbor every step ([`city::act`])
//! - **Disease**: bound to exactly one city, integrates its SIR dynamics
//!   with [`Rk4`] every step ([`disease::propagate_virus`])
//!
//! Both live in one graph as [`SirAgent`] values. Migration edges use
//! [`CITY_TO_CITY`], disease bindings use [`DISEASE_TO_CITY`].
//!
//! ## Topology
//!
//! [`topology`] builds uniform or spatially clustered city graphs with
//! Poisson out-degrees; [`SirModel::build`] turns one into agents.

pub mod agent;
pub mod city;
pub mod disease;
pub mod error;
pub mod model;
pub mod population;
pub mod rk4;
pub mod topology;

pub use agent::{AgentKind, SirAgent, CITY_TO_CITY, DISEASE_TO_CITY};
pub use city::City;
pub use disease::{Disease, DELTA_T};
pub use error::CoreError;
pub use model::{ModelConfig, SirModel};
pub use population::Population;
pub use rk4::Rk4;
pub use topology::{ClusteredGenerator, GraphGenerator, Location, PoissonDegree, Topology, UniformGenerator};
