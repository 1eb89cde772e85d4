//! Load balancing: agent-to-worker placement plans.

use crate::error::ConfigError;
use metapop_core::SirModel;
use metapop_env::{AgentId, WorkerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Load balancing methods selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LbMethod {
    /// Every agent on a uniformly random worker
    #[default]
    Random,

    /// Contiguous blocks of cities, each disease with its city
    Block,
}

impl LbMethod {
    pub fn name(&self) -> &'static str {
        match self {
            LbMethod::Random => "random",
            LbMethod::Block => "block",
        }
    }

    /// Creates the balancer for this method.
    pub fn balancer(&self, seed: u64) -> Box<dyn LoadBalancer> {
        match self {
            LbMethod::Random => Box::new(RandomBalancer::new(seed)),
            LbMethod::Block => Box::new(BlockBalancer),
        }
    }
}

impl std::fmt::Display for LbMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LbMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(LbMethod::Random),
            "block" | "blocks" => Ok(LbMethod::Block),
            _ => Err(ConfigError::UnknownLbMethod(s.to_string())),
        }
    }
}

/// Computes a placement for every agent of a model.
pub trait LoadBalancer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Target worker of each agent at `step`. Agents missing from the plan
    /// stay where they are.
    fn plan(&self, model: &SirModel, workers: usize, step: u64) -> Vec<(AgentId, WorkerId)>;
}

/// Places each agent independently on a random worker.
#[derive(Debug, Clone)]
pub struct RandomBalancer {
    seed: u64,
}

impl RandomBalancer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl LoadBalancer for RandomBalancer {
    fn name(&self) -> &'static str {
        "random"
    }

    fn plan(&self, model: &SirModel, workers: usize, step: u64) -> Vec<(AgentId, WorkerId)> {
        let workers = workers.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(step));
        model
            .cities()
            .iter()
            .chain(model.diseases())
            .map(|handle| (handle.id(), WorkerId(rng.gen_range(0..workers))))
            .collect()
    }
}

/// Splits cities into contiguous blocks, one per worker.
///
/// Diseases are co-located with their city, so disease updates never need a
/// remote acquire.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockBalancer;

impl LoadBalancer for BlockBalancer {
    fn name(&self) -> &'static str {
        "block"
    }

    fn plan(&self, model: &SirModel, workers: usize, _step: u64) -> Vec<(AgentId, WorkerId)> {
        let workers = workers.max(1);
        let count = model.cities().len();
        let mut plan = Vec::with_capacity(count * 2);

        // SirModel::build creates disease i for city i
        for (i, (city, disease)) in model.cities().iter().zip(model.diseases()).enumerate() {
            let worker = WorkerId(i * workers / count);
            plan.push((city.id(), worker));
            plan.push((disease.id(), worker));
        }
        plan
    }
}
