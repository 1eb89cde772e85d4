//! City agent and the cross-partition migration protocol.
//!
//! Each step a city pushes part of its population to every city-to-city
//! neighbor. One edge transfer is two short holds, never overlapping:
//!
//! ```text
//! lock(source)      packet = (g_s*m*S, g_i*m*I, g_r*m*R); source -= packet
//! release(source)
//! acquire(target)   target.arrivals += packet          (target may be remote)
//! release(target)   commit
//! ```
//!
//! Every transfer conserves mass on its own, so the global N is conserved
//! once all transfers of a step have committed, whatever the order and
//! whichever worker owns each endpoint. There is no atomicity across the
//! whole fan-out of a city.

use crate::agent::{SirAgent, CITY_TO_CITY};
use crate::error::CoreError;
use crate::population::Population;
use metapop_env::{GraphContext, Handle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A city holding an SIR population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Current city population
    #[serde(rename = "pop")]
    pub population: Population,

    /// Migrants received during the current step, not yet settled
    #[serde(default)]
    pub arrivals: Population,

    /// Susceptible people migration rate
    pub g_s: f64,

    /// Infected people migration rate
    pub g_i: f64,

    /// Removed people migration rate
    pub g_r: f64,
}

impl City {
    /// Creates a city. Rates must lie in [0, 1] and the population must be
    /// finite and non-negative.
    pub fn new(population: Population, g_s: f64, g_i: f64, g_r: f64) -> Result<Self, CoreError> {
        for (name, rate) in [("g_s", g_s), ("g_i", g_i), ("g_r", g_r)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(CoreError::invalid(format!("{} must be in [0, 1], got {}", name, rate)));
            }
        }
        if !population.is_valid() {
            return Err(CoreError::invalid(format!("invalid city population {}", population)));
        }
        Ok(Self {
            population,
            arrivals: Population::default(),
            g_s,
            g_i,
            g_r,
        })
    }

    /// Population sent to one neighbor when the out-degree share is `m`.
    pub fn migration_packet(&self, m: f64) -> Population {
        Population::new(
            self.g_s * m * self.population.S,
            self.g_i * m * self.population.I,
            self.g_r * m * self.population.R,
        )
    }

    /// Resident population plus unsettled arrivals.
    pub fn total(&self) -> Population {
        self.population + self.arrivals
    }

    /// Moves the arrivals buffer into the resident population.
    pub fn settle_arrivals(&mut self) {
        self.population += self.arrivals;
        self.arrivals = Population::default();
    }
}

/// City behavior: migrate an equal share to each city-to-city neighbor.
///
/// Returns the number of edges migrated along. A city without neighbors
/// keeps its population.
pub async fn act<Ctx>(ctx: &Ctx, city: &Handle<SirAgent>) -> Result<usize, CoreError>
where
    Ctx: GraphContext<SirAgent>,
{
    let neighbors = ctx.out_neighbors(city, CITY_TO_CITY);
    if neighbors.is_empty() {
        return Ok(0);
    }

    // The same share is sent to each neighbor
    let m = 1.0 / neighbors.len() as f64;

    let mut remaining = None;
    for neighbor in &neighbors {
        remaining = Some(migrate(ctx, city, neighbor, m).await?);
    }

    if let Some(population) = remaining {
        debug!(
            worker = %ctx.worker_id(),
            city = %city.id(),
            "Updated city population : {:.3}",
            population.N()
        );
    }
    Ok(neighbors.len())
}

/// Moves one migration packet from `source` to `target`.
///
/// `source` must be owned by the executing worker. The source hold is
/// released before the target is acquired. Returns the source's resident
/// population after the debit.
pub async fn migrate<Ctx>(
    ctx: &Ctx,
    source: &Handle<SirAgent>,
    target: &Handle<SirAgent>,
    m: f64,
) -> Result<Population, CoreError>
where
    Ctx: GraphContext<SirAgent>,
{
    let source_id = source.id();
    let target_id = target.id();

    if !ctx.is_local(source) {
        return Err(CoreError::NotLocal {
            agent: source_id,
            worker: ctx.worker_id(),
        });
    }
    // Agent kinds never change, so the ghost is enough to reject a bad edge
    // before any mass leaves the source
    if !ctx.ghost(target, SirAgent::is_city) {
        return Err(CoreError::NotACity(target_id));
    }

    let (packet, remaining) = ctx
        .lock(source, |agent| {
            let city = agent.as_city_mut().ok_or(CoreError::NotACity(source_id))?;
            let packet = city.migration_packet(m);
            city.population -= packet;
            Ok::<_, CoreError>((packet, city.population))
        })
        .await??;

    ctx.acquire(target, |agent| {
        let city = agent.as_city_mut().ok_or(CoreError::NotACity(target_id))?;
        city.arrivals += packet;
        Ok::<_, CoreError>(())
    })
    .await??;

    Ok(remaining)
}
