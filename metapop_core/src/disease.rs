//! Disease agent: drives the SIR dynamics of exactly one city.

use crate::agent::{SirAgent, DISEASE_TO_CITY};
use crate::city::City;
use crate::error::CoreError;
use crate::population::Population;
use crate::rk4::Rk4;
use metapop_env::{GraphContext, Handle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Integration step
pub const DELTA_T: f64 = 0.1;

/// SIR parameters bound to one city through a `DISEASE_TO_CITY` edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    /// Remission rate of infected people
    alpha: f64,

    /// Average number of people infected by one infected person per unit time
    beta: f64,
}

impl Disease {
    /// Creates a disease. Both rates must be finite and non-negative.
    pub fn new(alpha: f64, beta: f64) -> Result<Self, CoreError> {
        for (name, rate) in [("alpha", alpha), ("beta", beta)] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(CoreError::invalid(format!("{} must be finite and >= 0, got {}", name, rate)));
            }
        }
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Settles the city's arrivals, then advances it by one RK4 step.
    pub fn update(&self, city: &mut City) {
        city.settle_arrivals();
        city.population = Rk4::solve(self.alpha, self.beta, DELTA_T, &city.population);
    }
}

/// Resolves the single city a disease is bound to.
pub fn bound_city<Ctx>(ctx: &Ctx, disease: &Handle<SirAgent>) -> Result<Handle<SirAgent>, CoreError>
where
    Ctx: GraphContext<SirAgent>,
{
    let mut cities = ctx.out_neighbors(disease, DISEASE_TO_CITY);
    if cities.len() != 1 {
        return Err(CoreError::DiseaseBinding {
            disease: disease.id(),
            edges: cities.len(),
        });
    }
    let city = cities.remove(0);
    if !ctx.ghost(&city, SirAgent::is_city) {
        return Err(CoreError::NotACity(city.id()));
    }
    Ok(city)
}

/// Disease behavior: integrate the bound city under an exclusive acquire.
///
/// Returns the city's population after the update.
pub async fn propagate_virus<Ctx>(ctx: &Ctx, disease: &Handle<SirAgent>) -> Result<Population, CoreError>
where
    Ctx: GraphContext<SirAgent>,
{
    let disease_id = disease.id();
    let params = ctx
        .read(disease, |agent| agent.as_disease().copied())
        .await?
        .ok_or(CoreError::NotADisease(disease_id))?;

    let city = bound_city(ctx, disease)?;
    let city_id = city.id();

    let population = ctx
        .acquire(&city, |agent| {
            let city = agent.as_city_mut().ok_or(CoreError::NotACity(city_id))?;
            params.update(city);
            Ok::<_, CoreError>(city.population)
        })
        .await??;

    debug!(
        worker = %ctx.worker_id(),
        city = %city_id,
        "Updated city population : {:.3}, {:.3}, {:.3}",
        population.S,
        population.I,
        population.R
    );
    Ok(population)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use metapop_env::{SharedGraph, SyncStats, WorkerId};
    use std::sync::Arc;

    fn city(s: f64, i: f64) -> SirAgent {
        City::new(Population::new(s, i, 0.0), 0.12, 0.12, 0.12).unwrap().into()
    }

    #[test]
    fn test_new_rejects_bad_parameters() {
        assert!(Disease::new(-0.1, 0.5).is_err());
        assert!(Disease::new(0.2, f64::NAN).is_err());
        assert!(Disease::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_serialized_fields() {
        let json = serde_json::to_value(Disease::new(0.2, 0.5).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"alpha": 0.2, "beta": 0.5}));
    }

    #[test]
    fn test_update_settles_arrivals_first() {
        let disease = Disease::new(0.2, 0.5).unwrap();
        let mut c = City::new(Population::new(900.0, 1.0, 0.0), 0.1, 0.1, 0.1).unwrap();
        c.arrivals = Population::new(99.0, 0.0, 0.0);

        disease.update(&mut c);

        let expected = Rk4::solve(0.2, 0.5, DELTA_T, &Population::new(999.0, 1.0, 0.0));
        assert_eq!(c.population, expected);
        assert_eq!(c.arrivals, Population::default());
    }

    #[tokio::test]
    async fn test_propagate_remote_city() {
        let graph = SharedGraph::new(2, Arc::new(SyncStats::new()));
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let c = root.add_agent(city(999.0, 1.0));
        let d = root.add_agent(Disease::new(0.2, 0.5).unwrap().into());
        root.link(&d, &c, DISEASE_TO_CITY).unwrap();
        graph.relocate(c.id(), WorkerId(1)).await.unwrap();

        let updated = propagate_virus(&root, &d).await.unwrap();
        let expected = Rk4::solve(0.2, 0.5, DELTA_T, &Population::new(999.0, 1.0, 0.0));
        assert_relative_eq!(updated.I, expected.I, epsilon = 1e-9);

        let stored = root.read(&c, |a| a.as_city().unwrap().population).await.unwrap();
        assert_relative_eq!(stored.S, expected.S, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_unbound_disease_is_rejected() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let d = root.add_agent(Disease::new(0.2, 0.5).unwrap().into());

        let result = propagate_virus(&root, &d).await;
        assert!(matches!(result, Err(CoreError::DiseaseBinding { edges: 0, .. })));
    }

    #[tokio::test]
    async fn test_doubly_bound_disease_is_rejected() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let a = root.add_agent(city(10.0, 1.0));
        let b = root.add_agent(city(10.0, 1.0));
        let d = root.add_agent(Disease::new(0.2, 0.5).unwrap().into());
        root.link(&d, &a, DISEASE_TO_CITY).unwrap();
        root.link(&d, &b, DISEASE_TO_CITY).unwrap();

        let result = propagate_virus(&root, &d).await;
        assert!(matches!(result, Err(CoreError::DiseaseBinding { edges: 2, .. })));

        // Neither city was touched
        let a_pop = root.read(&a, |x| x.as_city().unwrap().population).await.unwrap();
        assert_eq!(a_pop, Population::new(10.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn test_city_scheduled_as_disease_is_rejected() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let c = root.add_agent(city(10.0, 1.0));

        let result = propagate_virus(&root, &c).await;
        assert!(matches!(result, Err(CoreError::NotADisease(_))));
    }
}
