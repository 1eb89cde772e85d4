//! Model construction: cities, diseases and their links.

use crate::agent::{SirAgent, CITY_TO_CITY, DISEASE_TO_CITY};
use crate::city::City;
use crate::disease::{bound_city, Disease};
use crate::error::CoreError;
use crate::population::Population;
use crate::topology::Topology;
use metapop_env::{GraphContext, Handle};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Initial state shared by every city and disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of cities
    pub city_count: usize,

    /// Initial susceptible people by city
    pub population: f64,

    /// Initial infected people by city
    pub infected: f64,

    /// Migration rates applied to every city
    pub g_s: f64,
    pub g_i: f64,
    pub g_r: f64,

    /// Disease parameters applied to every city
    pub alpha: f64,
    pub beta: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            city_count: 100,
            population: 40000.0,
            infected: 1.0,
            g_s: 0.12,
            g_i: 0.12,
            g_r: 0.12,
            alpha: 0.2,
            beta: 0.5,
        }
    }
}

impl ModelConfig {
    /// Initial population of every city.
    pub fn initial_population(&self) -> Population {
        Population::new(self.population, self.infected, 0.0)
    }

    /// Checks every parameter by building a prototype city and disease.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.prototype_city()?;
        Disease::new(self.alpha, self.beta)?;
        Ok(())
    }

    fn prototype_city(&self) -> Result<City, CoreError> {
        City::new(self.initial_population(), self.g_s, self.g_i, self.g_r)
    }
}

/// Handles of every agent of a built model, in creation order.
#[derive(Debug, Clone, Default)]
pub struct SirModel {
    cities: Vec<Handle<SirAgent>>,
    diseases: Vec<Handle<SirAgent>>,
}

impl SirModel {
    /// Builds the model on `ctx`'s worker.
    ///
    /// City `i` is topology node `i`. Each city gets one disease linked to
    /// it with a `DISEASE_TO_CITY` edge.
    pub fn build<Ctx>(ctx: &Ctx, config: &ModelConfig, topology: &Topology) -> Result<Self, CoreError>
    where
        Ctx: GraphContext<SirAgent>,
    {
        if topology.node_count() != config.city_count {
            return Err(CoreError::invalid(format!(
                "topology has {} nodes for {} cities",
                topology.node_count(),
                config.city_count
            )));
        }
        let city = config.prototype_city()?;
        let disease = Disease::new(config.alpha, config.beta)?;

        let cities: Vec<_> = (0..config.city_count)
            .map(|_| ctx.add_agent(SirAgent::City(city.clone())))
            .collect();
        for &(source, target) in topology.edges() {
            ctx.link(&cities[source], &cities[target], CITY_TO_CITY)?;
        }

        let mut diseases = Vec::with_capacity(cities.len());
        for city in &cities {
            let handle = ctx.add_agent(SirAgent::Disease(disease));
            ctx.link(&handle, city, DISEASE_TO_CITY)?;
            diseases.push(handle);
        }

        info!(
            cities = cities.len(),
            edges = topology.edges().len(),
            saturated = topology.saturated().len(),
            "Model built"
        );
        Ok(Self { cities, diseases })
    }

    pub fn cities(&self) -> &[Handle<SirAgent>] {
        &self.cities
    }

    pub fn diseases(&self) -> &[Handle<SirAgent>] {
        &self.diseases
    }

    /// Checks that each disease is bound to exactly one city and each city
    /// to exactly one disease.
    pub fn validate<Ctx>(&self, ctx: &Ctx) -> Result<(), CoreError>
    where
        Ctx: GraphContext<SirAgent>,
    {
        let mut bound = HashSet::with_capacity(self.diseases.len());
        for disease in &self.diseases {
            let city = bound_city(ctx, disease)?;
            if !bound.insert(city.id()) {
                return Err(CoreError::invalid(format!("{} is bound to several diseases", city.id())));
            }
        }
        if let Some(city) = self.cities.iter().find(|city| !bound.contains(&city.id())) {
            return Err(CoreError::invalid(format!("{} has no disease", city.id())));
        }
        Ok(())
    }

    /// Sum of every city's population, arrivals included.
    pub async fn total_population<Ctx>(&self, ctx: &Ctx) -> Result<Population, CoreError>
    where
        Ctx: GraphContext<SirAgent>,
    {
        sum_cities(ctx, self.cities.iter()).await
    }

    /// Sum over the cities `ctx`'s worker currently owns.
    pub async fn local_population<Ctx>(&self, ctx: &Ctx) -> Result<Population, CoreError>
    where
        Ctx: GraphContext<SirAgent>,
    {
        sum_cities(ctx, self.cities.iter().filter(|city| ctx.is_local(city))).await
    }
}

/// Reads and sums the total of each city.
pub async fn sum_cities<'a, Ctx, I>(ctx: &Ctx, cities: I) -> Result<Population, CoreError>
where
    Ctx: GraphContext<SirAgent>,
    I: IntoIterator<Item = &'a Handle<SirAgent>>,
{
    let mut total = Population::default();
    for city in cities {
        let id = city.id();
        total += ctx
            .read(city, |agent| agent.as_city().map(City::total))
            .await?
            .ok_or(CoreError::NotACity(id))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city;
    use crate::disease::propagate_virus;
    use crate::topology::{GraphGenerator, PoissonDegree, UniformGenerator};
    use approx::assert_relative_eq;
    use metapop_env::{SharedGraph, SyncStats, TokioWorker, WorkerId};
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn small_config(city_count: usize) -> ModelConfig {
        ModelConfig {
            city_count,
            population: 1000.0,
            infected: 5.0,
            ..ModelConfig::default()
        }
    }

    fn topology(nodes: usize, seed: u64) -> Topology {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        UniformGenerator::new(PoissonDegree::new(3.0).unwrap())
            .generate(nodes, &mut rng)
            .unwrap()
    }

    async fn setup(
        workers: usize,
        cities: usize,
        seed: u64,
    ) -> (Arc<SharedGraph<SirAgent>>, Vec<TokioWorker<SirAgent>>, SirModel) {
        let graph = SharedGraph::new(workers, Arc::new(SyncStats::new()));
        let ctxs = graph.workers();
        let model = SirModel::build(&ctxs[0], &small_config(cities), &topology(cities, seed)).unwrap();

        // Round-robin placement
        for (i, handle) in model.cities().iter().chain(model.diseases()).enumerate() {
            graph.relocate(handle.id(), WorkerId(i % workers)).await.unwrap();
        }
        graph.synchronize().await;
        (graph, ctxs, model)
    }

    /// Runs one migration phase then one disease phase, each agent on its
    /// owning worker, in the given execution orders.
    async fn run_step(ctxs: &[TokioWorker<SirAgent>], model: &SirModel, city_order: &[usize], disease_order: &[usize]) {
        for &i in city_order {
            let handle = &model.cities()[i];
            city::act(&ctxs[handle.owner().index()], handle).await.unwrap();
        }
        for &i in disease_order {
            let handle = &model.diseases()[i];
            propagate_virus(&ctxs[handle.owner().index()], handle).await.unwrap();
        }
    }

    async fn city_populations(ctx: &TokioWorker<SirAgent>, model: &SirModel) -> Vec<Population> {
        let mut populations = Vec::new();
        for city in model.cities() {
            populations.push(ctx.read(city, |a| a.as_city().unwrap().total()).await.unwrap());
        }
        populations
    }

    #[test]
    fn test_config_validation() {
        assert!(ModelConfig::default().validate().is_ok());
        assert!(ModelConfig { g_i: 2.0, ..ModelConfig::default() }.validate().is_err());
        assert!(ModelConfig { beta: -0.5, ..ModelConfig::default() }.validate().is_err());
        assert!(ModelConfig { population: f64::NAN, ..ModelConfig::default() }.validate().is_err());
    }

    #[tokio::test]
    async fn test_build_links_one_disease_per_city() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let ctx = graph.worker(WorkerId::ROOT).unwrap();
        let topology = topology(20, 1);
        let model = SirModel::build(&ctx, &small_config(20), &topology).unwrap();

        assert_eq!(model.cities().len(), 20);
        assert_eq!(model.diseases().len(), 20);
        assert_eq!(graph.len(), 40);
        model.validate(&ctx).unwrap();

        let links: usize = model
            .cities()
            .iter()
            .map(|city| ctx.out_neighbors(city, CITY_TO_CITY).len())
            .sum();
        assert_eq!(links, topology.edges().len());

        let total = model.total_population(&ctx).await.unwrap();
        assert_relative_eq!(total.N(), 20.0 * 1005.0);
    }

    #[tokio::test]
    async fn test_build_rejects_mismatched_topology() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let ctx = graph.worker(WorkerId::ROOT).unwrap();
        let result = SirModel::build(&ctx, &small_config(10), &topology(5, 1));
        assert!(matches!(result, Err(CoreError::InvalidParameter(_))));
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_validate_detects_extra_binding() {
        let graph = SharedGraph::new(1, Arc::new(SyncStats::new()));
        let ctx = graph.worker(WorkerId::ROOT).unwrap();
        let model = SirModel::build(&ctx, &small_config(3), &topology(3, 2)).unwrap();

        ctx.link(&model.diseases()[0], &model.cities()[1], DISEASE_TO_CITY).unwrap();
        assert!(matches!(
            model.validate(&ctx),
            Err(CoreError::DiseaseBinding { edges: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_local_population_partitions_total() {
        let (_graph, ctxs, model) = setup(3, 12, 4).await;

        let mut sum = Population::default();
        for ctx in &ctxs {
            sum += model.local_population(ctx).await.unwrap();
        }
        let total = model.total_population(&ctxs[0]).await.unwrap();
        assert_relative_eq!(sum.N(), total.N());
        assert_relative_eq!(total.N(), 12.0 * 1005.0);
    }

    #[tokio::test]
    async fn test_steps_conserve_mass() {
        let (graph, ctxs, model) = setup(2, 30, 8).await;
        let order: Vec<usize> = (0..30).collect();
        let initial = model.total_population(&ctxs[0]).await.unwrap().N();

        for _ in 0..50 {
            run_step(&ctxs, &model, &order, &order).await;
            graph.synchronize().await;
        }

        let total = model.total_population(&ctxs[0]).await.unwrap();
        assert!(total.is_valid());
        assert_relative_eq!(total.N(), initial, max_relative = 1e-9);
        assert!(total.R > 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_execution_order_does_not_change_result(seed in any::<u64>(), workers in 1usize..5) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (reference, shuffled) = runtime.block_on(async {
                let cities = 15;
                let order: Vec<usize> = (0..cities).collect();
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let (_g1, ctxs, model) = setup(1, cities, seed).await;
                for _ in 0..3 {
                    run_step(&ctxs, &model, &order, &order).await;
                }
                let reference = city_populations(&ctxs[0], &model).await;

                let (_g2, ctxs, model) = setup(workers, cities, seed).await;
                for _ in 0..3 {
                    let mut city_order = order.clone();
                    let mut disease_order = order.clone();
                    city_order.shuffle(&mut rng);
                    disease_order.shuffle(&mut rng);
                    run_step(&ctxs, &model, &city_order, &disease_order).await;
                }
                (reference, city_populations(&ctxs[0], &model).await)
            });

            for (a, b) in reference.iter().zip(&shuffled) {
                for (x, y) in [(a.S, b.S), (a.I, b.I), (a.R, b.R)] {
                    prop_assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0), "{} != {}", a, b);
                }
            }
        }
    }
}
