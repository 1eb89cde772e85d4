//! SimWorld - the simulation harness container.

use crate::balancer::{LbMethod, LoadBalancer};
use crate::error::{ConfigError, SimError};
use crate::output::{PopulationOutput, RecordSink, StepRecord};
use crate::scheduler::{Phase, Schedule};

use metapop_core::model::sum_cities;
use metapop_core::{
    city, disease, AgentKind, ClusteredGenerator, CoreError, GraphGenerator, ModelConfig, PoissonDegree, Population,
    SirAgent, SirModel, Topology, UniformGenerator,
};
use metapop_env::{
    gather_json, ChannelCommunicator, Communicator, GraphContext, Handle, SharedGraph, SyncStats, SyncStatsSnapshot, TokioWorker,
    WorkerId,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// City graph generators selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GraphMode {
    /// Nearby cities are more likely to be linked
    #[default]
    Clustered,

    /// Targets drawn uniformly among all cities
    Uniform,
}

impl GraphMode {
    pub fn name(&self) -> &'static str {
        match self {
            GraphMode::Clustered => "clustered",
            GraphMode::Uniform => "uniform",
        }
    }
}

impl std::fmt::Display for GraphMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for GraphMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clustered" | "cluster" => Ok(GraphMode::Clustered),
            "uniform" => Ok(GraphMode::Uniform),
            _ => Err(ConfigError::UnknownGraphMode(s.to_string())),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of cities
    pub city_count: usize,

    /// Initial susceptible people by city
    pub population: f64,

    /// Initial infected people by city
    pub infected: f64,

    /// Disease remission rate
    pub alpha: f64,

    /// Disease infection rate
    pub beta: f64,

    /// Migration rate applied to every compartment
    pub migration_rate: f64,

    /// Mean out-degree of the city graph
    pub graph_degree: f64,

    pub graph_mode: GraphMode,

    /// Number of workers sharing the graph
    pub workers: usize,

    /// Number of steps to run
    pub max_step: u64,

    pub lb_method: LbMethod,

    /// Steps between two load balancing phases (step 0 only if unset)
    pub lb_period: Option<u64>,

    /// Shuffle each worker's agent order at every step
    pub shuffle: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            city_count: 100,
            population: 40000.0,
            infected: 1.0,
            alpha: 0.2,
            beta: 0.5,
            migration_rate: 0.12,
            graph_degree: 6.0,
            graph_mode: GraphMode::Clustered,
            workers: 4,
            max_step: 1000,
            lb_method: LbMethod::Random,
            lb_period: None,
            shuffle: false,
        }
    }
}

impl SimConfig {
    /// Model parameters derived from this configuration.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            city_count: self.city_count,
            population: self.population,
            infected: self.infected,
            g_s: self.migration_rate,
            g_i: self.migration_rate,
            g_r: self.migration_rate,
            alpha: self.alpha,
            beta: self.beta,
        }
    }

    /// Rejects configurations that cannot produce a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "at least one worker is required"));
        }
        if self.city_count == 0 {
            return Err(ConfigError::invalid("city_count", "at least one city is required"));
        }
        if !self.graph_degree.is_finite() || self.graph_degree < 0.0 {
            return Err(ConfigError::invalid(
                "graph_degree",
                format!("must be finite and >= 0, got {}", self.graph_degree),
            ));
        }
        if self.lb_period == Some(0) {
            return Err(ConfigError::invalid("lb_period", "must be at least 1"));
        }
        self.model_config()
            .validate()
            .map_err(|e| ConfigError::invalid("model", e.to_string()))
    }

    fn balance_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }

    fn shuffle_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x517cc1b727220a95)
    }
}

/// What happened during one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: u64,

    /// Phases executed, in order
    pub phases: Vec<Phase>,

    /// Agents whose owner changed
    pub relocated: usize,

    /// Cities executed in the migration phase
    pub cities: usize,

    /// Diseases executed in the disease phase
    pub diseases: usize,

    /// Global population gathered at the end of the step
    pub population: Population,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    config: SimConfig,

    /// Cluster-wide agent graph
    graph: Arc<SharedGraph<SirAgent>>,

    /// One execution context per worker, indexed by worker id
    workers: Vec<TokioWorker<SirAgent>>,

    /// One communicator per worker, indexed by rank
    comms: Vec<Arc<ChannelCommunicator>>,

    model: SirModel,
    schedule: Schedule,
    balancer: Box<dyn LoadBalancer>,

    /// Population table written by the root worker
    output: Option<Box<dyn RecordSink>>,

    /// Global population of every completed step
    records: Vec<StepRecord>,

    /// Global population before the first step
    initial: Population,

    /// Next step to run
    step: u64,
}

impl SimWorld {
    /// Validates the configuration, generates the city graph and builds the
    /// model on the root worker.
    pub async fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let stats = Arc::new(SyncStats::new());
        let graph = SharedGraph::new(config.workers, stats.clone());
        let workers = graph.workers();
        let comms: Vec<_> = ChannelCommunicator::mesh(config.workers, stats)
            .into_iter()
            .map(Arc::new)
            .collect();

        let topology = generate_topology(&config)?;
        info!(
            mode = %config.graph_mode,
            cities = topology.node_count(),
            mean_degree = topology.mean_out_degree(),
            "City graph generated"
        );

        let root = &workers[WorkerId::ROOT.index()];
        let model = SirModel::build(root, &config.model_config(), &topology)?;
        model.validate(root)?;
        graph.synchronize().await;
        let initial = model.total_population(root).await?;

        Ok(Self {
            schedule: Schedule::new(config.lb_period),
            balancer: config.lb_method.balancer(config.balance_seed()),
            config,
            graph,
            workers,
            comms,
            model,
            output: None,
            records: Vec::new(),
            initial,
            step: 0,
        })
    }

    /// Writes one row per step to `output`.
    pub fn with_output<W: Write + Send + 'static>(mut self, output: PopulationOutput<W>) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<SharedGraph<SirAgent>> {
        &self.graph
    }

    pub fn model(&self) -> &SirModel {
        &self.model
    }

    /// Global population of every completed step.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn initial_population(&self) -> Population {
        self.initial
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.graph.stats().snapshot()
    }

    /// Runs every phase of the next step.
    pub async fn step(&mut self) -> Result<StepReport, SimError> {
        let step = self.step;
        let phases = self.schedule.phases(step);
        let mut report = StepReport {
            step,
            phases: phases.clone(),
            relocated: 0,
            cities: 0,
            diseases: 0,
            population: Population::default(),
        };

        for phase in phases {
            match phase {
                Phase::LoadBalancing => report.relocated = self.balance(step).await?,
                Phase::Migration => report.cities = self.run_agents(AgentKind::City, step).await?,
                Phase::Disease => report.diseases = self.run_agents(AgentKind::Disease, step).await?,
                Phase::Synchronization => self.graph.synchronize().await,
                Phase::Output => report.population = self.output_population(step).await?,
            }
        }

        self.step += 1;
        Ok(report)
    }

    /// Runs the remaining steps up to `max_step`.
    pub async fn run(&mut self) -> Result<(), SimError> {
        while self.step < self.config.max_step {
            let report = self.step().await?;
            if report.step % 100 == 0 {
                info!(
                    step = report.step,
                    S = report.population.S,
                    I = report.population.I,
                    R = report.population.R,
                    "Step completed"
                );
            }
        }
        Ok(())
    }

    /// Applies the balancer's plan. Returns the number of agents moved.
    async fn balance(&self, step: u64) -> Result<usize, SimError> {
        let plan = self.balancer.plan(&self.model, self.workers.len(), step);
        let mut moved = 0;
        let mut bytes = 0;
        for (agent, worker) in plan {
            let size = self.graph.relocate(agent, worker).await?;
            if size > 0 {
                moved += 1;
                bytes += size;
            }
        }
        debug!(
            step,
            balancer = self.balancer.name(),
            moved,
            bytes,
            owners = ?self.graph.ownership_counts(),
            "Load balancing done"
        );
        Ok(moved)
    }

    /// Executes every agent of `kind` on its owning worker, one task per
    /// worker. Returns once all tasks have finished.
    async fn run_agents(&self, kind: AgentKind, step: u64) -> Result<usize, SimError> {
        let handles = match kind {
            AgentKind::City => self.model.cities(),
            AgentKind::Disease => self.model.diseases(),
        };
        let mut local: Vec<Vec<Handle<SirAgent>>> = vec![Vec::new(); self.workers.len()];
        for handle in handles {
            local[handle.owner().index()].push(handle.clone());
        }

        let mut tasks = JoinSet::new();
        for (ctx, mut agents) in self.workers.iter().cloned().zip(local) {
            if self.config.shuffle {
                let seed = self.config.shuffle_seed() ^ step.wrapping_mul(0x2545f4914f6cdd1d) ^ ctx.worker_id().index() as u64;
                agents.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
            }
            tasks.spawn(async move {
                for agent in &agents {
                    match kind {
                        AgentKind::City => {
                            city::act(&ctx, agent).await?;
                        }
                        AgentKind::Disease => {
                            disease::propagate_virus(&ctx, agent).await?;
                        }
                    }
                }
                Ok::<_, CoreError>(agents.len())
            });
        }

        let mut executed = 0;
        while let Some(joined) = tasks.join_next().await {
            executed += joined.map_err(SimError::task)??;
        }
        Ok(executed)
    }

    /// Sums the local cities of each worker, gathers the sums on the root
    /// and records the global population.
    async fn output_population(&mut self, step: u64) -> Result<Population, SimError> {
        let mut tasks = JoinSet::new();
        for (ctx, comm) in self.workers.iter().cloned().zip(self.comms.iter().cloned()) {
            let cities: Vec<_> = self.model.cities().iter().filter(|c| ctx.is_local(c)).cloned().collect();
            tasks.spawn(async move {
                let local = sum_cities(&ctx, &cities).await.map_err(SimError::from);
                gather_partial(comm.as_ref(), local).await
            });
        }

        // Join every task before reporting a failure so no envelope is left
        // in the root's inbox
        let mut gathered = None;
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(SimError::task).and_then(|result| result) {
                Ok(Some(total)) => gathered = Some(total),
                Ok(None) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        let population = gathered.ok_or_else(|| SimError::Task("root worker gathered nothing".to_string()))?;

        let record = StepRecord::new(step, population);
        if let Some(output) = self.output.as_mut() {
            output.record(&record)?;
        }
        self.records.push(record);
        Ok(population)
    }
}

/// Sends one worker's partial sum to the root and returns the global sum on
/// the root.
///
/// A worker whose sum failed still joins the gather with an empty part, so
/// the root never waits on it, then reports its own error.
pub(crate) async fn gather_partial<C>(comm: &C, local: Result<Population, SimError>) -> Result<Option<Population>, SimError>
where
    C: Communicator + ?Sized,
{
    let part = local.as_ref().ok().copied();
    let gathered = gather_json(comm, &part, WorkerId::ROOT).await?;
    local?;

    match gathered {
        Some(parts) => parts
            .into_iter()
            .enumerate()
            .map(|(rank, part)| part.ok_or_else(|| SimError::Task(format!("{} failed to sum its cities", WorkerId(rank)))))
            .sum::<Result<Population, _>>()
            .map(Some),
        None => Ok(None),
    }
}

/// Generates the city graph selected by the configuration.
pub fn generate_topology(config: &SimConfig) -> Result<Topology, CoreError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let degree = PoissonDegree::new(config.graph_degree)?;
    match config.graph_mode {
        GraphMode::Clustered => ClusteredGenerator::new(degree).generate(config.city_count, &mut rng),
        GraphMode::Uniform => UniformGenerator::new(degree).generate(config.city_count, &mut rng),
    }
}
