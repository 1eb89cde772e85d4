//! Run orchestration and summary.

use crate::error::SimError;
use crate::output::PopulationOutput;
use crate::world::{SimConfig, SimWorld};
use metapop_core::Population;
use metapop_env::SyncStatsSnapshot;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Largest relative change of the global population accepted at the end of
/// a run.
pub const MASS_TOLERANCE: f64 = 1e-6;

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Seed used
    pub seed: u64,

    /// Number of workers
    pub workers: usize,

    /// Steps executed
    pub steps: u64,

    /// Global population before the first step
    pub initial: Population,

    /// Global population after the last step
    pub final_population: Population,

    /// Step at which the infected compartment peaked, and its size
    pub peak_infected: Option<(u64, f64)>,

    /// |N_final - N_initial| / N_initial (0 for an empty population)
    pub mass_drift: f64,

    /// Whether the global population was conserved
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Synchronization counters collected during the run
    pub stats: SyncStatsSnapshot,
}

impl RunSummary {
    /// Summarizes the steps a world has completed so far.
    pub fn from_world(world: &SimWorld) -> Self {
        let initial = world.initial_population();
        let final_population = world
            .records()
            .last()
            .map(|record| record.population())
            .unwrap_or(initial);

        let mass_drift = if initial.N() > 0.0 {
            (final_population.N() - initial.N()).abs() / initial.N()
        } else {
            final_population.N().abs()
        };
        let passed = mass_drift <= MASS_TOLERANCE && final_population.is_valid();
        let failure_reason = if passed {
            None
        } else {
            Some(format!(
                "global population drifted from {:.6} to {:.6}",
                initial.N(),
                final_population.N()
            ))
        };

        let peak_infected = world
            .records()
            .iter()
            .max_by(|a, b| a.I.total_cmp(&b.I))
            .map(|record| (record.step, record.I));

        Self {
            seed: world.config().seed,
            workers: world.config().workers,
            steps: world.step_count(),
            initial,
            final_population,
            peak_infected,
            mass_drift,
            passed,
            failure_reason,
            stats: world.stats(),
        }
    }
}

/// Builds and runs a [`SimWorld`] from a configuration.
#[derive(Debug, Clone)]
pub struct SimRunner {
    config: SimConfig,

    /// CSV table destination, none to keep rows in memory only
    output_path: Option<PathBuf>,
}

impl SimRunner {
    /// Creates a new runner.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            output_path: None,
        }
    }

    /// Writes the population table to `path`.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Runs the configured number of steps and returns the summary.
    pub async fn run(&self) -> Result<RunSummary, SimError> {
        info!(
            "Starting simulation: {} cities, {} workers, {} steps (seed={})",
            self.config.city_count, self.config.workers, self.config.max_step, self.config.seed
        );

        let mut world = SimWorld::new(self.config.clone()).await?;
        if let Some(path) = &self.output_path {
            world = world.with_output(PopulationOutput::create(path)?);
        }
        world.run().await?;

        let summary = RunSummary::from_world(&world);
        if summary.passed {
            info!(
                "Simulation finished: S={:.3} I={:.3} R={:.3} N={:.3}",
                summary.final_population.S,
                summary.final_population.I,
                summary.final_population.R,
                summary.final_population.N()
            );
        } else {
            warn!(
                "Simulation finished with errors: {}",
                summary.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        Ok(summary)
    }
}
