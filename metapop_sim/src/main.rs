//! Metapop simulator CLI
//!
//! Runs the metapopulation SIR model and writes the global population of
//! every step to a CSV table.

use clap::Parser;
use metapop_sim::{ConfigError, GraphMode, LbMethod, SimConfig, SimRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Distributed metapopulation SIR simulator
#[derive(Parser, Debug)]
#[command(name = "metapop-sim")]
#[command(about = "Run a metapopulation SIR epidemic simulation", long_about = None)]
struct Args {
    /// Number of cities
    #[arg(short = 'n', long, default_value = "100")]
    city_count: usize,

    /// Average initial population by city
    #[arg(short, long, default_value = "40000")]
    population: f64,

    /// Average initial number of infected people by city
    #[arg(short, long, default_value = "1")]
    infected: f64,

    /// Remission rate of infected people
    #[arg(short, long, default_value = "0.2")]
    alpha: f64,

    /// Infection rate
    #[arg(short, long, default_value = "0.5")]
    beta: f64,

    /// Average out-degree of each city
    #[arg(short = 'k', long, default_value = "6")]
    graph_degree: f64,

    /// City graph (clustered, uniform)
    #[arg(short, long, default_value = "clustered")]
    graph_mode: String,

    /// CSV file receiving the global population of each step
    #[arg(short, long, default_value = "output.csv")]
    output_file: String,

    /// Number of steps to run
    #[arg(short = 's', long, default_value = "1000")]
    max_step: u64,

    /// Number of workers
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Master seed for determinism
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Load balancing method (random, block)
    #[arg(short, long, default_value = "random")]
    lb_method: String,

    /// Steps between two load balancing phases (only step 0 if unset)
    #[arg(long)]
    lb_period: Option<u64>,

    /// Fraction of each compartment migrated per step
    #[arg(long, default_value = "0.12")]
    migration_rate: f64,

    /// Shuffle each worker's agent order at every step
    #[arg(long)]
    shuffle: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn to_config(&self) -> Result<SimConfig, ConfigError> {
        let config = SimConfig {
            seed: self.seed,
            city_count: self.city_count,
            population: self.population,
            infected: self.infected,
            alpha: self.alpha,
            beta: self.beta,
            migration_rate: self.migration_rate,
            graph_degree: self.graph_degree,
            graph_mode: self.graph_mode.parse::<GraphMode>()?,
            workers: self.workers,
            max_step: self.max_step,
            lb_method: self.lb_method.parse::<LbMethod>()?,
            lb_period: self.lb_period,
            shuffle: self.shuffle,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let config = args.to_config().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    if !args.json {
        info!("Metapop SIR Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "{} graph, {} load balancing, output to {}",
            config.graph_mode, config.lb_method, args.output_file
        );
    }

    let summary = match SimRunner::new(config).with_output(&args.output_file).run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                std::process::exit(1);
            }
        }
    } else if summary.passed {
        info!(
            "✓ {} steps, N {:.3} → {:.3} (drift {:.2e})",
            summary.steps,
            summary.initial.N(),
            summary.final_population.N(),
            summary.mass_drift
        );
        if let Some((step, infected)) = summary.peak_infected {
            info!("Infection peak at step {}: {:.3} infected", step, infected);
        }
    } else {
        error!("✗ {}", summary.failure_reason.as_deref().unwrap_or("unknown"));
    }

    if !summary.passed {
        std::process::exit(1);
    }
}
