use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warebots::{Layout, ReportFormat, RunRecord, RunStore, SimConfig, Simulation, SimulationReport};

mod runs;

use runs::{RunsCommand, run_runs};

#[derive(Parser)]
#[command(
    name = "warebots",
    version,
    about = "Decentralized warehouse robots stacking loose items into shelves",
    long_about = None
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one simulation and print the final report
    Run {
        /// JSON configuration file (defaults apply to missing fields)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
        /// Report format
        #[arg(long, default_value_t = ReportFormat::Text, value_enum)]
        format: ReportFormat,
        /// Persist a run record for later replay
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        save: bool,
    },
    /// Write a configuration file filled with defaults
    Config {
        #[arg(short = 'o', long, default_value = "warebots.json")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        force: bool,
    },
    /// Saved run records
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
}

/// Command-line values that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    #[arg(long)]
    width: Option<i32>,
    #[arg(long)]
    height: Option<i32>,
    /// Number of items to scatter
    #[arg(long)]
    items: Option<usize>,
    /// Number of agents
    #[arg(long)]
    agents: Option<usize>,
    /// Maximum stack height
    #[arg(long)]
    capacity: Option<usize>,
    #[arg(long)]
    sensor_range: Option<i32>,
    #[arg(long)]
    communication_range: Option<i32>,
    /// Turn budget
    #[arg(short = 't', long)]
    max_steps: Option<u64>,
    /// Per-turn chance that an exploring agent picks a new waypoint
    #[arg(long)]
    jitter: Option<f64>,
    /// Seed for placement and turn order (random if omitted)
    #[arg(short = 's', long)]
    seed: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut SimConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(items) = self.items {
            config.items = items;
        }
        if let Some(agents) = self.agents {
            config.agents = agents;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(range) = self.sensor_range {
            config.sensor_range = range;
        }
        if let Some(range) = self.communication_range {
            config.communication_range = range;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(jitter) = self.jitter {
            config.exploration_jitter = jitter;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

pub fn run() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = dispatch(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            config,
            overrides,
            format,
            save,
        } => run_simulation(config, overrides, format, save),
        Command::Config { output, force } => run_config(output, force),
        Command::Runs { command } => run_runs(command),
    }
}

fn run_simulation(
    config_path: Option<PathBuf>,
    overrides: Overrides,
    format: ReportFormat,
    save: bool,
) -> Result<(), String> {
    let mut config = match config_path {
        Some(path) => SimConfig::load(&path).map_err(|e| e.to_string())?,
        None => SimConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().map_err(|e| e.to_string())?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let layout =
        Layout::random(&config, &mut StdRng::seed_from_u64(seed)).map_err(|e| e.to_string())?;
    info!(
        seed,
        width = config.width,
        height = config.height,
        items = config.items,
        agents = config.agents,
        digest = %layout.digest(),
        "starting run"
    );

    let mut sim = Simulation::new(config.clone(), &layout, seed).map_err(|e| e.to_string())?;
    let outcome = sim.run();
    let report = SimulationReport::from_simulation(&sim, &outcome);
    println!("{}", report.render(format).map_err(|e| e.to_string())?);

    if save {
        let record = RunRecord::new(seed, config, layout, outcome);
        let path = RunStore::default()
            .save(&record)
            .map_err(|e| e.to_string())?;
        eprintln!("Saved run {} (seed {}) to {}", record.id, seed, path.display());
    }
    Ok(())
}

fn run_config(output: PathBuf, force: bool) -> Result<(), String> {
    if output.exists() && !force {
        return Err(format!(
            "{} already exists; pass --force to overwrite",
            output.display()
        ));
    }
    SimConfig::default()
        .save(&output)
        .map_err(|e| e.to_string())?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "warebots", "-vv", "run", "--items", "10", "--seed", "3", "--max-steps", "50",
            "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run {
            overrides, format, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(format, ReportFormat::Json);

        let mut config = SimConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.items, 10);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.agents, 5);
    }

    #[test]
    fn runs_subcommands_parse() {
        let cli = Cli::try_parse_from(["warebots", "runs", "replay", "run_1_x"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Runs {
                command: RunsCommand::Replay { id: Some(_), .. }
            }
        ));
    }
}
