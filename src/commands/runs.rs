use clap::Subcommand;
use warebots::{ReportFormat, RunRecord, RunStore, SimulationReport};

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List saved runs
    List,
    /// Show a saved run (latest if omitted)
    Show {
        /// Record id, file name or path
        id: Option<String>,
        #[arg(long, default_value_t = ReportFormat::Text, value_enum)]
        format: ReportFormat,
    },
    /// Re-run a saved run and check that it ends the same way
    Replay {
        /// Record id, file name or path (latest if omitted)
        id: Option<String>,
        #[arg(long, default_value_t = ReportFormat::Text, value_enum)]
        format: ReportFormat,
    },
}

pub(super) fn run_runs(cmd: RunsCommand) -> Result<(), String> {
    let store = RunStore::default();

    match cmd {
        RunsCommand::List => {
            let paths = store.list().map_err(|e| e.to_string())?;
            if paths.is_empty() {
                println!("No saved runs in {}", store.dir().display());
                return Ok(());
            }
            for path in paths {
                let record = store
                    .load(&path.display().to_string())
                    .map_err(|e| e.to_string())?;
                println!(
                    "{}  seed={}  {}x{}  items={}  agents={}  steps={}  success={}",
                    record.id,
                    record.seed,
                    record.config.width,
                    record.config.height,
                    record.config.items,
                    record.config.agents,
                    record.outcome.steps,
                    record.outcome.success
                );
            }
        }
        RunsCommand::Show { id, format } => {
            let record = resolve(&store, id)?;
            println!("{}", render_record(&record, format)?);
        }
        RunsCommand::Replay { id, format } => {
            let record = resolve(&store, id)?;
            let (sim, outcome) = record.replay().map_err(|e| e.to_string())?;
            let report = SimulationReport::from_simulation(&sim, &outcome);
            println!("{}", report.render(format).map_err(|e| e.to_string())?);
            eprintln!(
                "Replay of {} matched: {} steps, success={}",
                record.id, outcome.steps, outcome.success
            );
        }
    }

    Ok(())
}

fn resolve(store: &RunStore, id: Option<String>) -> Result<RunRecord, String> {
    match id {
        Some(id) => store.load(&id).map_err(|e| e.to_string()),
        None => store
            .latest()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no saved runs; use `warebots run --save` first".to_string()),
    }
}

fn render_record(record: &RunRecord, format: ReportFormat) -> Result<String, String> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(record).map_err(|e| e.to_string()),
        ReportFormat::Toon => {
            let value = serde_json::to_value(record).map_err(|e| e.to_string())?;
            Ok(serde_toon::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
        }
        ReportFormat::Text => Ok(format!(
            "Run {}\n  started: {}\n  seed: {}\n  grid: {}x{}, capacity {}\n  items: {}, agents: {}\n  layout digest: {}\n  outcome: {} steps, success={}, {} ms",
            record.id,
            record.started_at,
            record.seed,
            record.config.width,
            record.config.height,
            record.config.capacity,
            record.layout.items.len(),
            record.layout.agents.len(),
            record.layout_digest,
            record.outcome.steps,
            record.outcome.success,
            record.outcome.elapsed_ms
        )),
    }
}
