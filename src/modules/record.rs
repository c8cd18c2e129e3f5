use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::modules::config::SimConfig;
use crate::modules::error::RecordError;
use crate::modules::layout::Layout;
use crate::modules::sim::{RunOutcome, Simulation};

/// Everything needed to reproduce a run: seed, configuration and the
/// exact initial layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub started_at: String,
    pub seed: u64,
    pub config: SimConfig,
    pub layout: Layout,
    pub layout_digest: String,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn new(seed: u64, config: SimConfig, layout: Layout, outcome: RunOutcome) -> Self {
        let now = Utc::now();
        Self {
            id: format!("run_{}_{}", seed, now.format("%Y%m%dT%H%M%S%3f")),
            started_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            seed,
            layout_digest: layout.digest(),
            config,
            layout,
            outcome,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    /// Re-run from the recorded layout and seed. Fails when the layout was
    /// tampered with or the replay ends differently.
    pub fn replay(&self) -> Result<(Simulation, RunOutcome), RecordError> {
        let computed = self.layout.digest();
        if computed != self.layout_digest {
            return Err(RecordError::DigestMismatch {
                recorded: self.layout_digest.clone(),
                computed,
            });
        }
        let mut sim = Simulation::new(self.config.clone(), &self.layout, self.seed)?;
        let outcome = sim.run();
        if outcome.steps != self.outcome.steps || outcome.success != self.outcome.success {
            return Err(RecordError::Diverged {
                recorded_steps: self.outcome.steps,
                recorded_success: self.outcome.success,
                replayed_steps: outcome.steps,
                replayed_success: outcome.success,
            });
        }
        info!(id = %self.id, steps = outcome.steps, "replay matched");
        Ok((sim, outcome))
    }
}

/// Directory of saved run records, one JSON file per run.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new(PathBuf::from(".warebots").join("runs"))
    }
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, record: &RunRecord) -> Result<PathBuf, RecordError> {
        fs::create_dir_all(&self.dir).map_err(|source| io_error(&self.dir, source))?;
        let path = self.dir.join(record.file_name());
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&path, json).map_err(|source| io_error(&path, source))?;
        Ok(path)
    }

    /// Accepts a record id, a file name inside the store, or any path.
    pub fn load(&self, name: &str) -> Result<RunRecord, RecordError> {
        let path = self.resolve(name);
        let bytes = fs::read(&path).map_err(|source| io_error(&path, source))?;
        serde_json::from_slice(&bytes).map_err(|source| RecordError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Record files sorted by name. A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<PathBuf>, RecordError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.dir, source)),
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json")
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Most recently started record, if any.
    pub fn latest(&self) -> Result<Option<RunRecord>, RecordError> {
        let mut latest: Option<RunRecord> = None;
        for path in self.list()? {
            let record = self.load(&path.display().to_string())?;
            if latest
                .as_ref()
                .is_none_or(|current| record.started_at > current.started_at)
            {
                latest = Some(record);
            }
        }
        Ok(latest)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return direct;
        }
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{name}.json")
        };
        self.dir.join(file)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.display().to_string(),
        source,
    }
}
