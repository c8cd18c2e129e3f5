use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::modules::error::ConfigError;
use crate::modules::grid::DEFAULT_STACK_CAPACITY;
use crate::modules::perception::DEFAULT_SENSOR_RANGE;

pub const DEFAULT_COMMUNICATION_RANGE: i32 = 8;
pub const DEFAULT_MAX_STEPS: u64 = 2000;
/// Chance per turn that an exploring agent abandons its waypoint.
pub const DEFAULT_EXPLORATION_JITTER: f64 = 0.1;

/// Every tunable of a run. Missing JSON fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: i32,
    pub height: i32,
    pub items: usize,
    pub agents: usize,
    pub capacity: usize,
    pub sensor_range: i32,
    pub communication_range: i32,
    pub max_steps: u64,
    pub exploration_jitter: f64,
    /// Minimum Manhattan distance between agents at placement time.
    pub min_agent_spacing: i32,
    pub placement_attempts: u32,
    /// Turns between progress log lines; 0 disables them.
    pub progress_interval: u64,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 12,
            height: 12,
            items: 22,
            agents: 5,
            capacity: DEFAULT_STACK_CAPACITY,
            sensor_range: DEFAULT_SENSOR_RANGE,
            communication_range: DEFAULT_COMMUNICATION_RANGE,
            max_steps: DEFAULT_MAX_STEPS,
            exploration_jitter: DEFAULT_EXPLORATION_JITTER,
            min_agent_spacing: 3,
            placement_attempts: 200,
            progress_interval: 100,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn interior_cells(&self) -> usize {
        let w = usize::try_from(self.width.saturating_sub(2)).unwrap_or(0);
        let h = usize::try_from(self.height.saturating_sub(2)).unwrap_or(0);
        w.saturating_mul(h)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 3 || self.height < 3 {
            return Err(ConfigError::GridTooSmall {
                width: self.width,
                height: self.height,
            });
        }
        if self.capacity < 2 {
            return Err(ConfigError::CapacityTooSmall(self.capacity));
        }
        if !(0.0..=1.0).contains(&self.exploration_jitter) {
            return Err(ConfigError::JitterOutOfRange(self.exploration_jitter));
        }
        if self.agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        let cells = self.interior_cells();
        if self.items.saturating_add(self.agents) > cells {
            return Err(ConfigError::Overcrowded {
                items: self.items,
                agents: self.agents,
                cells,
            });
        }
        Ok(())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse config file {}: {}", path.display(), e),
            )
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)
    }
}
