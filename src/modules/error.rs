use std::io;

use crate::modules::grid::{AgentId, ItemId, Position};

/// Legality failures raised by [`GridWorld`](crate::GridWorld) mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),

    #[error("position {0} is a wall")]
    Wall(Position),

    #[error("position {position} is occupied by agent {occupant}")]
    Occupied { position: Position, occupant: AgentId },

    #[error("stack at {position} has depth {depth}; only single items can be picked up")]
    NotPickable { position: Position, depth: usize },

    #[error("stack at {position} is full (capacity {capacity})")]
    StackFull { position: Position, capacity: usize },

    #[error("item {0} is unknown")]
    UnknownItem(ItemId),

    #[error("item {0} is already on the grid")]
    ItemOnGrid(ItemId),

    #[error("agent {0} is not on the grid")]
    UnknownAgent(AgentId),

    #[error("agent {0} is already on the grid")]
    DuplicateAgent(AgentId),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid must be at least 3x3 (got {width}x{height})")]
    GridTooSmall { width: i32, height: i32 },

    #[error("stack capacity must be at least 2 (got {0})")]
    CapacityTooSmall(usize),

    #[error("exploration jitter must be within [0, 1] (got {0})")]
    JitterOutOfRange(f64),

    #[error("at least one agent is required")]
    NoAgents,

    #[error("{items} items and {agents} agents do not fit into {cells} interior cells")]
    Overcrowded {
        items: usize,
        agents: usize,
        cells: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("could not place {kind} {index} after {attempts} attempts")]
    Placement {
        kind: &'static str,
        index: usize,
        attempts: u32,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}; delete it to reset: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("layout digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },

    #[error(
        "replay diverged: recorded {recorded_steps} steps (success={recorded_success}), replayed {replayed_steps} steps (success={replayed_success})"
    )]
    Diverged {
        recorded_steps: u64,
        recorded_success: bool,
        replayed_steps: u64,
        replayed_success: bool,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
