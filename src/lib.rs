pub mod modules;

pub use modules::agent::{Activity, Agent};
pub use modules::claims::ClaimRegistry;
pub use modules::config::{
    DEFAULT_COMMUNICATION_RANGE, DEFAULT_EXPLORATION_JITTER, DEFAULT_MAX_STEPS, SimConfig,
};
pub use modules::decision::{AgentState, AgentView, Surroundings, Transition, transition};
pub use modules::error::{ConfigError, GridError, LayoutError, RecordError};
pub use modules::grid::{
    AgentId, Cell, DEFAULT_STACK_CAPACITY, Direction, GridWorld, Item, ItemId, Position,
};
pub use modules::layout::Layout;
pub use modules::message::{Envelope, Inbox, Message, Network, Recipient};
pub use modules::path::{route, walk};
pub use modules::perception::{DEFAULT_SENSOR_RANGE, KnownItems, scan};
pub use modules::record::{RunRecord, RunStore};
pub use modules::report::{AgentSummary, ReportFormat, ShelfSummary, SimulationReport};
pub use modules::sim::{Broadcast, Counts, RunOutcome, Simulation, TurnReport};
