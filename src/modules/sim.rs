use std::collections::HashSet;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::modules::agent::{Activity, Agent};
use crate::modules::config::SimConfig;
use crate::modules::decision::AgentState;
use crate::modules::error::{ConfigError, LayoutError};
use crate::modules::grid::{AgentId, GridWorld, Position};
use crate::modules::layout::Layout;
use crate::modules::message::{Message, Network};

/// One message put on the network and the agents whose inboxes it reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub message: Message,
    pub origin: Position,
    pub reached: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub turn: u64,
    pub events: Vec<(AgentId, Activity)>,
    /// Broadcasts in the order they were sent.
    pub broadcasts: Vec<Broadcast>,
    /// Inboxes reached by this turn's broadcasts.
    pub deliveries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub steps: u64,
    pub success: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub single: usize,
    pub organized: usize,
    pub carried: usize,
    pub total: usize,
    pub shelves: usize,
}

/// Turn driver. Agents act one at a time in a freshly shuffled order each
/// turn; every broadcast is delivered before the next agent acts.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    world: GridWorld,
    agents: Vec<Agent>,
    network: Network,
    rng: StdRng,
    order: Vec<usize>,
    turn: u64,
    total_items: usize,
}

impl Simulation {
    pub fn new(config: SimConfig, layout: &Layout, seed: u64) -> Result<Self, LayoutError> {
        let world = layout.build_world(config.capacity)?;
        Self::from_world(config, world, seed).map_err(LayoutError::from)
    }

    /// Drive a hand-built world. Agents are taken from the grid in id order.
    pub fn from_world(config: SimConfig, world: GridWorld, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let agents: Vec<Agent> = world
            .agents()
            .map(|(id, pos)| Agent::new(id, pos, config.sensor_range))
            .collect();
        let order = (0..agents.len()).collect();
        let total_items = world.items().len();
        Ok(Self {
            network: Network::new(config.communication_range),
            rng: StdRng::seed_from_u64(seed),
            config,
            world,
            agents,
            order,
            turn: 0,
            total_items,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id() == id)
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_movements(&self) -> u64 {
        self.agents.iter().map(Agent::movements).sum()
    }

    pub fn counts(&self) -> Counts {
        Counts {
            single: self.world.single_items(),
            organized: self.world.organized_items(),
            carried: self.agents.iter().filter(|a| a.is_carrying()).count(),
            total: self.total_items,
            shelves: self.world.shelf_count(),
        }
    }

    /// Nobody carries anything, no stack of depth 1 remains and every item
    /// sits on a shelf.
    pub fn is_complete(&self) -> bool {
        let counts = self.counts();
        counts.carried == 0 && counts.single == 0 && counts.organized == counts.total
    }

    pub fn step(&mut self) -> TurnReport {
        self.turn += 1;
        self.order.shuffle(&mut self.rng);
        let jitter = self.config.exploration_jitter;
        let mut events = Vec::new();
        let mut broadcasts = Vec::new();
        let mut deliveries = 0;

        for slot in 0..self.order.len() {
            let idx = self.order[slot];
            let shelf_targets = self.shelf_targets(idx);

            let agent = &mut self.agents[idx];
            agent.process_messages();
            agent.sense(&self.world, &shelf_targets);
            let mut activities = agent.decide(&mut self.world, &shelf_targets, jitter, &mut self.rng);
            activities.extend(agent.execute(&mut self.world, &shelf_targets));
            let id = agent.id();
            let outbox = agent.take_outbox();

            events.extend(activities.into_iter().map(|activity| (id, activity)));
            for envelope in outbox {
                let reached = self.network.deliver(envelope, &mut self.agents);
                deliveries += reached.len();
                broadcasts.push(Broadcast {
                    message: envelope.message,
                    origin: envelope.origin,
                    reached,
                });
            }
        }

        let interval = self.config.progress_interval;
        if interval > 0 && self.turn % interval == 0 {
            let counts = self.counts();
            info!(
                turn = self.turn,
                single = counts.single,
                carried = counts.carried,
                organized = counts.organized,
                total = counts.total,
                shelves = counts.shelves,
                seeking = self.in_state(AgentState::Seeking),
                picking_up = self.in_state(AgentState::PickingUp),
                delivering = self.in_state(AgentState::Delivering),
                movements = self.total_movements(),
                "progress"
            );
        }

        TurnReport {
            turn: self.turn,
            events,
            broadcasts,
            deliveries,
        }
    }

    /// Step until every item is shelved or the turn budget runs out.
    pub fn run(&mut self) -> RunOutcome {
        let started = Instant::now();
        while self.turn < self.config.max_steps {
            self.step();
            if self.is_complete() {
                break;
            }
        }
        let success = self.is_complete();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            steps = self.turn,
            success,
            elapsed_ms,
            movements = self.total_movements(),
            "run finished"
        );
        RunOutcome {
            steps: self.turn,
            success,
            elapsed_ms,
        }
    }

    fn in_state(&self, state: AgentState) -> usize {
        self.agents.iter().filter(|a| a.state() == state).count()
    }

    /// Delivery targets of every other agent currently delivering.
    fn shelf_targets(&self, except: usize) -> HashSet<Position> {
        self.agents
            .iter()
            .enumerate()
            .filter(|(idx, agent)| *idx != except && agent.state() == AgentState::Delivering)
            .filter_map(|(_, agent)| agent.target())
            .collect()
    }
}
