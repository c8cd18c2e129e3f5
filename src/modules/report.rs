use std::fmt::Write as _;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::modules::decision::AgentState;
use crate::modules::grid::{AgentId, Position};
use crate::modules::sim::{RunOutcome, Simulation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Toon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub movements: u64,
    pub deliveries: u64,
    pub messages_sent: u64,
    pub state: AgentState,
    pub carrying: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfSummary {
    pub position: Position,
    pub size: usize,
}

/// End-of-run statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub width: i32,
    pub height: i32,
    pub steps: u64,
    pub elapsed_ms: u64,
    pub success: bool,
    pub total_movements: u64,
    pub single_items: usize,
    pub carried_items: usize,
    pub organized_items: usize,
    pub total_items: usize,
    pub shelf_count: usize,
    pub agents: Vec<AgentSummary>,
    /// Largest first.
    pub shelves: Vec<ShelfSummary>,
}

impl SimulationReport {
    pub fn from_simulation(sim: &Simulation, outcome: &RunOutcome) -> Self {
        let counts = sim.counts();
        let world = sim.world();

        let agents = sim
            .agents()
            .iter()
            .map(|agent| AgentSummary {
                id: agent.id(),
                movements: agent.movements(),
                deliveries: world.deliveries(agent.id()),
                messages_sent: agent.messages_sent(),
                state: agent.state(),
                carrying: agent.is_carrying(),
            })
            .collect();

        let mut shelves: Vec<ShelfSummary> = world
            .stacks()
            .filter(|(_, items)| items.len() >= 2)
            .map(|(position, items)| ShelfSummary {
                position,
                size: items.len(),
            })
            .collect();
        shelves.sort_by(|a, b| b.size.cmp(&a.size).then(a.position.cmp(&b.position)));

        Self {
            width: world.width(),
            height: world.height(),
            steps: outcome.steps,
            elapsed_ms: outcome.elapsed_ms,
            success: outcome.success,
            total_movements: sim.total_movements(),
            single_items: counts.single,
            carried_items: counts.carried,
            organized_items: counts.organized,
            total_items: counts.total,
            shelf_count: counts.shelves,
            agents,
            shelves,
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => serde_json::to_string_pretty(self),
            ReportFormat::Toon => {
                let value = serde_json::to_value(self)?;
                Ok(serde_toon::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
            }
        }
    }

    pub fn to_text(&self) -> String {
        let rule = "=".repeat(50);
        let mut out = String::new();
        let _ = writeln!(out, "FINAL RESULTS ({}x{})", self.width, self.height);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Time elapsed: {:.2} seconds", self.elapsed_ms as f64 / 1000.0);
        let _ = writeln!(out, "Total steps: {}", self.steps);
        let _ = writeln!(out, "Total movements by all agents: {}", self.total_movements);
        let _ = writeln!(
            out,
            "Single/carried items remaining: {}",
            self.single_items + self.carried_items
        );
        let _ = writeln!(
            out,
            "Items organized in stacks: {}/{}",
            self.organized_items, self.total_items
        );
        let _ = writeln!(out, "Total shelves formed: {}", self.shelf_count);
        let _ = writeln!(out, "Success: {}", self.success);

        let _ = writeln!(out, "\nAgent performance:");
        for agent in &self.agents {
            let carrying = if agent.carrying { "carrying" } else { "empty" };
            let _ = writeln!(
                out,
                "  Agent {}: {} moves, {} deliveries, {} messages, state={}, {}",
                agent.id, agent.movements, agent.deliveries, agent.messages_sent, agent.state, carrying
            );
        }

        let _ = writeln!(out, "\nShelf details:");
        if self.shelves.is_empty() {
            let _ = writeln!(out, "  No shelves formed.");
        }
        for shelf in &self.shelves {
            let _ = writeln!(out, "  Shelf at {}: {} items", shelf.position, shelf.size);
        }
        let _ = write!(out, "{rule}");
        out
    }
}
