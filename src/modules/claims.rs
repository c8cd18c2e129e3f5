use std::collections::HashMap;

use crate::modules::grid::{AgentId, Position};
use crate::modules::message::Message;

/// One agent's view of who is working on which coordinate.
///
/// Each agent owns its own registry and learns about other agents' claims
/// only through broadcast messages, so two registries may disagree for a
/// while. Two agents can both see a target as available before either
/// claim has propagated; whoever arrives first acts and the other falls
/// back on its failed legality check.
#[derive(Clone, Debug)]
pub struct ClaimRegistry {
    owner: AgentId,
    claims: HashMap<Position, AgentId>,
}

impl ClaimRegistry {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            claims: HashMap::new(),
        }
    }

    /// Record the owner as claimant and return the announcement to broadcast.
    pub fn claim(&mut self, position: Position) -> Message {
        self.claims.insert(position, self.owner);
        Message::TargetClaimed {
            position,
            sender: self.owner,
        }
    }

    /// Drop the owner's claim. Claims held by others are left untouched.
    pub fn release(&mut self, position: Position) -> Option<Message> {
        if self.claims.get(&position) != Some(&self.owner) {
            return None;
        }
        self.claims.remove(&position);
        Some(Message::TargetReleased {
            position,
            sender: self.owner,
        })
    }

    pub fn is_available(&self, position: Position) -> bool {
        match self.claims.get(&position) {
            Some(claimant) => *claimant == self.owner,
            None => true,
        }
    }

    pub fn claimant(&self, position: Position) -> Option<AgentId> {
        self.claims.get(&position).copied()
    }

    /// Apply a claim heard from the network.
    pub fn record(&mut self, position: Position, claimant: AgentId) {
        self.claims.insert(position, claimant);
    }

    /// Apply a release heard from the network.
    pub fn forget(&mut self, position: Position) {
        self.claims.remove(&position);
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
