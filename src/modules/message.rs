use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modules::grid::{AgentId, Position};

/// Broadcast payloads exchanged between agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    ItemDiscovered { position: Position, sender: AgentId },
    TargetClaimed { position: Position, sender: AgentId },
    TargetReleased { position: Position, sender: AgentId },
    ItemPicked { position: Position, sender: AgentId },
}

impl Message {
    pub const fn position(&self) -> Position {
        match *self {
            Message::ItemDiscovered { position, .. }
            | Message::TargetClaimed { position, .. }
            | Message::TargetReleased { position, .. }
            | Message::ItemPicked { position, .. } => position,
        }
    }

    pub const fn sender(&self) -> AgentId {
        match *self {
            Message::ItemDiscovered { sender, .. }
            | Message::TargetClaimed { sender, .. }
            | Message::TargetReleased { sender, .. }
            | Message::ItemPicked { sender, .. } => sender,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Message::ItemDiscovered { .. } => "item_discovered",
            Message::TargetClaimed { .. } => "target_claimed",
            Message::TargetReleased { .. } => "target_released",
            Message::ItemPicked { .. } => "item_picked",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} from {}", self.label(), self.position(), self.sender())
    }
}

/// A message plus the sender's coordinate at the moment it was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub origin: Position,
}

/// Messages received since the owner last processed them, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct Inbox {
    queue: VecDeque<Message>,
}

impl Inbox {
    pub fn push(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Message> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Anything that can sit on the broadcast medium.
pub trait Recipient {
    fn id(&self) -> AgentId;
    fn position(&self) -> Position;
    fn receive(&mut self, message: Message);
}

/// Range-limited broadcast medium. Delivery is reliable inside the radius
/// and absent beyond it.
#[derive(Clone, Copy, Debug)]
pub struct Network {
    range: i32,
}

impl Network {
    pub const fn new(range: i32) -> Self {
        Self { range }
    }

    pub const fn range(&self) -> i32 {
        self.range
    }

    /// Push `envelope` into every other recipient's inbox within range.
    /// Returns the ids reached, in slice order.
    pub fn deliver<R: Recipient>(&self, envelope: Envelope, recipients: &mut [R]) -> Vec<AgentId> {
        let sender = envelope.message.sender();
        let mut reached = Vec::new();
        for recipient in recipients.iter_mut() {
            if recipient.id() == sender {
                continue;
            }
            if recipient.position().manhattan(envelope.origin) <= self.range {
                recipient.receive(envelope.message);
                reached.push(recipient.id());
            }
        }
        tracing::trace!(
            message = %envelope.message,
            reached = reached.len(),
            "broadcast delivered"
        );
        reached
    }
}
