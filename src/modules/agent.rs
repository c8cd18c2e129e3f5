use std::collections::{HashSet, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modules::claims::ClaimRegistry;
use crate::modules::decision::{
    AgentState, AgentView, Surroundings, Transition, nearest_single, transition,
};
use crate::modules::error::GridError;
use crate::modules::grid::{AgentId, Direction, GridWorld, ItemId, Position};
use crate::modules::message::{Envelope, Inbox, Message, Recipient};
use crate::modules::path::route;
use crate::modules::perception::{KnownItems, scan};

/// Observable outcome of an agent's turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    Moved {
        from: Position,
        to: Position,
    },
    Blocked {
        at: Position,
        direction: Direction,
    },
    PickedUp {
        position: Position,
        item: ItemId,
    },
    PickupFailed {
        position: Position,
    },
    Dropped {
        position: Position,
        item: ItemId,
        depth: usize,
    },
    DropFailed {
        position: Position,
    },
    StateChanged {
        from: AgentState,
        to: AgentState,
    },
    Idle,
}

#[derive(Clone, Debug)]
pub struct Agent {
    id: AgentId,
    position: Position,
    carrying: Option<ItemId>,
    state: AgentState,
    target: Option<Position>,
    route: VecDeque<Direction>,
    known: KnownItems,
    claims: ClaimRegistry,
    inbox: Inbox,
    outbox: Vec<Envelope>,
    sensor_range: i32,
    movements: u64,
    messages_sent: u64,
}

impl Agent {
    pub fn new(id: AgentId, position: Position, sensor_range: i32) -> Self {
        Self {
            id,
            position,
            carrying: None,
            state: AgentState::Seeking,
            target: None,
            route: VecDeque::new(),
            known: KnownItems::default(),
            claims: ClaimRegistry::new(id),
            inbox: Inbox::default(),
            outbox: Vec::new(),
            sensor_range,
            movements: 0,
            messages_sent: 0,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn target(&self) -> Option<Position> {
        self.target
    }

    pub fn carrying(&self) -> Option<ItemId> {
        self.carrying
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying.is_some()
    }

    pub fn route(&self) -> impl Iterator<Item = Direction> + '_ {
        self.route.iter().copied()
    }

    pub fn known(&self) -> &KnownItems {
        &self.known
    }

    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn movements(&self) -> u64 {
        self.movements
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Messages queued since the last [`Agent::take_outbox`].
    pub fn pending_broadcasts(&self) -> usize {
        self.outbox.len()
    }

    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply and discard everything received since the last call.
    pub fn process_messages(&mut self) {
        let messages: Vec<Message> = self.inbox.drain().collect();
        for message in messages {
            match message {
                Message::ItemDiscovered { position, .. } => {
                    self.known.insert(position);
                }
                Message::TargetClaimed { position, sender } => {
                    self.claims.record(position, sender);
                    if sender != self.id {
                        self.known.remove(position);
                    }
                }
                Message::TargetReleased { position, .. } => {
                    self.claims.forget(position);
                }
                Message::ItemPicked { position, .. } => {
                    self.known.remove(position);
                }
            }
        }
    }

    /// Look along the four rays and record new single items. Only an agent
    /// that is still looking for work tells the others.
    pub fn sense(&mut self, world: &GridWorld, shelf_targets: &HashSet<Position>) {
        for position in scan(world, self.position, self.sensor_range) {
            if shelf_targets.contains(&position) {
                continue;
            }
            if self.known.insert(position) && self.state == AgentState::Seeking {
                self.broadcast(Message::ItemDiscovered {
                    position,
                    sender: self.id,
                });
            }
        }
    }

    /// Evaluate the state machine once and apply its result.
    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        world: &mut GridWorld,
        shelf_targets: &HashSet<Position>,
        jitter: f64,
        rng: &mut R,
    ) -> Vec<Activity> {
        let route: Vec<Direction> = self.route.iter().copied().collect();
        let next = {
            let view = self.view(&route);
            let env = Surroundings {
                world: &*world,
                shelf_targets,
            };
            transition(&view, &env, jitter, rng)
        };
        self.apply(next, world)
    }

    /// Take one step along the route, or act on arrival.
    pub fn execute(
        &mut self,
        world: &mut GridWorld,
        shelf_targets: &HashSet<Position>,
    ) -> Vec<Activity> {
        let mut activities = Vec::new();

        match self.route.pop_front() {
            Some(direction) => {
                let from = self.position;
                let to = from.step(direction);
                match world.move_agent(self.id, to) {
                    Ok(_) => {
                        self.position = to;
                        self.movements = self.movements.saturating_add(1);
                        activities.push(Activity::Moved { from, to });
                        self.sense(world, shelf_targets);
                    }
                    Err(err) => {
                        debug!(agent = self.id, %err, "step blocked; dropping route");
                        self.route.clear();
                        activities.push(Activity::Blocked { at: from, direction });
                    }
                }
                if self.route.is_empty() && self.target == Some(self.position) {
                    activities.extend(self.arrive(world, shelf_targets));
                }
            }
            None if self.target == Some(self.position) => {
                activities.extend(self.arrive(world, shelf_targets));
            }
            None => {
                self.sense(world, shelf_targets);
                activities.push(Activity::Idle);
            }
        }

        activities
    }

    fn view<'a>(&'a self, route: &'a [Direction]) -> AgentView<'a> {
        AgentView {
            id: self.id,
            position: self.position,
            state: self.state,
            target: self.target,
            route,
            known: &self.known,
            claims: &self.claims,
        }
    }

    fn apply(&mut self, next: Transition, world: &mut GridWorld) -> Vec<Activity> {
        let mut activities = Vec::new();
        for position in next.forget {
            self.known.remove(position);
        }
        if let Some(position) = next.release {
            self.release(position);
        }
        if let Some(position) = next.claim {
            self.claim(position);
        }
        self.target = next.target;
        if let Some(steps) = next.route {
            self.route = steps.into();
        }

        let mut state = next.state;
        if next.drop_here {
            match self.drop_item(world) {
                Ok(activity) => activities.push(activity),
                Err(err) => {
                    debug!(agent = self.id, %err, "fallback drop failed; still delivering");
                    activities.push(Activity::DropFailed {
                        position: self.position,
                    });
                    state = AgentState::Delivering;
                }
            }
        }
        activities.extend(self.set_state(state));
        activities
    }

    fn arrive(&mut self, world: &mut GridWorld, shelf_targets: &HashSet<Position>) -> Vec<Activity> {
        let mut activities = Vec::new();
        let here = self.position;

        match self.state {
            AgentState::PickingUp => {
                let picked = self.pick_up(world);
                self.release(here);
                self.target = None;
                let next = match picked {
                    Ok(activity) => {
                        activities.push(activity);
                        AgentState::Delivering
                    }
                    Err(err) => {
                        debug!(agent = self.id, %err, "pickup failed");
                        activities.push(Activity::PickupFailed { position: here });
                        AgentState::Seeking
                    }
                };
                activities.extend(self.set_state(next));
            }
            AgentState::Delivering => {
                let dropped = self.drop_item(world);
                self.release(here);
                self.target = None;
                match dropped {
                    Ok(activity) => {
                        activities.push(activity);
                        activities.extend(self.look_for_next_pickup(world, shelf_targets));
                    }
                    Err(err) => {
                        // Someone filled the shelf first; pick another next turn.
                        debug!(agent = self.id, %err, "drop failed");
                        activities.push(Activity::DropFailed { position: here });
                    }
                }
            }
            AgentState::Seeking => {
                self.target = None;
            }
        }

        activities
    }

    fn look_for_next_pickup(
        &mut self,
        world: &GridWorld,
        shelf_targets: &HashSet<Position>,
    ) -> Option<Activity> {
        let (nearest, stale) = {
            let view = self.view(&[]);
            let env = Surroundings {
                world,
                shelf_targets,
            };
            nearest_single(&view, &env, None)
        };
        for position in stale {
            self.known.remove(position);
        }
        match nearest {
            Some(item) => {
                self.target = Some(item);
                self.claim(item);
                self.route = route(world, self.position, item).into();
                self.set_state(AgentState::PickingUp)
            }
            None => self.set_state(AgentState::Seeking),
        }
    }

    fn pick_up(&mut self, world: &mut GridWorld) -> Result<Activity, GridError> {
        let position = self.position;
        if self.carrying.is_some() {
            return Err(GridError::NotPickable { position, depth: 0 });
        }
        let item = world.remove_top_item(position)?;
        self.carrying = Some(item);
        self.known.remove(position);
        self.broadcast(Message::ItemPicked {
            position,
            sender: self.id,
        });
        debug!(agent = self.id, item, %position, "picked up item");
        Ok(Activity::PickedUp { position, item })
    }

    fn drop_item(&mut self, world: &mut GridWorld) -> Result<Activity, GridError> {
        let position = self.position;
        let Some(item) = self.carrying else {
            return Err(GridError::NotPickable { position, depth: 0 });
        };
        world.place_item(position, item, self.id)?;
        self.carrying = None;
        let depth = world.stack_depth(position);
        debug!(agent = self.id, item, %position, depth, "dropped item");
        Ok(Activity::Dropped {
            position,
            item,
            depth,
        })
    }

    fn claim(&mut self, position: Position) {
        let message = self.claims.claim(position);
        self.broadcast(message);
    }

    fn release(&mut self, position: Position) {
        if let Some(message) = self.claims.release(position) {
            self.broadcast(message);
        }
    }

    fn broadcast(&mut self, message: Message) {
        self.messages_sent = self.messages_sent.saturating_add(1);
        self.outbox.push(Envelope {
            message,
            origin: self.position,
        });
    }

    fn set_state(&mut self, next: AgentState) -> Option<Activity> {
        if next == self.state {
            return None;
        }
        let from = self.state;
        self.state = next;
        debug!(agent = self.id, %from, to = %next, "state changed");
        Some(Activity::StateChanged { from, to: next })
    }
}

impl Recipient for Agent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn receive(&mut self, message: Message) {
        self.inbox.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::grid::DEFAULT_STACK_CAPACITY;
    use crate::modules::message::Network;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup(agent_at: Position) -> (GridWorld, Agent) {
        let mut world = GridWorld::walled(12, 12, DEFAULT_STACK_CAPACITY);
        world.spawn_agent(0, agent_at).unwrap();
        (world, Agent::new(0, agent_at, 3))
    }

    #[test]
    fn seeking_agent_broadcasts_each_discovery_once() {
        let (mut world, mut agent) = setup(Position::new(4, 4));
        world.spawn_item(Position::new(4, 2)).unwrap();

        agent.sense(&world, &HashSet::new());
        assert_eq!(agent.pending_broadcasts(), 1);
        assert!(agent.known().contains(Position::new(4, 2)));

        agent.sense(&world, &HashSet::new());
        assert_eq!(agent.pending_broadcasts(), 1, "already known, no repeat");
        let outbox = agent.take_outbox();
        assert_eq!(
            outbox[0].message,
            Message::ItemDiscovered {
                position: Position::new(4, 2),
                sender: 0
            }
        );
    }

    #[test]
    fn busy_agent_records_discoveries_silently() {
        for state in [AgentState::PickingUp, AgentState::Delivering] {
            let (mut world, mut agent) = setup(Position::new(4, 4));
            world.spawn_item(Position::new(6, 4)).unwrap();
            agent.state = state;

            agent.sense(&world, &HashSet::new());
            assert!(agent.known().contains(Position::new(6, 4)));
            assert_eq!(agent.pending_broadcasts(), 0);
            assert_eq!(agent.messages_sent(), 0);
        }
    }

    #[test]
    fn shelf_targets_are_not_discovered() {
        let (mut world, mut agent) = setup(Position::new(4, 4));
        let shelf = Position::new(4, 6);
        world.spawn_item(shelf).unwrap();
        let targets = HashSet::from([shelf]);

        agent.sense(&world, &targets);
        assert!(!agent.known().contains(shelf));
        assert_eq!(agent.pending_broadcasts(), 0);
    }

    #[test]
    fn messages_update_knowledge_and_claims() {
        let (_world, mut agent) = setup(Position::new(4, 4));
        let a = Position::new(2, 2);
        let b = Position::new(3, 3);
        agent.receive(Message::ItemDiscovered { position: a, sender: 1 });
        agent.receive(Message::ItemDiscovered { position: b, sender: 2 });
        agent.receive(Message::TargetClaimed { position: a, sender: 1 });
        agent.receive(Message::ItemPicked { position: b, sender: 2 });
        agent.process_messages();

        assert!(agent.inbox().is_empty());
        assert!(!agent.known().contains(a), "claimed by someone else");
        assert!(!agent.known().contains(b), "picked up");
        assert!(!agent.claims().is_available(a));

        agent.receive(Message::TargetReleased { position: a, sender: 1 });
        agent.process_messages();
        assert!(agent.claims().is_available(a));
    }

    #[test]
    fn full_cycle_pickup_then_delivery() {
        let (mut world, mut agent) = setup(Position::new(2, 2));
        let item_at = Position::new(4, 2);
        let shelf = Position::new(2, 5);
        let item = world.spawn_item(item_at).unwrap();
        world.spawn_item(shelf).unwrap();
        world.spawn_item(shelf).unwrap();
        let none = HashSet::new();
        let mut rng = StdRng::seed_from_u64(11);

        agent.sense(&world, &none);
        agent.decide(&mut world, &none, 0.1, &mut rng);
        assert_eq!(agent.state(), AgentState::PickingUp);
        assert_eq!(agent.target(), Some(item_at));

        agent.execute(&mut world, &none);
        let acts = agent.execute(&mut world, &none);
        assert!(acts.contains(&Activity::PickedUp {
            position: item_at,
            item
        }));
        assert_eq!(agent.state(), AgentState::Delivering);
        assert_eq!(agent.carrying(), Some(item));
        assert_eq!(world.stack_depth(item_at), 0);

        let mut dropped = None;
        for _ in 0..20 {
            agent.process_messages();
            agent.sense(&world, &none);
            agent.decide(&mut world, &none, 0.1, &mut rng);
            for act in agent.execute(&mut world, &none) {
                if let Activity::Dropped { position, depth, .. } = act {
                    dropped = Some((position, depth));
                }
            }
            if dropped.is_some() {
                break;
            }
        }
        assert_eq!(dropped, Some((shelf, 3)));
        assert!(!agent.is_carrying());
        assert_eq!(world.deliveries(0), 1);
        assert!(agent.claims().is_empty(), "all claims released");
    }

    #[test]
    fn blocked_step_discards_route() {
        let (mut world, mut agent) = setup(Position::new(2, 2));
        world.spawn_agent(1, Position::new(3, 2)).unwrap();
        agent.route = VecDeque::from([Direction::Right, Direction::Right]);
        agent.target = Some(Position::new(4, 2));

        let acts = agent.execute(&mut world, &HashSet::new());
        assert_eq!(
            acts,
            vec![Activity::Blocked {
                at: Position::new(2, 2),
                direction: Direction::Right
            }]
        );
        assert_eq!(agent.route().count(), 0);
        assert_eq!(agent.position(), Position::new(2, 2));
    }

    #[test]
    fn failed_drop_keeps_agent_delivering() {
        let mut world = GridWorld::walled(8, 8, 2);
        let shelf = Position::new(3, 3);
        world.spawn_agent(0, Position::new(3, 2)).unwrap();
        let carried = world.spawn_item(Position::new(5, 5)).unwrap();
        world.remove_top_item(Position::new(5, 5)).unwrap();
        world.spawn_item(shelf).unwrap();
        world.spawn_item(shelf).unwrap();

        let mut agent = Agent::new(0, Position::new(3, 2), 3);
        agent.carrying = Some(carried);
        agent.state = AgentState::Delivering;
        agent.target = Some(shelf);
        agent.claims.claim(shelf);
        agent.route = VecDeque::from([Direction::Down]);

        let acts = agent.execute(&mut world, &HashSet::new());
        assert!(acts.contains(&Activity::DropFailed { position: shelf }));
        assert_eq!(agent.state(), AgentState::Delivering);
        assert_eq!(agent.carrying(), Some(carried));
        assert_eq!(agent.target(), None);
    }

    #[test]
    fn agent_standing_on_target_acts_without_moving() {
        let (mut world, mut agent) = setup(Position::new(5, 5));
        let here = Position::new(5, 5);
        let item = world.spawn_item(here).unwrap();
        agent.known.insert(here);
        let mut rng = StdRng::seed_from_u64(2);

        agent.decide(&mut world, &HashSet::new(), 0.1, &mut rng);
        assert_eq!(agent.target(), Some(here));
        let acts = agent.execute(&mut world, &HashSet::new());
        assert!(acts.contains(&Activity::PickedUp { position: here, item }));
        assert_eq!(agent.movements(), 0);
    }

    #[test]
    fn neighbours_waiting_on_each_other_break_the_standoff() {
        let mut world = GridWorld::walled(12, 12, DEFAULT_STACK_CAPACITY);
        let single = Position::new(9, 6);
        let shelf = Position::new(9, 7);
        world.spawn_item(single).unwrap();
        world.spawn_item(shelf).unwrap();
        world.spawn_item(shelf).unwrap();
        let carried = world.spawn_item(Position::new(2, 2)).unwrap();
        world.remove_top_item(Position::new(2, 2)).unwrap();
        world.spawn_agent(0, shelf).unwrap();
        world.spawn_agent(3, single).unwrap();

        let mut picker = Agent::new(0, shelf, 3);
        picker.state = AgentState::PickingUp;
        picker.target = Some(single);
        picker.known.insert(single);
        picker.claims.claim(single);
        picker.claims.record(shelf, 3);

        let mut carrier = Agent::new(3, single, 3);
        carrier.state = AgentState::Delivering;
        carrier.carrying = Some(carried);
        carrier.target = Some(shelf);
        carrier.claims.claim(shelf);
        carrier.claims.record(single, 0);

        let network = Network::new(5);
        let mut agents = vec![picker, carrier];
        let mut rng = StdRng::seed_from_u64(15);
        for _ in 0..10 {
            for idx in 0..agents.len() {
                let shelf_targets: HashSet<Position> = agents
                    .iter()
                    .enumerate()
                    .filter(|(other, a)| *other != idx && a.state() == AgentState::Delivering)
                    .filter_map(|(_, a)| a.target())
                    .collect();
                let agent = &mut agents[idx];
                agent.process_messages();
                agent.sense(&world, &shelf_targets);
                agent.decide(&mut world, &shelf_targets, 0.1, &mut rng);
                agent.execute(&mut world, &shelf_targets);
                let outbox = agent.take_outbox();
                for envelope in outbox {
                    network.deliver(envelope, &mut agents);
                }
            }
            if !agents[1].is_carrying() {
                break;
            }
        }

        assert!(!agents[1].is_carrying(), "carrier never let go of its item");
        assert_eq!(world.stack_depth(single), 2);
        assert_eq!(world.stack_depth(shelf), 2);
    }
}
