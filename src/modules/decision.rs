//! Task selection for a single agent.
//!
//! [`transition`] reads an agent's local view and the current grid and
//! returns the next state, target and route without touching either. The
//! agent applies the result, including the claim traffic it implies.

use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::modules::claims::ClaimRegistry;
use crate::modules::grid::{AgentId, Cell, Direction, GridWorld, Position};
use crate::modules::path::route;
use crate::modules::perception::KnownItems;

/// Tries before an exploring agent gives up drawing a waypoint.
const WAYPOINT_ATTEMPTS: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Seeking,
    PickingUp,
    Delivering,
}

impl AgentState {
    pub const fn label(self) -> &'static str {
        match self {
            AgentState::Seeking => "seeking",
            AgentState::PickingUp => "picking_up",
            AgentState::Delivering => "delivering",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The parts of an agent the decision reads.
#[derive(Clone, Copy, Debug)]
pub struct AgentView<'a> {
    pub id: AgentId,
    pub position: Position,
    pub state: AgentState,
    pub target: Option<Position>,
    pub route: &'a [Direction],
    pub known: &'a KnownItems,
    pub claims: &'a ClaimRegistry,
}

/// Shared context: the grid and the coordinates other agents are currently
/// delivering to (treated as shelves in progress, never as loose items).
#[derive(Clone, Copy, Debug)]
pub struct Surroundings<'a> {
    pub world: &'a GridWorld,
    pub shelf_targets: &'a HashSet<Position>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: AgentState,
    pub target: Option<Position>,
    /// `None` keeps the current route.
    pub route: Option<Vec<Direction>>,
    pub release: Option<Position>,
    pub claim: Option<Position>,
    /// Known coordinates that no longer hold a single item.
    pub forget: Vec<Position>,
    /// Drop the carried item where the agent stands.
    pub drop_here: bool,
}

impl Transition {
    fn keep(agent: &AgentView<'_>) -> Self {
        Self {
            state: agent.state,
            target: agent.target,
            route: None,
            release: None,
            claim: None,
            forget: Vec::new(),
            drop_here: false,
        }
    }
}

pub fn transition<R: Rng + ?Sized>(
    agent: &AgentView<'_>,
    env: &Surroundings<'_>,
    jitter: f64,
    rng: &mut R,
) -> Transition {
    match agent.state {
        AgentState::Seeking => seek(agent, env, jitter, rng),
        AgentState::PickingUp => pick_up(agent, env),
        AgentState::Delivering => deliver(agent, env),
    }
}

fn seek<R: Rng + ?Sized>(
    agent: &AgentView<'_>,
    env: &Surroundings<'_>,
    jitter: f64,
    rng: &mut R,
) -> Transition {
    let mut next = Transition::keep(agent);
    let (nearest, stale) = nearest_single(agent, env, None);
    next.forget = stale;

    if let Some(item) = nearest {
        next.state = AgentState::PickingUp;
        next.target = Some(item);
        next.claim = Some(item);
        next.route = Some(route(env.world, agent.position, item));
        return next;
    }

    if agent.route.is_empty() || rng.gen_bool(jitter) {
        let waypoint = random_waypoint(env.world, rng).unwrap_or(agent.position);
        next.target = Some(waypoint);
        next.route = Some(route(env.world, agent.position, waypoint));
    }
    next
}

fn pick_up(agent: &AgentView<'_>, env: &Surroundings<'_>) -> Transition {
    let mut next = Transition::keep(agent);
    let mut unreachable = None;

    if let Some(target) = agent.target {
        let still_there = env.world.can_pickup(target);
        let pursuable =
            still_there && agent.claims.is_available(target) && !blocked(agent, env, target);
        if pursuable {
            if !agent.route.is_empty() {
                return next;
            }
            let steps = route(env.world, agent.position, target);
            if !steps.is_empty() || target == agent.position {
                next.route = Some(steps);
                return next;
            }
            unreachable = Some(target);
        }
        next.release = Some(target);
    }

    let (nearest, mut stale) = nearest_single(agent, env, unreachable);
    stale.extend(unreachable);
    next.forget = stale;

    match nearest {
        Some(item) => {
            next.target = Some(item);
            next.claim = Some(item);
            next.route = Some(route(env.world, agent.position, item));
        }
        None => {
            next.state = AgentState::Seeking;
            next.target = None;
            next.route = Some(Vec::new());
        }
    }
    next
}

fn deliver(agent: &AgentView<'_>, env: &Surroundings<'_>) -> Transition {
    let mut next = Transition::keep(agent);
    let mut unreachable = Vec::new();

    while let Some(shelf) = best_shelf(agent, env, &unreachable) {
        if agent.target == Some(shelf) && !agent.route.is_empty() {
            return next;
        }
        let steps = route(env.world, agent.position, shelf);
        if steps.is_empty() && shelf != agent.position {
            unreachable.push(shelf);
            continue;
        }
        if agent.target != Some(shelf) {
            next.release = agent.target;
            next.target = Some(shelf);
            next.claim = Some(shelf);
        }
        next.route = Some(steps);
        return next;
    }

    next.release = agent.target;
    next.state = AgentState::Seeking;
    next.target = None;
    next.route = Some(Vec::new());
    next.drop_here = true;
    next
}

/// Another agent stands on the neighbouring `pos` after this agent's route
/// ran out. Such a coordinate is passed over until the neighbour leaves.
fn blocked(agent: &AgentView<'_>, env: &Surroundings<'_>, pos: Position) -> bool {
    agent.route.is_empty()
        && agent.position.manhattan(pos) == 1
        && env
            .world
            .occupant(pos)
            .is_some_and(|occupant| occupant != agent.id)
}

/// Closest known single item the agent may pursue, plus any known
/// coordinates that turned out to be empty or stacked.
///
/// Ties go to the smaller `x`, then the smaller `y`.
pub fn nearest_single(
    agent: &AgentView<'_>,
    env: &Surroundings<'_>,
    exclude: Option<Position>,
) -> (Option<Position>, Vec<Position>) {
    let mut stale = Vec::new();
    let mut best: Option<(i32, Position)> = None;

    for pos in agent.known.iter() {
        if !env.world.is_valid(pos) || Some(pos) == exclude {
            continue;
        }
        if env.world.stack_depth(pos) != 1 {
            stale.push(pos);
            continue;
        }
        if env.shelf_targets.contains(&pos)
            || !agent.claims.is_available(pos)
            || blocked(agent, env, pos)
        {
            continue;
        }
        let key = (agent.position.manhattan(pos), pos);
        if best.is_none_or(|current| key < current) {
            best = Some(key);
        }
    }

    (best.map(|(_, pos)| pos), stale)
}

/// Where a carried item should go: the closest open stack below capacity,
/// otherwise the best empty coordinate to seed a new shelf. Coordinates in
/// `exclude` are never returned.
///
/// Between equally close stacks the larger `x`, then larger `y`, wins.
pub fn best_shelf(
    agent: &AgentView<'_>,
    env: &Surroundings<'_>,
    exclude: &[Position],
) -> Option<Position> {
    let capacity = env.world.capacity();
    let stack = env
        .world
        .stacks()
        .filter(|(_, items)| !items.is_empty() && items.len() < capacity)
        .map(|(pos, _)| pos)
        .filter(|pos| !exclude.contains(pos) && !blocked(agent, env, *pos))
        .filter(|pos| agent.claims.is_available(*pos) || agent.target == Some(*pos))
        .max_by_key(|pos| (-agent.position.manhattan(*pos), pos.x, pos.y));

    stack.or_else(|| seed_spot(agent, env, exclude))
}

/// Empty, unclaimed interior coordinate favouring the grid centre and, at
/// half weight, proximity to the agent.
pub fn seed_spot(
    agent: &AgentView<'_>,
    env: &Surroundings<'_>,
    exclude: &[Position],
) -> Option<Position> {
    let center = env.world.center();
    env.world
        .interior()
        .filter(|pos| env.world.cell_type(*pos) == Cell::Empty && !exclude.contains(pos))
        .filter(|pos| agent.claims.is_available(*pos))
        .max_by_key(|pos| {
            let score = 2 * pos.manhattan(center) + pos.manhattan(agent.position);
            (-score, pos.x, pos.y)
        })
}

/// Random non-wall interior coordinate to explore towards.
pub fn random_waypoint<R: Rng + ?Sized>(world: &GridWorld, rng: &mut R) -> Option<Position> {
    if world.width() < 3 || world.height() < 3 {
        return None;
    }
    for _ in 0..WAYPOINT_ATTEMPTS {
        let pos = Position::new(
            rng.gen_range(1..=world.width() - 2),
            rng.gen_range(1..=world.height() - 2),
        );
        if !world.is_wall(pos) {
            return Some(pos);
        }
    }
    None
}
