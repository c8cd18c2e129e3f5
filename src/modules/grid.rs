use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modules::error::GridError;

pub type AgentId = u32;
pub type ItemId = u32;

/// Maximum number of items a single coordinate may hold.
pub const DEFAULT_STACK_CAPACITY: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub const fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Unit step on the grid. `y` grows downwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Enumeration order used by sensing and path search.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Rendered content of a coordinate. Agents take precedence over items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Wall,
    Item,
    Agent(AgentId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// `None` while the item is being carried.
    pub position: Option<Position>,
    /// Set once the item has been lifted at least once.
    pub processed: bool,
}

/// Authoritative warehouse state: walls, item stacks and agent positions.
///
/// Cell contents are never stored; [`GridWorld::cell_type`] projects them
/// from the stacks and the occupancy map so the two cannot drift apart.
#[derive(Clone, Debug)]
pub struct GridWorld {
    width: i32,
    height: i32,
    capacity: usize,
    walls: HashSet<Position>,
    stacks: BTreeMap<Position, Vec<ItemId>>,
    items: Vec<Item>,
    occupants: HashMap<Position, AgentId>,
    agent_positions: BTreeMap<AgentId, Position>,
    deliveries: BTreeMap<AgentId, u64>,
}

impl GridWorld {
    pub fn new(width: i32, height: i32, capacity: usize) -> Self {
        Self {
            width,
            height,
            capacity,
            walls: HashSet::new(),
            stacks: BTreeMap::new(),
            items: Vec::new(),
            occupants: HashMap::new(),
            agent_positions: BTreeMap::new(),
            deliveries: BTreeMap::new(),
        }
    }

    /// Grid whose outermost ring is wall.
    pub fn walled(width: i32, height: i32, capacity: usize) -> Self {
        let mut world = Self::new(width, height, capacity);
        for x in 0..width {
            world.walls.insert(Position::new(x, 0));
            world.walls.insert(Position::new(x, height - 1));
        }
        for y in 0..height {
            world.walls.insert(Position::new(0, y));
            world.walls.insert(Position::new(width - 1, y));
        }
        world
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn center(&self) -> Position {
        Position::new(self.width / 2, self.height / 2)
    }

    pub fn add_wall(&mut self, pos: Position) -> Result<(), GridError> {
        if !self.is_valid(pos) {
            return Err(GridError::OutOfBounds(pos));
        }
        if let Some(occupant) = self.occupants.get(&pos) {
            return Err(GridError::Occupied {
                position: pos,
                occupant: *occupant,
            });
        }
        self.walls.insert(pos);
        Ok(())
    }

    /// Create a new item on top of the stack at `pos`.
    pub fn spawn_item(&mut self, pos: Position) -> Result<ItemId, GridError> {
        self.check_floor(pos)?;
        if self.stack_depth(pos) >= self.capacity {
            return Err(GridError::StackFull {
                position: pos,
                capacity: self.capacity,
            });
        }
        let id = self.items.len() as ItemId;
        self.items.push(Item {
            id,
            position: Some(pos),
            processed: false,
        });
        self.stacks.entry(pos).or_default().push(id);
        Ok(id)
    }

    pub fn spawn_agent(&mut self, agent: AgentId, pos: Position) -> Result<(), GridError> {
        if self.agent_positions.contains_key(&agent) {
            return Err(GridError::DuplicateAgent(agent));
        }
        self.check_floor(pos)?;
        if let Some(occupant) = self.occupants.get(&pos) {
            return Err(GridError::Occupied {
                position: pos,
                occupant: *occupant,
            });
        }
        self.occupants.insert(pos, agent);
        self.agent_positions.insert(agent, pos);
        self.deliveries.entry(agent).or_insert(0);
        Ok(())
    }

    pub fn is_valid(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        !self.is_valid(pos) || self.walls.contains(&pos)
    }

    pub fn cell_type(&self, pos: Position) -> Cell {
        if self.is_wall(pos) {
            return Cell::Wall;
        }
        if let Some(agent) = self.occupants.get(&pos) {
            return Cell::Agent(*agent);
        }
        if self.stack_depth(pos) > 0 {
            Cell::Item
        } else {
            Cell::Empty
        }
    }

    pub fn stack_depth(&self, pos: Position) -> usize {
        self.stacks.get(&pos).map_or(0, Vec::len)
    }

    pub fn stack(&self, pos: Position) -> &[ItemId] {
        self.stacks.get(&pos).map_or(&[][..], Vec::as_slice)
    }

    pub fn top_item(&self, pos: Position) -> Option<ItemId> {
        self.stacks.get(&pos).and_then(|stack| stack.last().copied())
    }

    pub fn can_pickup(&self, pos: Position) -> bool {
        self.stack_depth(pos) == 1
    }

    pub fn can_place(&self, pos: Position, agent: AgentId) -> bool {
        if self.is_wall(pos) || self.stack_depth(pos) >= self.capacity {
            return false;
        }
        match self.occupants.get(&pos) {
            Some(occupant) => *occupant == agent,
            None => true,
        }
    }

    pub fn can_move_into(&self, pos: Position) -> bool {
        matches!(self.cell_type(pos), Cell::Empty | Cell::Item)
    }

    /// Lift the only item at `pos`. Organized shelves are never unstacked.
    pub fn remove_top_item(&mut self, pos: Position) -> Result<ItemId, GridError> {
        let depth = self.stack_depth(pos);
        if depth != 1 {
            return Err(GridError::NotPickable {
                position: pos,
                depth,
            });
        }
        let id = self
            .stacks
            .remove(&pos)
            .and_then(|mut stack| stack.pop())
            .ok_or(GridError::NotPickable {
                position: pos,
                depth,
            })?;
        let item = self.item_mut(id)?;
        item.position = None;
        item.processed = true;
        Ok(id)
    }

    /// Push a carried item onto the stack at `pos` and credit `agent`.
    pub fn place_item(&mut self, pos: Position, id: ItemId, agent: AgentId) -> Result<(), GridError> {
        if !self.is_valid(pos) {
            return Err(GridError::OutOfBounds(pos));
        }
        if self.walls.contains(&pos) {
            return Err(GridError::Wall(pos));
        }
        if let Some(occupant) = self.occupants.get(&pos) {
            if *occupant != agent {
                return Err(GridError::Occupied {
                    position: pos,
                    occupant: *occupant,
                });
            }
        }
        if self.stack_depth(pos) >= self.capacity {
            return Err(GridError::StackFull {
                position: pos,
                capacity: self.capacity,
            });
        }
        let item = self.item_mut(id)?;
        if item.position.is_some() {
            return Err(GridError::ItemOnGrid(id));
        }
        item.position = Some(pos);
        self.stacks.entry(pos).or_default().push(id);
        let count = self.deliveries.entry(agent).or_insert(0);
        *count = count.saturating_add(1);
        Ok(())
    }

    /// Move `agent` onto `to`. Any adjacency rule is the caller's business.
    pub fn move_agent(&mut self, agent: AgentId, to: Position) -> Result<Position, GridError> {
        let from = self
            .agent_positions
            .get(&agent)
            .copied()
            .ok_or(GridError::UnknownAgent(agent))?;
        match self.cell_type(to) {
            Cell::Wall if self.is_valid(to) => return Err(GridError::Wall(to)),
            Cell::Wall => return Err(GridError::OutOfBounds(to)),
            Cell::Agent(occupant) => {
                return Err(GridError::Occupied {
                    position: to,
                    occupant,
                });
            }
            Cell::Empty | Cell::Item => {}
        }
        self.occupants.remove(&from);
        self.occupants.insert(to, agent);
        self.agent_positions.insert(agent, to);
        Ok(from)
    }

    pub fn agent_position(&self, agent: AgentId) -> Option<Position> {
        self.agent_positions.get(&agent).copied()
    }

    /// Every agent on the grid, in id order.
    pub fn agents(&self) -> impl Iterator<Item = (AgentId, Position)> + '_ {
        self.agent_positions.iter().map(|(id, pos)| (*id, *pos))
    }

    pub fn occupant(&self, pos: Position) -> Option<AgentId> {
        self.occupants.get(&pos).copied()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id as usize)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// 1-indexed position of an item within its stack, counted from the bottom.
    pub fn item_depth(&self, id: ItemId) -> Option<usize> {
        let pos = self.item(id)?.position?;
        self.stack(pos)
            .iter()
            .position(|candidate| *candidate == id)
            .map(|idx| idx + 1)
    }

    pub fn stacks(&self) -> impl Iterator<Item = (Position, &[ItemId])> {
        self.stacks.iter().map(|(pos, stack)| (*pos, stack.as_slice()))
    }

    pub fn deliveries(&self, agent: AgentId) -> u64 {
        self.deliveries.get(&agent).copied().unwrap_or(0)
    }

    /// Every coordinate inside the perimeter ring, column by column.
    pub fn interior(&self) -> impl Iterator<Item = Position> + '_ {
        (1..self.width - 1).flat_map(move |x| (1..self.height - 1).map(move |y| Position::new(x, y)))
    }

    pub fn items_on_grid(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }

    pub fn single_items(&self) -> usize {
        self.stacks.values().filter(|stack| stack.len() == 1).count()
    }

    pub fn organized_items(&self) -> usize {
        self.stacks
            .values()
            .filter(|stack| stack.len() >= 2)
            .map(Vec::len)
            .sum()
    }

    pub fn shelf_count(&self) -> usize {
        self.stacks.values().filter(|stack| stack.len() >= 2).count()
    }

    fn check_floor(&self, pos: Position) -> Result<(), GridError> {
        if !self.is_valid(pos) {
            return Err(GridError::OutOfBounds(pos));
        }
        if self.walls.contains(&pos) {
            return Err(GridError::Wall(pos));
        }
        Ok(())
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, GridError> {
        self.items
            .get_mut(id as usize)
            .ok_or(GridError::UnknownItem(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> GridWorld {
        GridWorld::walled(6, 6, DEFAULT_STACK_CAPACITY)
    }

    #[test]
    fn perimeter_is_wall_and_outside_is_wall() {
        let world = world();
        assert_eq!(world.cell_type(Position::new(0, 3)), Cell::Wall);
        assert_eq!(world.cell_type(Position::new(5, 5)), Cell::Wall);
        assert_eq!(world.cell_type(Position::new(-1, 2)), Cell::Wall);
        assert_eq!(world.cell_type(Position::new(2, 2)), Cell::Empty);
        assert!(!world.is_valid(Position::new(6, 0)));
    }

    #[test]
    fn agent_takes_precedence_over_items() {
        let mut world = world();
        let pos = Position::new(2, 2);
        world.spawn_item(pos).unwrap();
        assert_eq!(world.cell_type(pos), Cell::Item);
        world.spawn_agent(7, Position::new(2, 3)).unwrap();
        world.move_agent(7, pos).unwrap();
        assert_eq!(world.cell_type(pos), Cell::Agent(7));
        world.move_agent(7, Position::new(3, 2)).unwrap();
        assert_eq!(world.cell_type(pos), Cell::Item);
        assert_eq!(world.cell_type(Position::new(2, 3)), Cell::Empty);
    }

    #[test]
    fn only_single_items_can_be_picked_up() {
        let mut world = world();
        let single = Position::new(1, 1);
        let shelf = Position::new(3, 3);
        let id = world.spawn_item(single).unwrap();
        world.spawn_item(shelf).unwrap();
        world.spawn_item(shelf).unwrap();

        assert!(world.can_pickup(single));
        assert!(!world.can_pickup(shelf));
        assert!(matches!(
            world.remove_top_item(shelf),
            Err(GridError::NotPickable { depth: 2, .. })
        ));
        assert_eq!(world.stack_depth(shelf), 2);

        assert_eq!(world.remove_top_item(single).unwrap(), id);
        assert_eq!(world.cell_type(single), Cell::Empty);
        let item = world.item(id).unwrap();
        assert!(item.processed);
        assert_eq!(item.position, None);
        assert!(world.remove_top_item(single).is_err());
    }

    #[test]
    fn placement_respects_capacity_and_credits_agent() {
        let mut world = GridWorld::walled(6, 6, 2);
        let from = Position::new(1, 1);
        let shelf = Position::new(3, 3);
        let a = world.spawn_item(from).unwrap();
        let b = world.spawn_item(Position::new(1, 2)).unwrap();
        world.spawn_item(shelf).unwrap();

        world.remove_top_item(from).unwrap();
        world.place_item(shelf, a, 4).unwrap();
        assert_eq!(world.stack_depth(shelf), 2);
        assert_eq!(world.top_item(shelf), Some(a));
        assert_eq!(world.item_depth(a), Some(2));
        assert_eq!(world.deliveries(4), 1);

        world.remove_top_item(Position::new(1, 2)).unwrap();
        assert!(!world.can_place(shelf, 4));
        assert!(matches!(
            world.place_item(shelf, b, 4),
            Err(GridError::StackFull { capacity: 2, .. })
        ));
    }

    #[test]
    fn agent_may_drop_on_its_own_cell_only() {
        let mut world = world();
        let pos = Position::new(2, 2);
        let id = world.spawn_item(Position::new(3, 3)).unwrap();
        world.spawn_agent(1, pos).unwrap();
        world.remove_top_item(Position::new(3, 3)).unwrap();

        assert!(!world.can_place(pos, 2));
        assert!(world.can_place(pos, 1));
        world.place_item(pos, id, 1).unwrap();
        assert_eq!(world.cell_type(pos), Cell::Agent(1));
        assert_eq!(world.stack_depth(pos), 1);
    }

    #[test]
    fn agents_cannot_move_into_walls_or_each_other() {
        let mut world = world();
        world.spawn_agent(1, Position::new(1, 1)).unwrap();
        world.spawn_agent(2, Position::new(2, 1)).unwrap();
        assert!(!world.can_move_into(Position::new(0, 1)));
        assert!(matches!(
            world.move_agent(1, Position::new(0, 1)),
            Err(GridError::Wall(_))
        ));
        assert!(matches!(
            world.move_agent(1, Position::new(2, 1)),
            Err(GridError::Occupied { occupant: 2, .. })
        ));
        assert_eq!(world.agent_position(1), Some(Position::new(1, 1)));
    }

    #[test]
    fn counts_split_single_and_organized() {
        let mut world = world();
        world.spawn_item(Position::new(1, 1)).unwrap();
        for _ in 0..3 {
            world.spawn_item(Position::new(2, 2)).unwrap();
        }
        assert_eq!(world.single_items(), 1);
        assert_eq!(world.organized_items(), 3);
        assert_eq!(world.shelf_count(), 1);
        assert_eq!(world.items_on_grid(), 4);
        assert_eq!(world.interior().count(), 16);
    }
}
