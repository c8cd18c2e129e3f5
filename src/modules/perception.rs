use crate::modules::grid::{Cell, Direction, GridWorld, Position};

/// Default ray length for passive sensing.
pub const DEFAULT_SENSOR_RANGE: i32 = 3;

/// Cast four cardinal rays of length `range` from `origin` and return every
/// single-item coordinate they cross. A ray stops at the first wall or at
/// the grid edge; agents do not block it but hide the items under them.
pub fn scan(world: &GridWorld, origin: Position, range: i32) -> Vec<Position> {
    let mut found = Vec::new();
    for direction in Direction::ALL {
        let mut cursor = origin;
        for _ in 0..range {
            cursor = cursor.step(direction);
            match world.cell_type(cursor) {
                Cell::Wall => break,
                Cell::Item if world.stack_depth(cursor) == 1 => found.push(cursor),
                Cell::Item | Cell::Empty | Cell::Agent(_) => {}
            }
        }
    }
    found
}

/// Coordinates an agent believes hold unclaimed single items, in the order
/// it learned about them.
#[derive(Clone, Debug, Default)]
pub struct KnownItems {
    positions: Vec<Position>,
}

impl KnownItems {
    /// Returns `true` when `position` was not known before.
    pub fn insert(&mut self, position: Position) -> bool {
        if self.positions.contains(&position) {
            return false;
        }
        self.positions.push(position);
        true
    }

    pub fn remove(&mut self, position: Position) -> bool {
        let before = self.positions.len();
        self.positions.retain(|known| *known != position);
        before != self.positions.len()
    }

    pub fn contains(&self, position: Position) -> bool {
        self.positions.contains(&position)
    }

    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
