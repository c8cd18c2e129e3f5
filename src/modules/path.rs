use std::collections::{HashMap, VecDeque};

use crate::modules::grid::{Cell, Direction, GridWorld, Position};

/// Shortest 4-connected route from `from` to `to` over the current grid.
///
/// Walls and other agents block; items and a non-wall destination are
/// passable. Ties follow [`Direction::ALL`] order. An empty route means
/// either `from == to` or that `to` is unreachable right now.
pub fn route(world: &GridWorld, from: Position, to: Position) -> Vec<Direction> {
    if from == to {
        return Vec::new();
    }

    let mut parents: HashMap<Position, (Position, Direction)> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    parents.insert(from, (from, Direction::Up));

    while let Some(current) = queue.pop_front() {
        for direction in Direction::ALL {
            let next = current.step(direction);
            if parents.contains_key(&next) || world.is_wall(next) {
                continue;
            }
            let passable = next == to || matches!(world.cell_type(next), Cell::Empty | Cell::Item);
            if !passable {
                continue;
            }
            parents.insert(next, (current, direction));
            if next == to {
                return unwind(&parents, from, to);
            }
            queue.push_back(next);
        }
    }

    Vec::new()
}

fn unwind(
    parents: &HashMap<Position, (Position, Direction)>,
    from: Position,
    to: Position,
) -> Vec<Direction> {
    let mut steps = Vec::new();
    let mut cursor = to;
    while cursor != from {
        let Some((parent, direction)) = parents.get(&cursor) else {
            break;
        };
        steps.push(*direction);
        cursor = *parent;
    }
    steps.reverse();
    steps
}

/// Follow `steps` from `from`, returning the final coordinate.
pub fn walk(from: Position, steps: &[Direction]) -> Position {
    steps.iter().fold(from, |pos, direction| pos.step(*direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::grid::DEFAULT_STACK_CAPACITY;
    use proptest::prelude::*;

    fn open(width: i32, height: i32) -> GridWorld {
        GridWorld::walled(width, height, DEFAULT_STACK_CAPACITY)
    }

    #[test]
    fn same_cell_is_empty_route() {
        let world = open(5, 5);
        assert!(route(&world, Position::new(2, 2), Position::new(2, 2)).is_empty());
    }

    #[test]
    fn detours_around_a_single_wall() {
        // 7x7 with interior 5x5; wall at (3,2) sits between start and goal.
        let mut world = open(7, 7);
        world.add_wall(Position::new(3, 2)).unwrap();
        let from = Position::new(2, 2);
        let to = Position::new(4, 2);

        let steps = route(&world, from, to);
        assert_eq!(steps.len(), 4);
        assert_eq!(walk(from, &steps), to);
        assert_eq!(
            steps,
            vec![
                Direction::Up,
                Direction::Right,
                Direction::Right,
                Direction::Down
            ]
        );
    }

    #[test]
    fn enclosed_target_is_unreachable() {
        let mut world = open(7, 7);
        let target = Position::new(3, 3);
        for direction in Direction::ALL {
            world.add_wall(target.step(direction)).unwrap();
        }
        assert!(route(&world, Position::new(1, 1), target).is_empty());
    }

    #[test]
    fn items_are_passable_agents_are_not() {
        let mut world = open(5, 4);
        // Interior row y=1 and y=2, x in 1..=3.
        world.spawn_item(Position::new(2, 1)).unwrap();
        let steps = route(&world, Position::new(1, 1), Position::new(3, 1));
        assert_eq!(steps, vec![Direction::Right, Direction::Right]);

        world.spawn_agent(9, Position::new(2, 1)).unwrap();
        let steps = route(&world, Position::new(1, 1), Position::new(3, 1));
        assert_eq!(steps.len(), 4);
        assert!(!steps.is_empty());
    }

    #[test]
    fn occupied_destination_is_still_routable() {
        let mut world = open(5, 5);
        world.spawn_agent(1, Position::new(3, 3)).unwrap();
        let steps = route(&world, Position::new(1, 3), Position::new(3, 3));
        assert_eq!(steps.len(), 2);
    }

    proptest! {
        #[test]
        fn open_grid_routes_are_manhattan_shortest(
            fx in 1i32..9, fy in 1i32..9, tx in 1i32..9, ty in 1i32..9,
        ) {
            let world = open(10, 10);
            let from = Position::new(fx, fy);
            let to = Position::new(tx, ty);
            let steps = route(&world, from, to);
            prop_assert_eq!(steps.len() as i32, from.manhattan(to));
            prop_assert_eq!(walk(from, &steps), to);
        }

        #[test]
        fn routes_never_cross_walls(
            walls in proptest::collection::vec((1i32..9, 1i32..9), 0..20),
            fx in 1i32..9, fy in 1i32..9, tx in 1i32..9, ty in 1i32..9,
        ) {
            let mut world = open(10, 10);
            let from = Position::new(fx, fy);
            let to = Position::new(tx, ty);
            for (x, y) in walls {
                let pos = Position::new(x, y);
                if pos != from && pos != to {
                    world.add_wall(pos).unwrap();
                }
            }
            let steps = route(&world, from, to);
            let mut cursor = from;
            for step in &steps {
                cursor = cursor.step(*step);
                prop_assert!(!world.is_wall(cursor));
            }
            if !steps.is_empty() {
                prop_assert_eq!(cursor, to);
                prop_assert!(steps.len() as i32 >= from.manhattan(to));
            }
        }
    }
}
