use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::modules::config::SimConfig;
use crate::modules::error::LayoutError;
use crate::modules::grid::{AgentId, GridWorld, Position};

/// Initial placement of a run: perimeter-walled grid, one item per listed
/// coordinate and agents in id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
    pub items: Vec<Position>,
    pub agents: Vec<Position>,
}

impl Layout {
    /// Scatter items and agents over free interior cells. Agents keep
    /// `min_agent_spacing` Manhattan distance from one another.
    pub fn random<R: Rng + ?Sized>(config: &SimConfig, rng: &mut R) -> Result<Self, LayoutError> {
        config.validate()?;
        let mut taken: HashSet<Position> = HashSet::new();
        let mut items = Vec::with_capacity(config.items);
        let mut agents: Vec<Position> = Vec::with_capacity(config.agents);

        for index in 0..config.items {
            let pos = pick(config, rng, |pos| !taken.contains(&pos)).ok_or(
                LayoutError::Placement {
                    kind: "item",
                    index,
                    attempts: config.placement_attempts,
                },
            )?;
            taken.insert(pos);
            items.push(pos);
        }

        for index in 0..config.agents {
            let pos = pick(config, rng, |pos| {
                !taken.contains(&pos)
                    && agents
                        .iter()
                        .all(|other| other.manhattan(pos) >= config.min_agent_spacing)
            })
            .ok_or(LayoutError::Placement {
                kind: "agent",
                index,
                attempts: config.placement_attempts,
            })?;
            taken.insert(pos);
            agents.push(pos);
        }

        Ok(Self {
            width: config.width,
            height: config.height,
            items,
            agents,
        })
    }

    /// Materialise the layout. Agent ids follow list order.
    pub fn build_world(&self, capacity: usize) -> Result<GridWorld, LayoutError> {
        let mut world = GridWorld::walled(self.width, self.height, capacity);
        for pos in &self.items {
            world.spawn_item(*pos)?;
        }
        for (id, pos) in self.agents.iter().enumerate() {
            world.spawn_agent(id as AgentId, *pos)?;
        }
        Ok(world)
    }

    /// SHA-256 over the canonical JSON encoding, hex encoded.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}

fn pick<R, F>(config: &SimConfig, rng: &mut R, accept: F) -> Option<Position>
where
    R: Rng + ?Sized,
    F: Fn(Position) -> bool,
{
    for _ in 0..config.placement_attempts {
        let pos = Position::new(
            rng.gen_range(1..=config.width - 2),
            rng.gen_range(1..=config.height - 2),
        );
        if accept(pos) {
            return Some(pos);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::ConfigError;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_layout_is_seeded_and_non_overlapping() {
        let config = SimConfig::default();
        let a = Layout::random(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = Layout::random(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.items.len(), 22);
        assert_eq!(a.agents.len(), 5);

        let all: HashSet<Position> = a.items.iter().chain(a.agents.iter()).copied().collect();
        assert_eq!(all.len(), 27);
        for pos in &all {
            assert!(pos.x >= 1 && pos.x <= 10 && pos.y >= 1 && pos.y <= 10);
        }
        for (i, p) in a.agents.iter().enumerate() {
            for q in &a.agents[i + 1..] {
                assert!(p.manhattan(*q) >= config.min_agent_spacing);
            }
        }
    }

    #[test]
    fn different_seeds_change_the_digest() {
        let config = SimConfig::default();
        let a = Layout::random(&config, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = Layout::random(&config, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn build_world_places_everything() {
        let layout = Layout {
            width: 6,
            height: 6,
            items: vec![Position::new(1, 1), Position::new(2, 3)],
            agents: vec![Position::new(4, 4), Position::new(1, 4)],
        };
        let world = layout.build_world(5).unwrap();
        assert_eq!(world.items_on_grid(), 2);
        assert_eq!(world.agent_position(0), Some(Position::new(4, 4)));
        assert_eq!(world.agent_position(1), Some(Position::new(1, 4)));
        assert!(world.is_wall(Position::new(0, 0)));
    }

    #[test]
    fn impossible_spacing_fails_placement() {
        let config = SimConfig {
            width: 5,
            height: 5,
            items: 0,
            agents: 3,
            min_agent_spacing: 10,
            placement_attempts: 20,
            ..SimConfig::default()
        };
        let err = Layout::random(&config, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::Placement {
                kind: "agent",
                index: 1,
                ..
            }
        ));
    }

    #[test]
    fn invalid_config_is_rejected_before_placement() {
        let config = SimConfig {
            agents: 0,
            ..SimConfig::default()
        };
        let err = Layout::random(&config, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, LayoutError::Config(ConfigError::NoAgents)));
    }
}
