use std::fmt;

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod cancel;
pub mod config;
pub mod map;
pub mod race;
pub mod strategy;
pub mod visits;

pub use agent::{AgentRun, BlockReason, RunError, RunResult, Status, Turn};
pub use cancel::CancelToken;
pub use config::{
    AgentConfig, ConfigError, GRID_SIZE_RANGE, MAX_MOVES_RANGE, OBSTACLE_CHANCE_RANGE, RaceConfig,
};
pub use map::{CellState, Grid, GridError, GridModel};
pub use race::{Entrant, Race, RaceEntry, RaceOutcome, RaceReport};
pub use strategy::{PathStrategy, Step, StrategyKind};
pub use visits::VisitMap;

/// Represents a cell coordinate on a square grid.
///
/// `row` grows downward and `col` grows rightward; every agent starts at
/// [`Position::ORIGIN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    /// The start cell shared by every agent.
    pub const ORIGIN: Position = Position { row: 0, col: 0 };

    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns manhattan distance between two positions
    pub fn manhattan_distance(&self, other: &Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// True when `other` is exactly one orthogonal step away.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.manhattan_distance(other) == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance_is_symmetric() {
        let a = Position::new(1, 4);
        let b = Position::new(3, 0);
        assert_eq!(a.manhattan_distance(&b), 6);
        assert_eq!(b.manhattan_distance(&a), 6);
    }

    #[test]
    fn adjacency_excludes_diagonals_and_self() {
        let p = Position::new(2, 2);
        assert!(p.is_adjacent(&Position::new(1, 2)));
        assert!(p.is_adjacent(&Position::new(2, 3)));
        assert!(!p.is_adjacent(&Position::new(3, 3)));
        assert!(!p.is_adjacent(&p));
    }
}
