use serde::Serialize;

use crate::{Position, map::Grid, map::GridModel};

/// Per-agent visit counts, owned by exactly one [`crate::AgentRun`].
///
/// The start cell begins with one visit; every other cell begins at zero.
/// [`VisitMap::mark_visited`] is the only mutator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitMap {
    counts: Grid<u32>,
}

impl VisitMap {
    pub fn new(size: usize) -> Self {
        let mut counts: Grid<u32> = Grid::new(size);
        if let Some(origin) = counts.get_mut(Position::ORIGIN) {
            *origin = 1;
        }
        VisitMap { counts }
    }

    /// Creates a visit map sized to `grid`.
    pub fn for_grid(grid: &GridModel) -> Self {
        Self::new(grid.size())
    }

    pub fn size(&self) -> usize {
        self.counts.size()
    }

    /// Number of times the agent has occupied `pos`; zero when out of bounds.
    #[inline]
    pub fn visit_count_at(&self, pos: Position) -> u32 {
        self.counts.get(pos).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_unvisited(&self, pos: Position) -> bool {
        self.visit_count_at(pos) == 0
    }

    /// Records one more occupancy of `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is outside the map.
    pub fn mark_visited(&mut self, pos: Position) {
        self.counts[pos] += 1;
    }

    /// True iff every open cell of `grid` has been visited at least once.
    ///
    /// Scans the whole grid on every call.
    pub fn all_cleanable_visited(&self, grid: &GridModel) -> bool {
        grid.open_cells().all(|pos| self.visit_count_at(pos) > 0)
    }

    /// Count of distinct cells visited at least once.
    pub fn cells_visited(&self) -> usize {
        self.counts.iter().filter(|count| **count > 0).count()
    }

    /// Iterates `(Position, count)` for every cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, u32)> + '_ {
        self.counts.enumerate().map(|(pos, count)| (pos, *count))
    }
}
