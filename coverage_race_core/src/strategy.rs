use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{Position, map::Grid, map::GridModel, visits::VisitMap};

/// Extra A* edge cost per prior visit of the destination cell.
pub const VISIT_PENALTY: f64 = 0.1;

/// What a strategy wants the agent to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Move to one adjacent cell.
    Single(Position),
    /// Walk this path, start excluded, ending on an unvisited cell.
    Path(Vec<Position>),
    /// Nothing reachable to move toward.
    NoPath,
}

/// Trait defining how an agent picks its next move.
///
/// Strategies are stateless; everything they need comes from the shared
/// grid and the calling agent's own visit map.
pub trait PathStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn next_step(&self, grid: &GridModel, visits: &VisitMap, from: Position) -> Step;
}

/// The four stock search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Greedy,
    Bfs,
    AStar,
    DfsBacktrack,
}

static GREEDY: Greedy = Greedy;
static BFS: BreadthFirst = BreadthFirst;
static A_STAR: AStar = AStar;
static DFS_BACKTRACK: DfsBacktrack = DfsBacktrack;

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Greedy,
        StrategyKind::Bfs,
        StrategyKind::AStar,
        StrategyKind::DfsBacktrack,
    ];

    /// Returns the shared implementation for this kind.
    pub fn strategy(self) -> &'static dyn PathStrategy {
        match self {
            StrategyKind::Greedy => &GREEDY,
            StrategyKind::Bfs => &BFS,
            StrategyKind::AStar => &A_STAR,
            StrategyKind::DfsBacktrack => &DFS_BACKTRACK,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StrategyKind::Greedy => "Greedy",
            StrategyKind::Bfs => "BFS",
            StrategyKind::AStar => "A*",
            StrategyKind::DfsBacktrack => "DFS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StrategyKind::Greedy => "Picks the least-visited adjacent cell",
            StrategyKind::Bfs => "Walks the shortest path to the nearest unvisited cell",
            StrategyKind::AStar => "Visit-penalised A* toward the nearest unvisited cell",
            StrategyKind::DfsBacktrack => {
                "Explores deep branches first, backtracking from dead ends"
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// True if `pos` is a search goal: unvisited and not where the search began.
#[inline]
fn is_goal(visits: &VisitMap, start: Position, pos: Position) -> bool {
    pos != start && visits.is_unvisited(pos)
}

/// Rebuilds the path from `start` (exclusive) to `goal` via back-pointers.
fn trace_back(came_from: &Grid<Option<Position>>, start: Position, goal: Position) -> Vec<Position> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(prev) = came_from[current] {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
        debug_assert!(
            path.len() <= came_from.cell_count(),
            "back-pointer cycle while tracing from {goal}"
        );
    }
    path.reverse();
    path
}

/// Steps to the adjacent open cell with the fewest visits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl PathStrategy for Greedy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Greedy
    }

    fn next_step(&self, grid: &GridModel, visits: &VisitMap, from: Position) -> Step {
        // min_by_key keeps the first minimum, so ties fall to neighbor order.
        grid.open_neighbors(from)
            .min_by_key(|n| visits.visit_count_at(*n))
            .map_or(Step::NoPath, Step::Single)
    }
}

/// Breadth-first search to the nearest unvisited cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirst;

impl PathStrategy for BreadthFirst {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Bfs
    }

    fn next_step(&self, grid: &GridModel, visits: &VisitMap, from: Position) -> Step {
        let mut seen: Grid<bool> = Grid::new(grid.size());
        let mut came_from: Grid<Option<Position>> = Grid::new(grid.size());
        let mut queue = VecDeque::from([from]);
        seen[from] = true;

        while let Some(current) = queue.pop_front() {
            if is_goal(visits, from, current) {
                return Step::Path(trace_back(&came_from, from, current));
            }
            for next in grid.open_neighbors(current) {
                if !seen[next] {
                    seen[next] = true;
                    came_from[next] = Some(current);
                    queue.push_back(next);
                }
            }
        }

        tracing::trace!(%from, "bfs found no reachable unvisited cell");
        Step::NoPath
    }
}

/// A* search that stops at the first unvisited cell it settles.
///
/// The heuristic is the manhattan distance to [`Position::ORIGIN`], not to
/// any goal, so the search leans toward cells near the start. Each edge
/// costs `1 + VISIT_PENALTY * visits(destination)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AStar;

#[derive(Debug, Clone, Copy)]
struct Frontier {
    f_score: f64,
    /// Push order; earlier entries win f-score ties.
    seq: u64,
    position: Position,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl AStar {
    fn heuristic(pos: Position) -> f64 {
        pos.manhattan_distance(&Position::ORIGIN) as f64
    }
}

impl PathStrategy for AStar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AStar
    }

    fn next_step(&self, grid: &GridModel, visits: &VisitMap, from: Position) -> Step {
        let size = grid.size();
        let mut frontier = BinaryHeap::new();
        let mut came_from: Grid<Option<Position>> = Grid::new(size);
        let mut g_score: Grid<Option<f64>> = Grid::new(size);
        let mut closed: Grid<bool> = Grid::new(size);
        let mut seq = 0u64;

        g_score[from] = Some(0.0);
        frontier.push(Frontier {
            f_score: Self::heuristic(from),
            seq,
            position: from,
        });

        while let Some(Frontier {
            position: current, ..
        }) = frontier.pop()
        {
            // Superseded entry for a cell already settled at a lower score.
            if closed[current] {
                continue;
            }
            if is_goal(visits, from, current) {
                return Step::Path(trace_back(&came_from, from, current));
            }
            closed[current] = true;

            let current_cost = g_score[current].unwrap_or(0.0);
            for next in grid.open_neighbors(current) {
                if closed[next] {
                    continue;
                }
                let tentative =
                    current_cost + 1.0 + VISIT_PENALTY * f64::from(visits.visit_count_at(next));
                if g_score[next].is_none_or(|known| tentative < known) {
                    came_from[next] = Some(current);
                    g_score[next] = Some(tentative);
                    seq += 1;
                    frontier.push(Frontier {
                        f_score: tentative + Self::heuristic(next),
                        seq,
                        position: next,
                    });
                }
            }
        }

        tracing::trace!(%from, "a* open set exhausted");
        Step::NoPath
    }
}

/// Depth-first search with backtracking.
///
/// Children are tried in ascending visit count (ties by neighbor order). A
/// search-local explored set, fresh on every call, keeps each cell expanded
/// at most once per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfsBacktrack;

struct DepthFirst<'a> {
    grid: &'a GridModel,
    visits: &'a VisitMap,
    start: Position,
    explored: Grid<bool>,
    trail: Vec<Position>,
    expansions: Vec<Position>,
}

impl<'a> DepthFirst<'a> {
    fn new(grid: &'a GridModel, visits: &'a VisitMap, start: Position) -> Self {
        DepthFirst {
            grid,
            visits,
            start,
            explored: Grid::new(grid.size()),
            trail: Vec::new(),
            expansions: Vec::new(),
        }
    }

    /// Marks `at` explored. Returns `None` when it is a goal, otherwise its
    /// unexplored children in ascending visit count (ties by neighbor order).
    fn expand(&mut self, at: Position) -> Option<std::vec::IntoIter<Position>> {
        self.explored[at] = true;
        self.expansions.push(at);
        if is_goal(self.visits, self.start, at) {
            return None;
        }

        let mut children: Vec<Position> = self
            .grid
            .open_neighbors(at)
            .filter(|n| !self.explored[*n])
            .collect();
        children.sort_by_key(|n| self.visits.visit_count_at(*n));
        Some(children.into_iter())
    }

    /// Returns true once the start or a descendant is unvisited; `trail`
    /// then holds the path from the start (exclusive) to that cell.
    ///
    /// Branches live on a heap stack, one frame per trail cell, so depth is
    /// bounded by the cell count rather than the thread stack.
    fn descend(&mut self) -> bool {
        let Some(root) = self.expand(self.start) else {
            return true;
        };
        let mut branches = vec![root];

        while let Some(children) = branches.last_mut() {
            // An earlier sibling's subtree may have reached a child already.
            match children.find(|child| !self.explored[*child]) {
                Some(child) => {
                    self.trail.push(child);
                    match self.expand(child) {
                        Some(grandchildren) => branches.push(grandchildren),
                        None => return true,
                    }
                }
                None => {
                    branches.pop();
                    // The root frame has no trail cell of its own.
                    if !branches.is_empty() {
                        self.trail.pop();
                    }
                }
            }
        }
        false
    }
}

impl DfsBacktrack {
    /// Runs one search, returning the path (if any) and every cell expanded
    /// in expansion order.
    fn search(
        grid: &GridModel,
        visits: &VisitMap,
        from: Position,
    ) -> (Option<Vec<Position>>, Vec<Position>) {
        let mut search = DepthFirst::new(grid, visits, from);
        let found = search.descend();
        let path = found.then_some(search.trail);
        (path, search.expansions)
    }
}

impl PathStrategy for DfsBacktrack {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DfsBacktrack
    }

    fn next_step(&self, grid: &GridModel, visits: &VisitMap, from: Position) -> Step {
        match Self::search(grid, visits, from) {
            (Some(path), _) => Step::Path(path),
            (None, expanded) => {
                tracing::trace!(%from, expanded = expanded.len(), "dfs exhausted every branch");
                Step::NoPath
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn visited(grid: &GridModel, cells: &[(usize, usize)]) -> VisitMap {
        let mut visits = VisitMap::for_grid(grid);
        for &(row, col) in cells {
            visits.mark_visited(Position::new(row, col));
        }
        visits
    }

    fn assert_walkable(grid: &GridModel, from: Position, path: &[Position]) {
        let mut prev = from;
        for &pos in path {
            assert!(prev.is_adjacent(&pos), "{prev} -> {pos} is not a single step");
            assert!(grid.is_open(pos), "{pos} is not open");
            prev = pos;
        }
    }

    #[test]
    fn greedy_prefers_fewest_visits_then_fixed_order() {
        let grid = GridModel::open(3).unwrap();
        let center = Position::new(1, 1);

        let fresh = visited(&grid, &[]);
        assert_eq!(
            Greedy.next_step(&grid, &fresh, center),
            Step::Single(Position::new(0, 1))
        );

        // Up and down already seen: left wins over right.
        let worn = visited(&grid, &[(0, 1), (2, 1)]);
        assert_eq!(
            Greedy.next_step(&grid, &worn, center),
            Step::Single(Position::new(1, 0))
        );
    }

    #[test]
    fn greedy_reports_no_path_only_when_walled_in() {
        let grid = GridModel::from_blocked(2, [Position::new(0, 1), Position::new(1, 0)]).unwrap();
        let visits = VisitMap::for_grid(&grid);
        assert_eq!(Greedy.next_step(&grid, &visits, Position::ORIGIN), Step::NoPath);

        // Every neighbor visited is still a move for greedy.
        let open = GridModel::open(2).unwrap();
        let visits = visited(&open, &[(0, 1), (1, 0)]);
        assert!(matches!(
            Greedy.next_step(&open, &visits, Position::ORIGIN),
            Step::Single(_)
        ));
    }

    #[test]
    fn bfs_walks_around_obstacles_to_nearest_unvisited() {
        let grid: GridModel = "...\n##.\n...".parse().unwrap();
        let visits = visited(&grid, &[(0, 1), (0, 2), (1, 2)]);
        let step = BreadthFirst.next_step(&grid, &visits, Position::new(1, 2));
        assert_eq!(step, Step::Path(vec![Position::new(2, 2)]));

        let visits = visited(&grid, &[(0, 1), (0, 2), (1, 2), (2, 2)]);
        let Step::Path(path) = BreadthFirst.next_step(&grid, &visits, Position::ORIGIN) else {
            panic!("expected a path");
        };
        assert_eq!(
            path,
            vec![
                Position::new(0, 1),
                Position::new(0, 2),
                Position::new(1, 2),
                Position::new(2, 2),
                Position::new(2, 1),
            ]
        );
    }

    #[test]
    fn bfs_reports_no_path_when_unvisited_cells_are_cut_off() {
        let grid: GridModel = ".#.\n##.\n...".parse().unwrap();
        let visits = VisitMap::for_grid(&grid);
        assert_eq!(BreadthFirst.next_step(&grid, &visits, Position::ORIGIN), Step::NoPath);
    }

    #[test]
    fn a_star_settles_on_an_unvisited_cell() {
        let grid = GridModel::open(4).unwrap();
        let visits = visited(&grid, &[(1, 0), (0, 1), (1, 1)]);
        let Step::Path(path) = AStar.next_step(&grid, &visits, Position::new(1, 1)) else {
            panic!("expected a path");
        };
        assert_walkable(&grid, Position::new(1, 1), &path);
        assert!(visits.is_unvisited(*path.last().unwrap()));
        // (2, 1) and (1, 2) tie on f-score; down was pushed before right.
        assert_eq!(path, vec![Position::new(2, 1)]);
    }

    #[test]
    fn a_star_reports_no_path_when_open_set_empties() {
        let grid = GridModel::from_blocked(2, [Position::new(0, 1), Position::new(1, 0)]).unwrap();
        let visits = VisitMap::for_grid(&grid);
        assert_eq!(AStar.next_step(&grid, &visits, Position::ORIGIN), Step::NoPath);
    }

    #[test]
    fn dfs_prefers_less_visited_branches() {
        let grid = GridModel::open(3).unwrap();
        // Down neighbor is worn, so the search dives right first.
        let visits = visited(&grid, &[(1, 0), (1, 0), (0, 1)]);
        let Step::Path(path) = DfsBacktrack.next_step(&grid, &visits, Position::ORIGIN) else {
            panic!("expected a path");
        };
        assert_walkable(&grid, Position::ORIGIN, &path);
        assert_eq!(path, vec![Position::new(0, 1), Position::new(1, 1)]);
    }

    #[test]
    fn dfs_expands_each_cell_at_most_once_per_search() {
        let grid: GridModel = "....\n.##.\n....\n#...".parse().unwrap();
        let mut visits = VisitMap::for_grid(&grid);
        for pos in grid.open_cells() {
            if pos != Position::new(3, 3) {
                visits.mark_visited(pos);
            }
        }

        let (path, expansions) = DfsBacktrack::search(&grid, &visits, Position::new(2, 0));
        let unique: HashSet<_> = expansions.iter().collect();
        assert_eq!(unique.len(), expansions.len());

        let path = path.expect("(3, 3) is reachable");
        assert_walkable(&grid, Position::new(2, 0), &path);
        assert_eq!(path.last(), Some(&Position::new(3, 3)));

        // A fresh call starts with an empty explored set.
        let (again, _) = DfsBacktrack::search(&grid, &visits, Position::new(2, 0));
        assert_eq!(again, Some(path));
    }

    #[test]
    fn dfs_walks_a_full_length_trail_on_a_small_stack() {
        const SIZE: usize = 400;
        let grid = GridModel::open(SIZE).unwrap();
        let target = Position::new(SIZE - 1, SIZE - 1);
        let mut visits = VisitMap::for_grid(&grid);
        for pos in grid.open_cells() {
            if pos != target {
                visits.mark_visited(pos);
            }
        }

        // The search snakes down and up whole columns; the corner is reached
        // on entering the last one.
        let path = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || match DfsBacktrack.next_step(&grid, &visits, Position::ORIGIN) {
                Step::Path(path) => {
                    assert_walkable(&grid, Position::ORIGIN, &path);
                    path
                }
                other => panic!("expected a path, got {other:?}"),
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(path.len(), SIZE * (SIZE - 1));
        assert_eq!(path.last(), Some(&target));
        assert_eq!(&path[..2], &[Position::new(1, 0), Position::new(2, 0)]);
    }

    #[test]
    fn dfs_reports_no_path_after_exhausting_branches() {
        let grid: GridModel = "..#\n.##\n#..".parse().unwrap();
        let mut visits = VisitMap::for_grid(&grid);
        visits.mark_visited(Position::new(0, 1));
        visits.mark_visited(Position::new(1, 0));
        assert_eq!(
            DfsBacktrack.next_step(&grid, &visits, Position::new(1, 0)),
            Step::NoPath
        );
    }

    #[test]
    fn strategy_table_round_trips_kind() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.strategy().kind(), kind);
        }
    }
}
