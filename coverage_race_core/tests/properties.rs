use std::collections::VecDeque;

use coverage_race_core::{
    AgentRun, GridModel, PathStrategy, Position, Status, Step, StrategyKind, Turn, VisitMap,
    map::Grid, strategy::BreadthFirst,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const SEEDS: std::ops::Range<u64> = 0..40;

fn random_grid(rng: &mut StdRng) -> GridModel {
    let size = rng.random_range(2..=9);
    let chance = rng.random_range(0.0..0.35);
    GridModel::generate(size, chance, rng).unwrap()
}

/// Hop distance from `start` to every cell, over open cells only.
fn hop_distances(grid: &GridModel, start: Position) -> Grid<Option<usize>> {
    let mut dist: Grid<Option<usize>> = Grid::new(grid.size());
    dist[start] = Some(0);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let here = dist[current].unwrap();
        for next in grid.open_neighbors(current) {
            if dist[next].is_none() {
                dist[next] = Some(here + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}

#[test]
fn runs_respect_budget_and_report_exact_coverage() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = random_grid(&mut rng);
        let max_moves = rng.random_range(1..=120);

        for strategy in StrategyKind::ALL {
            let mut run = AgentRun::new(&grid, "a", strategy, max_moves).unwrap();
            let mut turns = 0u32;
            let result = loop {
                turns += 1;
                match run.step() {
                    Turn::Moved(pos) => assert!(grid.is_open(pos)),
                    Turn::Finished(result) => break result,
                }
            };

            let context = format!("seed {seed}, {strategy}");
            assert!(result.moves < max_moves, "{context}");
            assert!(result.moves < turns, "{context}");
            assert!(result.cells_visited <= result.total_cleanable_cells, "{context}");
            assert_eq!(result.total_cleanable_cells, grid.cleanable_count());
            if result.is_cleaning_complete {
                assert_eq!(result.cells_visited, result.total_cleanable_cells, "{context}");
            }
            if run.status() == Status::Completed {
                assert!(result.is_cleaning_complete, "{context}");
            }
            for (pos, count) in run.visits().enumerate() {
                assert!(count == 0 || grid.is_open(pos), "{context}: visited obstacle {pos}");
            }
        }
    }
}

#[test]
fn bfs_paths_are_shortest_to_an_unvisited_cell() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = random_grid(&mut rng);

        let open: Vec<Position> = grid.open_cells().collect();
        let mut visits = VisitMap::for_grid(&grid);
        for pos in &open {
            if rng.random_bool(0.6) {
                visits.mark_visited(*pos);
            }
        }
        let start = open[rng.random_range(0..open.len())];

        let dist = hop_distances(&grid, start);
        let nearest = open
            .iter()
            .filter(|pos| **pos != start && visits.is_unvisited(**pos))
            .filter_map(|pos| dist[*pos])
            .min();

        match (BreadthFirst.next_step(&grid, &visits, start), nearest) {
            (Step::Path(path), Some(hops)) => {
                assert_eq!(path.len(), hops, "seed {seed}");
                assert!(visits.is_unvisited(*path.last().unwrap()));
                assert!(path[..path.len() - 1].iter().all(|p| *p != start));
            }
            (Step::NoPath, None) => {}
            (step, nearest) => panic!("seed {seed}: got {step:?}, nearest {nearest:?}"),
        }
    }
}

#[test]
fn search_strategies_only_give_up_when_nothing_is_reachable() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = random_grid(&mut rng);
        let dist = hop_distances(&grid, Position::ORIGIN);
        let reachable = grid.open_cells().filter(|p| dist[*p].is_some()).count();

        for strategy in [
            StrategyKind::Bfs,
            StrategyKind::AStar,
            StrategyKind::DfsBacktrack,
        ] {
            let mut run = AgentRun::new(&grid, "a", strategy, 10_000).unwrap();
            let result = loop {
                if let Turn::Finished(result) = run.step() {
                    break result;
                }
            };
            assert_eq!(result.cells_visited, reachable, "seed {seed}, {strategy}");
            let expected_complete = reachable == grid.cleanable_count();
            assert_eq!(result.is_cleaning_complete, expected_complete);
            assert_eq!(
                run.status() == Status::Completed,
                expected_complete,
                "seed {seed}, {strategy}"
            );
        }
    }
}
