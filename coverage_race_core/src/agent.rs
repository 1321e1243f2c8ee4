use std::{collections::VecDeque, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    cancel::CancelToken,
    config::ConfigError,
    map::{GridError, GridModel},
    strategy::{Step, StrategyKind},
    visits::VisitMap,
};

/// Errors raised while setting up a run or race, before any turn executes.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Agent '{agent}' must have a move budget greater than zero")]
    ZeroMaxMoves { agent: String },
    #[error("A race needs at least one agent")]
    NoAgents,
    #[error("Agent name '{0}' is used more than once")]
    DuplicateAgent(String),
    #[error("Agent '{0}' panicked during its run")]
    AgentPanicked(String),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why an agent stopped with cells still unvisited and no move to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Every orthogonal neighbor is out of bounds or an obstacle.
    Surrounded,
    /// Open neighbors exist but the strategy found nothing unvisited to reach.
    Unreachable,
}

/// Lifecycle of one agent run. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Running,
    Completed,
    Blocked(BlockReason),
    Exhausted,
    /// Stopped from outside before reaching another terminal state.
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => f.write_str("running"),
            Status::Completed => f.write_str("completed"),
            Status::Blocked(BlockReason::Surrounded) => f.write_str("blocked (surrounded)"),
            Status::Blocked(BlockReason::Unreachable) => f.write_str("blocked (unreachable)"),
            Status::Exhausted => f.write_str("out of moves"),
            Status::Cancelled => f.write_str("stopped"),
        }
    }
}

/// Frozen snapshot taken when a run becomes terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub cells_visited: usize,
    pub total_cleanable_cells: usize,
    /// Fresh re-scan of the visit map; always false for a cancelled run.
    pub is_cleaning_complete: bool,
    /// Moves made, not counting the initial occupancy of the start cell.
    pub moves: u32,
}

/// Outcome of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Moved(Position),
    Finished(RunResult),
}

/// Drives one agent's turn loop over a shared, read-only grid.
///
/// The run owns its visit map and state; nothing is shared mutably with
/// other agents.
#[derive(Debug)]
pub struct AgentRun<'g> {
    name: String,
    strategy: StrategyKind,
    grid: &'g GridModel,
    visits: VisitMap,
    position: Position,
    move_count: u32,
    max_moves: u32,
    status: Status,
    pending: VecDeque<Position>,
    blocked_cells: Vec<Position>,
    result: Option<RunResult>,
}

impl<'g> AgentRun<'g> {
    /// Creates a run at the start cell. Fails if `max_moves` is zero.
    pub fn new(
        grid: &'g GridModel,
        name: impl Into<String>,
        strategy: StrategyKind,
        max_moves: u32,
    ) -> Result<Self, RunError> {
        let name = name.into();
        if max_moves == 0 {
            return Err(RunError::ZeroMaxMoves { agent: name });
        }
        Ok(Self::fresh(grid, name, strategy, max_moves))
    }

    /// Builds a run from an already validated budget.
    pub(crate) fn fresh(
        grid: &'g GridModel,
        name: String,
        strategy: StrategyKind,
        max_moves: u32,
    ) -> Self {
        AgentRun {
            name,
            strategy,
            grid,
            visits: VisitMap::for_grid(grid),
            position: Position::ORIGIN,
            move_count: 1,
            max_moves,
            status: Status::Running,
            pending: VecDeque::new(),
            blocked_cells: Vec::new(),
            result: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn grid(&self) -> &'g GridModel {
        self.grid
    }

    pub fn visits(&self) -> &VisitMap {
        &self.visits
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// One more than the moves made so far; starts at 1.
    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    pub fn max_moves(&self) -> u32 {
        self.max_moves
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Obstacles next to the final position of a blocked run.
    pub fn blocked_cells(&self) -> &[Position] {
        &self.blocked_cells
    }

    /// Remaining steps of the path currently being followed.
    pub fn pending_path(&self) -> impl Iterator<Item = Position> + '_ {
        self.pending.iter().copied()
    }

    /// The final result, once the run is terminal.
    pub fn result(&self) -> Option<RunResult> {
        self.result
    }

    /// Executes one turn.
    ///
    /// Once terminal, further calls return the same result without changing
    /// any state.
    pub fn step(&mut self) -> Turn {
        if let Some(result) = self.result {
            return Turn::Finished(result);
        }
        if self.move_count >= self.max_moves {
            return Turn::Finished(self.finish(Status::Exhausted));
        }
        if self.visits.all_cleanable_visited(self.grid) {
            return Turn::Finished(self.finish(Status::Completed));
        }

        let next = match self.pending.pop_front() {
            Some(next) => next,
            None => match self.plan() {
                Some(next) => next,
                None => return Turn::Finished(self.block()),
            },
        };
        self.advance(next);
        Turn::Moved(next)
    }

    /// Asks the strategy for a fresh step, queueing the rest of any path.
    fn plan(&mut self) -> Option<Position> {
        let step = self
            .strategy
            .strategy()
            .next_step(self.grid, &self.visits, self.position);
        match step {
            Step::Single(next) => Some(next),
            Step::Path(path) => {
                let mut path = VecDeque::from(path);
                let next = path.pop_front()?;
                tracing::trace!(agent = %self.name, len = path.len() + 1, "following new path");
                self.pending = path;
                Some(next)
            }
            Step::NoPath => None,
        }
    }

    fn advance(&mut self, next: Position) {
        debug_assert!(self.position.is_adjacent(&next), "non-adjacent step to {next}");
        debug_assert!(self.grid.is_open(next), "step into obstacle at {next}");
        self.position = next;
        self.visits.mark_visited(next);
        self.move_count += 1;
        tracing::debug!(
            agent = %self.name,
            position = %next,
            move_count = self.move_count,
            "moved"
        );
    }

    fn block(&mut self) -> RunResult {
        let reason = if self.grid.open_neighbors(self.position).next().is_some() {
            BlockReason::Unreachable
        } else {
            BlockReason::Surrounded
        };
        self.blocked_cells = self.grid.blocked_neighbors(self.position);
        tracing::warn!(
            agent = %self.name,
            position = %self.position,
            ?reason,
            obstacles = self.blocked_cells.len(),
            "agent blocked"
        );
        self.finish(Status::Blocked(reason))
    }

    /// Records the terminal status and freezes the result. Runs once.
    fn finish(&mut self, status: Status) -> RunResult {
        debug_assert!(self.result.is_none(), "run finished twice");
        let result = RunResult {
            cells_visited: self.visits.cells_visited(),
            total_cleanable_cells: self.grid.cleanable_count(),
            is_cleaning_complete: status != Status::Cancelled
                && self.visits.all_cleanable_visited(self.grid),
            moves: self.move_count - 1,
        };
        self.status = status;
        self.result = Some(result);
        self.pending.clear();
        tracing::info!(
            agent = %self.name,
            %status,
            cells_visited = result.cells_visited,
            total = result.total_cleanable_cells,
            moves = result.moves,
            "agent finished"
        );
        result
    }

    /// Stops a running agent immediately.
    ///
    /// The result reports incomplete coverage regardless of the visit map.
    /// A run that already finished keeps its original result.
    pub fn cancel(&mut self) -> RunResult {
        match self.result {
            Some(result) => result,
            None => self.finish(Status::Cancelled),
        }
    }

    /// Runs turns until the agent is terminal, sleeping `pace` between
    /// moves and checking `cancel` at every turn boundary.
    pub fn run(&mut self, cancel: &CancelToken, pace: Duration) -> RunResult {
        loop {
            if cancel.is_cancelled() {
                return self.cancel();
            }
            if let Turn::Finished(result) = self.step() {
                return result;
            }
            if !pace.is_zero() && cancel.sleep(pace) {
                return self.cancel();
            }
        }
    }
}
