use std::{
    collections::HashSet,
    fmt,
    thread::{self, ScopedJoinHandle},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentRun, RunError, RunResult, Status},
    cancel::CancelToken,
    config::RaceConfig,
    map::GridModel,
    strategy::StrategyKind,
};

/// A validated racer: name, strategy and move budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub name: String,
    pub strategy: StrategyKind,
    pub max_moves: u32,
}

impl Entrant {
    pub fn new(name: impl Into<String>, strategy: StrategyKind, max_moves: u32) -> Self {
        Entrant {
            name: name.into(),
            strategy,
            max_moves,
        }
    }
}

/// N agents over one shared grid.
///
/// Each agent traverses its own logical copy: runs share the grid by
/// reference and own everything they mutate.
#[derive(Debug, Clone)]
pub struct Race {
    grid: GridModel,
    entrants: Vec<Entrant>,
}

impl Race {
    /// Validates every entrant before any turn can execute.
    pub fn new(grid: GridModel, entrants: Vec<Entrant>) -> Result<Self, RunError> {
        if entrants.is_empty() {
            return Err(RunError::NoAgents);
        }
        let mut names = HashSet::new();
        for entrant in &entrants {
            if entrant.max_moves == 0 {
                return Err(RunError::ZeroMaxMoves {
                    agent: entrant.name.clone(),
                });
            }
            if !names.insert(entrant.name.as_str()) {
                return Err(RunError::DuplicateAgent(entrant.name.clone()));
            }
        }
        Ok(Race { grid, entrants })
    }

    /// Builds a race over `grid` from the agents listed in `config`.
    pub fn from_config(grid: GridModel, config: &RaceConfig) -> Result<Self, RunError> {
        config.validate()?;
        let entrants = config
            .agents
            .iter()
            .map(|agent| Entrant::new(&agent.name, agent.strategy, config.max_moves_for(agent)))
            .collect();
        Self::new(grid, entrants)
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn entrants(&self) -> &[Entrant] {
        &self.entrants
    }

    /// Fresh runs for every entrant, for callers that tick turns themselves.
    pub fn start(&self) -> Vec<AgentRun<'_>> {
        self.entrants
            .iter()
            .map(|e| AgentRun::fresh(&self.grid, e.name.clone(), e.strategy, e.max_moves))
            .collect()
    }

    /// Runs every agent on its own thread and waits for all of them.
    ///
    /// `pace` is slept between each agent's moves; `cancel` stops every
    /// agent at its next turn boundary.
    pub fn run(&self, cancel: &CancelToken, pace: Duration) -> Result<RaceReport, RunError> {
        tracing::info!(
            agents = self.entrants.len(),
            size = self.grid.size(),
            cleanable = self.grid.cleanable_count(),
            "race started"
        );

        let entries = thread::scope(|scope| {
            let handles: Vec<_> = self
                .start()
                .into_iter()
                .map(|mut run| {
                    let name = run.name().to_owned();
                    let handle = scope.spawn(move || {
                        let result = run.run(cancel, pace);
                        RaceEntry::new(&run, result)
                    });
                    (name, handle)
                })
                .collect();

            join_all(handles)
        })?;

        let report = RaceReport::new(entries);
        tracing::info!(outcome = %report.outcome, "race finished");
        Ok(report)
    }
}

/// Joins every named handle, then reports the first agent that panicked.
///
/// All handles must be joined: an unjoined panicked thread makes the
/// enclosing scope panic instead of returning.
fn join_all<T>(handles: Vec<(String, ScopedJoinHandle<'_, T>)>) -> Result<Vec<T>, RunError> {
    let joined: Vec<_> = handles
        .into_iter()
        .map(|(name, handle)| handle.join().map_err(|_| RunError::AgentPanicked(name)))
        .collect();
    joined.into_iter().collect()
}

/// One agent's final standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceEntry {
    pub name: String,
    pub strategy: StrategyKind,
    pub status: Status,
    pub result: RunResult,
}

impl RaceEntry {
    fn new(run: &AgentRun<'_>, result: RunResult) -> Self {
        RaceEntry {
            name: run.name().to_owned(),
            strategy: run.strategy(),
            status: run.status(),
            result,
        }
    }

    /// The entry for a finished run, or `None` while it is still running.
    pub fn from_run(run: &AgentRun<'_>) -> Option<Self> {
        run.result().map(|result| Self::new(run, result))
    }
}

/// Who won, decided only once every agent has reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceOutcome {
    Winner { name: String, moves: u32 },
    Tie { names: Vec<String>, moves: u32 },
    /// Nobody covered the grid; lists the agents that moved at all.
    NoWinner { unfinished: Vec<String> },
    NoMoves,
}

impl RaceOutcome {
    /// Among agents with complete coverage, the fewest moves wins; equal
    /// move counts tie.
    pub fn decide(entries: &[RaceEntry]) -> Self {
        let complete = entries.iter().filter(|e| e.result.is_cleaning_complete);
        if let Some(best) = complete.clone().map(|e| e.result.moves).min() {
            let mut names: Vec<String> = complete
                .filter(|e| e.result.moves == best)
                .map(|e| e.name.clone())
                .collect();
            return if names.len() == 1 {
                RaceOutcome::Winner {
                    name: names.remove(0),
                    moves: best,
                }
            } else {
                RaceOutcome::Tie { names, moves: best }
            };
        }

        let unfinished: Vec<String> = entries
            .iter()
            .filter(|e| e.result.moves > 0)
            .map(|e| e.name.clone())
            .collect();
        if unfinished.is_empty() {
            RaceOutcome::NoMoves
        } else {
            RaceOutcome::NoWinner { unfinished }
        }
    }
}

/// Joins names as "A", "A and B", "A, B and C".
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

impl fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceOutcome::Winner { name, moves } => write!(f, "{name} wins with {moves} moves!"),
            RaceOutcome::Tie { names, moves } => write!(
                f,
                "It's a tie between {} with {moves} moves each!",
                join_names(names)
            ),
            RaceOutcome::NoWinner { unfinished } => write!(
                f,
                "No winner - {} did not visit all cells!",
                join_names(unfinished)
            ),
            RaceOutcome::NoMoves => f.write_str("No winner - no agents made any moves!"),
        }
    }
}

/// Every agent's entry plus the decided outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceReport {
    pub entries: Vec<RaceEntry>,
    pub outcome: RaceOutcome,
}

impl RaceReport {
    pub fn new(entries: Vec<RaceEntry>) -> Self {
        let outcome = RaceOutcome::decide(&entries);
        RaceReport { entries, outcome }
    }

    /// Builds a report from tick-driven runs once all of them are terminal.
    pub fn from_runs(runs: &[AgentRun<'_>]) -> Option<Self> {
        runs.iter()
            .map(RaceEntry::from_run)
            .collect::<Option<Vec<_>>>()
            .map(Self::new)
    }
}
