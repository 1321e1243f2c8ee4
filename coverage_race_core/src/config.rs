//! Race configuration, loaded from TOML.
//!
//! Every field has a default, so a missing file or an empty table yields a
//! playable race with the four stock agents.

use std::{
    collections::HashSet,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::strategy::StrategyKind;

/// Accepted side lengths for race grids.
pub const GRID_SIZE_RANGE: RangeInclusive<usize> = 4..=20;

/// Accepted move budgets, race-wide and per agent.
pub const MAX_MOVES_RANGE: RangeInclusive<u32> = 10..=1000;

/// Accepted obstacle chances for generated grids.
pub const OBSTACLE_CHANCE_RANGE: RangeInclusive<f64> = 0.1..=0.3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// One racing agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub strategy: StrategyKind,
    /// Overrides the race-wide move budget for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_moves: Option<u32>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, strategy: StrategyKind) -> Self {
        AgentConfig {
            name: name.into(),
            strategy,
            max_moves: None,
        }
    }

    /// The four stock agents, one per strategy.
    pub fn stock() -> Vec<AgentConfig> {
        vec![
            AgentConfig::new("Red (Greedy)", StrategyKind::Greedy),
            AgentConfig::new("Green (BFS)", StrategyKind::Bfs),
            AgentConfig::new("Blue (A*)", StrategyKind::AStar),
            AgentConfig::new("Purple (DFS)", StrategyKind::DfsBacktrack),
        ]
    }
}

/// Settings for one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Side length of generated grids.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,

    /// Chance that any non-start cell of a generated grid is an obstacle.
    #[serde(default = "default_obstacle_chance")]
    pub obstacle_chance: f64,

    /// Move budget for every agent without its own override.
    #[serde(default = "default_max_moves")]
    pub max_moves: u32,

    /// Seed for grid generation; random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Delay between turns when pacing a live race, in milliseconds.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,

    #[serde(default = "AgentConfig::stock")]
    pub agents: Vec<AgentConfig>,
}

fn default_grid_size() -> usize {
    8
}

fn default_obstacle_chance() -> f64 {
    0.15
}

fn default_max_moves() -> u32 {
    200
}

fn default_pace_ms() -> u64 {
    250
}

impl Default for RaceConfig {
    fn default() -> Self {
        RaceConfig {
            grid_size: default_grid_size(),
            obstacle_chance: default_obstacle_chance(),
            max_moves: default_max_moves(),
            seed: None,
            pace_ms: default_pace_ms(),
            agents: AgentConfig::stock(),
        }
    }
}

impl RaceConfig {
    /// Loads and validates a config file, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !GRID_SIZE_RANGE.contains(&self.grid_size) {
            return Err(ConfigError::Validation(format!(
                "grid_size must be between {} and {}",
                GRID_SIZE_RANGE.start(),
                GRID_SIZE_RANGE.end()
            )));
        }
        if !OBSTACLE_CHANCE_RANGE.contains(&self.obstacle_chance) {
            return Err(ConfigError::Validation(format!(
                "obstacle_chance must be between {} and {}",
                OBSTACLE_CHANCE_RANGE.start(),
                OBSTACLE_CHANCE_RANGE.end()
            )));
        }
        if !MAX_MOVES_RANGE.contains(&self.max_moves) {
            return Err(ConfigError::Validation(format!(
                "max_moves must be between {} and {}",
                MAX_MOVES_RANGE.start(),
                MAX_MOVES_RANGE.end()
            )));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Validation("at least one agent is required".into()));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "agent name '{}' is used more than once",
                    agent.name
                )));
            }
            if agent.max_moves.is_some_and(|moves| !MAX_MOVES_RANGE.contains(&moves)) {
                return Err(ConfigError::Validation(format!(
                    "agent '{}' max_moves must be between {} and {}",
                    agent.name,
                    MAX_MOVES_RANGE.start(),
                    MAX_MOVES_RANGE.end()
                )));
            }
        }
        Ok(())
    }

    /// Delay between turns, in both live and headless races.
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    /// The move budget `agent` races with.
    pub fn max_moves_for(&self, agent: &AgentConfig) -> u32 {
        agent.max_moves.unwrap_or(self.max_moves)
    }
}
