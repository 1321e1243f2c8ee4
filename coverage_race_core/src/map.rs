use std::{
    fmt,
    ops::{Index, IndexMut},
    str::FromStr,
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Position;

/// Matrix code for an open cell in the external grid format.
pub const OPEN_CODE: i32 = 0;
/// Matrix code for an obstacle in the external grid format.
pub const BLOCKED_CODE: i32 = -1;

/// Orthogonal offsets in the fixed neighbor order: up, down, left, right.
///
/// Every strategy that iterates neighbors breaks ties by this order.
const DIRECTIONS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Represents errors that can occur while building a grid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("Grid has no cells")]
    Empty,
    #[error("Grid is not square: row {row} has {found} cells, expected {expected}")]
    NotSquare {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Start cell (0, 0) must be open")]
    StartBlocked,
    #[error("Unknown cell code '{code}' at ({row}, {col})")]
    UnknownCell { code: String, row: usize, col: usize },
    #[error("Coordinates ({row}, {col}) are out of bounds for grid size {size}")]
    OutOfBounds { row: usize, col: usize, size: usize },
    #[error("Obstacle chance {0} must lie in [0, 1)")]
    InvalidObstacleChance(f64),
}

/// A generic square grid.
///
/// Stores elements of type `T` in a flat vector using row-major order and
/// is addressed by [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grid<T> {
    size: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new `size` x `size` grid filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `size * size` overflows `usize`.
    pub fn new(size: usize) -> Self
    where
        T: Default + Clone,
    {
        let len = size.checked_mul(size).expect("Grid size overflow");
        Grid {
            size,
            cells: vec![T::default(); len],
        }
    }

    /// Creates a new grid whose cells are produced by `f` in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `size * size` overflows `usize`.
    pub fn from_fn<F>(size: usize, mut f: F) -> Self
    where
        F: FnMut(Position) -> T,
    {
        let len = size.checked_mul(size).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(len);
        for row in 0..size {
            for col in 0..size {
                cells.push(f(Position { row, col }));
            }
        }
        Grid { size, cells }
    }

    /// Returns the side length of the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn index_of(&self, pos: Position) -> Option<usize> {
        self.contains(pos).then(|| pos.row * self.size + pos.col)
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.row < self.size && pos.col < self.size
    }

    /// Gets an immutable reference to the cell at `pos`, or `None` when out of bounds.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.index_of(pos).map(|idx| &self.cells[idx])
    }

    /// Gets a mutable reference to the cell at `pos`, or `None` when out of bounds.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        self.index_of(pos).map(|idx| &mut self.cells[idx])
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let size = self.size;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            let pos = Position {
                row: index / size,
                col: index % size,
            };
            (pos, cell)
        })
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!("Grid index {} out of bounds for grid size {}", pos, self.size),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!("Grid index {} out of bounds for grid size {}", pos, self.size),
        }
    }
}

/// Represents the static state of a cell in the obstacle grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Open,
    Blocked,
}

/// The immutable obstacle grid every agent in a race traverses.
///
/// The start cell is always open; construction fails otherwise. Serde goes
/// through the text form, so deserialized grids are validated too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GridModel {
    cells: Grid<CellState>,
    cleanable: usize,
}

impl GridModel {
    fn from_cells(cells: Grid<CellState>) -> Result<Self, GridError> {
        if cells.size() == 0 {
            return Err(GridError::Empty);
        }
        if cells[Position::ORIGIN] == CellState::Blocked {
            return Err(GridError::StartBlocked);
        }
        let cleanable = cells.iter().filter(|c| **c == CellState::Open).count();
        Ok(GridModel { cells, cleanable })
    }

    /// Creates a fully open `size` x `size` grid.
    pub fn open(size: usize) -> Result<Self, GridError> {
        Self::from_cells(Grid::new(size))
    }

    /// Creates a grid with the given obstacle coordinates.
    pub fn from_blocked<I>(size: usize, blocked: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut cells: Grid<CellState> = Grid::new(size);
        for pos in blocked {
            let cell = cells.get_mut(pos).ok_or(GridError::OutOfBounds {
                row: pos.row,
                col: pos.col,
                size,
            })?;
            *cell = CellState::Blocked;
        }
        Self::from_cells(cells)
    }

    /// Creates a grid from the external matrix format (`0` open, `-1` blocked).
    pub fn from_matrix(rows: &[Vec<i32>]) -> Result<Self, GridError> {
        let size = rows.len();
        for (row, values) in rows.iter().enumerate() {
            if values.len() != size {
                return Err(GridError::NotSquare {
                    row,
                    expected: size,
                    found: values.len(),
                });
            }
        }

        let mut unknown = None;
        let cells = Grid::from_fn(size, |pos| match rows[pos.row][pos.col] {
            OPEN_CODE => CellState::Open,
            BLOCKED_CODE => CellState::Blocked,
            code => {
                unknown.get_or_insert(GridError::UnknownCell {
                    code: code.to_string(),
                    row: pos.row,
                    col: pos.col,
                });
                CellState::Blocked
            }
        });
        if let Some(err) = unknown {
            return Err(err);
        }
        Self::from_cells(cells)
    }

    /// Generates a grid where every cell except the start is independently
    /// blocked with probability `obstacle_chance`.
    pub fn generate<R>(size: usize, obstacle_chance: f64, rng: &mut R) -> Result<Self, GridError>
    where
        R: Rng,
    {
        if !(0.0..1.0).contains(&obstacle_chance) {
            return Err(GridError::InvalidObstacleChance(obstacle_chance));
        }
        let cells = Grid::from_fn(size, |pos| {
            if pos != Position::ORIGIN && rng.random_bool(obstacle_chance) {
                CellState::Blocked
            } else {
                CellState::Open
            }
        });
        let grid = Self::from_cells(cells)?;
        tracing::debug!(
            size,
            obstacle_chance,
            cleanable = grid.cleanable,
            "generated grid"
        );
        Ok(grid)
    }

    /// Returns the side length of the grid.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.size()
    }

    /// Number of open cells.
    #[inline]
    pub fn cleanable_count(&self) -> usize {
        self.cleanable
    }

    /// Returns the state of the cell at `pos`, or `None` when out of bounds.
    pub fn cell(&self, pos: Position) -> Option<CellState> {
        self.cells.get(pos).copied()
    }

    /// True if `pos` is in bounds and open.
    #[inline]
    pub fn is_open(&self, pos: Position) -> bool {
        self.cell(pos) == Some(CellState::Open)
    }

    /// In-bounds orthogonal neighbors of `pos` in the order up, down, left, right.
    ///
    /// Blocked neighbors are included; filter with [`GridModel::is_open`].
    pub fn neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        DIRECTIONS.iter().filter_map(move |&(dr, dc)| {
            let next = Position {
                row: pos.row.checked_add_signed(dr)?,
                col: pos.col.checked_add_signed(dc)?,
            };
            self.cells.contains(next).then_some(next)
        })
    }

    /// Open orthogonal neighbors of `pos`, in the fixed neighbor order.
    pub fn open_neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.neighbors(pos).filter(|n| self.is_open(*n))
    }

    /// Obstacle cells orthogonally adjacent to `pos`.
    pub fn blocked_neighbors(&self, pos: Position) -> Vec<Position> {
        self.neighbors(pos).filter(|n| !self.is_open(*n)).collect()
    }

    /// Iterates every open cell in row-major order.
    pub fn open_cells(&self) -> impl Iterator<Item = Position> + '_ {
        self.cells
            .enumerate()
            .filter(|(_, cell)| **cell == CellState::Open)
            .map(|(pos, _)| pos)
    }
}

/// Loads a grid from its text form: one row per line, `.` open and `#` blocked.
impl FromStr for GridModel {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lines: Vec<&str> = s
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let mut rows = Vec::with_capacity(lines.len());
        for (row, line) in lines.iter().enumerate() {
            let values = line
                .chars()
                .enumerate()
                .map(|(col, ch)| match ch {
                    '.' => Ok(OPEN_CODE),
                    '#' => Ok(BLOCKED_CODE),
                    other => Err(GridError::UnknownCell {
                        code: other.to_string(),
                        row,
                        col,
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }
        Self::from_matrix(&rows)
    }
}

impl TryFrom<String> for GridModel {
    type Error = GridError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<GridModel> for String {
    fn from(grid: GridModel) -> Self {
        grid.to_string()
    }
}

impl fmt::Display for GridModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.size() {
            for col in 0..self.size() {
                let ch = match self.cells[Position { row, col }] {
                    CellState::Open => '.',
                    CellState::Blocked => '#',
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn neighbors_follow_fixed_order_and_stay_in_bounds() {
        let grid = GridModel::open(3).unwrap();
        let center: Vec<_> = grid.neighbors(Position::new(1, 1)).collect();
        assert_eq!(
            center,
            vec![
                Position::new(0, 1),
                Position::new(2, 1),
                Position::new(1, 0),
                Position::new(1, 2),
            ]
        );

        let corner: Vec<_> = grid.neighbors(Position::ORIGIN).collect();
        assert_eq!(corner, vec![Position::new(1, 0), Position::new(0, 1)]);
    }

    #[test]
    fn cleanable_count_excludes_obstacles() {
        let grid = GridModel::from_blocked(3, [Position::new(1, 1), Position::new(2, 0)]).unwrap();
        assert_eq!(grid.cleanable_count(), 7);
        assert!(!grid.is_open(Position::new(1, 1)));
        assert!(!grid.is_open(Position::new(5, 5)));
        assert_eq!(grid.open_cells().count(), 7);
    }

    #[test]
    fn blocked_start_is_rejected() {
        assert_eq!(
            GridModel::from_blocked(2, [Position::ORIGIN]),
            Err(GridError::StartBlocked)
        );
        assert_eq!(
            GridModel::from_matrix(&[vec![-1, 0], vec![0, 0]]),
            Err(GridError::StartBlocked)
        );
    }

    #[test]
    fn malformed_matrices_are_rejected() {
        assert_eq!(GridModel::from_matrix(&[]), Err(GridError::Empty));
        assert_eq!(
            GridModel::from_matrix(&[vec![0, 0], vec![0]]),
            Err(GridError::NotSquare {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert!(matches!(
            GridModel::from_matrix(&[vec![0, 7], vec![0, 0]]),
            Err(GridError::UnknownCell { row: 0, col: 1, .. })
        ));
        assert!(matches!(
            GridModel::from_blocked(2, [Position::new(2, 0)]),
            Err(GridError::OutOfBounds { row: 2, col: 0, size: 2 })
        ));
    }

    #[test]
    fn text_form_parses_and_renders() {
        let text = "..#\n.#.\n...\n";
        let grid: GridModel = text.parse().unwrap();
        assert_eq!(grid.size(), 3);
        assert_eq!(grid.cleanable_count(), 7);
        assert_eq!(
            grid.blocked_neighbors(Position::new(0, 1)),
            vec![Position::new(1, 1), Position::new(0, 2)]
        );
        assert_eq!(grid.to_string(), text);

        assert!(matches!(
            "..\n.x".parse::<GridModel>(),
            Err(GridError::UnknownCell { row: 1, col: 1, .. })
        ));
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct Arena {
        grid: GridModel,
    }

    #[test]
    fn deserialized_grids_are_validated() {
        let arena: Arena = toml::from_str("grid = \"..#\\n...\\n#..\"").unwrap();
        assert_eq!(arena.grid.size(), 3);
        assert_eq!(arena.grid.cleanable_count(), 7);

        let round_trip: Arena = toml::from_str(&toml::to_string(&arena).unwrap()).unwrap();
        assert_eq!(round_trip.grid, arena.grid);

        assert!(toml::from_str::<Arena>("grid = \"#.\\n..\"").is_err());
        assert!(toml::from_str::<Arena>("grid = \"..\\n.\"").is_err());
        assert!(toml::from_str::<Arena>("grid = \"\"").is_err());
    }

    #[test]
    fn generation_keeps_start_open_and_is_seeded() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let first = GridModel::generate(12, 0.3, &mut a).unwrap();
        let second = GridModel::generate(12, 0.3, &mut b).unwrap();
        assert_eq!(first, second);
        assert!(first.is_open(Position::ORIGIN));

        let empty = GridModel::generate(5, 0.0, &mut a).unwrap();
        assert_eq!(empty.cleanable_count(), 25);

        assert_eq!(
            GridModel::generate(5, 1.0, &mut a),
            Err(GridError::InvalidObstacleChance(1.0))
        );
    }
}
