//! 带符号关联矩阵 `C ∈ {-1, 0, 1}^{|P|×|T|}` 及其工作流网结构校验.
//!
//! 第 `i` 行对应库所 `p_i`, 第 `j` 列对应迁移 `t_j`:
//! `C[i, j] = -1` 表示 `p_i ∈ •t_j`, `C[i, j] = 1` 表示 `p_i ∈ t_j•`.
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};

pub type Cell = i8;

type SmallRow = SmallVec<[Cell; 8]>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("cell ({row}, {col}) holds {value}, expected -1, 0 or 1")]
    OutOfRange { row: usize, col: usize, value: i64 },
    #[error("a chain of {transitions} transitions needs {} places, got {places}", transitions + 1)]
    ChainShape { places: usize, transitions: usize },
}

/// 违反的工作流网结构不变量.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("matrix has no places or no transitions")]
    Empty,
    #[error("place {0} has no arcs")]
    IsolatedPlace(PlaceId),
    #[error("transition {0} has no arcs")]
    IsolatedTransition(TransitionId),
    #[error("expected exactly one source place, found {0}")]
    SourceCount(usize),
    #[error("expected exactly one sink place, found {0}")]
    SinkCount(usize),
    #[error("transition {0} has no input place")]
    NoInput(TransitionId),
    #[error("transition {0} has no output place")]
    NoOutput(TransitionId),
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidenceMatrix {
    rows: Vec<SmallRow>,
    cols: usize,
}

impl IncidenceMatrix {
    pub fn new(places: usize, transitions: usize) -> Self {
        Self {
            rows: (0..places)
                .map(|_| SmallRow::from_elem(0, transitions))
                .collect(),
            cols: transitions,
        }
    }

    pub fn from_rows<R>(rows: &[R]) -> Result<Self, MatrixError>
    where
        R: AsRef<[i32]>,
    {
        let cols = rows.first().map(|row| row.as_ref().len()).unwrap_or_default();
        let mut matrix = Self::new(0, cols);
        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(MatrixError::Ragged {
                    row: row_idx,
                    found: row.len(),
                    expected: cols,
                });
            }
            let mut cells = SmallRow::with_capacity(cols);
            for (col_idx, value) in row.iter().enumerate() {
                cells.push(to_cell(*value as i64).ok_or(MatrixError::OutOfRange {
                    row: row_idx,
                    col: col_idx,
                    value: *value as i64,
                })?);
            }
            matrix.rows.push(cells);
        }
        Ok(matrix)
    }

    /// 最小的可靠自由选择工作流网: `p2` 经 `t1` 或 `t2` 分支, 最终汇合到 `p0`.
    pub fn seed() -> Self {
        Self {
            rows: vec![
                SmallRow::from_slice(&[1, 0, 1]),
                SmallRow::from_slice(&[-1, 1, 0]),
                SmallRow::from_slice(&[0, -1, -1]),
            ],
            cols: 3,
        }
    }

    /// 线性工作流 `p0 -t0-> p1 -t1-> ... -> p_n`.
    pub fn chain(places: usize, transitions: usize) -> Result<Self, MatrixError> {
        if transitions == 0 || places != transitions + 1 {
            return Err(MatrixError::ChainShape {
                places,
                transitions,
            });
        }
        let mut matrix = Self::new(places, transitions);
        for t in 0..transitions {
            matrix.rows[t][t] = -1;
            matrix.rows[t + 1][t] = 1;
        }
        Ok(matrix)
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn cell(&self, row: usize, col: usize) -> Cell {
        self.rows[row][col]
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: Cell) {
        debug_assert!((-1..=1).contains(&value));
        self.rows[row][col] = value;
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> Cell {
        self.cell(place.index(), transition.index())
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        &self.rows[row]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|row| row.as_slice())
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = Cell> + '_ {
        self.rows.iter().map(move |row| row[col])
    }

    pub fn column_vec(&self, col: usize) -> Vec<Cell> {
        self.column(col).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = Vec<Cell>> + '_ {
        (0..self.cols).map(|col| self.column_vec(col))
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.rows.iter().map(|row| row.to_vec()).collect()
    }

    pub fn push_place(&mut self, row: &[Cell]) -> PlaceId {
        debug_assert!(
            row.len() == self.cols,
            "row length {} does not match incidence column count {}",
            row.len(),
            self.cols
        );
        self.rows.push(SmallRow::from_slice(row));
        PlaceId::from_index(self.rows.len() - 1)
    }

    pub fn push_transition(&mut self, column: &[Cell]) -> TransitionId {
        debug_assert!(
            column.len() == self.rows.len(),
            "column length {} does not match incidence row count {}",
            column.len(),
            self.rows.len()
        );
        for (row, value) in self.rows.iter_mut().zip(column.iter()) {
            row.push(*value);
        }
        self.cols += 1;
        TransitionId::from_index(self.cols - 1)
    }

    /// 第一个不被任何迁移产出(无 `+1`)的库所.
    pub fn source_index(&self) -> Option<PlaceId> {
        self.rows
            .iter()
            .position(|row| is_source_row(row))
            .map(PlaceId::from_index)
    }

    /// 第一个不被任何迁移消耗(无 `-1`)的库所.
    pub fn sink_index(&self) -> Option<PlaceId> {
        self.rows
            .iter()
            .position(|row| is_sink_row(row))
            .map(PlaceId::from_index)
    }

    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }

    pub fn violations(&self) -> Vec<Violation> {
        if self.rows.is_empty() || self.cols == 0 {
            return vec![Violation::Empty];
        }
        let mut violations = Vec::new();

        for (idx, row) in self.rows.iter().enumerate() {
            if row.iter().all(|cell| *cell == 0) {
                violations.push(Violation::IsolatedPlace(PlaceId::from_index(idx)));
            }
        }

        let sources = self.rows.iter().filter(|row| is_source_row(row)).count();
        if sources != 1 {
            violations.push(Violation::SourceCount(sources));
        }
        let sinks = self.rows.iter().filter(|row| is_sink_row(row)).count();
        if sinks != 1 {
            violations.push(Violation::SinkCount(sinks));
        }

        for col in 0..self.cols {
            let transition = TransitionId::from_index(col);
            let has_input = self.column(col).any(|cell| cell == -1);
            let has_output = self.column(col).any(|cell| cell == 1);
            if !has_input && !has_output {
                violations.push(Violation::IsolatedTransition(transition));
                continue;
            }
            if !has_input {
                violations.push(Violation::NoInput(transition));
            }
            if !has_output {
                violations.push(Violation::NoOutput(transition));
            }
        }

        violations
    }

    /// 与某个更靠前的行完全相同的行号.
    pub fn duplicate_rows(&self) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&row| self.rows[..row].iter().any(|earlier| *earlier == self.rows[row]))
            .collect()
    }

    /// 与某个更靠前的列完全相同的列号.
    pub fn duplicate_columns(&self) -> Vec<usize> {
        let columns = self.columns().collect::<Vec<_>>();
        (0..columns.len())
            .filter(|&col| columns[..col].contains(&columns[col]))
            .collect()
    }

    /// `•t`: 以 `-1` 连到迁移 `col` 的行号, 升序.
    pub fn input_places(&self, col: usize) -> Vec<usize> {
        self.column(col)
            .enumerate()
            .filter_map(|(row, cell)| (cell == -1).then_some(row))
            .collect()
    }
}

impl Default for IncidenceMatrix {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Debug for IncidenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidenceMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl fmt::Display for IncidenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, row) in self.rows.iter().enumerate() {
            write!(f, "{:>4} [", PlaceId::from_index(idx).name())?;
            for cell in row.iter() {
                write!(f, "{cell:>3}")?;
            }
            writeln!(f, " ]")?;
        }
        Ok(())
    }
}

pub(crate) fn to_cell(value: i64) -> Option<Cell> {
    (-1..=1).contains(&value).then_some(value as Cell)
}

fn is_source_row(row: &[Cell]) -> bool {
    row.iter().all(|cell| *cell <= 0)
}

fn is_sink_row(row: &[Cell]) -> bool {
    row.iter().all(|cell| *cell >= 0)
}
