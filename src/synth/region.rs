//! 折叠区域的查找: 在矩阵中找出值为 `v` 的单元格的传递闭包.
//!
//! 行 `r` 与列 `c` 同属一个区域, 当且仅当二者通过一串值为 `v` 的单元格相连,
//! 相邻单元格共享行或列.
use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::net::{Cell, IncidenceMatrix};

/// 存在重复行 (或列) 时, 决定从哪一个重复项起步.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    #[default]
    Random,
    LowestIndex,
}

impl TieBreak {
    fn pick<R: Rng + ?Sized>(self, duplicates: &[usize], rng: &mut R) -> Option<usize> {
        match self {
            TieBreak::Random => duplicates.choose(rng).copied(),
            TieBreak::LowestIndex => duplicates.first().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// 升序行号.
    pub rows: Vec<usize>,
    /// 升序列号.
    pub cols: Vec<usize>,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    /// 区域内值为 `value` 的单元格, 行优先.
    pub fn cells(&self, matrix: &IncidenceMatrix, value: Cell) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for &row in &self.rows {
            for &col in &self.cols {
                if matrix.cell(row, col) == value {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    /// 区域是否为一个满块, 即所有单元格都等于 `value`.
    pub fn is_block(&self, matrix: &IncidenceMatrix, value: Cell) -> bool {
        !self.is_empty()
            && self
                .rows
                .iter()
                .all(|&row| self.cols.iter().all(|&col| matrix.cell(row, col) == value))
    }
}

/// 行优先地列出所有值为 `value` 的单元格.
pub fn matching_cells(matrix: &IncidenceMatrix, value: Cell) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    for (row, cells_in_row) in matrix.rows().enumerate() {
        for (col, cell) in cells_in_row.iter().enumerate() {
            if *cell == value {
                cells.push((row, col));
            }
        }
    }
    cells
}

/// 找到 `value` 的一个连通区域; 没有匹配的单元格时返回空区域.
///
/// `value == -1` 时优先从重复列起步, `value == 1` 时优先从重复行起步.
pub fn find_region<R: Rng + ?Sized>(
    matrix: &IncidenceMatrix,
    value: Cell,
    tie_break: TieBreak,
    rng: &mut R,
) -> Region {
    let mut cells = matching_cells(matrix, value);
    if cells.is_empty() {
        return Region::default();
    }

    let by_column = value == -1;
    let duplicates = if by_column {
        matrix.duplicate_columns()
    } else {
        matrix.duplicate_rows()
    };
    if let Some(pick) = tie_break.pick(&duplicates, rng) {
        let restricted = cells
            .iter()
            .copied()
            .filter(|&(row, col)| if by_column { col == pick } else { row == pick })
            .collect::<Vec<_>>();
        if !restricted.is_empty() {
            cells = restricted;
        }
    }

    grow_region(matrix, value, cells[0])
}

/// 从 `seed` 单元格出发求闭包.
pub fn grow_region(matrix: &IncidenceMatrix, value: Cell, seed: (usize, usize)) -> Region {
    let mut rows = BTreeSet::from([seed.0]);
    let mut cols = BTreeSet::from([seed.1]);

    let mut changed = true;
    while changed {
        changed = false;
        for row in rows.iter().copied().collect::<Vec<_>>() {
            for col in 0..matrix.transitions() {
                if matrix.cell(row, col) == value && cols.insert(col) {
                    changed = true;
                }
            }
        }
        for col in cols.iter().copied().collect::<Vec<_>>() {
            for row in 0..matrix.places() {
                if matrix.cell(row, col) == value && rows.insert(row) {
                    changed = true;
                }
            }
        }
    }

    Region {
        rows: rows.into_iter().collect(),
        cols: cols.into_iter().collect(),
    }
}
