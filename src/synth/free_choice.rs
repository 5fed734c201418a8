//! 自由选择性 (free-choice): 任意两个迁移的前集要么相同, 要么不相交.
use itertools::Itertools;

use crate::net::IncidenceMatrix;

fn compatible(a: &[usize], b: &[usize]) -> bool {
    a == b || a.iter().all(|place| !b.contains(place))
}

fn presets(matrix: &IncidenceMatrix) -> Vec<Vec<usize>> {
    (0..matrix.transitions())
        .map(|col| matrix.input_places(col))
        .collect()
}

pub fn is_free_choice(matrix: &IncidenceMatrix) -> bool {
    presets(matrix)
        .iter()
        .array_combinations()
        .all(|[a, b]| compatible(a, b))
}

/// 只检查最后一列与其余列.
pub fn free_choice_after_column(matrix: &IncidenceMatrix) -> bool {
    let Some(last) = matrix.transitions().checked_sub(1) else {
        return true;
    };
    let added = matrix.input_places(last);
    (0..last).all(|col| compatible(&added, &matrix.input_places(col)))
}

/// 只有消耗最后一行 (新库所) 的迁移前集会变化, 将它们与其余所有迁移比较.
pub fn free_choice_after_row(matrix: &IncidenceMatrix) -> bool {
    let Some(last) = matrix.places().checked_sub(1) else {
        return true;
    };
    let presets = presets(matrix);
    matrix
        .row(last)
        .iter()
        .positions(|cell| *cell == -1)
        .all(|consumer| {
            presets
                .iter()
                .enumerate()
                .all(|(col, preset)| col == consumer || compatible(&presets[consumer], preset))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_free_choice() {
        assert!(is_free_choice(&IncidenceMatrix::seed()));
        assert!(free_choice_after_column(&IncidenceMatrix::seed()));
        assert!(free_choice_after_row(&IncidenceMatrix::seed()));
    }

    #[test]
    fn overlapping_presets_break_free_choice() {
        // •t0 = {p0}, •t1 = {p0, p1}
        let matrix = IncidenceMatrix::from_rows(&[[-1, -1], [1, -1], [0, 1]]).unwrap();
        assert!(!is_free_choice(&matrix));
        assert!(!free_choice_after_column(&matrix));
        assert!(free_choice_after_row(&matrix));
    }

    #[test]
    fn shared_preset_is_free_choice() {
        let matrix = IncidenceMatrix::from_rows(&[[-1, -1], [1, 0], [0, 1]]).unwrap();
        assert!(is_free_choice(&matrix));
    }

    #[test]
    fn new_place_consumed_by_incompatible_transitions() {
        // 新库所 p2 同时被 t0 与 t1 消耗, 而 •t0 = {p0, p2}, •t1 = {p2}.
        let matrix = IncidenceMatrix::from_rows(&[[-1, 0], [1, 1], [-1, -1]]).unwrap();
        assert!(!free_choice_after_row(&matrix));
        assert!(!is_free_choice(&matrix));
    }

    #[test]
    fn new_place_enlarges_one_preset() {
        // 种子网追加 p3 = [1, -1, 0]: •t1 = {p2, p3}, 而 •t2 = {p2}.
        let mut matrix = IncidenceMatrix::seed();
        matrix.push_place(&[1, -1, 0]);
        assert!(!free_choice_after_row(&matrix));
        assert!(!is_free_choice(&matrix));

        let mut shared = IncidenceMatrix::seed();
        shared.push_place(&[0, -1, -1]);
        assert!(free_choice_after_row(&shared));
        assert!(is_free_choice(&shared));
    }
}
