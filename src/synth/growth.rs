//! 线性相关的增长规则: ψP 追加库所行, ψT 追加迁移列.
//!
//! 新向量取现有行 (列) 的 `{-1, 0, 1}` 系数线性组合. 候选先经过廉价筛选
//! (取值范围、符号、源/汇约束、不为现有向量的相反数), 再追加到矩阵上做结构合法性、
//! 自由选择性与 oracle 判定. 随机阶段耗尽后, 按随机顺序把现有向量本身作为候选回退.
use rand::Rng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashSet;

use crate::net::incidence::to_cell;
use crate::net::{Cell, IncidenceMatrix};
use crate::synth::free_choice::{free_choice_after_column, free_choice_after_row};
use crate::synth::{SearchContext, SynthError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// ψP: 追加一行.
    Place,
    /// ψT: 追加一列.
    Transition,
}

impl Axis {
    fn label(self) -> &'static str {
        match self {
            Axis::Place => "place",
            Axis::Transition => "transition",
        }
    }

    pub fn vectors(self, matrix: &IncidenceMatrix) -> Vec<Vec<Cell>> {
        match self {
            Axis::Place => matrix.to_rows(),
            Axis::Transition => matrix.columns().collect(),
        }
    }

    fn append(self, matrix: &IncidenceMatrix, cells: &[Cell]) -> IncidenceMatrix {
        let mut next = matrix.clone();
        match self {
            Axis::Place => {
                next.push_place(cells);
            }
            Axis::Transition => {
                next.push_transition(cells);
            }
        }
        next
    }

    fn free_choice_after(self, matrix: &IncidenceMatrix) -> bool {
        match self {
            Axis::Place => free_choice_after_row(matrix),
            Axis::Transition => free_choice_after_column(matrix),
        }
    }
}

/// `Σ coefficients[k] · vectors[k]`, 逐元素计算.
pub fn combine(vectors: &[Vec<Cell>], coefficients: &[i32]) -> Vec<i32> {
    let width = vectors.first().map_or(0, Vec::len);
    let mut sum = vec![0i32; width];
    for (vector, coefficient) in vectors.iter().zip(coefficients) {
        for (acc, cell) in sum.iter_mut().zip(vector) {
            *acc += coefficient * i32::from(*cell);
        }
    }
    sum
}

/// 廉价筛选; 通过时返回收窄后的单元格.
///
/// `source` 与 `sink` 只对迁移列有意义: 新迁移不得向源库所产出, 也不得从汇库所消耗.
pub fn screen_candidate(
    axis: Axis,
    candidate: &[i32],
    existing: &[Vec<Cell>],
    source: usize,
    sink: usize,
) -> Option<Vec<Cell>> {
    let cells = candidate
        .iter()
        .map(|value| to_cell(i64::from(*value)))
        .collect::<Option<Vec<_>>>()?;
    if !cells.contains(&-1) || !cells.contains(&1) {
        return None;
    }
    if axis == Axis::Transition && (cells[source] == 1 || cells[sink] == -1) {
        return None;
    }
    let negates_existing = existing
        .iter()
        .any(|vector| vector.iter().zip(&cells).all(|(a, b)| *a == -*b));
    if negates_existing {
        return None;
    }
    Some(cells)
}

fn try_candidate(
    matrix: &IncidenceMatrix,
    axis: Axis,
    cells: &[Cell],
    ctx: &mut SearchContext<'_>,
) -> Result<Option<IncidenceMatrix>, SynthError> {
    let extended = axis.append(matrix, cells);
    if !axis.free_choice_after(&extended) {
        ctx.stats.rejected_structure += 1;
        return Ok(None);
    }
    Ok(ctx.accept(&extended)?.then_some(extended))
}

pub fn grow(
    matrix: &IncidenceMatrix,
    axis: Axis,
    ctx: &mut SearchContext<'_>,
) -> Result<IncidenceMatrix, SynthError> {
    let (Some(source), Some(sink)) = (matrix.source_index(), matrix.sink_index()) else {
        return Err(SynthError::Precondition(
            "matrix has no source or no sink place".into(),
        ));
    };
    let (source, sink) = (source.index(), sink.index());
    let vectors = axis.vectors(matrix);

    if !ctx.options.deterministic_only {
        let mut tried: FxHashSet<Vec<Cell>> = FxHashSet::default();
        for _ in 0..ctx.options.max_attempts {
            ctx.checkpoint()?;
            ctx.stats.attempts += 1;
            let coefficients = (0..vectors.len())
                .map(|_| ctx.rng.random_range(-1..=1))
                .collect::<Vec<i32>>();
            let candidate = combine(&vectors, &coefficients);
            let Some(cells) = screen_candidate(axis, &candidate, &vectors, source, sink) else {
                ctx.stats.rejected_cheap += 1;
                continue;
            };
            if !tried.insert(cells.clone()) {
                ctx.stats.rejected_cheap += 1;
                continue;
            }
            if let Some(accepted) = try_candidate(matrix, axis, &cells, ctx)? {
                log::debug!(
                    "new {} found after {} attempts",
                    axis.label(),
                    ctx.stats.attempts
                );
                return Ok(accepted);
            }
        }
        log::warn!(
            "random {} search exhausted {} attempts, reusing existing vectors",
            axis.label(),
            ctx.options.max_attempts
        );
    }

    let mut order = (0..vectors.len()).collect::<Vec<_>>();
    let mut pass = 0;
    while ctx.options.fallback_passes.is_none_or(|passes| pass < passes) {
        pass += 1;
        order.shuffle(&mut *ctx.rng);
        let mut screened = 0usize;
        for &index in &order {
            ctx.checkpoint()?;
            ctx.stats.fallback_candidates += 1;
            let candidate = vectors[index]
                .iter()
                .map(|cell| i32::from(*cell))
                .collect::<Vec<_>>();
            let Some(cells) = screen_candidate(axis, &candidate, &vectors, source, sink) else {
                continue;
            };
            screened += 1;
            if let Some(accepted) = try_candidate(matrix, axis, &cells, ctx)? {
                return Ok(accepted);
            }
        }
        if screened == 0 {
            break;
        }
    }

    Err(SynthError::RuleNotApplicable(format!(
        "no {} extension passed validity, free-choice and soundness checks",
        axis.label()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StateSpaceOracle;
    use crate::synth::free_choice::is_free_choice;
    use crate::synth::testing::{accept_all, reject_all, rng};
    use crate::synth::{CancelToken, SearchOptions};

    #[test]
    fn combination_is_elementwise() {
        let vectors = vec![vec![1, 0, -1], vec![0, 1, 1]];
        assert_eq!(combine(&vectors, &[1, 1]), vec![1, 1, 0]);
        assert_eq!(combine(&vectors, &[-1, 1]), vec![-1, 1, 2]);
        assert_eq!(combine(&vectors, &[0, 0]), vec![0, 0, 0]);
    }

    #[test]
    fn screening_rules() {
        let seed = IncidenceMatrix::seed();
        let columns = Axis::Transition.vectors(&seed);
        // 源库所为 p2, 汇库所为 p0.
        assert_eq!(
            screen_candidate(Axis::Transition, &[1, 0, -1], &columns, 2, 0),
            Some(vec![1, 0, -1])
        );
        // 超出范围
        assert_eq!(screen_candidate(Axis::Transition, &[2, 0, -1], &columns, 2, 0), None);
        // 全零或单一符号
        assert_eq!(screen_candidate(Axis::Transition, &[0, 0, 0], &columns, 2, 0), None);
        assert_eq!(screen_candidate(Axis::Transition, &[1, 1, 0], &columns, 2, 0), None);
        // 向源库所产出
        assert_eq!(screen_candidate(Axis::Transition, &[-1, 0, 1], &columns, 2, 0), None);
        // 从汇库所消耗
        assert_eq!(screen_candidate(Axis::Transition, &[-1, 1, 0], &columns, 2, 0), None);
        // 行不受源/汇约束, 但不能是现有行的相反数
        let rows = Axis::Place.vectors(&seed);
        assert_eq!(
            screen_candidate(Axis::Place, &[1, -1, 0], &rows, 2, 0),
            None,
            "negation of p1"
        );
        assert_eq!(
            screen_candidate(Axis::Place, &[1, -1, 1], &rows, 2, 0),
            Some(vec![1, -1, 1])
        );
    }

    #[test]
    fn screening_rejects_negated_columns() {
        // p0 -> t0 -> p1 -> t1 -> p2 -> t2 -> p3, 源库所 p0, 汇库所 p3.
        let columns = vec![vec![-1, 1, 0, 0], vec![0, -1, 1, 0], vec![0, 0, -1, 1]];
        assert_eq!(
            screen_candidate(Axis::Transition, &[0, 1, -1, 0], &columns, 0, 3),
            None,
            "negation of t1"
        );
        assert_eq!(
            screen_candidate(Axis::Transition, &[-1, 0, 1, 0], &columns, 0, 3),
            Some(vec![-1, 0, 1, 0])
        );
        assert_eq!(
            screen_candidate(Axis::Transition, &[0, -1, 0, 1], &columns, 0, 3),
            Some(vec![0, -1, 0, 1])
        );
    }

    #[test]
    fn growth_keeps_nets_sound_and_free_choice() {
        let oracle = StateSpaceOracle::default();
        let options = SearchOptions::default();
        let cancel = CancelToken::new();
        for seed in 0..6 {
            let mut rng = rng(seed);
            let mut ctx = SearchContext::new(&options, &oracle, &mut rng, &cancel);
            let matrix = IncidenceMatrix::seed();
            let wider = grow(&matrix, Axis::Transition, &mut ctx).unwrap();
            assert_eq!(wider.transitions(), 4);
            assert!(wider.is_valid());
            assert!(is_free_choice(&wider));
            let taller = grow(&wider, Axis::Place, &mut ctx).unwrap();
            assert_eq!(taller.places(), 4);
            assert!(taller.is_valid());
            assert!(is_free_choice(&taller));
        }
    }

    #[test]
    fn rejecting_oracle_is_bounded() {
        let options = SearchOptions {
            max_attempts: 0,
            ..SearchOptions::default()
        };
        let cancel = CancelToken::new();
        let mut rng = rng(9);
        let mut ctx = SearchContext::new(&options, &reject_all, &mut rng, &cancel);
        let seed = IncidenceMatrix::seed();
        assert!(matches!(
            grow(&seed, Axis::Transition, &mut ctx),
            Err(SynthError::RuleNotApplicable(_))
        ));
        assert_eq!(ctx.stats.attempts, 0);
        assert_eq!(ctx.stats.fallback_candidates, seed.transitions());
        assert!(ctx.stats.oracle_calls <= seed.transitions());
    }

    #[test]
    fn deterministic_mode_reuses_existing_vectors() {
        let options = SearchOptions {
            deterministic_only: true,
            ..SearchOptions::default()
        };
        let cancel = CancelToken::new();
        let mut rng = rng(2);
        let mut ctx = SearchContext::new(&options, &accept_all, &mut rng, &cancel);
        let seed = IncidenceMatrix::seed();
        let next = grow(&seed, Axis::Transition, &mut ctx).unwrap();
        assert_eq!(ctx.stats.attempts, 0);
        let added = next.column_vec(3);
        assert!(seed.columns().any(|column| column == added));
    }

    #[test]
    fn cancellation_interrupts_the_search() {
        let options = SearchOptions {
            fallback_passes: None,
            ..SearchOptions::default()
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut rng = rng(2);
        let mut ctx = SearchContext::new(&options, &reject_all, &mut rng, &cancel);
        assert!(matches!(
            grow(&IncidenceMatrix::seed(), Axis::Place, &mut ctx),
            Err(SynthError::Cancelled)
        ));
    }
}
