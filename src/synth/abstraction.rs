//! 抽象规则 ψA 与对偶抽象规则 ψD.
//!
//! ψA 作用于一个全为 `+1` 的块 `R × C`: 清零该块, 新增库所 `p'` (在 `C` 处为 `+1`)
//! 与迁移 `t'` (在 `R` 处为 `+1`, 在 `p'` 处为 `-1`). 即把 `C → R` 的直连弧改为
//! `C → p' → t' → R`.
//!
//! ψD 作用于一个全为 `-1` 的块: 清零该块, 新增迁移 `t'` (在 `R` 处为 `-1`)
//! 与库所 `p'` (在 `C` 处为 `-1`, 在 `t'` 处为 `+1`), 即 `R → t' → p' → C`.
use itertools::Itertools;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use rustc_hash::FxHashSet;

use crate::net::{Cell, IncidenceMatrix, NodeRef};
use crate::synth::free_choice::is_free_choice;
use crate::synth::region::{Region, find_region, grow_region, matching_cells};
use crate::synth::{SearchContext, Selection, SynthError};

/// 对 `R × C` 应用 ψA.
pub fn abstraction(
    matrix: &IncidenceMatrix,
    rows: &[usize],
    cols: &[usize],
) -> Result<IncidenceMatrix, SynthError> {
    check_block(matrix, rows, cols, 1)?;
    let mut next = zero_block(matrix, rows, cols);

    let place_row = (0..next.transitions())
        .map(|col| Cell::from(cols.contains(&col)))
        .collect::<Vec<_>>();
    let place = next.push_place(&place_row);

    let mut column = (0..next.places())
        .map(|row| Cell::from(rows.contains(&row)))
        .collect::<Vec<_>>();
    column[place.index()] = -1;
    next.push_transition(&column);
    Ok(next)
}

/// 对 `R × C` 应用 ψD.
pub fn dual_abstraction(
    matrix: &IncidenceMatrix,
    rows: &[usize],
    cols: &[usize],
) -> Result<IncidenceMatrix, SynthError> {
    check_block(matrix, rows, cols, -1)?;
    let mut next = zero_block(matrix, rows, cols);

    let column = (0..next.places())
        .map(|row| -Cell::from(rows.contains(&row)))
        .collect::<Vec<_>>();
    let transition = next.push_transition(&column);

    let mut place_row = (0..next.transitions())
        .map(|col| -Cell::from(cols.contains(&col)))
        .collect::<Vec<_>>();
    place_row[transition.index()] = 1;
    next.push_place(&place_row);
    Ok(next)
}

fn zero_block(matrix: &IncidenceMatrix, rows: &[usize], cols: &[usize]) -> IncidenceMatrix {
    let mut next = matrix.clone();
    for &row in rows {
        for &col in cols {
            next.set_cell(row, col, 0);
        }
    }
    next
}

fn check_block(
    matrix: &IncidenceMatrix,
    rows: &[usize],
    cols: &[usize],
    value: Cell,
) -> Result<(), SynthError> {
    if rows.is_empty() || cols.is_empty() {
        return Err(SynthError::Precondition(
            "selection must name at least one place and one transition".into(),
        ));
    }
    if let Some(row) = rows.iter().find(|&&row| row >= matrix.places()) {
        return Err(SynthError::Precondition(format!(
            "p{row} is out of range, the net has {} places",
            matrix.places()
        )));
    }
    if let Some(col) = cols.iter().find(|&&col| col >= matrix.transitions()) {
        return Err(SynthError::Precondition(format!(
            "t{col} is out of range, the net has {} transitions",
            matrix.transitions()
        )));
    }
    if !rows.iter().all_unique() || !cols.iter().all_unique() {
        return Err(SynthError::Precondition(
            "selection names the same node twice".into(),
        ));
    }
    for &row in rows {
        for &col in cols {
            let found = matrix.cell(row, col);
            if found != value {
                return Err(SynthError::Precondition(format!(
                    "cell (p{row}, t{col}) is {found}, expected {value}"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    Abstraction,
    Dual,
}

impl Fold {
    pub fn value(self) -> Cell {
        match self {
            Fold::Abstraction => 1,
            Fold::Dual => -1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Fold::Abstraction => "psiA",
            Fold::Dual => "psiD",
        }
    }

    fn rewrite(
        self,
        matrix: &IncidenceMatrix,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<IncidenceMatrix, SynthError> {
        match self {
            Fold::Abstraction => abstraction(matrix, rows, cols),
            Fold::Dual => dual_abstraction(matrix, rows, cols),
        }
    }

    /// ψA 以迁移为锚 (取其列上的 `+1`), ψD 以库所为锚 (取其行上的 `-1`).
    fn anchored_region(
        self,
        matrix: &IncidenceMatrix,
        anchor: &NodeRef,
    ) -> Result<Region, SynthError> {
        let value = self.value();
        let seed = match (self, anchor) {
            (Fold::Abstraction, NodeRef::Transition(transition)) => {
                let col = transition.index();
                if col >= matrix.transitions() {
                    return Err(SynthError::Precondition(format!(
                        "{transition} is not a transition of the current net"
                    )));
                }
                (0..matrix.places())
                    .find(|&row| matrix.cell(row, col) == value)
                    .map(|row| (row, col))
            }
            (Fold::Dual, NodeRef::Place(place)) => {
                let row = place.index();
                if row >= matrix.places() {
                    return Err(SynthError::Precondition(format!(
                        "{place} is not a place of the current net"
                    )));
                }
                matrix
                    .row(row)
                    .iter()
                    .position(|cell| *cell == value)
                    .map(|col| (row, col))
            }
            (Fold::Abstraction, NodeRef::Place(_)) | (Fold::Dual, NodeRef::Transition(_)) => {
                let expected = match self {
                    Fold::Abstraction => "transition",
                    Fold::Dual => "place",
                };
                return Err(SynthError::Precondition(format!(
                    "{} must be anchored at a {expected}, got {anchor}",
                    self.label()
                )));
            }
        };
        Ok(seed
            .map(|seed| grow_region(matrix, value, seed))
            .unwrap_or_default())
    }

    /// ψA 对行与列各取非空随机子集; ψD 只对一侧取子集.
    fn sample<R: Rng + ?Sized>(self, region: &Region, rng: &mut R) -> Region {
        match self {
            Fold::Abstraction => Region {
                rows: sample_nonempty(&region.rows, rng),
                cols: sample_nonempty(&region.cols, rng),
            },
            Fold::Dual => {
                let keep_rows = rng.random_bool(0.5);
                if keep_rows || region.cols.len() == 1 {
                    Region {
                        rows: region.rows.clone(),
                        cols: sample_nonempty(&region.cols, rng),
                    }
                } else {
                    Region {
                        rows: sample_nonempty(&region.rows, rng),
                        cols: region.cols.clone(),
                    }
                }
            }
        }
    }
}

fn sample_nonempty<R: Rng + ?Sized>(items: &[usize], rng: &mut R) -> Vec<usize> {
    if items.is_empty() {
        return Vec::new();
    }
    let amount = rng.random_range(1..=items.len());
    let mut picked = items
        .choose_multiple(rng, amount)
        .copied()
        .collect::<Vec<_>>();
    picked.sort_unstable();
    picked
}

fn preserves_free_choice(before: &IncidenceMatrix, after: &IncidenceMatrix) -> bool {
    !is_free_choice(before) || is_free_choice(after)
}

pub(crate) fn apply(
    matrix: &IncidenceMatrix,
    fold: Fold,
    anchor: Option<&NodeRef>,
    selection: Option<&Selection>,
    ctx: &mut SearchContext<'_>,
) -> Result<IncidenceMatrix, SynthError> {
    match (anchor, selection) {
        (Some(_), Some(_)) => Err(SynthError::Precondition(
            "an anchor and an explicit selection cannot be combined".into(),
        )),
        (None, Some(selection)) => apply_selection(matrix, fold, selection, ctx),
        (anchor, None) => generate(matrix, fold, anchor, ctx),
    }
}

fn apply_selection(
    matrix: &IncidenceMatrix,
    fold: Fold,
    selection: &Selection,
    ctx: &mut SearchContext<'_>,
) -> Result<IncidenceMatrix, SynthError> {
    ctx.checkpoint()?;
    let candidate = fold.rewrite(matrix, &selection.rows(), &selection.cols())?;
    if !preserves_free_choice(matrix, &candidate) {
        return Err(SynthError::RuleNotApplicable(format!(
            "{} on the selection breaks free choice",
            fold.label()
        )));
    }
    if !ctx.accept(&candidate)? {
        return Err(SynthError::RuleNotApplicable(format!(
            "{} on the selection is not a sound workflow net",
            fold.label()
        )));
    }
    Ok(candidate)
}

fn try_fold(
    matrix: &IncidenceMatrix,
    fold: Fold,
    region: &Region,
    ctx: &mut SearchContext<'_>,
) -> Result<Option<IncidenceMatrix>, SynthError> {
    if !region.is_block(matrix, fold.value()) {
        ctx.stats.rejected_cheap += 1;
        return Ok(None);
    }
    let candidate = fold.rewrite(matrix, &region.rows, &region.cols)?;
    if !preserves_free_choice(matrix, &candidate) {
        ctx.stats.rejected_structure += 1;
        return Ok(None);
    }
    Ok(ctx.accept(&candidate)?.then_some(candidate))
}

/// 随机阶段: 每次重新求区域并取随机子集; 回退阶段: 整个闭包, 再逐个尝试单元格.
fn generate(
    matrix: &IncidenceMatrix,
    fold: Fold,
    anchor: Option<&NodeRef>,
    ctx: &mut SearchContext<'_>,
) -> Result<IncidenceMatrix, SynthError> {
    let value = fold.value();
    let anchored = anchor
        .map(|anchor| fold.anchored_region(matrix, anchor))
        .transpose()?;
    let closure = match &anchored {
        Some(region) => region.clone(),
        None => find_region(matrix, value, ctx.options.tie_break, &mut *ctx.rng),
    };
    if closure.is_empty() {
        return Err(SynthError::RuleNotApplicable(format!(
            "no {value} cell to fold for {}",
            fold.label()
        )));
    }

    if !ctx.options.deterministic_only {
        let mut tried: FxHashSet<Region> = FxHashSet::default();
        for attempt in 0..ctx.options.max_attempts {
            ctx.checkpoint()?;
            ctx.stats.attempts += 1;
            let region = match &anchored {
                Some(region) => region.clone(),
                None if attempt == 0 => closure.clone(),
                None => find_region(matrix, value, ctx.options.tie_break, &mut *ctx.rng),
            };
            let region = if ctx.options.random_subset {
                fold.sample(&region, &mut *ctx.rng)
            } else {
                region
            };
            if !tried.insert(region.clone()) {
                ctx.stats.rejected_cheap += 1;
                continue;
            }
            if let Some(accepted) = try_fold(matrix, fold, &region, ctx)? {
                return Ok(accepted);
            }
        }
        log::debug!(
            "{} random phase exhausted after {} attempts",
            fold.label(),
            ctx.options.max_attempts
        );
    }

    let mut singles = match &anchored {
        Some(region) => region.cells(matrix, value),
        None => matching_cells(matrix, value),
    };
    let mut pass = 0;
    while ctx.options.fallback_passes.is_none_or(|passes| pass < passes) {
        pass += 1;
        singles.shuffle(&mut *ctx.rng);
        let cells = singles.iter().map(|&(row, col)| Region {
            rows: vec![row],
            cols: vec![col],
        });
        for region in std::iter::once(closure.clone()).chain(cells) {
            ctx.checkpoint()?;
            ctx.stats.fallback_candidates += 1;
            if let Some(accepted) = try_fold(matrix, fold, &region, ctx)? {
                return Ok(accepted);
            }
        }
    }

    Err(SynthError::RuleNotApplicable(format!(
        "no {} candidate passed validity, free-choice and soundness checks",
        fold.label()
    )))
}
