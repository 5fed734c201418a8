//! Petri 网合成规则: 抽象 (ψA)、对偶抽象 (ψD)、线性库所 (ψP) 与线性迁移 (ψT).
//!
//! 所有规则都是关联矩阵上的纯重写: 输入矩阵从不被修改, 成功时返回新矩阵.
//! 候选矩阵须依次通过结构合法性、自由选择性与可靠性判定 (oracle) 才会被接受;
//! 被拒绝的候选只计入 [`SearchStats`], 不作为错误上抛.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::{IncidenceMatrix, NodeRef, PlaceId, TransitionId, WorkflowNet};
use crate::oracle::{OracleError, SoundnessOracle, Verdict};

pub mod abstraction;
pub mod free_choice;
pub mod growth;
pub mod region;

pub use abstraction::{abstraction, dual_abstraction};
pub use free_choice::is_free_choice;
pub use growth::Axis;
pub use region::{Region, TieBreak, find_region, grow_region};

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("rule not applicable: {0}")]
    RuleNotApplicable(String),
    #[error("search cancelled by caller")]
    Cancelled,
    #[error("search exceeded its time budget of {0:?}")]
    TimedOut(Duration),
    #[error("internal consistency error: {0}")]
    Internal(#[from] OracleError),
}

/// 显式给出的折叠区域: 库所 (行) 与迁移 (列).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub places: Vec<PlaceId>,
    pub transitions: Vec<TransitionId>,
}

impl Selection {
    pub fn new(places: Vec<PlaceId>, transitions: Vec<TransitionId>) -> Self {
        Self {
            places,
            transitions,
        }
    }

    pub(crate) fn rows(&self) -> Vec<usize> {
        self.places.iter().map(|place| place.index()).collect()
    }

    pub(crate) fn cols(&self) -> Vec<usize> {
        self.transitions.iter().map(|t| t.index()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    Abstraction {
        anchor: Option<NodeRef>,
        selection: Option<Selection>,
    },
    DualAbstraction {
        anchor: Option<NodeRef>,
        selection: Option<Selection>,
    },
    LinearPlace,
    LinearTransition,
}

impl Rule {
    pub fn abstraction() -> Self {
        Rule::Abstraction {
            anchor: None,
            selection: None,
        }
    }

    pub fn dual_abstraction() -> Self {
        Rule::DualAbstraction {
            anchor: None,
            selection: None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rule::Abstraction { .. } => "psiA",
            Rule::DualAbstraction { .. } => "psiD",
            Rule::LinearPlace => "psiP",
            Rule::LinearTransition => "psiT",
        }
    }
}

/// 动作日志中的描述, 例如 `psiA(auto)`、`psiD(p2)`、`psiA(p0,p1|t2)`.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (anchor, selection) = match self {
            Rule::Abstraction { anchor, selection } | Rule::DualAbstraction { anchor, selection } => {
                (anchor.as_ref(), selection.as_ref())
            }
            Rule::LinearPlace | Rule::LinearTransition => (None, None),
        };
        match (anchor, selection) {
            (_, Some(selection)) => {
                let places = selection.places.iter().map(|p| p.name()).collect::<Vec<_>>();
                let transitions = selection
                    .transitions
                    .iter()
                    .map(|t| t.name())
                    .collect::<Vec<_>>();
                write!(
                    f,
                    "{}({}|{})",
                    self.label(),
                    places.join(","),
                    transitions.join(",")
                )
            }
            (Some(anchor), None) => write!(f, "{}({})", self.label(), anchor),
            (None, None) => write!(f, "{}(auto)", self.label()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRuleError {
    #[error("unknown rule `{0}` (expected psiA, psiD, psiP or psiT)")]
    UnknownRule(String),
    #[error("rule `{rule}` does not take an anchor")]
    UnexpectedAnchor { rule: String },
    #[error(transparent)]
    Anchor(#[from] crate::net::ids::ParseNodeRefError),
}

impl FromStr for Rule {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, anchor) = match s.trim().split_once(':') {
            Some((name, anchor)) => (name.trim(), Some(anchor.parse::<NodeRef>()?)),
            None => (s.trim(), None),
        };
        match name.to_ascii_lowercase().as_str() {
            "psia" | "abstraction" => Ok(Rule::Abstraction {
                anchor,
                selection: None,
            }),
            "psid" | "dual-abstraction" => Ok(Rule::DualAbstraction {
                anchor,
                selection: None,
            }),
            "psip" | "linear-place" if anchor.is_none() => Ok(Rule::LinearPlace),
            "psit" | "linear-transition" if anchor.is_none() => Ok(Rule::LinearTransition),
            "psip" | "linear-place" | "psit" | "linear-transition" => {
                Err(ParseRuleError::UnexpectedAnchor {
                    rule: name.to_string(),
                })
            }
            _ => Err(ParseRuleError::UnknownRule(name.to_string())),
        }
    }
}

/// 可由其他线程触发的取消标志.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// 随机候选的尝试次数.
    pub max_attempts: usize,
    /// 确定性回退的遍数; `None` 表示不设上限, 只能由取消或时间预算终止.
    pub fallback_passes: Option<usize>,
    /// 跳过随机阶段, 直接执行确定性回退.
    pub deterministic_only: bool,
    /// 抽象规则是否只折叠闭包的随机子集.
    pub random_subset: bool,
    pub tie_break: TieBreak,
    pub time_budget: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 9999,
            fallback_passes: Some(1),
            deterministic_only: false,
            random_subset: true,
            tie_break: TieBreak::Random,
            time_budget: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub attempts: usize,
    pub rejected_cheap: usize,
    pub rejected_structure: usize,
    pub oracle_calls: usize,
    pub oracle_timeouts: usize,
    pub fallback_candidates: usize,
}

impl SearchStats {
    /// 累加另一次搜索的计数, 用于批量生成.
    pub fn merge(&mut self, other: &SearchStats) {
        self.attempts += other.attempts;
        self.rejected_cheap += other.rejected_cheap;
        self.rejected_structure += other.rejected_structure;
        self.oracle_calls += other.oracle_calls;
        self.oracle_timeouts += other.oracle_timeouts;
        self.fallback_candidates += other.fallback_candidates;
    }
}

/// 一次规则应用期间共享的搜索状态.
pub struct SearchContext<'a> {
    pub options: &'a SearchOptions,
    pub oracle: &'a dyn SoundnessOracle,
    pub rng: &'a mut StdRng,
    pub cancel: &'a CancelToken,
    pub stats: SearchStats,
    started: Instant,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        options: &'a SearchOptions,
        oracle: &'a dyn SoundnessOracle,
        rng: &'a mut StdRng,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            options,
            oracle,
            rng,
            cancel,
            stats: SearchStats::default(),
            started: Instant::now(),
        }
    }

    /// 每个候选之前调用.
    pub fn checkpoint(&self) -> Result<(), SynthError> {
        if self.cancel.is_cancelled() {
            return Err(SynthError::Cancelled);
        }
        if let Some(budget) = self.options.time_budget {
            if self.started.elapsed() > budget {
                return Err(SynthError::TimedOut(budget));
            }
        }
        Ok(())
    }

    /// 结构合法性 + oracle. 自由选择性由各规则在调用前检查.
    pub fn accept(&mut self, candidate: &IncidenceMatrix) -> Result<bool, SynthError> {
        if !candidate.is_valid() {
            self.stats.rejected_structure += 1;
            log::trace!("candidate rejected: {:?}", candidate.violations());
            return Ok(false);
        }
        let net = WorkflowNet::from_matrix(candidate)
            .map_err(|err| OracleError::Fault(err.to_string()))?;
        self.stats.oracle_calls += 1;
        let verdict = self
            .oracle
            .check(&net, &net.initial_marking, &net.final_marking)?;
        if verdict == Verdict::Timeout {
            self.stats.oracle_timeouts += 1;
            log::debug!(
                "soundness oracle timed out on a {}x{} candidate",
                candidate.places(),
                candidate.transitions()
            );
        }
        Ok(verdict.accepts())
    }
}

/// 在 `matrix` 上应用 `rule`, 全有或全无.
pub fn apply_rule(
    matrix: &IncidenceMatrix,
    rule: &Rule,
    ctx: &mut SearchContext<'_>,
) -> Result<IncidenceMatrix, SynthError> {
    if !matrix.is_valid() {
        return Err(SynthError::Precondition(format!(
            "current matrix is not a valid workflow net: {:?}",
            matrix.violations()
        )));
    }
    match rule {
        Rule::Abstraction { anchor, selection } => abstraction::apply(
            matrix,
            abstraction::Fold::Abstraction,
            anchor.as_ref(),
            selection.as_ref(),
            ctx,
        ),
        Rule::DualAbstraction { anchor, selection } => abstraction::apply(
            matrix,
            abstraction::Fold::Dual,
            anchor.as_ref(),
            selection.as_ref(),
            ctx,
        ),
        Rule::LinearPlace => growth::grow(matrix, Axis::Place, ctx),
        Rule::LinearTransition => growth::grow(matrix, Axis::Transition, ctx),
    }
}
