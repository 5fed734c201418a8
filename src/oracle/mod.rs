//! 可靠性判定 (soundness oracle) 的注入接口.
//!
//! 引擎只依赖 [`SoundnessOracle`]: 对固定的网与标识, 判定必须是确定的.
//! `Unsound` 与 `Timeout` 都只是拒绝当前候选; `OracleError` 表示传入的网本身违反了
//! 引擎应当保证的不变量, 会作为内部一致性错误向上传播.
pub mod state_space;

use thiserror::Error;

use crate::net::{Marking, WorkflowNet};

pub use state_space::StateSpaceOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Sound,
    Unsound,
    /// 判定在预算内未完成, 按拒绝处理.
    Timeout,
}

impl Verdict {
    pub fn accepts(self) -> bool {
        matches!(self, Verdict::Sound)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("marking covers {found} places, net has {expected}")]
    MarkingShape { found: usize, expected: usize },
    #[error("initial marking must hold exactly one token on the source place")]
    BadInitialMarking,
    #[error("final marking must hold exactly one token on the sink place")]
    BadFinalMarking,
    #[error("oracle fault: {0}")]
    Fault(String),
}

pub trait SoundnessOracle {
    fn check(
        &self,
        net: &WorkflowNet,
        initial: &Marking,
        fin: &Marking,
    ) -> Result<Verdict, OracleError>;
}

impl<F> SoundnessOracle for F
where
    F: Fn(&WorkflowNet, &Marking, &Marking) -> Result<Verdict, OracleError>,
{
    fn check(
        &self,
        net: &WorkflowNet,
        initial: &Marking,
        fin: &Marking,
    ) -> Result<Verdict, OracleError> {
        self(net, initial, fin)
    }
}

/// 校验标识与网的形状, 供各实现共用.
pub(crate) fn check_markings(
    net: &WorkflowNet,
    initial: &Marking,
    fin: &Marking,
) -> Result<(), OracleError> {
    for marking in [initial, fin] {
        if marking.len() != net.places_len() {
            return Err(OracleError::MarkingShape {
                found: marking.len(),
                expected: net.places_len(),
            });
        }
    }
    if initial.total() != 1 || initial.tokens(net.source) != 1 {
        return Err(OracleError::BadInitialMarking);
    }
    if fin.total() != 1 || fin.tokens(net.sink) != 1 {
        return Err(OracleError::BadFinalMarking);
    }
    Ok(())
}
