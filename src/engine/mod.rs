//! 合成引擎: 持有当前矩阵、派生网缓存、动作日志、历史栈、随机源与 oracle.
//!
//! 每个变更操作都是全有或全无的: 先在副本上算出候选, 成功后才记录快照并提交.
//! 引擎不加锁, 调用方负责串行化变更; 只有 [`CancelToken`] 可跨线程使用.
pub mod history;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::config::SynthConfig;
use crate::net::{
    DocumentError, GraphDocument, IncidenceMatrix, MatrixError, Violation, WorkflowNet,
};
use crate::oracle::{SoundnessOracle, StateSpaceOracle};
use crate::synth::{
    CancelToken, Rule, SearchContext, SearchOptions, SearchStats, SynthError, apply_rule,
};

pub use history::{ActionLog, LogEntry, NetHistory, Snapshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no net has been initialised")]
    NotInitialized,
    #[error("not a valid workflow net: {0:?}")]
    InvalidNet(Vec<Violation>),
    #[error("nothing to undo")]
    HistoryEmpty,
    #[error("nothing to redo")]
    RedoEmpty,
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub struct SynthesisEngine {
    matrix: Option<IncidenceMatrix>,
    net: Option<WorkflowNet>,
    log: ActionLog,
    history: NetHistory,
    rng: StdRng,
    config: SynthConfig,
    options: SearchOptions,
    oracle: Box<dyn SoundnessOracle>,
    cancel: CancelToken,
    last_stats: SearchStats,
}

impl SynthesisEngine {
    pub fn new(config: SynthConfig, oracle: Box<dyn SoundnessOracle>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            matrix: None,
            net: None,
            log: ActionLog::default(),
            history: NetHistory::new(config.history_limit),
            rng,
            options: config.search_options(),
            config,
            oracle,
            cancel: CancelToken::new(),
            last_stats: SearchStats::default(),
        }
    }

    /// 使用内置的状态空间 oracle, 状态上限取自配置.
    pub fn with_state_space_oracle(config: SynthConfig) -> Self {
        let oracle = StateSpaceOracle::new(config.state_limit);
        Self::new(config, Box::new(oracle))
    }

    pub fn init_seed(&mut self) -> Result<(), EngineError> {
        self.commit(IncidenceMatrix::seed(), "seed".to_string())
    }

    pub fn init_chain(&mut self, places: usize, transitions: usize) -> Result<(), EngineError> {
        let matrix = IncidenceMatrix::chain(places, transitions)?;
        self.commit(matrix, format!("init({places},{transitions})"))
    }

    pub fn load(&mut self, matrix: IncidenceMatrix) -> Result<(), EngineError> {
        self.commit(matrix, "load".to_string())
    }

    pub fn load_document(&mut self, document: &GraphDocument) -> Result<(), EngineError> {
        let matrix = document.to_matrix()?;
        self.load(matrix)
    }

    /// 应用一条规则. 失败时引擎状态不变.
    pub fn apply(&mut self, rule: &Rule) -> Result<&IncidenceMatrix, EngineError> {
        let current = self.matrix.as_ref().ok_or(EngineError::NotInitialized)?;
        let mut ctx = SearchContext::new(&self.options, &*self.oracle, &mut self.rng, &self.cancel);
        let result = apply_rule(current, rule, &mut ctx);
        self.last_stats = ctx.stats;
        log::debug!("{rule}: {:?}", self.last_stats);

        let next = result.inspect_err(|err| log::warn!("{rule} failed: {err}"))?;
        self.commit(next, rule.to_string())?;
        self.matrix.as_ref().ok_or(EngineError::NotInitialized)
    }

    /// 连续应用 `count` 轮规则, 整批作为一次可撤销的变更.
    ///
    /// `rules` 为空时每轮随机挑选一条自动规则, 否则每轮依次应用 `rules` 中的全部规则.
    /// 不适用的规则被跳过; 取消、超时或内部错误会放弃整批. 返回实际应用的规则数.
    pub fn generate(&mut self, count: usize, rules: &[Rule]) -> Result<usize, EngineError> {
        let mut current = self.matrix.clone().ok_or(EngineError::NotInitialized)?;
        let automatic = [
            Rule::abstraction(),
            Rule::dual_abstraction(),
            Rule::LinearPlace,
            Rule::LinearTransition,
        ];
        let mut actions = Vec::new();
        let mut stats = SearchStats::default();

        for _ in 0..count {
            let round = match rules {
                [] => automatic
                    .choose(&mut self.rng)
                    .cloned()
                    .into_iter()
                    .collect::<Vec<_>>(),
                rules => rules.to_vec(),
            };
            for rule in round {
                let mut ctx =
                    SearchContext::new(&self.options, &*self.oracle, &mut self.rng, &self.cancel);
                let result = apply_rule(&current, &rule, &mut ctx);
                stats.merge(&ctx.stats);
                match result {
                    Ok(next) => {
                        current = next;
                        actions.push(format!("batch {rule}"));
                    }
                    Err(SynthError::RuleNotApplicable(reason)) => {
                        log::warn!("batch step {rule} skipped: {reason}");
                    }
                    Err(err) => {
                        self.last_stats = stats;
                        return Err(err.into());
                    }
                }
            }
        }

        self.last_stats = stats;
        if actions.is_empty() {
            return Ok(0);
        }
        let applied = actions.len();
        self.history.record(self.snapshot());
        self.install(current)?;
        for action in actions {
            self.log.push(action);
        }
        log::info!("batch applied {applied} rules");
        Ok(applied)
    }

    pub fn undo(&mut self) -> Result<(), EngineError> {
        let previous = self
            .history
            .undo(self.snapshot())
            .ok_or(EngineError::HistoryEmpty)?;
        self.restore(previous);
        log::info!("undo: {} step(s) left", self.history.undo_depth());
        Ok(())
    }

    /// 最多撤销 `steps` 步, 但不会撤销到没有网的状态. 返回实际撤销的步数.
    pub fn rewind(&mut self, steps: usize) -> Result<usize, EngineError> {
        let mut undone = 0;
        while undone < steps {
            match self.history.peek_undo() {
                Some(previous) if previous.matrix.is_some() => {}
                _ => break,
            }
            self.undo()?;
            undone += 1;
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<(), EngineError> {
        let next = self
            .history
            .redo(self.snapshot())
            .ok_or(EngineError::RedoEmpty)?;
        self.restore(next);
        log::info!("redo: {} step(s) left", self.history.redo_depth());
        Ok(())
    }

    /// 清空当前状态与全部历史.
    pub fn reset(&mut self) {
        self.matrix = None;
        self.net = None;
        self.log = ActionLog::default();
        self.history.clear();
        self.cancel.reset();
        log::info!("engine reset");
    }

    pub fn matrix(&self) -> Option<&IncidenceMatrix> {
        self.matrix.as_ref()
    }

    pub fn net(&self) -> Option<&WorkflowNet> {
        self.net.as_ref()
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn log_records(&self) -> &[LogEntry] {
        self.log.entries()
    }

    /// 当前网的传输文档, token 数取自初始标识.
    pub fn graph_document(&self) -> Option<GraphDocument> {
        self.net
            .as_ref()
            .map(|net| GraphDocument::from_net(net, &net.initial_marking))
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn last_stats(&self) -> SearchStats {
        self.last_stats
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        self.history.undo_depth() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.redo_depth() > 0
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            matrix: self.matrix.clone(),
            net: self.net.clone(),
            log: self.log.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.matrix = snapshot.matrix;
        self.net = snapshot.net;
        self.log = snapshot.log;
    }

    fn install(&mut self, matrix: IncidenceMatrix) -> Result<(), EngineError> {
        let net = WorkflowNet::from_matrix(&matrix)
            .map_err(|_| EngineError::InvalidNet(matrix.violations()))?;
        self.matrix = Some(matrix);
        self.net = Some(net);
        Ok(())
    }

    fn commit(&mut self, matrix: IncidenceMatrix, action: String) -> Result<(), EngineError> {
        if !matrix.is_valid() {
            return Err(EngineError::InvalidNet(matrix.violations()));
        }
        let snapshot = self.snapshot();
        self.install(matrix)?;
        self.history.record(snapshot);
        if let Some(matrix) = &self.matrix {
            log::info!(
                "{action}: {} places, {} transitions",
                matrix.places(),
                matrix.transitions()
            );
        }
        self.log.push(action);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::PlaceId;
    use crate::synth::is_free_choice;

    fn engine(seed: u64) -> SynthesisEngine {
        let config = SynthConfig {
            seed: Some(seed),
            ..SynthConfig::default()
        };
        SynthesisEngine::with_state_space_oracle(config)
    }

    #[test]
    fn seed_initialisation() {
        let mut engine = engine(1);
        engine.init_seed().unwrap();
        let matrix = engine.matrix().unwrap();
        assert!(matrix.is_valid());
        assert_eq!(matrix.source_index(), Some(PlaceId::new(2)));
        assert_eq!(matrix.sink_index(), Some(PlaceId::new(0)));
        assert_eq!(engine.log().actions().collect::<Vec<_>>(), ["seed"]);
        assert_eq!(engine.net().unwrap().places_len(), 3);
    }

    #[test]
    fn rules_need_an_initialised_net() {
        let mut engine = engine(1);
        assert!(matches!(
            engine.apply(&Rule::LinearPlace),
            Err(EngineError::NotInitialized)
        ));
        assert!(matches!(
            engine.generate(3, &[]),
            Err(EngineError::NotInitialized)
        ));
    }

    #[test]
    fn undo_restores_matrix_and_log_prefix() {
        let mut engine = engine(7);
        engine.init_chain(3, 2).unwrap();
        let before = engine.matrix().unwrap().clone();
        let log_before = engine.log().clone();

        let rules = [
            Rule::abstraction(),
            Rule::LinearTransition,
            Rule::dual_abstraction(),
            Rule::LinearPlace,
        ];
        for rule in &rules {
            let next = engine.apply(rule).unwrap();
            assert!(next.is_valid());
            assert!(is_free_choice(next));
        }
        assert_eq!(engine.log().len(), 5);
        assert_eq!(engine.log().entries()[1].action, "psiA(auto)");

        for _ in &rules {
            engine.undo().unwrap();
        }
        assert_eq!(engine.matrix(), Some(&before));
        assert_eq!(engine.log(), &log_before);

        engine.redo().unwrap();
        assert_eq!(engine.log().len(), 2);
        assert!(engine.can_redo());
        engine.apply(&Rule::LinearPlace).unwrap();
        assert!(!engine.can_redo());
    }

    #[test]
    fn rewind_stops_at_the_initial_net() {
        let mut engine = engine(5);
        engine.init_seed().unwrap();
        engine.apply(&Rule::LinearPlace).unwrap();
        engine.apply(&Rule::LinearTransition).unwrap();

        assert_eq!(engine.rewind(1).unwrap(), 1);
        assert_eq!(engine.log().len(), 2);
        assert_eq!(engine.rewind(10).unwrap(), 1);
        assert_eq!(engine.matrix(), Some(&IncidenceMatrix::seed()));
        assert!(engine.graph_document().is_some());
        assert_eq!(engine.rewind(1).unwrap(), 0);
        assert!(engine.can_undo());
    }

    #[test]
    fn undo_after_reset_reports_empty_history() {
        let mut engine = engine(3);
        engine.init_seed().unwrap();
        engine.apply(&Rule::LinearPlace).unwrap();
        engine.reset();
        assert!(matches!(engine.undo(), Err(EngineError::HistoryEmpty)));
        assert!(matches!(engine.redo(), Err(EngineError::RedoEmpty)));
        assert!(engine.matrix().is_none());
        assert!(engine.log().is_empty());
    }

    #[test]
    fn failed_rule_leaves_state_untouched() {
        let mut engine = engine(3);
        engine.init_seed().unwrap();
        let rule: Rule = "psiA:p0".parse().unwrap();
        assert!(matches!(
            engine.apply(&rule),
            Err(EngineError::Synth(SynthError::Precondition(_)))
        ));
        assert_eq!(engine.matrix(), Some(&IncidenceMatrix::seed()));
        assert_eq!(engine.log().len(), 1);

        engine.cancel_token().cancel();
        assert!(matches!(
            engine.apply(&Rule::LinearTransition),
            Err(EngineError::Synth(SynthError::Cancelled))
        ));
        assert_eq!(engine.matrix(), Some(&IncidenceMatrix::seed()));
        engine.undo().unwrap();
        assert!(engine.matrix().is_none());
    }

    #[test]
    fn invalid_nets_are_refused() {
        let mut engine = engine(3);
        let broken = IncidenceMatrix::from_rows(&[[1, -1], [-1, 1]]).unwrap();
        assert!(matches!(
            engine.load(broken),
            Err(EngineError::InvalidNet(_))
        ));
        assert!(matches!(
            engine.init_chain(2, 2),
            Err(EngineError::Matrix(_))
        ));
        assert!(engine.matrix().is_none());
        assert!(!engine.can_undo());
    }

    #[test]
    fn documents_load_back() {
        let mut engine = engine(3);
        engine.init_seed().unwrap();
        engine.apply(&Rule::abstraction()).unwrap();
        let document = engine.graph_document().unwrap();

        let mut other = self::engine(4);
        other.load_document(&document).unwrap();
        assert_eq!(other.matrix(), engine.matrix());
        assert_eq!(other.log_records()[0].action, "load");
    }

    #[test]
    fn batch_is_a_single_undo_step() {
        let mut engine = engine(11);
        engine.init_seed().unwrap();
        let applied = engine.generate(4, &[]).unwrap();
        assert!(applied > 0);
        assert_eq!(engine.log().len(), 1 + applied);
        assert!(engine.log().actions().skip(1).all(|a| a.starts_with("batch psi")));
        assert!(engine.matrix().unwrap().is_valid());

        engine.undo().unwrap();
        assert_eq!(engine.matrix(), Some(&IncidenceMatrix::seed()));

        let applied = engine
            .generate(2, &[Rule::LinearPlace, Rule::LinearTransition])
            .unwrap();
        assert_eq!(applied, 4);
        let matrix = engine.matrix().unwrap();
        assert_eq!((matrix.places(), matrix.transitions()), (5, 5));
    }
}
