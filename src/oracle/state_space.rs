//! 基于有界状态空间搜索的可靠性判定.
//!
//! 工作流网 `N` 在 `[i]` 下可靠当且仅当:
//! 1. 任一可达标识 `M` 均可到达 `[o]` (option to complete);
//! 2. 若可达标识 `M ≥ [o]`, 则 `M = [o]` (proper completion);
//! 3. 不存在死迁移.
//!
//! 可靠的工作流网必然有界, 因此若某可达标识严格覆盖其祖先标识, 直接判为不可靠.
//! 探索状态数超过 `state_limit` 时返回 [`Verdict::Timeout`].
use std::collections::VecDeque;
use std::collections::hash_map::Entry;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use rustc_hash::FxHashMap;

use crate::net::{Marking, TransitionId, WorkflowNet};
use crate::oracle::{OracleError, SoundnessOracle, Verdict, check_markings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsoundReason {
    /// 可达标识严格覆盖其祖先.
    Unbounded,
    /// 汇库所已有 token 时仍有其他 token.
    ImproperCompletion,
    FinalUnreachable,
    /// 某个可达标识无法到达终止标识.
    CannotComplete,
    DeadTransition(TransitionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSpaceReport {
    pub verdict: Verdict,
    pub reason: Option<UnsoundReason>,
    pub states: usize,
    pub edges: usize,
}

impl StateSpaceReport {
    fn new(
        verdict: Verdict,
        reason: Option<UnsoundReason>,
        graph: &DiGraph<Marking, TransitionId>,
    ) -> Self {
        Self {
            verdict,
            reason,
            states: graph.node_count(),
            edges: graph.edge_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateSpaceOracle {
    pub state_limit: usize,
}

impl Default for StateSpaceOracle {
    fn default() -> Self {
        Self {
            state_limit: 100_000,
        }
    }
}

impl StateSpaceOracle {
    pub fn new(state_limit: usize) -> Self {
        Self { state_limit }
    }

    pub fn analyze(
        &self,
        net: &WorkflowNet,
        initial: &Marking,
        fin: &Marking,
    ) -> Result<StateSpaceReport, OracleError> {
        check_markings(net, initial, fin)?;

        let mut graph: DiGraph<Marking, TransitionId> = DiGraph::new();
        let mut markings: FxHashMap<Marking, NodeIndex> = FxHashMap::default();
        let mut parent: Vec<Option<NodeIndex>> = Vec::new();
        let mut fired = vec![false; net.transitions_len()];
        let mut queue = VecDeque::new();

        let root = graph.add_node(initial.clone());
        parent.push(None);
        markings.insert(initial.clone(), root);
        queue.push_back(root);

        while let Some(state) = queue.pop_front() {
            let current = graph[state].clone();
            if current.tokens(net.sink) > 0 && current != *fin {
                return Ok(StateSpaceReport::new(
                    Verdict::Unsound,
                    Some(UnsoundReason::ImproperCompletion),
                    &graph,
                ));
            }

            for transition in net.enabled_transitions(&current) {
                let next = net
                    .fire_transition(&current, transition)
                    .map_err(|err| OracleError::Fault(err.to_string()))?;
                fired[transition.index()] = true;

                let target = match markings.entry(next) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        if covers_ancestor(&graph, &parent, state, entry.key()) {
                            return Ok(StateSpaceReport::new(
                                Verdict::Unsound,
                                Some(UnsoundReason::Unbounded),
                                &graph,
                            ));
                        }
                        if graph.node_count() >= self.state_limit {
                            log::debug!(
                                "state space exceeded {} markings, giving up",
                                self.state_limit
                            );
                            return Ok(StateSpaceReport::new(Verdict::Timeout, None, &graph));
                        }
                        let index = graph.add_node(entry.key().clone());
                        parent.push(Some(state));
                        entry.insert(index);
                        queue.push_back(index);
                        index
                    }
                };
                graph.add_edge(state, target, transition);
            }
        }

        let Some(&final_index) = markings.get(fin) else {
            return Ok(StateSpaceReport::new(
                Verdict::Unsound,
                Some(UnsoundReason::FinalUnreachable),
                &graph,
            ));
        };

        if let Some(dead) = fired.iter().position(|fired| !fired) {
            return Ok(StateSpaceReport::new(
                Verdict::Unsound,
                Some(UnsoundReason::DeadTransition(TransitionId::from_index(dead))),
                &graph,
            ));
        }

        let reversed = Reversed(&graph);
        let mut bfs = Bfs::new(reversed, final_index);
        let mut completing = 0usize;
        while bfs.next(reversed).is_some() {
            completing += 1;
        }
        if completing != graph.node_count() {
            return Ok(StateSpaceReport::new(
                Verdict::Unsound,
                Some(UnsoundReason::CannotComplete),
                &graph,
            ));
        }

        Ok(StateSpaceReport::new(Verdict::Sound, None, &graph))
    }
}

impl SoundnessOracle for StateSpaceOracle {
    fn check(
        &self,
        net: &WorkflowNet,
        initial: &Marking,
        fin: &Marking,
    ) -> Result<Verdict, OracleError> {
        let report = self.analyze(net, initial, fin)?;
        log::trace!(
            "state space: {} markings, {} edges, {:?} ({:?})",
            report.states,
            report.edges,
            report.verdict,
            report.reason
        );
        Ok(report.verdict)
    }
}

/// 沿 BFS 树回溯 `state` 的祖先链 (含自身), 检查 `next` 是否严格覆盖其中之一.
fn covers_ancestor(
    graph: &DiGraph<Marking, TransitionId>,
    parent: &[Option<NodeIndex>],
    state: NodeIndex,
    next: &Marking,
) -> bool {
    let mut cursor = Some(state);
    while let Some(node) = cursor {
        if next.strictly_covers(&graph[node]) {
            return true;
        }
        cursor = parent[node.index()];
    }
    false
}
