//! 由关联矩阵派生的工作流网: 库所、迁移、弧与标识.
//!
//! 派生网是矩阵的纯投影, 从不被直接修改; 任何编辑都发生在矩阵上, 随后重新派生.
use std::cmp::Ordering;
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::IncidenceMatrix;

pub type Weight = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("matrix has no source place (a row without +1 cells)")]
    NoSource,
    #[error("matrix has no sink place (a row without -1 cells)")]
    NoSink,
}

#[derive(Debug, Error)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("marking covers {found} places, net has {expected}")]
    MarkingShape { found: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub direction: ArcDirection,
}

impl Arc {
    /// (源节点名, 目标节点名).
    pub fn endpoints(&self) -> (String, String) {
        match self.direction {
            ArcDirection::PlaceToTransition => (self.place.name(), self.transition.name()),
            ArcDirection::TransitionToPlace => (self.transition.name(), self.place.name()),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Marking(pub Vec<Weight>);

impl Marking {
    pub fn empty(places: usize) -> Self {
        Self(vec![0; places])
    }

    /// 仅在 `place` 上放置一个 token.
    pub fn singleton(places: usize, place: PlaceId) -> Self {
        let mut marking = Self::empty(places);
        marking.0[place.index()] = 1;
        marking
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Weight)> {
        self.0
            .iter()
            .enumerate()
            .map(|(idx, tokens)| (PlaceId::from_index(idx), tokens))
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0[place.index()]
    }

    pub fn tokens_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place.index()]
    }

    pub fn total(&self) -> Weight {
        self.0.iter().sum()
    }

    /// `self ≥ other` 且 `self ≠ other`.
    pub fn strictly_covers(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Greater)
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter().filter(|(_, tokens)| **tokens > 0) {
            map.entry(&place, tokens);
        }
        map.finish()
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.len() != other.len() {
            return None;
        }
        let mut less = false;
        let mut greater = false;
        for (left, right) in self.0.iter().zip(other.0.iter()) {
            match left.cmp(right) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (true, true) => None,
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNet {
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    pub arcs: Vec<Arc>,
    pub source: PlaceId,
    pub sink: PlaceId,
    pub initial_marking: Marking,
    pub final_marking: Marking,
    /// `•t`, 按迁移下标.
    preset: Vec<Vec<PlaceId>>,
    /// `t•`, 按迁移下标.
    postset: Vec<Vec<PlaceId>>,
}

impl WorkflowNet {
    /// 按行优先顺序从矩阵派生库所、迁移与弧, O(|P|·|T|).
    pub fn from_matrix(matrix: &IncidenceMatrix) -> Result<Self, DeriveError> {
        let source = matrix.source_index().ok_or(DeriveError::NoSource)?;
        let sink = matrix.sink_index().ok_or(DeriveError::NoSink)?;

        let places = (0..matrix.places())
            .map(PlaceId::from_index)
            .map(|id| Place { id, name: id.name() })
            .collect::<Vec<_>>();
        let transitions = (0..matrix.transitions())
            .map(TransitionId::from_index)
            .map(|id| Transition { id, name: id.name() })
            .collect::<Vec<_>>();

        let mut arcs = Vec::new();
        let mut preset = vec![Vec::new(); matrix.transitions()];
        let mut postset = vec![Vec::new(); matrix.transitions()];
        for (row, cells) in matrix.rows().enumerate() {
            let place = PlaceId::from_index(row);
            for (col, cell) in cells.iter().enumerate() {
                let transition = TransitionId::from_index(col);
                let direction = match *cell {
                    -1 => {
                        preset[col].push(place);
                        ArcDirection::PlaceToTransition
                    }
                    1 => {
                        postset[col].push(place);
                        ArcDirection::TransitionToPlace
                    }
                    _ => continue,
                };
                arcs.push(Arc {
                    place,
                    transition,
                    direction,
                });
            }
        }

        Ok(Self {
            initial_marking: Marking::singleton(places.len(), source),
            final_marking: Marking::singleton(places.len(), sink),
            places,
            transitions,
            arcs,
            source,
            sink,
            preset,
            postset,
        })
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn preset(&self, transition: TransitionId) -> &[PlaceId] {
        &self.preset[transition.index()]
    }

    pub fn postset(&self, transition: TransitionId) -> &[PlaceId] {
        &self.postset[transition.index()]
    }

    /// 每个库所当前的 token 数, 供渲染端使用.
    pub fn token_counts(&self, marking: &Marking) -> Vec<(PlaceId, Weight)> {
        marking.iter().map(|(place, tokens)| (place, *tokens)).collect()
    }

    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .iter()
            .map(|transition| transition.id)
            .filter(|&transition| self.is_transition_enabled(transition, marking))
            .collect()
    }

    pub fn fire_transition(
        &self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Marking, FireError> {
        if marking.len() != self.places_len() {
            return Err(FireError::MarkingShape {
                found: marking.len(),
                expected: self.places_len(),
            });
        }
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if !self.is_transition_enabled(transition, marking) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();
        for &place in self.preset(transition) {
            *next.tokens_mut(place) -= 1;
        }
        for &place in self.postset(transition) {
            *next.tokens_mut(place) += 1;
        }
        Ok(next)
    }

    fn is_transition_enabled(&self, transition: TransitionId, marking: &Marking) -> bool {
        if transition.index() >= self.transitions_len() || marking.len() != self.places_len() {
            return false;
        }
        self.preset(transition)
            .iter()
            .all(|&place| marking.tokens(place) > 0)
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph WorkflowNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for place in &self.places {
            let tokens = self.initial_marking.tokens(place.id);
            let fill = if place.id == self.source {
                "#c8e6c9"
            } else if place.id == self.sink {
                "#ffcdd2"
            } else {
                "#e3f2fd"
            };
            let _ = writeln!(
                &mut dot,
                "    {} [label=\"{}\\n{}\", shape=circle, style=filled, fillcolor=\"{}\"];",
                place.name, place.name, tokens, fill
            );
        }

        for transition in &self.transitions {
            let _ = writeln!(
                &mut dot,
                "    {} [label=\"{}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                transition.name, transition.name
            );
        }

        for arc in &self.arcs {
            let (source, target) = arc.endpoints();
            let _ = writeln!(&mut dot, "    {} -> {};", source, target);
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derives_arcs_and_markings() {
        let net = WorkflowNet::from_matrix(&IncidenceMatrix::seed()).unwrap();
        assert_eq!(net.places_len(), 3);
        assert_eq!(net.transitions_len(), 3);
        assert_eq!(net.arcs.len(), 6);
        assert_eq!(net.source, PlaceId::new(2));
        assert_eq!(net.sink, PlaceId::new(0));
        assert_eq!(net.initial_marking.0, vec![0, 0, 1]);
        assert_eq!(net.final_marking.0, vec![1, 0, 0]);
        assert_eq!(net.preset(TransitionId::new(0)), &[PlaceId::new(1)]);
        assert_eq!(
            net.arcs[0],
            Arc {
                place: PlaceId::new(0),
                transition: TransitionId::new(0),
                direction: ArcDirection::TransitionToPlace,
            }
        );
        assert_eq!(net.arcs[0].endpoints(), ("t0".to_string(), "p0".to_string()));
    }

    #[test]
    fn derivation_is_deterministic() {
        let matrix = IncidenceMatrix::seed();
        let copy = matrix.clone();
        assert_eq!(
            WorkflowNet::from_matrix(&matrix).unwrap(),
            WorkflowNet::from_matrix(&copy).unwrap()
        );
    }

    #[test]
    fn firing_moves_the_token_to_the_sink() {
        let net = WorkflowNet::from_matrix(&IncidenceMatrix::seed()).unwrap();
        let start = net.initial_marking.clone();
        assert_eq!(
            net.enabled_transitions(&start),
            vec![TransitionId::new(1), TransitionId::new(2)]
        );
        let next = net.fire_transition(&start, TransitionId::new(1)).unwrap();
        assert_eq!(next.0, vec![0, 1, 0]);
        let done = net.fire_transition(&next, TransitionId::new(0)).unwrap();
        assert_eq!(done, net.final_marking);
        assert!(matches!(
            net.fire_transition(&done, TransitionId::new(0)),
            Err(FireError::NotEnabled(_))
        ));
    }

    #[test]
    fn token_counts_follow_the_marking() {
        let net = WorkflowNet::from_matrix(&IncidenceMatrix::seed()).unwrap();
        assert_eq!(
            net.token_counts(&net.initial_marking),
            vec![(PlaceId::new(0), 0), (PlaceId::new(1), 0), (PlaceId::new(2), 1)]
        );
        let next = net
            .fire_transition(&net.initial_marking, TransitionId::new(1))
            .unwrap();
        assert_eq!(net.token_counts(&next)[1], (PlaceId::new(1), 1));
    }

    #[test]
    fn missing_source_is_reported() {
        let matrix = IncidenceMatrix::from_rows(&[[1, -1], [-1, 1]]).unwrap();
        assert_eq!(
            WorkflowNet::from_matrix(&matrix),
            Err(DeriveError::NoSource)
        );
    }

    #[test]
    fn coverage_is_a_partial_order() {
        let small = Marking(vec![1, 0]);
        let large = Marking(vec![1, 2]);
        let other = Marking(vec![0, 3]);
        assert!(large.strictly_covers(&small));
        assert!(!small.strictly_covers(&large));
        assert!(!other.strictly_covers(&small));
        assert!(!small.strictly_covers(&small));
    }

    #[test]
    fn dot_lists_every_arc() {
        let net = WorkflowNet::from_matrix(&IncidenceMatrix::seed()).unwrap();
        let dot = net.to_dot();
        assert!(dot.contains("p2 -> t1;"));
        assert!(dot.contains("t2 -> p0;"));
    }
}
