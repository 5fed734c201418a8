//! 跨边界的传输形态: `{nodes, edges}` 图文档, 以及 JSON / RON 序列化接口.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use indexmap::map::Entry;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::incidence::IncidenceMatrix;
use crate::net::structure::{Marking, Weight, WorkflowNet};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("node id `{0}` appears more than once")]
    DuplicateNode(String),
    #[error("edge {from} -> {to} refers to an unknown node")]
    UnknownNode { from: String, to: String },
    #[error("edge {from} -> {to} connects two nodes of the same kind")]
    SameKind { from: String, to: String },
    #[error("{place} and {transition} are connected in both directions")]
    SelfLoop { place: String, transition: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Place,
    Transition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Weight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    /// 库所在前、迁移在后; 库所携带 `marking` 下的 token 数.
    pub fn from_net(net: &WorkflowNet, marking: &Marking) -> Self {
        let mut nodes = Vec::with_capacity(net.places_len() + net.transitions_len());
        let tokens = net.token_counts(marking);
        for place in &net.places {
            let count = tokens
                .iter()
                .find(|(id, _)| *id == place.id)
                .map_or(0, |(_, count)| *count);
            nodes.push(NodeRecord {
                id: place.name.clone(),
                kind: NodeKind::Place,
                tokens: Some(count),
            });
        }
        for transition in &net.transitions {
            nodes.push(NodeRecord {
                id: transition.name.clone(),
                kind: NodeKind::Transition,
                tokens: None,
            });
        }
        let edges = net
            .arcs
            .iter()
            .map(|arc| {
                let (source, target) = arc.endpoints();
                EdgeRecord { source, target }
            })
            .collect();
        Self { nodes, edges }
    }

    /// 按节点出现顺序为库所与迁移编号, 还原关联矩阵. 结果未经结构校验.
    pub fn to_matrix(&self) -> Result<IncidenceMatrix, DocumentError> {
        let mut places: IndexMap<&str, usize> = IndexMap::new();
        let mut transitions: IndexMap<&str, usize> = IndexMap::new();
        let mut kinds: IndexMap<&str, NodeKind> = IndexMap::new();

        for node in &self.nodes {
            match kinds.entry(node.id.as_str()) {
                Entry::Occupied(_) => return Err(DocumentError::DuplicateNode(node.id.clone())),
                Entry::Vacant(entry) => {
                    entry.insert(node.kind);
                }
            }
            let index = match node.kind {
                NodeKind::Place => &mut places,
                NodeKind::Transition => &mut transitions,
            };
            let next = index.len();
            index.insert(node.id.as_str(), next);
        }

        let mut matrix = IncidenceMatrix::new(places.len(), transitions.len());
        for edge in &self.edges {
            let unknown = || DocumentError::UnknownNode {
                from: edge.source.clone(),
                to: edge.target.clone(),
            };
            let source_kind = *kinds.get(edge.source.as_str()).ok_or_else(unknown)?;
            let target_kind = *kinds.get(edge.target.as_str()).ok_or_else(unknown)?;
            let (place, transition, value) = match (source_kind, target_kind) {
                (NodeKind::Place, NodeKind::Transition) => (&edge.source, &edge.target, -1),
                (NodeKind::Transition, NodeKind::Place) => (&edge.target, &edge.source, 1),
                _ => {
                    return Err(DocumentError::SameKind {
                        from: edge.source.clone(),
                        to: edge.target.clone(),
                    });
                }
            };
            let row = places[place.as_str()];
            let col = transitions[transition.as_str()];
            let existing = matrix.cell(row, col);
            if existing != 0 && existing != value {
                return Err(DocumentError::SelfLoop {
                    place: place.clone(),
                    transition: transition.clone(),
                });
            }
            matrix.set_cell(row, col, value);
        }
        Ok(matrix)
    }
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_json_string(value)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_json_str(&content)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let mut pretty = PrettyConfig::default();
    pretty.new_line = "\n".into();
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn write_ron<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_ron_string(value)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
