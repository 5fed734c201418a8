//! 库所与迁移的强类型下标.
//!
//! 下标与关联矩阵的行号/列号一一对应,派生网中的节点名即 `p{行号}` / `t{列号}`.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const PREFIX: char = $prefix;

            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub fn from_index(idx: usize) -> Self {
                Self(idx as u32)
            }

            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// 派生网与传输文档中使用的节点名.
            pub fn name(self) -> String {
                format!("{}{}", $prefix, self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, stringify!($name))?;
                f.debug_tuple("").field(&self.0).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

define_id!(PlaceId, 'p');
define_id!(TransitionId, 't');

/// 指向派生网中某个节点的引用, 用于规则锚点.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Place(PlaceId),
    Transition(TransitionId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Place(place) => write!(f, "{place}"),
            NodeRef::Transition(transition) => write!(f, "{transition}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a node name (expected `p<index>` or `t<index>`)")]
pub struct ParseNodeRefError(pub String);

impl FromStr for NodeRef {
    type Err = ParseNodeRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let kind = chars.next();
        let index = chars
            .as_str()
            .parse::<u32>()
            .map_err(|_| ParseNodeRefError(s.to_string()))?;
        match kind {
            Some(PlaceId::PREFIX) => Ok(NodeRef::Place(PlaceId::new(index))),
            Some(TransitionId::PREFIX) => Ok(NodeRef::Transition(TransitionId::new(index))),
            _ => Err(ParseNodeRefError(s.to_string())),
        }
    }
}
