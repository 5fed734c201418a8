//! 动作日志与撤销/重做栈.
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::net::{IncidenceMatrix, WorkflowNet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: usize,
    pub timestamp: DateTime<Utc>,
    pub action: String,
}

/// 只追加; 撤销时整体回退到快照中的前缀.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    entries: Vec<LogEntry>,
}

impl ActionLog {
    pub fn push(&mut self, action: impl Into<String>) -> &LogEntry {
        let entry = LogEntry {
            id: self.entries.len() + 1,
            timestamp: Utc::now(),
            action: action.into(),
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.action.as_str())
    }
}

/// 变更前的完整状态. 快照持有深拷贝, 不与活动矩阵共享存储.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub matrix: Option<IncidenceMatrix>,
    pub net: Option<WorkflowNet>,
    pub log: ActionLog,
}

#[derive(Debug, Clone, Default)]
pub struct NetHistory {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    /// 超出时丢弃最旧的快照; `None` 表示不限.
    limit: Option<usize>,
}

impl NetHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// 新的变更使重做栈失效.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.redo.clear();
        self.undo.push_back(snapshot);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.undo.pop_front();
            }
        }
    }

    /// 弹出最近的快照, 并把 `current` 压入重做栈.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// 下一次 `undo` 将恢复的快照.
    pub fn peek_undo(&self) -> Option<&Snapshot> {
        self.undo.back()
    }

    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}
