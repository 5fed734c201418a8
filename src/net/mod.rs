//! # 工作流网的关联矩阵表示
//!
//! 设库所集合 `P` 与迁移集合 `T`. 网以带符号矩阵 `C ∈ {-1, 0, 1}^{|P|×|T|}` 存储:
//! `C[p, t] = -1` 表示弧 `p → t`, `C[p, t] = 1` 表示弧 `t → p`.
//!
//! 合法的工作流网矩阵满足:
//! * 无全零行、无全零列;
//! * 恰有一个源库所 `i` (行内无 `+1`) 与一个汇库所 `o` (行内无 `-1`);
//! * 每列至少含一个 `-1` 与一个 `+1`.
//!
//! 初始标识 `M_0 = [i]`, 终止标识 `M_f = [o]`, 均由矩阵派生而非独立存储.
//!
//! ## 示例
//!
//! ```rust
//! use pn_synth::net::*;
//!
//! let matrix = IncidenceMatrix::seed();
//! assert!(matrix.is_valid());
//!
//! let net = WorkflowNet::from_matrix(&matrix).unwrap();
//! let marking = net.initial_marking.clone();
//! let enabled = net.enabled_transitions(&marking);
//! let next = net.fire_transition(&marking, enabled[0]).unwrap();
//! assert_eq!(next.total(), 1);
//! ```

pub mod ids;
pub mod incidence;
pub mod io;
pub mod structure;

pub use ids::{NodeRef, PlaceId, TransitionId};
pub use incidence::{Cell, IncidenceMatrix, MatrixError, Violation};
pub use io::{DocumentError, EdgeRecord, GraphDocument, IoError, NodeKind, NodeRecord};
pub use structure::{
    Arc, ArcDirection, DeriveError, FireError, Marking, Place, Transition, Weight, WorkflowNet,
};
