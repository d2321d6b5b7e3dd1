//! Control flow edge types for the CFG.

use crate::utils::graph::NodeId;

/// The kind of control flow represented by an edge.
///
/// # Examples
///
/// ```rust
/// use cfcss::analysis::CfgEdgeKind;
///
/// let edge_kind = CfgEdgeKind::ConditionalTrue;
/// assert!(edge_kind.is_conditional());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgEdgeKind {
    /// The single successor of a `jmp`, or a branch whose targets coincide.
    Unconditional,

    /// The `then` target of a two-way branch, taken when the condition is non-zero.
    ConditionalTrue,

    /// The `else` target of a two-way branch, taken when the condition is zero.
    ConditionalFalse,

    /// A switch edge.
    ///
    /// Carries the first case value that selects this target, or `None` when the edge is
    /// only reachable through the default.
    Switch {
        /// The case value that triggers this edge, or `None` for the default case.
        case_value: Option<i64>,
    },
}

impl CfgEdgeKind {
    /// Returns `true` if this is a conditional branch edge.
    ///
    /// ```rust
    /// use cfcss::analysis::CfgEdgeKind;
    ///
    /// assert!(CfgEdgeKind::ConditionalTrue.is_conditional());
    /// assert!(CfgEdgeKind::ConditionalFalse.is_conditional());
    /// assert!(!CfgEdgeKind::Unconditional.is_conditional());
    /// ```
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalTrue | Self::ConditionalFalse)
    }

    /// Returns `true` if this is a switch edge.
    #[must_use]
    pub const fn is_switch(&self) -> bool {
        matches!(self, Self::Switch { .. })
    }

    /// Returns the label used for this edge in DOT output.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Unconditional => String::new(),
            Self::ConditionalTrue => "true".to_string(),
            Self::ConditionalFalse => "false".to_string(),
            Self::Switch { case_value } => {
                case_value.map_or("default".to_string(), |v| format!("case {v}"))
            }
        }
    }
}

/// An edge in the control flow graph.
///
/// # Examples
///
/// ```rust
/// use cfcss::analysis::{CfgEdge, CfgEdgeKind};
/// use cfcss::utils::graph::NodeId;
///
/// let edge = CfgEdge::new(NodeId::new(1), CfgEdgeKind::Unconditional);
/// assert_eq!(edge.target(), NodeId::new(1));
/// assert!(!edge.kind().is_conditional());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    target: NodeId,
    kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Creates a new CFG edge.
    #[must_use]
    pub const fn new(target: NodeId, kind: CfgEdgeKind) -> Self {
        Self { target, kind }
    }

    /// Returns the target block of this edge.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Returns the kind of control flow this edge represents.
    #[must_use]
    pub const fn kind(&self) -> &CfgEdgeKind {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_labels() {
        assert_eq!(CfgEdgeKind::Unconditional.label(), "");
        assert_eq!(CfgEdgeKind::ConditionalFalse.label(), "false");
        assert_eq!(
            CfgEdgeKind::Switch {
                case_value: Some(-3)
            }
            .label(),
            "case -3"
        );
        assert_eq!(CfgEdgeKind::Switch { case_value: None }.label(), "default");
    }

    #[test]
    fn test_edge_kind_predicates() {
        assert!(CfgEdgeKind::Switch { case_value: None }.is_switch());
        assert!(!CfgEdgeKind::Switch { case_value: None }.is_conditional());
    }
}
