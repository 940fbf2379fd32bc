//! Hierarchical findings recorded during one evaluation.

use complyscan_core::Status;
use serde::{Deserialize, Serialize};
use tracing::error;

/// One finding node.
///
/// Scopes carry a label and children; leaves carry a message and the
/// status they were recorded with. A scope's `status` stays unset until
/// the scope is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorNode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IndicatorNode>,
}

impl IndicatorNode {
    fn scope(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: None,
            message: None,
            children: Vec::new(),
        }
    }

    fn leaf(message: String, status: Status) -> Self {
        Self {
            label: String::new(),
            status: Some(status),
            message: Some(message),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.message.is_some()
    }

    /// True when this node or any descendant is non-compliant.
    pub fn has_non_compliant(&self) -> bool {
        self.status == Some(Status::NonCompliant)
            || self.children.iter().any(IndicatorNode::has_non_compliant)
    }
}

/// Scope-structured record of findings for a single evaluation.
///
/// One tree exists per invocation and is threaded down the call stack by
/// `&mut`; it is never shared between concurrent invocations, so it needs
/// no internal synchronization.
///
/// Stack misuse (popping with nothing open, recording after the root
/// closed) is a check-author bug, not a host condition: it is logged at
/// error level and ignored, and the dispatcher separately fails any
/// invocation that finishes with an unbalanced stack.
#[derive(Debug, Clone, Default)]
pub struct IndicatorsTree {
    root: Option<IndicatorNode>,
    /// Child-index path from the root to the currently open scope.
    open: Vec<usize>,
    /// Number of open scopes; 0 both before the first push and after the
    /// final pop.
    depth: usize,
}

impl IndicatorsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The root node, if any scope was ever opened.
    pub fn root(&self) -> Option<&IndicatorNode> {
        self.root.as_ref()
    }

    /// Root status; `Some` once the outermost scope has been closed.
    pub fn status(&self) -> Option<Status> {
        self.root.as_ref().and_then(|node| node.status)
    }

    fn current_mut(&mut self) -> Option<&mut IndicatorNode> {
        if self.depth == 0 {
            return None;
        }
        let mut node = self.root.as_mut()?;
        for &index in &self.open {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Open a new scope under the current one and make it active.
    pub fn push(&mut self, label: impl Into<String>) {
        let label = label.into();
        if self.depth == 0 {
            if self.root.is_some() {
                error!("push of '{}' after the root scope closed is ignored", label);
                return;
            }
            self.root = Some(IndicatorNode::scope(label));
            self.depth = 1;
            return;
        }
        let Some(parent) = self.current_mut() else {
            error!("indicator stack is inconsistent; push of '{}' ignored", label);
            return;
        };
        parent.children.push(IndicatorNode::scope(label));
        let index = parent.children.len() - 1;
        self.open.push(index);
        self.depth += 1;
    }

    /// Close the current scope and return its finalized status.
    ///
    /// A scope closes non-compliant when any of its children is
    /// non-compliant, compliant otherwise; in particular an empty scope
    /// closes compliant. Once finalized a status is never rewritten by
    /// later pops elsewhere in the tree.
    pub fn pop(&mut self) -> Option<Status> {
        if self.depth == 0 {
            error!("pop with no open indicator scope is ignored");
            return None;
        }
        let finalized = self.current_mut().map(|node| {
            let aggregated = if node
                .children
                .iter()
                .any(|child| child.status == Some(Status::NonCompliant))
            {
                Status::NonCompliant
            } else {
                Status::Compliant
            };
            node.status = Some(aggregated);
            aggregated
        });
        self.open.pop();
        self.depth -= 1;
        finalized
    }

    /// Close the current scope with a status decided by the caller.
    ///
    /// Reserved for composite rule constructs (`anyOf` keeps its scope
    /// compliant although failed alternatives remain visible beneath it).
    /// Plain procedure scopes always close through [`pop`](Self::pop).
    pub(crate) fn pop_with(&mut self, status: Status) -> Status {
        if self.depth == 0 {
            error!("pop with no open indicator scope is ignored");
            return status;
        }
        if let Some(node) = self.current_mut() {
            node.status = Some(status);
        }
        self.open.pop();
        self.depth -= 1;
        status
    }

    /// Record a compliant finding under the current scope.
    pub fn compliant(&mut self, message: impl Into<String>) -> Status {
        self.record(message.into(), Status::Compliant)
    }

    /// Record a non-compliant finding under the current scope.
    pub fn non_compliant(&mut self, message: impl Into<String>) -> Status {
        self.record(message.into(), Status::NonCompliant)
    }

    fn record(&mut self, message: String, status: Status) -> Status {
        match self.current_mut() {
            Some(node) => node.children.push(IndicatorNode::leaf(message, status)),
            None => error!("indicator '{}' recorded with no open scope is ignored", message),
        }
        status
    }
}
