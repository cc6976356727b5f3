//! Per-compilation rewrite state.
//!
//! One [`RewriteState`] exists per query compilation and is threaded
//! explicitly through every pass. It is never shared: concurrent
//! compilations each use their own instance, so no locking is involved.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Ast, NodeId};
use crate::error::{RewriteError, RewriteResult};

/// A cross-reference recorded during the single-pass rewrite, linked later by
/// [`link_labels`](super::link_labels).
#[derive(Debug, Clone)]
pub(crate) enum PendingRef {
    /// A comparison referenced one label: `op` must end up joined onto the
    /// join declared under `label`, correlated as `predicate` describes.
    LabelRef {
        /// The referenced label name.
        label: String,
        /// The operator carrying the comparison (a filter, or the filter the
        /// comparison was consolidated into).
        op: NodeId,
        /// The comparison, rewritten to be self-referential on `op`.
        predicate: NodeId,
    },
    /// A comparison equated two labels: the later-declared join must be
    /// joined onto the earlier-declared one by subject equality.
    LabelPair {
        /// The label on one side.
        left: String,
        /// The label on the other side.
        right: String,
        /// Whether one side passed through the recursive-closure marker.
        transitive: bool,
    },
}

impl PendingRef {
    /// The label whose declaration order drives processing order.
    pub(crate) fn sort_label(&self) -> &str {
        match self {
            Self::LabelRef { label, .. } => label,
            Self::LabelPair { left, .. } => left,
        }
    }
}

/// Mutable state for one compilation.
///
/// Tracks which joins claim which label names, the order in which labels were
/// first declared (the tie-break key for deferred linking), the
/// cross-references still to be linked, and the counter behind synthesized
/// anonymous label names.
#[derive(Debug, Default)]
pub struct RewriteState {
    /// Label name → joins claiming that name, outermost occurrence first.
    labels: HashMap<String, Vec<NodeId>>,
    /// Label names in first-declaration order.
    declaration_order: Vec<String>,
    /// Pending cross-references, keyed by the join they were recorded
    /// against, in recording order.
    pending: Vec<(NodeId, Vec<PendingRef>)>,
    /// Counter behind `@1`, `@2`, … anonymous names.
    anon_counter: u32,
}

impl RewriteState {
    /// Creates a fresh state for one compilation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` as a label for `join`.
    ///
    /// Re-declaring a name on the identical join is a no-op. A structurally
    /// equal join appends a claim (the outermost, first, claim wins at
    /// resolution). A conflicting join fails with
    /// [`RewriteError::DuplicateLabel`].
    pub fn declare(&mut self, ast: &Ast, name: &str, join: NodeId) -> RewriteResult<()> {
        if let Some(claims) = self.labels.get_mut(name) {
            if claims.contains(&join) {
                return Ok(());
            }
            if !ast.structural_eq(claims[0], join) {
                return Err(RewriteError::DuplicateLabel { name: name.to_string() });
            }
            claims.push(join);
        } else {
            debug!(label = name, %join, "declaring label");
            self.declaration_order.push(name.to_string());
            self.labels.insert(name.to_string(), vec![join]);
        }
        Ok(())
    }

    /// Resolves a label to the join it names (the outermost claim).
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<NodeId> {
        self.labels.get(name).map(|claims| claims[0])
    }

    /// Returns true if the label has been declared.
    #[must_use]
    pub fn is_declared(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// Returns true if `join` is registered under any label.
    #[must_use]
    pub fn is_registered(&self, join: NodeId) -> bool {
        self.labels.values().any(|claims| claims.contains(&join))
    }

    /// Returns the rank of a label in first-declaration order. Labels never
    /// declared sort last.
    #[must_use]
    pub fn declaration_rank(&self, name: &str) -> usize {
        self.declaration_order.iter().position(|n| n == name).unwrap_or(usize::MAX)
    }

    /// Synthesizes the next anonymous label name.
    pub fn next_anonymous(&mut self) -> String {
        self.anon_counter += 1;
        format!("@{}", self.anon_counter)
    }

    /// Records a cross-reference against the join it was found under.
    pub(crate) fn push_pending(&mut self, context: NodeId, re: PendingRef) {
        if let Some((_, refs)) = self.pending.iter_mut().find(|(join, _)| *join == context) {
            refs.push(re);
        } else {
            self.pending.push((context, vec![re]));
        }
    }

    /// Takes all pending cross-references, leaving none behind.
    pub(crate) fn take_pending(&mut self) -> Vec<(NodeId, Vec<PendingRef>)> {
        std::mem::take(&mut self.pending)
    }

    /// Returns true if any cross-references are still pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;

    #[test]
    fn declare_twice_same_join_is_noop() {
        let mut ast = Ast::new();
        let join = ast.join();
        let mut state = RewriteState::new();
        state.declare(&ast, "x", join).unwrap();
        state.declare(&ast, "x", join).unwrap();
        assert_eq!(state.resolve("x"), Some(join));
        assert_eq!(state.declaration_rank("x"), 0);
    }

    #[test]
    fn declare_conflicting_join_fails() {
        let mut ast = Ast::new();
        let a = ast.join();
        // A join with a filter child is structurally distinct from a bare one.
        let p = ast.column_project(crate::ast::Position::Predicate);
        let c = ast.constant(Value::String("t".to_string()));
        let pred = ast.eq(p, c).unwrap();
        let f = ast.filter(vec![pred]).unwrap();
        let b = ast.join();
        ast.attach(b, f).unwrap();

        let mut state = RewriteState::new();
        state.declare(&ast, "x", a).unwrap();
        let err = state.declare(&ast, "x", b).unwrap_err();
        assert!(matches!(err, RewriteError::DuplicateLabel { name } if name == "x"));
    }

    #[test]
    fn outermost_claim_wins() {
        let mut ast = Ast::new();
        let a = ast.join();
        let b = ast.join();
        let mut state = RewriteState::new();
        state.declare(&ast, "x", a).unwrap();
        // b is structurally equal to a (both bare), so the claim is accepted
        // but resolution keeps the first join.
        state.declare(&ast, "x", b).unwrap();
        assert_eq!(state.resolve("x"), Some(a));
    }

    #[test]
    fn anonymous_names_are_sequential() {
        let mut state = RewriteState::new();
        assert_eq!(state.next_anonymous(), "@1");
        assert_eq!(state.next_anonymous(), "@2");
    }

    #[test]
    fn undeclared_labels_sort_last() {
        let mut ast = Ast::new();
        let join = ast.join();
        let mut state = RewriteState::new();
        state.declare(&ast, "first", join).unwrap();
        assert!(state.declaration_rank("first") < state.declaration_rank("never"));
    }
}
