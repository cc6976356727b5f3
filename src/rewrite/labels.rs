//! Deferred label resolution and join linking.
//!
//! The single-pass rewrite can meet a label reference before the join that
//! declares the label exists. Every such cross-reference is recorded in the
//! [`RewriteState`] and replayed here, once all declarations are known, as a
//! second pass over the rewritten tree.

use tracing::debug;

use crate::ast::{Ast, CorrelationKey, JoinKind, NodeId, NodeKind, Position};
use crate::error::{RewriteError, RewriteResult};

use super::state::{PendingRef, RewriteState};

/// Links every deferred cross-reference to its declared join.
///
/// References are processed per recording join, ordered by the referenced
/// label's first-declaration rank (labels declared earlier in the source take
/// precedence as join anchors; a label with no recorded declaration sorts
/// last). References whose label was never declared are collected and
/// reported together as [`RewriteError::UnknownLabel`].
pub fn link_labels(ast: &mut Ast, state: &mut RewriteState) -> RewriteResult<()> {
    let pending = state.take_pending();
    let mut unresolved: Vec<String> = Vec::new();

    for (context, mut refs) in pending {
        refs.sort_by_key(|re| state.declaration_rank(re.sort_label()));
        for re in refs {
            match re {
                PendingRef::LabelRef { label, op, predicate } => {
                    let Some(target) = state.resolve(&label) else {
                        unresolved.push(label);
                        continue;
                    };
                    link_reference(ast, state, target, &label, op, predicate, context)?;
                }
                PendingRef::LabelPair { left, right, transitive } => {
                    match (state.resolve(&left), state.resolve(&right)) {
                        (Some(a), Some(b)) => {
                            let (anchor, other) =
                                if state.declaration_rank(&left) <= state.declaration_rank(&right)
                                {
                                    (a, b)
                                } else {
                                    (b, a)
                                };
                            if anchor != other {
                                link_pair(ast, anchor, other, transitive)?;
                            }
                        }
                        (a, b) => {
                            if a.is_none() {
                                unresolved.push(left);
                            }
                            if b.is_none() {
                                unresolved.push(right);
                            }
                        }
                    }
                }
            }
        }
    }

    unresolved.sort();
    unresolved.dedup();
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(RewriteError::UnknownLabel { names: unresolved })
    }
}

/// Attaches a single-label cross-reference onto its declared join.
#[allow(clippy::too_many_arguments)]
fn link_reference(
    ast: &mut Ast,
    state: &mut RewriteState,
    target: NodeId,
    label: &str,
    op: NodeId,
    predicate: NodeId,
    context: NodeId,
) -> RewriteResult<()> {
    // A reference negated at the source turns into an anti join.
    let (predicate, anti) = match ast.kind(predicate) {
        NodeKind::Not => (ast.args(predicate)[0], true),
        _ => (predicate, false),
    };
    let (_, position) = ast.correlation_from_predicate(predicate)?;
    let join_kind = if anti { JoinKind::Anti } else { JoinKind::Inner };

    // The referenced label becomes an exported column of the binding filter,
    // so the join condition can resolve it against the operator's own label
    // table at evaluation time.
    if matches!(ast.kind(op), NodeKind::Filter { .. }) {
        ast.export_label(op, label, position);
    }

    if context == target {
        // The comparison already lives in the right join; re-key the
        // enclosing condition to the label.
        if let Some(jc) = condition_under(ast, op, target) {
            rekey_condition(ast, jc, CorrelationKey::Label(label.to_string()), join_kind);
        }
        debug!(label, join = %target, "label reference resolved in place");
        return Ok(());
    }

    if ast.subtree_contains(context, target) {
        // The declared join is nested inside the recording one: moving the
        // whole context under it would cycle, so only the binding operator
        // migrates.
        if let Some(wrapper) = ast.parent(op) {
            if matches!(ast.kind(wrapper), NodeKind::JoinCondition { .. }) {
                ast.detach(op);
                ast.detach(wrapper);
            } else {
                ast.detach(op);
            }
        }
        let jc = ast.join_condition(op, CorrelationKey::Label(label.to_string()), join_kind)?;
        ast.attach(target, jc)?;
        debug!(label, join = %target, "binding filter moved onto declared join");
        return Ok(());
    }

    // The recording join itself joins onto the target. A bare join is moved:
    // detached from its current parent and given a synthesized anonymous
    // name first.
    if !state.is_registered(context) {
        let anon = state.next_anonymous();
        debug!(label, anon = %anon, "naming bare join before relocation");
        state.declare(ast, &anon, context)?;
    }
    if let Some(wrapper) = ast.parent(context) {
        if matches!(ast.kind(wrapper), NodeKind::JoinCondition { .. }) {
            ast.detach(context);
            ast.detach(wrapper);
        } else {
            ast.detach(context);
        }
    }
    let jc = ast.join_condition(context, CorrelationKey::Label(label.to_string()), join_kind)?;
    ast.attach(target, jc)?;
    debug!(label, join = %target, "join relocated under declared label");
    Ok(())
}

/// Joins the later-declared of two labeled joins onto the earlier-declared
/// anchor by plain subject equality.
fn link_pair(ast: &mut Ast, anchor: NodeId, other: NodeId, transitive: bool) -> RewriteResult<()> {
    if let Some(wrapper) = ast.parent(other) {
        if matches!(ast.kind(wrapper), NodeKind::JoinCondition { .. }) {
            ast.detach(other);
            ast.detach(wrapper);
        } else {
            ast.detach(other);
        }
    }
    let jc = ast.add(
        NodeKind::JoinCondition {
            key: CorrelationKey::Column(Position::Subject),
            kind: JoinKind::Inner,
            transitive,
        },
        vec![other],
    )?;
    ast.attach(anchor, jc)?;
    debug!(anchor = %anchor, other = %other, transitive, "paired labeled joins");
    Ok(())
}

/// Finds the join condition directly under `target` on the path from `op`.
fn condition_under(ast: &Ast, op: NodeId, target: NodeId) -> Option<NodeId> {
    let mut cur = op;
    while let Some(parent) = ast.parent(cur) {
        if parent == target {
            return matches!(ast.kind(cur), NodeKind::JoinCondition { .. }).then_some(cur);
        }
        cur = parent;
    }
    None
}

/// Replaces a join condition's key and kind in place, keeping transitivity.
fn rekey_condition(ast: &mut Ast, jc: NodeId, key: CorrelationKey, kind: JoinKind) {
    if let NodeKind::JoinCondition { transitive, .. } = *ast.kind(jc) {
        ast.retype(jc, NodeKind::JoinCondition { key, kind, transitive });
    }
}

#[cfg(test)]
mod tests {
    use super::super::relational::rewrite_expr;
    use super::*;
    use crate::ast::validate_tree;

    #[test]
    fn unresolved_reference_fails() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let proj = ast.property_project(&["owner"], None);
        let lab = ast.label("x");
        let expr = ast.eq(proj, lab).unwrap();

        let root = rewrite_expr(&mut ast, &mut state, expr).unwrap();
        validate_tree(&ast, root).unwrap();

        let err = link_labels(&mut ast, &mut state).unwrap_err();
        assert!(matches!(err, RewriteError::UnknownLabel { names } if names == vec!["x"]));
    }

    #[test]
    fn declaration_then_reference_links_in_place() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        // subject == ?x and child = ?x in one conjunction.
        let subj = ast.subject_project();
        let x1 = ast.label("x");
        let decl = ast.eq(subj, x1).unwrap();
        let proj = ast.property_project(&["child"], None);
        let x2 = ast.label("x");
        let re = ast.eq(proj, x2).unwrap();
        let expr = ast.and(vec![decl, re]).unwrap();

        let root = rewrite_expr(&mut ast, &mut state, expr).unwrap();
        link_labels(&mut ast, &mut state).unwrap();
        validate_tree(&ast, root).unwrap();

        assert_eq!(state.resolve("x"), Some(root));
        // The child filter's condition is keyed by the label.
        let jc = ast.args(root)[0];
        assert!(matches!(
            ast.kind(jc),
            NodeKind::JoinCondition { key: CorrelationKey::Label(name), .. } if name == "x"
        ));
        let filter = ast.args(jc)[0];
        let labels = ast.filter_labels(filter);
        assert!(labels.contains(&("child".to_string(), Position::Object)));
        assert!(labels.contains(&("x".to_string(), Position::Object)));
    }

    #[test]
    fn pair_links_later_join_onto_earlier() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let a = ast.join();
        let b = ast.join();
        state.declare(&ast, "a", a).unwrap();
        state.declare(&ast, "b", b).unwrap();
        state.push_pending(
            a,
            PendingRef::LabelPair { left: "b".to_string(), right: "a".to_string(), transitive: false },
        );

        link_labels(&mut ast, &mut state).unwrap();
        // `a` was declared first, so it anchors and `b` attaches beneath it.
        assert_eq!(ast.args(a).len(), 1);
        let jc = ast.args(a)[0];
        assert_eq!(ast.args(jc), &[b]);
        assert!(matches!(
            ast.kind(jc),
            NodeKind::JoinCondition { key: CorrelationKey::Column(Position::Subject), .. }
        ));
    }

    #[test]
    fn transitive_pair_marks_condition() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let a = ast.join();
        let b = ast.join();
        state.declare(&ast, "a", a).unwrap();
        state.declare(&ast, "b", b).unwrap();
        state.push_pending(
            a,
            PendingRef::LabelPair { left: "a".to_string(), right: "b".to_string(), transitive: true },
        );

        link_labels(&mut ast, &mut state).unwrap();
        let jc = ast.args(a)[0];
        assert!(matches!(ast.kind(jc), NodeKind::JoinCondition { transitive: true, .. }));
    }
}
