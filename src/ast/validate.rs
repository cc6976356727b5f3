//! Structural validation of operator trees.
//!
//! The arena makes most invariant violations impossible to construct through
//! the public surface, but rewrites move a lot of nodes around; these checks
//! catch a broken transformation before it reaches the evaluator.

use crate::error::{RewriteError, RewriteResult};

use super::node::{NodeId, NodeKind};
use super::tree::Ast;

/// Validates the subtree rooted at `root`.
///
/// Checks, over every reachable node:
///
/// - every child's parent back-reference points at the node holding it;
/// - no node is reachable through two different parents (single-parent);
/// - walking parent links terminates within the arena size (acyclicity);
/// - resource-set operators hold only filters, resource sets, or join
///   conditions, and join conditions wrap exactly one operator.
pub fn validate_tree(ast: &Ast, root: NodeId) -> RewriteResult<()> {
    let mut seen = vec![false; ast.len()];
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if seen[id.index()] {
            return Err(RewriteError::MalformedAst(format!(
                "{} at {id} is reachable through two parents",
                ast.kind(id).name()
            )));
        }
        seen[id.index()] = true;

        check_parent_walk(ast, id)?;

        let kind = ast.kind(id);
        if kind.is_resource_set() {
            for &child in ast.args(id) {
                let ck = ast.kind(child);
                if !ck.is_resource_set()
                    && !matches!(ck, NodeKind::Filter { .. } | NodeKind::JoinCondition { .. })
                {
                    return Err(RewriteError::MalformedAst(format!(
                        "{} holds a {} child",
                        kind.name(),
                        ck.name()
                    )));
                }
            }
        }
        if matches!(kind, NodeKind::JoinCondition { .. }) && ast.args(id).len() != 1 {
            return Err(RewriteError::MalformedAst(format!(
                "JoinCondition at {id} wraps {} operators",
                ast.args(id).len()
            )));
        }

        for &child in ast.args(id) {
            if ast.parent(child) != Some(id) {
                return Err(RewriteError::MalformedAst(format!(
                    "{} at {child} has a dangling parent reference",
                    ast.kind(child).name()
                )));
            }
            stack.push(child);
        }
    }

    Ok(())
}

/// Walks parent links from `id`, failing if the walk exceeds the arena size.
fn check_parent_walk(ast: &Ast, id: NodeId) -> RewriteResult<()> {
    let mut cur = id;
    let mut steps = 0usize;
    while let Some(parent) = ast.parent(cur) {
        steps += 1;
        if steps > ast.len() {
            return Err(RewriteError::CyclicTree);
        }
        cur = parent;
    }
    Ok(())
}
