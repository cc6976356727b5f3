//! The logical-to-relational rewriter.
//!
//! Turns a boolean expression tree into a semantically equivalent tree built
//! only from `Join`/`Union`/`Except`/`Filter`/`JoinCondition`. The traversal
//! drives an explicit work stack rather than recursing, so expression depth
//! never translates into call-stack depth.

use tracing::{debug, trace};

use crate::ast::{Ast, CorrelationKey, JoinKind, NodeId, NodeKind, Position, ProjectStep};
use crate::error::{RewriteError, RewriteResult};

use super::projection::{project_to_filter_chain, FilterChain};
use super::state::{PendingRef, RewriteState};

/// Rewrites a boolean expression into a resource-set operator tree.
///
/// The input may contain nested resource-set subqueries (standalone joins
/// used as exists / not-exists predicates), nested negation, and comparisons
/// against projections and labels. The expression must be detached; the
/// returned operator is detached and owns everything it needs.
///
/// Label cross-references discovered here are recorded in `state` and are
/// linked by [`link_labels`](super::link_labels) once every declaration has
/// been seen.
pub fn rewrite_expr(
    ast: &mut Ast,
    state: &mut RewriteState,
    expr: NodeId,
) -> RewriteResult<NodeId> {
    ast.detach(expr);

    // The root operator kind follows the (de-negated) seed expression.
    let mut peek = expr;
    while matches!(ast.kind(peek), NodeKind::Not) {
        peek = ast.args(peek)[0];
    }
    let root = if matches!(ast.kind(peek), NodeKind::Or) { ast.union() } else { ast.join() };

    let mut work: Vec<(NodeId, NodeId)> = vec![(root, expr)];
    while let Some((parent, raw)) = work.pop() {
        let (expr, negated) = strip_negation(ast, raw);
        let kind = ast.kind(expr).clone();
        match kind {
            NodeKind::And | NodeKind::Or => {
                let group = resource_group(ast, parent, &kind, negated)?;
                let children: Vec<NodeId> = ast.args(expr).to_vec();
                for &child in &children {
                    ast.detach(child);
                }
                for &child in children.iter().rev() {
                    work.push((group, child));
                }
            }
            kind if kind.is_resource_set() || matches!(kind, NodeKind::Filter { .. }) => {
                // An already-rewritten operator used standalone as an
                // (not-)exists predicate.
                let join_kind = if negated { JoinKind::Anti } else { JoinKind::Inner };
                let jc = ast.join_condition(
                    expr,
                    CorrelationKey::Column(Position::Subject),
                    join_kind,
                )?;
                ast.attach(parent, jc)?;
            }
            _ => process_comparison_root(ast, state, parent, expr, negated)?,
        }
    }

    Ok(root)
}

/// Strips a run of `Not` wrappers, detaching as it goes, and reports the
/// resulting negation parity.
fn strip_negation(ast: &mut Ast, mut expr: NodeId) -> (NodeId, bool) {
    let mut negated = false;
    while matches!(ast.kind(expr), NodeKind::Not) {
        let inner = ast.args(expr)[0];
        ast.detach(inner);
        negated = !negated;
        expr = inner;
    }
    (expr, negated)
}

/// Allocates (or reuses) the resource-set group for an `And`/`Or` node.
///
/// A nested group of the same kind as its parent is flattened into the
/// parent. Odd negation parity interposes an `Except` above the new group.
fn resource_group(
    ast: &mut Ast,
    parent: NodeId,
    kind: &NodeKind,
    negated: bool,
) -> RewriteResult<NodeId> {
    let wants_join = matches!(kind, NodeKind::And);
    let parent_matches = match ast.kind(parent) {
        NodeKind::Join => wants_join,
        NodeKind::Union => !wants_join,
        _ => false,
    };
    if parent_matches && !negated {
        trace!(parent = %parent, "flattening nested group");
        return Ok(parent);
    }

    let group = if wants_join { ast.join() } else { ast.union() };
    let attach_point = if negated {
        let except = ast.except();
        let jc = ast.join_condition(
            group,
            CorrelationKey::Column(Position::Subject),
            JoinKind::Inner,
        )?;
        ast.attach(except, jc)?;
        except
    } else {
        group
    };
    let jc = ast.join_condition(
        attach_point,
        CorrelationKey::Column(Position::Subject),
        JoinKind::Inner,
    )?;
    ast.attach(parent, jc)?;
    Ok(group)
}

/// A projection occurrence together with its compiled filter chain.
struct CompiledRef {
    source: NodeId,
    chain: FilterChain,
}

/// Handles one comparison root: a leaf predicate destined for `parent`.
fn process_comparison_root(
    ast: &mut Ast,
    state: &mut RewriteState,
    parent: NodeId,
    root: NodeId,
    negated: bool,
) -> RewriteResult<()> {
    let mut projects: Vec<NodeId> = Vec::new();
    let mut labels: Vec<(String, Vec<NodeId>)> = Vec::new();
    collect_refs(ast, root, &mut projects, &mut labels);

    match labels.len() {
        0 => {
            let root = apply_negation(ast, root, negated)?;
            let chains = compile_chains(ast, state, &projects)?;
            if let [only] = chains.as_slice() {
                if only.chain.single {
                    consolidate(ast, root, only)?;
                    attach_op(
                        ast,
                        parent,
                        only.chain.root,
                        CorrelationKey::Column(Position::Subject),
                        JoinKind::Inner,
                    )?;
                    return Ok(());
                }
            }
            for compiled in &chains {
                attach_op(
                    ast,
                    parent,
                    compiled.chain.root,
                    CorrelationKey::Column(Position::Subject),
                    JoinKind::Inner,
                )?;
            }
            let filter = ast.filter(vec![root])?;
            attach_op(
                ast,
                parent,
                filter,
                CorrelationKey::Column(Position::Subject),
                JoinKind::Inner,
            )?;
        }
        1 => {
            let (name, occurrences) = labels.remove(0);
            if !negated && subject_label_declaration(ast, root, &name) {
                debug!(label = %name, join = %parent, "label declaration");
                state.declare(ast, &name, parent)?;
                return Ok(());
            }

            let root = apply_negation(ast, root, negated)?;
            let chains = compile_chains(ast, state, &projects)?;
            // The comparison becomes self-referential on the current join:
            // the label occurrence turns into the subject projection in
            // place, preserving its recorded parent linkage.
            for &occurrence in &occurrences {
                ast.retype(
                    occurrence,
                    NodeKind::Project {
                        path: vec![ProjectStep::Column(Position::Subject)],
                        varref: None,
                    },
                );
            }

            let op = match chains.as_slice() {
                [only] if only.chain.single => {
                    // Consolidated form: the single supporting filter carries
                    // the correlation, keyed by its own exported binding.
                    let key = CorrelationKey::Label(only.chain.binding.clone());
                    attach_op(ast, parent, only.chain.root, key, JoinKind::Inner)?;
                    only.chain.outer_filter
                }
                _ => {
                    for compiled in &chains {
                        attach_op(
                            ast,
                            parent,
                            compiled.chain.root,
                            CorrelationKey::Column(Position::Subject),
                            JoinKind::Inner,
                        )?;
                    }
                    let filter = ast.filter(vec![root])?;
                    attach_op(
                        ast,
                        parent,
                        filter,
                        CorrelationKey::Column(Position::Subject),
                        JoinKind::Inner,
                    )?;
                    filter
                }
            };
            trace!(label = %name, "deferring label cross-reference");
            state.push_pending(parent, PendingRef::LabelRef { label: name, op, predicate: root });
        }
        2 => {
            if negated {
                return Err(RewriteError::UnsupportedCorrelation(
                    "negated two-label comparison".to_string(),
                ));
            }
            let (left, right, transitive) = two_label_equality(ast, root)?;
            trace!(left = %left, right = %right, "deferring label pair");
            state.push_pending(parent, PendingRef::LabelPair { left, right, transitive });
        }
        n => {
            return Err(RewriteError::UnsupportedCorrelation(format!(
                "{n} distinct labels in one comparison"
            )));
        }
    }
    Ok(())
}

/// Wraps a detached predicate in `Not` when parity was odd.
fn apply_negation(ast: &mut Ast, root: NodeId, negated: bool) -> RewriteResult<NodeId> {
    if negated {
        ast.not(root)
    } else {
        Ok(root)
    }
}

/// Wraps `op` in a join condition and attaches it to `parent`.
fn attach_op(
    ast: &mut Ast,
    parent: NodeId,
    op: NodeId,
    key: CorrelationKey,
    kind: JoinKind,
) -> RewriteResult<()> {
    let jc = ast.join_condition(op, key, kind)?;
    ast.attach(parent, jc)
}

/// Collects projection and label references in a comparison subtree,
/// not descending into nested resource-set operators.
fn collect_refs(
    ast: &Ast,
    root: NodeId,
    projects: &mut Vec<NodeId>,
    labels: &mut Vec<(String, Vec<NodeId>)>,
) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        match ast.kind(id) {
            kind if kind.is_resource_set() => continue,
            NodeKind::Project { .. } => projects.push(id),
            NodeKind::Label { name } => {
                if let Some((_, occurrences)) = labels.iter_mut().find(|(n, _)| n == name) {
                    occurrences.push(id);
                } else {
                    labels.push((name.clone(), vec![id]));
                }
            }
            _ => {}
        }
        for &child in ast.args(id).iter().rev() {
            stack.push(child);
        }
    }
}

/// Compiles each property-path projection into its filter chain.
fn compile_chains(
    ast: &mut Ast,
    state: &mut RewriteState,
    projects: &[NodeId],
) -> RewriteResult<Vec<CompiledRef>> {
    let mut chains = Vec::new();
    for &source in projects {
        let NodeKind::Project { path, varref } = ast.kind(source).clone() else {
            continue;
        };
        if path.iter().all(|step| matches!(step, ProjectStep::Column(_))) {
            // Bare column projections read the current row directly; there
            // is nothing to scan for.
            continue;
        }
        let chain = project_to_filter_chain(ast, state, &path, varref.as_deref())?;
        chains.push(CompiledRef { source, chain });
    }
    Ok(chains)
}

/// Merges the root predicate into the single supporting projection filter.
///
/// The projection occurrence is retyped to the object column (inside the
/// merged filter, the projected value *is* the scan's object) and the
/// predicate joins the filter's predicate list, so one scan does the work
/// that would otherwise need a self-join.
fn consolidate(ast: &mut Ast, root: NodeId, compiled: &CompiledRef) -> RewriteResult<()> {
    trace!(filter = %compiled.chain.outer_filter, "consolidating root predicate into filter");
    ast.retype(
        compiled.source,
        NodeKind::Project { path: vec![ProjectStep::Column(Position::Object)], varref: None },
    );
    ast.filter_add_predicate(compiled.chain.outer_filter, root)
}

/// Recognizes the declaration form `subject == <label>` (either order).
fn subject_label_declaration(ast: &Ast, root: NodeId, name: &str) -> bool {
    if !matches!(ast.kind(root), NodeKind::Eq) {
        return false;
    }
    let args = ast.args(root);
    if args.len() != 2 {
        return false;
    }
    let is_label = |id: NodeId| matches!(ast.kind(id), NodeKind::Label { name: n } if n == name);
    (ast.is_bare_subject(args[0]) && is_label(args[1]))
        || (ast.is_bare_subject(args[1]) && is_label(args[0]))
}

/// Recognizes `label_a == label_b`, optionally through one level of a
/// declared recursive-closure marker on either side.
fn two_label_equality(ast: &Ast, root: NodeId) -> RewriteResult<(String, String, bool)> {
    let unsupported = || {
        RewriteError::UnsupportedCorrelation(
            "a two-label comparison must be a plain equality of labels".to_string(),
        )
    };
    if !matches!(ast.kind(root), NodeKind::Eq) {
        return Err(unsupported());
    }
    let args = ast.args(root);
    if args.len() != 2 {
        return Err(unsupported());
    }
    let left = label_side(ast, args[0]).ok_or_else(unsupported)?;
    let right = label_side(ast, args[1]).ok_or_else(unsupported)?;
    Ok((left.0, right.0, left.1 || right.1))
}

/// Reads one side of a two-label equality: a label, or the recursive-closure
/// marker applied to exactly one label.
fn label_side(ast: &Ast, id: NodeId) -> Option<(String, bool)> {
    match ast.kind(id) {
        NodeKind::Label { name } => Some((name.clone(), false)),
        NodeKind::Func { sig, .. } if sig.recursive_closure => {
            let args = ast.args(id);
            if let [only] = args {
                if let NodeKind::Label { name } = ast.kind(*only) {
                    return Some((name.clone(), true));
                }
            }
            None
        }
        _ => None,
    }
}
