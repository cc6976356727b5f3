//! Construct-pattern join building.
//!
//! A construction is not just an output template: its property list implies
//! join conditions. A property whose value is itself a query contributes that
//! query's (rewritten) join; a data-dependent property name contributes a
//! name/value equality; a non-trivial projection value contributes its filter
//! chain. The merged expression then goes through the ordinary rewriter.

use tracing::debug;

use crate::ast::{
    Ast, CorrelationKey, EmptyPolicy, JoinKind, NodeId, NodeKind, Position,
};
use crate::error::RewriteResult;

use super::labels::link_labels;
use super::projection::{project_to_filter_chain, FilterChain};
use super::relational::rewrite_expr;
use super::state::RewriteState;

/// Compiles a select in place: folds the construction into the where clause,
/// rewrites the combined expression, links every deferred label reference,
/// and installs the rewritten resource set as the select's where child.
///
/// Group-by, order-by, limit, offset, and depth pass through untouched.
/// Returns the rewritten where root.
pub fn compile_select(
    ast: &mut Ast,
    state: &mut RewriteState,
    select: NodeId,
) -> RewriteResult<NodeId> {
    let construct = ast.select_construct(select);
    let where_expr = ast.take_select_where(select);

    let join = join_from_construct(ast, state, construct, where_expr)?;
    link_labels(ast, state)?;

    // Linking may have re-homed the join under another labeled join; the
    // select owns whatever became the top of that tree.
    let mut root = join;
    while let Some(parent) = ast.parent(root) {
        root = parent;
    }
    ast.set_select_where(select, root)?;
    debug!(select = %select, root = %root, "select compiled");
    Ok(root)
}

/// Derives the implicit join expression of a construction, merges it with
/// the explicit where expression, and rewrites the result.
///
/// A construction with no implicit or explicit conditions yields a bare
/// (unconstrained) join. When the construction declares an explicit subject
/// label, the resulting join is registered under that label.
pub fn join_from_construct(
    ast: &mut Ast,
    state: &mut RewriteState,
    construct: NodeId,
    where_expr: Option<NodeId>,
) -> RewriteResult<NodeId> {
    let mut conjuncts: Vec<NodeId> = Vec::new();
    let mut optional_chains: Vec<FilterChain> = Vec::new();
    let subject = subject_label(ast, construct);

    for child in ast.args(construct).to_vec() {
        let NodeKind::ConstructProp { name, empty, .. } = ast.kind(child).clone() else {
            continue;
        };
        let value = ast.prop_value(child);

        // Name-is-filter: a data-dependent property name constrains the
        // matched statements to those whose predicate equals the value.
        if name.is_none() {
            if let Some(name_expr) = ast.prop_name_expr(child) {
                if ast.kind(value).is_expression() {
                    let ne = ast.deep_clone(name_expr);
                    let nv = ast.deep_clone(value);
                    let eq = ast.eq(ne, nv)?;
                    conjuncts.push(eq);
                }
            }
        }

        match ast.kind(value).clone() {
            NodeKind::Select { .. } => {
                let sub_join = fold_nested_select(ast, state, value)?;
                conjuncts.push(sub_join);
            }
            NodeKind::Project { path, varref } => {
                if ast.is_bare_subject(value) {
                    // The trivial projection adds no condition.
                    continue;
                }
                let chain = project_to_filter_chain(ast, state, &path, varref.as_deref())?;
                if matches!(empty, EmptyPolicy::UseNull | EmptyPolicy::UseList) {
                    // Empty-tolerant properties must not constrain the
                    // resource set; they join left-outer after the rewrite.
                    optional_chains.push(chain);
                } else {
                    conjuncts.push(chain.root);
                }
            }
            NodeKind::Label { name: var } => {
                // A variable-valued property binds the variable to the
                // property's value column; the rewriter resolves it like any
                // other label reference.
                if let Some(prop_name) = name {
                    let proj = ast.property_project(&[prop_name.as_str()], None);
                    let lab = ast.label(var);
                    let eq = ast.eq(proj, lab)?;
                    conjuncts.push(eq);
                }
            }
            _ => {}
        }
    }

    let mut exprs: Vec<NodeId> = Vec::new();
    if let Some(w) = where_expr {
        exprs.push(w);
    }
    exprs.append(&mut conjuncts);

    let join = match exprs.len() {
        0 => ast.join(),
        1 => rewrite_expr(ast, state, exprs[0])?,
        _ => {
            // Grow an existing top-level conjunction instead of nesting a
            // new one around it.
            let first = exprs[0];
            let merged = if matches!(ast.kind(first), NodeKind::And) {
                for &extra in &exprs[1..] {
                    ast.attach(first, extra)?;
                }
                first
            } else {
                ast.and(exprs)?
            };
            rewrite_expr(ast, state, merged)?
        }
    };

    let join = if optional_chains.is_empty() {
        join
    } else {
        let host = if matches!(ast.kind(join), NodeKind::Join) {
            join
        } else {
            let wrapper = ast.join();
            let jc = ast.join_condition(
                join,
                CorrelationKey::Column(Position::Subject),
                JoinKind::Inner,
            )?;
            ast.attach(wrapper, jc)?;
            wrapper
        };
        for chain in optional_chains {
            let jc = ast.join_condition(
                chain.root,
                CorrelationKey::Column(Position::Subject),
                JoinKind::LeftOuter,
            )?;
            ast.attach(host, jc)?;
        }
        host
    };

    if let Some(name) = subject {
        state.declare(ast, &name, join)?;
    }
    Ok(join)
}

/// Recursively compiles a select appearing as a construction value.
///
/// The subquery's where clause is rewritten and *moved* into the enclosing
/// expression (the tree is single-parent); the select keeps a label naming
/// the moved join (its declared subject label when it has one, a synthesized
/// anonymous name otherwise) so the evaluator can still find its rows.
fn fold_nested_select(
    ast: &mut Ast,
    state: &mut RewriteState,
    select: NodeId,
) -> RewriteResult<NodeId> {
    let construct = ast.select_construct(select);
    let where_expr = ast.take_select_where(select);

    let sub_join = join_from_construct(ast, state, construct, where_expr)?;

    let name = match subject_label(ast, construct) {
        Some(name) => name,
        None => {
            let anon = state.next_anonymous();
            state.declare(ast, &anon, sub_join)?;
            anon
        }
    };
    let placeholder = ast.label(name);
    ast.set_select_where(select, placeholder)?;
    Ok(sub_join)
}

/// Reads the construction's explicit subject label, if declared.
fn subject_label(ast: &Ast, construct: NodeId) -> Option<String> {
    for &child in ast.args(construct) {
        if matches!(ast.kind(child), NodeKind::ConstructSubject) {
            if let Some(&value) = ast.args(child).first() {
                if let NodeKind::Label { name } = ast.kind(value) {
                    return Some(name.clone());
                }
            }
        }
    }
    None
}
