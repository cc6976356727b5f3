//! Compiling projections into filter chains.
//!
//! A dotted projection `a.b.c` reads: follow property `a`, then `b` of the
//! result, then `c` of that. Against a statement store this is a chain of
//! scans: one filter per property, each scan's subject constrained to the
//! previous scan's object. The links are keyed through synthesized anonymous
//! labels so the evaluator can resolve the slot positions lazily.

use tracing::trace;

use crate::ast::{Ast, CorrelationKey, JoinKind, NodeId, Position, ProjectStep, Value};
use crate::error::{RewriteError, RewriteResult};

use super::state::RewriteState;

/// The compiled form of one projection reference.
#[derive(Debug, Clone)]
pub struct FilterChain {
    /// The attachable root: the single filter, or the join holding the whole
    /// chain when the path has more than one link.
    pub root: NodeId,
    /// The outermost filter (the consolidation target).
    pub outer_filter: NodeId,
    /// The name under which the outer filter exports the projected value
    /// column: the projection's bound variable if it has one, the first
    /// property name otherwise.
    pub binding: String,
    /// True when the chain is a single filter.
    pub single: bool,
}

/// Compiles a projection path into a filter chain.
///
/// Compilation runs right-to-left: the deepest property gets its filter (and
/// its link label) first. Each filter scans statements whose predicate is the
/// property name; each link binds the object side of one filter to the
/// subject side of the next through an anonymous label exported on the outer
/// filter of the link. The outermost link additionally exports the
/// projection's named binding.
pub fn project_to_filter_chain(
    ast: &mut Ast,
    state: &mut RewriteState,
    path: &[ProjectStep],
    varref: Option<&str>,
) -> RewriteResult<FilterChain> {
    let properties: Vec<&str> = path
        .iter()
        .map(|step| match step {
            ProjectStep::Property(name) => Ok(name.as_str()),
            ProjectStep::Column(pos) => Err(RewriteError::MalformedAst(format!(
                "position marker {pos} inside a dotted projection"
            ))),
        })
        .collect::<RewriteResult<_>>()?;
    if properties.is_empty() {
        return Err(RewriteError::MalformedAst("empty projection path".to_string()));
    }

    // One scan per property, outermost first.
    let mut filters = Vec::with_capacity(properties.len());
    for name in &properties {
        let pred = ast.column_project(Position::Predicate);
        let prop = ast.constant(Value::String((*name).to_string()));
        let eq = ast.eq(pred, prop)?;
        filters.push(ast.filter(vec![eq])?);
    }

    // Link labels, synthesized right-to-left: the deepest link first.
    let mut links = vec![String::new(); filters.len().saturating_sub(1)];
    for i in (0..links.len()).rev() {
        let name = state.next_anonymous();
        ast.export_label(filters[i], &name, Position::Object);
        links[i] = name;
    }

    let binding = varref.map_or_else(|| properties[0].to_string(), ToString::to_string);
    ast.export_label(filters[0], &binding, Position::Object);
    trace!(binding = %binding, links = filters.len() - 1, "compiled projection chain");

    if filters.len() == 1 {
        let only = filters[0];
        return Ok(FilterChain { root: only, outer_filter: only, binding, single: true });
    }

    let chain = ast.join();
    let first = ast.join_condition(
        filters[0],
        CorrelationKey::Column(Position::Subject),
        JoinKind::Inner,
    )?;
    ast.attach(chain, first)?;
    for (i, &filter) in filters.iter().enumerate().skip(1) {
        let jc = ast.join_condition(
            filter,
            CorrelationKey::Label(links[i - 1].clone()),
            JoinKind::Inner,
        )?;
        ast.attach(chain, jc)?;
    }

    Ok(FilterChain { root: chain, outer_filter: filters[0], binding, single: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn property_path(names: &[&str]) -> Vec<ProjectStep> {
        names.iter().map(|n| ProjectStep::Property((*n).to_string())).collect()
    }

    #[test]
    fn single_property_is_one_filter() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let chain =
            project_to_filter_chain(&mut ast, &mut state, &property_path(&["foo"]), None).unwrap();

        assert!(chain.single);
        assert_eq!(chain.root, chain.outer_filter);
        assert_eq!(chain.binding, "foo");
        assert_eq!(ast.filter_labels(chain.root), &[("foo".to_string(), Position::Object)]);
        assert_eq!(ast.args(chain.root).len(), 1);
    }

    #[test]
    fn two_level_chain() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let chain = project_to_filter_chain(
            &mut ast,
            &mut state,
            &property_path(&["foo", "bar"]),
            Some("foo"),
        )
        .unwrap();

        assert!(!chain.single);
        assert!(matches!(ast.kind(chain.root), NodeKind::Join));
        let conditions = ast.args(chain.root);
        assert_eq!(conditions.len(), 2);

        // Outer link correlates by subject; inner link through the anonymous
        // label exported on the outer filter.
        assert!(matches!(
            ast.kind(conditions[0]),
            NodeKind::JoinCondition { key: CorrelationKey::Column(Position::Subject), .. }
        ));
        assert!(matches!(
            ast.kind(conditions[1]),
            NodeKind::JoinCondition { key: CorrelationKey::Label(name), .. } if name == "@1"
        ));

        let labels = ast.filter_labels(chain.outer_filter);
        assert!(labels.contains(&("@1".to_string(), Position::Object)));
        assert!(labels.contains(&("foo".to_string(), Position::Object)));
        assert_eq!(chain.binding, "foo");
    }

    #[test]
    fn deep_chain_numbers_links_right_to_left() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let chain =
            project_to_filter_chain(&mut ast, &mut state, &property_path(&["a", "b", "c"]), None)
                .unwrap();

        let conditions: Vec<NodeId> = ast.args(chain.root).to_vec();
        assert_eq!(conditions.len(), 3);
        // The deepest link was synthesized first, so the middle filter
        // exports @1 and the outer filter @2.
        assert!(matches!(
            ast.kind(conditions[1]),
            NodeKind::JoinCondition { key: CorrelationKey::Label(name), .. } if name == "@2"
        ));
        assert!(matches!(
            ast.kind(conditions[2]),
            NodeKind::JoinCondition { key: CorrelationKey::Label(name), .. } if name == "@1"
        ));
    }

    #[test]
    fn bare_column_path_is_rejected() {
        let mut ast = Ast::new();
        let mut state = RewriteState::new();
        let err = project_to_filter_chain(
            &mut ast,
            &mut state,
            &[ProjectStep::Column(Position::Subject)],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RewriteError::MalformedAst(_)));
    }
}
