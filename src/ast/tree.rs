//! The arena that owns a query operator tree.
//!
//! Nodes are stored by index in a vector and addressed by [`NodeId`] handles.
//! Parent links are plain indices with no ownership implication, so the
//! single-parent invariant is enforced at the attachment points rather than
//! defended by a scan on every reassignment: a node can only be attached
//! while detached, and an attach that would make a node its own ancestor
//! fails with [`RewriteError::CyclicTree`].

// Allow long impl - the arena carries the whole construction surface
#![allow(clippy::too_many_lines)]
// Allow missing_const_for_fn - const fn with Vec isn't stable
#![allow(clippy::missing_const_for_fn)]

use crate::error::{RewriteError, RewriteResult};

use super::node::{
    CmpOp, ConstructShape, CorrelationKey, EmptyPolicy, FuncSig, Node, NodeId, NodeKind, Position,
    ProjectStep, SingletonPolicy, Value,
};

/// An arena-backed query operator tree.
///
/// One `Ast` holds every node of one query, both the parsed form and the
/// nodes synthesized during rewriting. Detached nodes stay in the arena (ids
/// are never invalidated); whether a node is part of the live tree is decided
/// by reachability from the root the caller holds.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Returns the number of allocated node slots (live and detached).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the variant of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    /// Returns the ordered children of a node.
    #[must_use]
    pub fn args(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].args
    }

    /// Returns the parent of a node, if attached.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Iterates over every allocated node id, live or detached.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.nodes.len() as u32;
        (0..len).map(NodeId)
    }

    /// Returns true for `Join`/`Union`/`Except` nodes.
    #[must_use]
    pub fn is_resource_set(&self, id: NodeId) -> bool {
        self.kind(id).is_resource_set()
    }

    // ========== Allocation ==========

    /// Allocates a node without validation, wiring child parent links.
    fn push_node(&mut self, kind: NodeKind, args: Vec<NodeId>) -> NodeId {
        #[allow(clippy::cast_possible_truncation)]
        let id = NodeId(self.nodes.len() as u32);
        for &arg in &args {
            self.nodes[arg.index()].parent = Some(id);
        }
        self.nodes.push(Node { kind, parent: None, args });
        id
    }

    /// Allocates a node with the given children.
    ///
    /// Every child must be detached, and must be a variant the parent
    /// accepts; otherwise the call fails with
    /// [`RewriteError::MalformedAst`].
    pub fn add(&mut self, kind: NodeKind, args: Vec<NodeId>) -> RewriteResult<NodeId> {
        for &arg in &args {
            if self.parent(arg).is_some() {
                return Err(RewriteError::MalformedAst(format!(
                    "{} is already attached and cannot be adopted by a new {}",
                    self.kind(arg).name(),
                    kind.name()
                )));
            }
            Self::check_accepts(&kind, self.kind(arg))?;
        }
        Ok(self.push_node(kind, args))
    }

    /// Checks the child-variant rules for one parent/child pair.
    fn check_accepts(parent: &NodeKind, child: &NodeKind) -> RewriteResult<()> {
        let ok = match parent {
            NodeKind::Join | NodeKind::Union | NodeKind::Except => {
                matches!(child, NodeKind::JoinCondition { .. } | NodeKind::Filter { .. })
                    || child.is_resource_set()
            }
            NodeKind::JoinCondition { .. } => {
                matches!(child, NodeKind::Filter { .. }) || child.is_resource_set()
            }
            NodeKind::Filter { .. } => child.is_expression(),
            NodeKind::And
            | NodeKind::Or
            | NodeKind::Not
            | NodeKind::Eq
            | NodeKind::Cmp { .. }
            | NodeKind::In
            | NodeKind::IsNull
            | NodeKind::Func { .. } => {
                child.is_expression()
                    || child.is_resource_set()
                    || matches!(child, NodeKind::Filter { .. })
            }
            NodeKind::Construct { .. } => {
                matches!(child, NodeKind::ConstructProp { .. } | NodeKind::ConstructSubject)
            }
            NodeKind::ConstructProp { .. } => {
                child.is_expression()
                    || matches!(child, NodeKind::Select { .. } | NodeKind::Construct { .. })
            }
            NodeKind::ConstructSubject => child.is_expression(),
            NodeKind::GroupBy => matches!(child, NodeKind::Project { .. }),
            NodeKind::OrderBy => matches!(child, NodeKind::SortExp { .. }),
            NodeKind::SortExp { .. } => child.is_expression(),
            NodeKind::Select { .. } => {
                matches!(
                    child,
                    NodeKind::Construct { .. } | NodeKind::GroupBy | NodeKind::OrderBy
                ) || child.is_expression()
                    || child.is_resource_set()
            }
            NodeKind::Label { .. } | NodeKind::Constant { .. } | NodeKind::Project { .. } => false,
        };
        if ok {
            Ok(())
        } else {
            Err(RewriteError::MalformedAst(format!(
                "{} cannot hold a {} child",
                parent.name(),
                child.name()
            )))
        }
    }

    // ========== Leaf Constructors ==========

    /// Creates a constant.
    pub fn constant(&mut self, value: Value) -> NodeId {
        self.push_node(NodeKind::Constant { value }, vec![])
    }

    /// Creates a label reference.
    pub fn label(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Label { name: name.into() }, vec![])
    }

    /// Creates a projection from a path.
    pub fn project(&mut self, path: Vec<ProjectStep>, varref: Option<String>) -> NodeId {
        self.push_node(NodeKind::Project { path, varref }, vec![])
    }

    /// Creates a projection over dotted property names.
    pub fn property_project(&mut self, names: &[&str], varref: Option<&str>) -> NodeId {
        let path = names.iter().map(|n| ProjectStep::Property((*n).to_string())).collect();
        self.project(path, varref.map(ToString::to_string))
    }

    /// Creates a projection of a fixed statement column.
    pub fn column_project(&mut self, position: Position) -> NodeId {
        self.project(vec![ProjectStep::Column(position)], None)
    }

    /// Creates the bare subject projection.
    pub fn subject_project(&mut self) -> NodeId {
        self.column_project(Position::Subject)
    }

    // ========== Expression Constructors ==========

    /// Creates an n-ary conjunction.
    pub fn and(&mut self, operands: Vec<NodeId>) -> RewriteResult<NodeId> {
        self.add(NodeKind::And, operands)
    }

    /// Creates an n-ary disjunction.
    pub fn or(&mut self, operands: Vec<NodeId>) -> RewriteResult<NodeId> {
        self.add(NodeKind::Or, operands)
    }

    /// Creates a negation.
    pub fn not(&mut self, operand: NodeId) -> RewriteResult<NodeId> {
        self.add(NodeKind::Not, vec![operand])
    }

    /// Creates an equality comparison.
    pub fn eq(&mut self, left: NodeId, right: NodeId) -> RewriteResult<NodeId> {
        self.add(NodeKind::Eq, vec![left, right])
    }

    /// Creates an ordering comparison.
    pub fn cmp(&mut self, op: CmpOp, left: NodeId, right: NodeId) -> RewriteResult<NodeId> {
        self.add(NodeKind::Cmp { op }, vec![left, right])
    }

    /// Creates a membership test: `needle` followed by its candidates.
    pub fn in_list(&mut self, needle: NodeId, candidates: Vec<NodeId>) -> RewriteResult<NodeId> {
        let mut args = vec![needle];
        args.extend(candidates);
        self.add(NodeKind::In, args)
    }

    /// Creates a null test.
    pub fn is_null(&mut self, operand: NodeId) -> RewriteResult<NodeId> {
        self.add(NodeKind::IsNull, vec![operand])
    }

    /// Creates an extension function call.
    pub fn func(
        &mut self,
        name: impl Into<String>,
        sig: FuncSig,
        args: Vec<NodeId>,
    ) -> RewriteResult<NodeId> {
        self.add(NodeKind::Func { name: name.into(), sig }, args)
    }

    // ========== Relational Constructors ==========

    /// Creates an empty join.
    pub fn join(&mut self) -> NodeId {
        self.push_node(NodeKind::Join, vec![])
    }

    /// Creates an empty union.
    pub fn union(&mut self) -> NodeId {
        self.push_node(NodeKind::Union, vec![])
    }

    /// Creates an empty set difference.
    pub fn except(&mut self) -> NodeId {
        self.push_node(NodeKind::Except, vec![])
    }

    /// Creates a filter over the given predicates, exporting no labels.
    pub fn filter(&mut self, predicates: Vec<NodeId>) -> RewriteResult<NodeId> {
        self.add(NodeKind::Filter { labels: Vec::new() }, predicates)
    }

    /// Creates a join condition wrapping `op` with an explicit correlation.
    ///
    /// `op` must be a detached filter or resource-set operator.
    pub fn join_condition(
        &mut self,
        op: NodeId,
        key: CorrelationKey,
        kind: super::node::JoinKind,
    ) -> RewriteResult<NodeId> {
        self.add(NodeKind::JoinCondition { key, kind, transitive: false }, vec![op])
    }

    /// Creates a join condition whose correlation is derived from a
    /// predicate.
    ///
    /// The predicate must be a simple equality against the subject position
    /// of one side; anything else fails with
    /// [`RewriteError::UnsupportedJoin`].
    pub fn join_condition_from(
        &mut self,
        op: NodeId,
        predicate: NodeId,
    ) -> RewriteResult<NodeId> {
        let (binding, position) = self.correlation_from_predicate(predicate)?;
        let key = match binding {
            Some(name) => CorrelationKey::Label(name),
            None => CorrelationKey::Column(position),
        };
        self.join_condition(op, key, super::node::JoinKind::Inner)
    }

    /// Extracts the correlation a predicate describes.
    ///
    /// Returns the named binding of the non-subject side (when it has one)
    /// and the statement column it reads.
    pub(crate) fn correlation_from_predicate(
        &self,
        predicate: NodeId,
    ) -> RewriteResult<(Option<String>, Position)> {
        if !matches!(self.kind(predicate), NodeKind::Eq) {
            return Err(RewriteError::UnsupportedJoin(format!(
                "correlation predicate is a {}",
                self.kind(predicate).name()
            )));
        }
        let args = self.args(predicate);
        if args.len() != 2 {
            return Err(RewriteError::UnsupportedJoin(
                "correlation equality must have exactly two operands".to_string(),
            ));
        }
        let (a, b) = (args[0], args[1]);
        let other = if self.is_bare_subject(a) {
            b
        } else if self.is_bare_subject(b) {
            a
        } else {
            return Err(RewriteError::UnsupportedJoin(
                "correlation predicate must compare against the subject position".to_string(),
            ));
        };
        match self.kind(other) {
            NodeKind::Project { path, varref } => match path.first() {
                Some(ProjectStep::Property(name)) => {
                    let binding = varref.clone().unwrap_or_else(|| name.clone());
                    Ok((Some(binding), Position::Object))
                }
                Some(ProjectStep::Column(pos)) => Ok((None, *pos)),
                None => Err(RewriteError::UnsupportedJoin(
                    "correlation projection has an empty path".to_string(),
                )),
            },
            NodeKind::Label { name } => Ok((Some(name.clone()), Position::Subject)),
            kind => Err(RewriteError::UnsupportedJoin(format!(
                "cannot correlate through a {}",
                kind.name()
            ))),
        }
    }

    /// Returns true if the node is the bare subject projection.
    #[must_use]
    pub fn is_bare_subject(&self, id: NodeId) -> bool {
        matches!(
            self.kind(id),
            NodeKind::Project { path, .. }
                if matches!(path.as_slice(), [ProjectStep::Column(Position::Subject)])
        )
    }

    // ========== Construct / Select Constructors ==========

    /// Creates a construction template.
    pub fn construct(
        &mut self,
        shape: ConstructShape,
        children: Vec<NodeId>,
    ) -> RewriteResult<NodeId> {
        self.add(NodeKind::Construct { shape }, children)
    }

    /// Creates a construction subject declaration.
    pub fn construct_subject(&mut self, value: NodeId) -> RewriteResult<NodeId> {
        self.add(NodeKind::ConstructSubject, vec![value])
    }

    /// Creates a construction property with a static name.
    pub fn construct_prop(
        &mut self,
        name: impl Into<String>,
        value: NodeId,
        empty: EmptyPolicy,
        singleton: SingletonPolicy,
    ) -> RewriteResult<NodeId> {
        self.add(
            NodeKind::ConstructProp { name: Some(name.into()), empty, singleton },
            vec![value],
        )
    }

    /// Creates a construction property whose name is data-dependent.
    pub fn construct_prop_dynamic(
        &mut self,
        name_expr: NodeId,
        value: NodeId,
        empty: EmptyPolicy,
        singleton: SingletonPolicy,
    ) -> RewriteResult<NodeId> {
        self.add(NodeKind::ConstructProp { name: None, empty, singleton }, vec![name_expr, value])
    }

    /// Returns a construction property's value child.
    #[must_use]
    pub fn prop_value(&self, prop: NodeId) -> NodeId {
        let args = self.args(prop);
        match self.kind(prop) {
            NodeKind::ConstructProp { name: None, .. } => args[1],
            _ => args[0],
        }
    }

    /// Returns a construction property's name expression, when dynamic.
    #[must_use]
    pub fn prop_name_expr(&self, prop: NodeId) -> Option<NodeId> {
        match self.kind(prop) {
            NodeKind::ConstructProp { name: None, .. } => self.args(prop).first().copied(),
            _ => None,
        }
    }

    /// Creates a group-by directive over projections.
    pub fn group_by(&mut self, projections: Vec<NodeId>) -> RewriteResult<NodeId> {
        self.add(NodeKind::GroupBy, projections)
    }

    /// Creates an order-by directive over sort terms.
    pub fn order_by(&mut self, terms: Vec<NodeId>) -> RewriteResult<NodeId> {
        self.add(NodeKind::OrderBy, terms)
    }

    /// Creates one sort term.
    pub fn sort_exp(&mut self, projection: NodeId, ascending: bool) -> RewriteResult<NodeId> {
        self.add(NodeKind::SortExp { ascending }, vec![projection])
    }

    /// Creates a select over a construction and an optional where expression.
    pub fn select(
        &mut self,
        construct: NodeId,
        where_expr: Option<NodeId>,
    ) -> RewriteResult<NodeId> {
        let mut args = vec![construct];
        let has_where = where_expr.is_some();
        if let Some(w) = where_expr {
            args.push(w);
        }
        self.add(
            NodeKind::Select {
                has_where,
                has_group_by: false,
                has_order_by: false,
                limit: None,
                offset: None,
                depth: None,
            },
            args,
        )
    }

    /// Returns a select's construction child.
    #[must_use]
    pub fn select_construct(&self, select: NodeId) -> NodeId {
        self.args(select)[0]
    }

    /// Returns a select's where child, if present.
    #[must_use]
    pub fn select_where(&self, select: NodeId) -> Option<NodeId> {
        match self.kind(select) {
            NodeKind::Select { has_where: true, .. } => self.args(select).get(1).copied(),
            _ => None,
        }
    }

    /// Returns a select's group-by child, if present.
    #[must_use]
    pub fn select_group_by(&self, select: NodeId) -> Option<NodeId> {
        match self.kind(select) {
            NodeKind::Select { has_where, has_group_by: true, .. } => {
                self.args(select).get(1 + usize::from(*has_where)).copied()
            }
            _ => None,
        }
    }

    /// Returns a select's order-by child, if present.
    #[must_use]
    pub fn select_order_by(&self, select: NodeId) -> Option<NodeId> {
        match self.kind(select) {
            NodeKind::Select { has_where, has_group_by, has_order_by: true, .. } => {
                self.args(select).get(1 + usize::from(*has_where) + usize::from(*has_group_by)).copied()
            }
            _ => None,
        }
    }

    /// Detaches and returns a select's where child, clearing the slot.
    pub fn take_select_where(&mut self, select: NodeId) -> Option<NodeId> {
        match self.kind(select) {
            NodeKind::Select { has_where: true, .. } => {}
            _ => return None,
        }
        let taken = self.nodes[select.index()].args.remove(1);
        self.nodes[taken.index()].parent = None;
        if let NodeKind::Select { has_where, .. } = &mut self.nodes[select.index()].kind {
            *has_where = false;
        }
        Some(taken)
    }

    /// Replaces (or installs) a select's where child.
    ///
    /// The new expression must be detached. Any previous where child is
    /// detached and left in the arena.
    pub fn set_select_where(&mut self, select: NodeId, new_where: NodeId) -> RewriteResult<()> {
        if self.parent(new_where).is_some() {
            return Err(RewriteError::MalformedAst(
                "replacement where expression is already attached".to_string(),
            ));
        }
        let NodeKind::Select { has_where, .. } = self.kind(select) else {
            return Err(RewriteError::MalformedAst(format!(
                "set_select_where on a {}",
                self.kind(select).name()
            )));
        };
        Self::check_accepts(self.kind(select), self.kind(new_where))?;
        if *has_where {
            let old = self.args(select)[1];
            self.nodes[old.index()].parent = None;
            self.nodes[select.index()].args[1] = new_where;
        } else {
            self.nodes[select.index()].args.insert(1, new_where);
            if let NodeKind::Select { has_where, .. } = &mut self.nodes[select.index()].kind {
                *has_where = true;
            }
        }
        self.nodes[new_where.index()].parent = Some(select);
        Ok(())
    }

    /// Attaches a group-by directive to a select.
    pub fn select_set_group_by(&mut self, select: NodeId, group_by: NodeId) -> RewriteResult<()> {
        if self.parent(group_by).is_some() {
            return Err(RewriteError::MalformedAst("group-by is already attached".to_string()));
        }
        let NodeKind::Select { has_where, has_group_by, .. } = self.kind(select) else {
            return Err(RewriteError::MalformedAst(format!(
                "select_set_group_by on a {}",
                self.kind(select).name()
            )));
        };
        if *has_group_by {
            return Err(RewriteError::MalformedAst("select already has a group-by".to_string()));
        }
        let at = 1 + usize::from(*has_where);
        self.nodes[select.index()].args.insert(at, group_by);
        self.nodes[group_by.index()].parent = Some(select);
        if let NodeKind::Select { has_group_by, .. } = &mut self.nodes[select.index()].kind {
            *has_group_by = true;
        }
        Ok(())
    }

    /// Attaches an order-by directive to a select.
    pub fn select_set_order_by(&mut self, select: NodeId, order_by: NodeId) -> RewriteResult<()> {
        if self.parent(order_by).is_some() {
            return Err(RewriteError::MalformedAst("order-by is already attached".to_string()));
        }
        let NodeKind::Select { has_where, has_group_by, has_order_by, .. } = self.kind(select)
        else {
            return Err(RewriteError::MalformedAst(format!(
                "select_set_order_by on a {}",
                self.kind(select).name()
            )));
        };
        if *has_order_by {
            return Err(RewriteError::MalformedAst("select already has an order-by".to_string()));
        }
        let at = 1 + usize::from(*has_where) + usize::from(*has_group_by);
        self.nodes[select.index()].args.insert(at, order_by);
        self.nodes[order_by.index()].parent = Some(select);
        if let NodeKind::Select { has_order_by, .. } = &mut self.nodes[select.index()].kind {
            *has_order_by = true;
        }
        Ok(())
    }

    /// Sets a select's limit, offset, and recursion depth.
    pub fn select_set_limits(
        &mut self,
        select: NodeId,
        limit: Option<u64>,
        offset: Option<u64>,
        depth: Option<u32>,
    ) -> RewriteResult<()> {
        if let NodeKind::Select { limit: l, offset: o, depth: d, .. } =
            &mut self.nodes[select.index()].kind
        {
            *l = limit;
            *o = offset;
            *d = depth;
            Ok(())
        } else {
            Err(RewriteError::MalformedAst(format!(
                "select_set_limits on a {}",
                self.kind(select).name()
            )))
        }
    }

    // ========== Filter Label Exports ==========

    /// Returns the labels a filter exports.
    #[must_use]
    pub fn filter_labels(&self, filter: NodeId) -> &[(String, Position)] {
        match self.kind(filter) {
            NodeKind::Filter { labels } => labels,
            _ => &[],
        }
    }

    /// Exports a named column on a filter. Re-exporting an existing name is
    /// a no-op.
    pub fn export_label(&mut self, filter: NodeId, name: &str, position: Position) {
        if let NodeKind::Filter { labels } = &mut self.nodes[filter.index()].kind {
            if !labels.iter().any(|(n, _)| n == name) {
                labels.push((name.to_string(), position));
            }
        }
    }

    /// Appends a predicate to a filter.
    pub fn filter_add_predicate(&mut self, filter: NodeId, predicate: NodeId) -> RewriteResult<()> {
        if !matches!(self.kind(filter), NodeKind::Filter { .. }) {
            return Err(RewriteError::MalformedAst(format!(
                "filter_add_predicate on a {}",
                self.kind(filter).name()
            )));
        }
        if self.parent(predicate).is_some() {
            return Err(RewriteError::MalformedAst(
                "predicate is already attached".to_string(),
            ));
        }
        Self::check_accepts(self.kind(filter), self.kind(predicate))?;
        self.nodes[filter.index()].args.push(predicate);
        self.nodes[predicate.index()].parent = Some(filter);
        Ok(())
    }

    // ========== Tree Surgery ==========

    /// Attaches a detached node as the last child of a parent.
    ///
    /// Fails with [`RewriteError::CyclicTree`] when the parent lies inside
    /// the child's own subtree, and with [`RewriteError::MalformedAst`] when
    /// the child is still attached elsewhere or is a variant the parent does
    /// not accept.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> RewriteResult<()> {
        if self.parent(child).is_some() {
            return Err(RewriteError::MalformedAst(format!(
                "{} is already attached",
                self.kind(child).name()
            )));
        }
        if parent == child || self.subtree_contains(child, parent) {
            return Err(RewriteError::CyclicTree);
        }
        Self::check_accepts(self.kind(parent), self.kind(child))?;
        self.nodes[parent.index()].args.push(child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    /// Detaches a node from its parent. A detached node is a no-op.
    ///
    /// Selects track their optional children positionally; use
    /// [`Ast::take_select_where`] to remove a where child so the slot
    /// bookkeeping stays consistent.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            self.nodes[parent.index()].args.retain(|&c| c != child);
            self.nodes[child.index()].parent = None;
        }
    }

    /// Replaces the child at `index` under `parent`, returning the old child
    /// (now detached).
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        index: usize,
        new_child: NodeId,
    ) -> RewriteResult<NodeId> {
        if self.parent(new_child).is_some() {
            return Err(RewriteError::MalformedAst(
                "replacement child is already attached".to_string(),
            ));
        }
        if parent == new_child || self.subtree_contains(new_child, parent) {
            return Err(RewriteError::CyclicTree);
        }
        Self::check_accepts(self.kind(parent), self.kind(new_child))?;
        let Some(&old) = self.args(parent).get(index) else {
            return Err(RewriteError::MalformedAst(format!(
                "{} has no child at index {index}",
                self.kind(parent).name()
            )));
        };
        self.nodes[old.index()].parent = None;
        self.nodes[parent.index()].args[index] = new_child;
        self.nodes[new_child.index()].parent = Some(parent);
        Ok(old)
    }

    /// Changes a node's variant in place, keeping its slot, parent link, and
    /// children.
    ///
    /// This is how a `Label` occurrence becomes a `Project` during rewriting
    /// without disturbing any recorded parent linkage. The caller is
    /// responsible for the new variant accepting the node's existing
    /// children.
    pub fn retype(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    /// Returns true if `needle` lies in the subtree rooted at `root`
    /// (including `root` itself).
    #[must_use]
    pub fn subtree_contains(&self, root: NodeId, needle: NodeId) -> bool {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if id == needle {
                return true;
            }
            stack.extend_from_slice(self.args(id));
        }
        false
    }

    /// Copies a subtree into fresh arena slots, returning the detached copy.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.index()].kind.clone();
        let args: Vec<NodeId> = self.args(id).to_vec();
        let cloned: Vec<NodeId> = args.into_iter().map(|a| self.deep_clone(a)).collect();
        self.push_node(kind, cloned)
    }

    // ========== Structural Queries ==========

    /// Structural equality over two subtrees.
    ///
    /// Two nodes are equal iff they have the same variant (including its
    /// attributes) and pairwise-equal children, except the commutative
    /// operators `And`, `Or`, and `Eq`, which also accept any permutation of
    /// equal children.
    #[must_use]
    pub fn structural_eq(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        if self.kind(a) != self.kind(b) {
            return false;
        }
        let (xs, ys) = (self.args(a), self.args(b));
        if xs.len() != ys.len() {
            return false;
        }
        if xs.iter().zip(ys.iter()).all(|(&x, &y)| self.structural_eq(x, y)) {
            return true;
        }
        if !self.kind(a).is_commutative() {
            return false;
        }
        let mut used = vec![false; ys.len()];
        'outer: for &x in xs {
            for (i, &y) in ys.iter().enumerate() {
                if !used[i] && self.structural_eq(x, y) {
                    used[i] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }

    /// Reports whether a subtree's value depends only on the current row.
    ///
    /// Constants are independent; labels and projections are not, since both
    /// implicitly depend on join context. Function calls are independent when
    /// the signature is pure and context-free and every argument is
    /// independent.
    #[must_use]
    pub fn is_independent(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Constant { .. } => true,
            NodeKind::Label { .. } | NodeKind::Project { .. } => false,
            NodeKind::Func { sig, .. } => {
                sig.pure
                    && !sig.needs_context
                    && self.args(id).iter().all(|&a| self.is_independent(a))
            }
            NodeKind::And
            | NodeKind::Or
            | NodeKind::Not
            | NodeKind::Eq
            | NodeKind::Cmp { .. }
            | NodeKind::In
            | NodeKind::IsNull => self.args(id).iter().all(|&a| self.is_independent(a)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::node::JoinKind;
    use super::*;

    #[test]
    fn eq_commutes() {
        let mut ast = Ast::new();
        let a1 = ast.property_project(&["foo"], None);
        let b1 = ast.constant(Value::Integer(1));
        let e1 = ast.eq(a1, b1).unwrap();

        let b2 = ast.constant(Value::Integer(1));
        let a2 = ast.property_project(&["foo"], None);
        let e2 = ast.eq(b2, a2).unwrap();

        assert!(ast.structural_eq(e1, e2));
    }

    #[test]
    fn cmp_does_not_commute() {
        let mut ast = Ast::new();
        let a1 = ast.constant(Value::Integer(1));
        let b1 = ast.constant(Value::Integer(2));
        let c1 = ast.cmp(CmpOp::Lt, a1, b1).unwrap();

        let a2 = ast.constant(Value::Integer(2));
        let b2 = ast.constant(Value::Integer(1));
        let c2 = ast.cmp(CmpOp::Lt, a2, b2).unwrap();

        assert!(!ast.structural_eq(c1, c2));
    }

    #[test]
    fn and_commutes_n_ary() {
        let mut ast = Ast::new();
        let mk = |ast: &mut Ast, n: i64| {
            let p = ast.subject_project();
            let c = ast.constant(Value::Integer(n));
            ast.eq(p, c).unwrap()
        };
        let (x1, y1, z1) = (mk(&mut ast, 1), mk(&mut ast, 2), mk(&mut ast, 3));
        let and1 = ast.and(vec![x1, y1, z1]).unwrap();
        let (z2, x2, y2) = (mk(&mut ast, 3), mk(&mut ast, 1), mk(&mut ast, 2));
        let and2 = ast.and(vec![z2, x2, y2]).unwrap();
        assert!(ast.structural_eq(and1, and2));
    }

    #[test]
    fn join_rejects_constant_child() {
        let mut ast = Ast::new();
        let c = ast.constant(Value::Boolean(true));
        let err = ast.add(NodeKind::Join, vec![c]).unwrap_err();
        assert!(matches!(err, RewriteError::MalformedAst(_)));
    }

    #[test]
    fn join_condition_from_non_equality() {
        let mut ast = Ast::new();
        let subj = ast.subject_project();
        let c = ast.constant(Value::Integer(5));
        let gt = ast.cmp(CmpOp::Gt, subj, c).unwrap();
        let p = ast.column_project(Position::Predicate);
        let name = ast.constant(Value::String("age".to_string()));
        let pred = ast.eq(p, name).unwrap();
        let f = ast.filter(vec![pred]).unwrap();
        let err = ast.join_condition_from(f, gt).unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedJoin(_)));
    }

    #[test]
    fn join_condition_from_property_equality() {
        let mut ast = Ast::new();
        let subj = ast.subject_project();
        let prop = ast.property_project(&["child"], None);
        let pred = ast.eq(prop, subj).unwrap();
        let p = ast.column_project(Position::Predicate);
        let name = ast.constant(Value::String("child".to_string()));
        let scan_pred = ast.eq(p, name).unwrap();
        let f = ast.filter(vec![scan_pred]).unwrap();
        let jc = ast.join_condition_from(f, pred).unwrap();
        assert!(matches!(
            ast.kind(jc),
            NodeKind::JoinCondition { key: CorrelationKey::Label(name), .. } if name == "child"
        ));
    }

    #[test]
    fn attach_cycle_detected() {
        let mut ast = Ast::new();
        let inner = ast.join();
        let outer = ast.join();
        let jc = ast
            .join_condition(inner, CorrelationKey::Column(Position::Subject), JoinKind::Inner)
            .unwrap();
        ast.attach(outer, jc).unwrap();

        // Attaching outer anywhere beneath inner would make inner its own
        // ancestor.
        let jc2 = ast
            .join_condition(outer, CorrelationKey::Column(Position::Subject), JoinKind::Inner)
            .unwrap();
        let err = ast.attach(inner, jc2).unwrap_err();
        assert!(matches!(err, RewriteError::CyclicTree));
    }

    #[test]
    fn detach_then_reattach() {
        let mut ast = Ast::new();
        let p = ast.column_project(Position::Predicate);
        let c = ast.constant(Value::String("a".to_string()));
        let pred = ast.eq(p, c).unwrap();
        let f = ast.filter(vec![pred]).unwrap();
        assert_eq!(ast.parent(pred), Some(f));

        ast.detach(pred);
        assert_eq!(ast.parent(pred), None);
        assert!(ast.args(f).is_empty());

        ast.filter_add_predicate(f, pred).unwrap();
        assert_eq!(ast.parent(pred), Some(f));
    }

    #[test]
    fn retype_label_to_project() {
        let mut ast = Ast::new();
        let lab = ast.label("x");
        let c = ast.constant(Value::Integer(1));
        let eq = ast.eq(lab, c).unwrap();

        ast.retype(
            lab,
            NodeKind::Project { path: vec![ProjectStep::Column(Position::Subject)], varref: None },
        );
        assert!(ast.is_bare_subject(lab));
        // Parent linkage survives the retype.
        assert_eq!(ast.parent(lab), Some(eq));
    }

    #[test]
    fn deep_clone_is_detached_and_equal() {
        let mut ast = Ast::new();
        let p = ast.property_project(&["foo"], None);
        let c = ast.constant(Value::String("bar".to_string()));
        let eq = ast.eq(p, c).unwrap();
        let copy = ast.deep_clone(eq);
        assert!(ast.parent(copy).is_none());
        assert_ne!(copy, eq);
        assert!(ast.structural_eq(copy, eq));
    }

    #[test]
    fn independence() {
        let mut ast = Ast::new();
        let c = ast.constant(Value::Integer(1));
        assert!(ast.is_independent(c));

        let lab = ast.label("x");
        assert!(!ast.is_independent(lab));

        let proj = ast.property_project(&["foo"], None);
        assert!(!ast.is_independent(proj));

        let c2 = ast.constant(Value::Integer(2));
        let pure = ast.func("abs", FuncSig::number(), vec![c2]).unwrap();
        assert!(ast.is_independent(pure));

        let c3 = ast.constant(Value::Integer(3));
        let ctx = ast.func("rank", FuncSig::number().with_context(), vec![c3]).unwrap();
        assert!(!ast.is_independent(ctx));
    }

    #[test]
    fn select_slots() {
        let mut ast = Ast::new();
        let construct = ast.construct(ConstructShape::Object, vec![]).unwrap();
        let p = ast.property_project(&["a"], None);
        let c = ast.constant(Value::Integer(1));
        let w = ast.eq(p, c).unwrap();
        let select = ast.select(construct, Some(w)).unwrap();

        assert_eq!(ast.select_construct(select), construct);
        assert_eq!(ast.select_where(select), Some(w));
        assert_eq!(ast.select_group_by(select), None);

        let gp = ast.property_project(&["a"], None);
        let gb = ast.group_by(vec![gp]).unwrap();
        ast.select_set_group_by(select, gb).unwrap();
        assert_eq!(ast.select_group_by(select), Some(gb));

        let sp = ast.property_project(&["a"], None);
        let se = ast.sort_exp(sp, true).unwrap();
        let ob = ast.order_by(vec![se]).unwrap();
        ast.select_set_order_by(select, ob).unwrap();
        assert_eq!(ast.select_order_by(select), Some(ob));
        assert_eq!(ast.select_where(select), Some(w));

        let replacement = ast.join();
        ast.set_select_where(select, replacement).unwrap();
        assert_eq!(ast.select_where(select), Some(replacement));
        assert_eq!(ast.parent(w), None);
        assert_eq!(ast.select_group_by(select), Some(gb));
    }
}
