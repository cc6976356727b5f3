//! Tree traversal.
//!
//! Both traversals are finite, restartable iterator structs over a borrowed
//! arena. Depth-first yields parents before children (pre-order);
//! breadth-first yields strictly by tree depth, shallowest or deepest level
//! first, with ties broken by original sibling order.

use std::collections::VecDeque;

use super::node::NodeId;
use super::tree::Ast;

/// Which end of the depth range a breadth-first traversal starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthOrder {
    /// Shallowest level first (plain level order).
    #[default]
    ShallowFirst,
    /// Deepest level first.
    DeepFirst,
}

/// Pre-order depth-first traversal.
pub struct DepthFirst<'a> {
    ast: &'a Ast,
    stack: Vec<NodeId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        for &child in self.ast.args(id).iter().rev() {
            self.stack.push(child);
        }
        Some(id)
    }
}

/// Level-order breadth-first traversal.
pub struct BreadthFirst<'a> {
    ast: &'a Ast,
    queue: VecDeque<NodeId>,
    // Levels in emit order, populated lazily for deep-first traversal.
    buffered: Vec<NodeId>,
    at: usize,
    order: DepthOrder,
    started: bool,
}

impl Iterator for BreadthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        match self.order {
            DepthOrder::ShallowFirst => {
                let id = self.queue.pop_front()?;
                for &child in self.ast.args(id) {
                    self.queue.push_back(child);
                }
                Some(id)
            }
            DepthOrder::DeepFirst => {
                // The deepest level cannot be known without walking the whole
                // tree, so the first pull materializes the level index.
                if !self.started {
                    self.started = true;
                    let mut levels: Vec<Vec<NodeId>> = Vec::new();
                    let mut current: Vec<NodeId> = self.queue.drain(..).collect();
                    while !current.is_empty() {
                        let mut next = Vec::new();
                        for &id in &current {
                            next.extend_from_slice(self.ast.args(id));
                        }
                        levels.push(current);
                        current = next;
                    }
                    for level in levels.into_iter().rev() {
                        self.buffered.extend(level);
                    }
                }
                let id = *self.buffered.get(self.at)?;
                self.at += 1;
                Some(id)
            }
        }
    }
}

impl Ast {
    /// Iterates the subtree at `root` depth-first, parents before children.
    #[must_use]
    pub fn depth_first(&self, root: NodeId) -> DepthFirst<'_> {
        DepthFirst { ast: self, stack: vec![root] }
    }

    /// Iterates the subtree at `root` strictly by depth.
    #[must_use]
    pub fn breadth_first(&self, root: NodeId, order: DepthOrder) -> BreadthFirst<'_> {
        let mut queue = VecDeque::new();
        queue.push_back(root);
        BreadthFirst { ast: self, queue, buffered: Vec::new(), at: 0, order, started: false }
    }
}

#[cfg(test)]
mod tests {
    use super::super::node::{NodeKind, Value};
    use super::*;

    /// Builds `And(Eq(p1, c1), Eq(p2, c2))` and returns all ids.
    fn sample(ast: &mut Ast) -> (NodeId, [NodeId; 6]) {
        let p1 = ast.property_project(&["a"], None);
        let c1 = ast.constant(Value::Integer(1));
        let e1 = ast.eq(p1, c1).unwrap();
        let p2 = ast.property_project(&["b"], None);
        let c2 = ast.constant(Value::Integer(2));
        let e2 = ast.eq(p2, c2).unwrap();
        let and = ast.and(vec![e1, e2]).unwrap();
        (and, [e1, p1, c1, e2, p2, c2])
    }

    #[test]
    fn depth_first_is_preorder() {
        let mut ast = Ast::new();
        let (and, [e1, p1, c1, e2, p2, c2]) = sample(&mut ast);
        let order: Vec<NodeId> = ast.depth_first(and).collect();
        assert_eq!(order, vec![and, e1, p1, c1, e2, p2, c2]);
    }

    #[test]
    fn breadth_first_shallow() {
        let mut ast = Ast::new();
        let (and, [e1, p1, c1, e2, p2, c2]) = sample(&mut ast);
        let order: Vec<NodeId> = ast.breadth_first(and, DepthOrder::ShallowFirst).collect();
        assert_eq!(order, vec![and, e1, e2, p1, c1, p2, c2]);
    }

    #[test]
    fn breadth_first_deep() {
        let mut ast = Ast::new();
        let (and, [e1, p1, c1, e2, p2, c2]) = sample(&mut ast);
        let order: Vec<NodeId> = ast.breadth_first(and, DepthOrder::DeepFirst).collect();
        assert_eq!(order, vec![p1, c1, p2, c2, e1, e2, and]);
    }

    #[test]
    fn traversals_restart() {
        let mut ast = Ast::new();
        let (and, _) = sample(&mut ast);
        let first: Vec<NodeId> = ast.depth_first(and).collect();
        let second: Vec<NodeId> = ast.depth_first(and).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn single_node_traversal() {
        let mut ast = Ast::new();
        let c = ast.constant(Value::Boolean(true));
        assert_eq!(ast.depth_first(c).count(), 1);
        assert_eq!(ast.breadth_first(c, DepthOrder::DeepFirst).count(), 1);
        assert!(matches!(ast.kind(c), NodeKind::Constant { .. }));
    }
}
