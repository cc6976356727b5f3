//! Tree-style rendering of query operator trees.

use std::fmt;

use super::node::{NodeId, NodeKind};
use super::tree::Ast;

/// Helper for tree-style display of a subtree.
pub struct DisplayTree<'a> {
    ast: &'a Ast,
    root: NodeId,
}

impl Ast {
    /// Pretty prints the subtree at `root` as a tree.
    #[must_use]
    pub fn display_tree(&self, root: NodeId) -> DisplayTree<'_> {
        DisplayTree { ast: self, root }
    }
}

impl fmt::Display for DisplayTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, "", true)
    }
}

impl DisplayTree<'_> {
    fn fmt_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: NodeId,
        prefix: &str,
        is_last: bool,
    ) -> fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };

        write!(f, "{prefix}{connector}")?;
        self.fmt_node_content(f, id)?;
        writeln!(f)?;

        let children = self.ast.args(id);
        let new_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });

        for (i, &child) in children.iter().enumerate() {
            self.fmt_node(f, child, &new_prefix, i == children.len() - 1)?;
        }

        Ok(())
    }

    fn fmt_node_content(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        match self.ast.kind(id) {
            NodeKind::JoinCondition { key, kind, transitive } => {
                write!(f, "JoinCondition: {kind} on {key}")?;
                if *transitive {
                    write!(f, " (transitive)")?;
                }
            }
            NodeKind::Filter { labels } => {
                write!(f, "Filter")?;
                if !labels.is_empty() {
                    write!(f, " [")?;
                    for (i, (name, pos)) in labels.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "?{name}={pos}")?;
                    }
                    write!(f, "]")?;
                }
            }
            NodeKind::Label { name } => {
                write!(f, "Label: ?{name}")?;
            }
            NodeKind::Constant { value } => {
                write!(f, "Constant: {value}")?;
            }
            NodeKind::Project { path, varref } => {
                write!(f, "Project: ")?;
                for (i, step) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{step}")?;
                }
                if let Some(var) = varref {
                    write!(f, " AS ?{var}")?;
                }
            }
            NodeKind::Cmp { op } => {
                write!(f, "Cmp: {op}")?;
            }
            NodeKind::Func { name, .. } => {
                write!(f, "Func: {name}")?;
            }
            NodeKind::Construct { shape } => {
                write!(f, "Construct: {shape:?}")?;
            }
            NodeKind::ConstructProp { name, .. } => match name {
                Some(n) => write!(f, "ConstructProp: {n}")?,
                None => write!(f, "ConstructProp: <dynamic>")?,
            },
            NodeKind::SortExp { ascending } => {
                write!(f, "SortExp: {}", if *ascending { "asc" } else { "desc" })?;
            }
            NodeKind::Select { limit, offset, depth, .. } => {
                write!(f, "Select")?;
                if let Some(n) = limit {
                    write!(f, " LIMIT {n}")?;
                }
                if let Some(n) = offset {
                    write!(f, " OFFSET {n}")?;
                }
                if let Some(n) = depth {
                    write!(f, " DEPTH {n}")?;
                }
            }
            kind => {
                write!(f, "{}", kind.name())?;
            }
        }
        Ok(())
    }
}
