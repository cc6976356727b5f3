//! Query operator tree.
//!
//! This module defines the node model shared by the parser and the rewrite
//! engine: a closed set of operator variants stored in an arena, with
//! ordered children and index-based parent links.
//!
//! # Example
//!
//! ```
//! use quintdb_query::ast::{Ast, Position, Value};
//!
//! let mut ast = Ast::new();
//! let pred = ast.column_project(Position::Predicate);
//! let name = ast.constant(Value::String("child".to_string()));
//! let eq = ast.eq(pred, name).unwrap();
//! let filter = ast.filter(vec![eq]).unwrap();
//! assert_eq!(ast.parent(eq), Some(filter));
//! ```

mod display;
mod node;
mod traverse;
mod tree;
mod validate;

pub use display::DisplayTree;
pub use node::{
    CmpOp, ConstructShape, CorrelationKey, EmptyPolicy, FuncSig, JoinKind, NodeId, NodeKind,
    Position, ProjectStep, SingletonPolicy, Value, ValueType,
};
pub use traverse::{BreadthFirst, DepthFirst, DepthOrder};
pub use tree::Ast;
pub use validate::validate_tree;
