//! The rewrite engine.
//!
//! This module turns a parsed query (a construction template plus a boolean
//! where-expression) into a normalized tree of relational operators the
//! evaluator can execute against the statement store.
//!
//! # Passes
//!
//! Compilation runs three cooperating passes over one shared
//! [`RewriteState`]:
//!
//! 1. [`join_from_construct`] folds the join conditions implied by a
//!    construction's property list into the explicit where expression,
//!    recursing into query-valued properties.
//! 2. [`rewrite_expr`] walks the combined boolean expression once, bottom-up,
//!    emitting `Join`/`Union`/`Except`/`Filter`/`JoinCondition` nodes and
//!    recording label bindings.
//! 3. [`link_labels`] reconciles the cross-references the single pass had to
//!    defer, once every label declaration has been seen.
//!
//! [`compile_select`] drives all three for a top-level query.
//!
//! # Example
//!
//! ```
//! use quintdb_query::ast::{Ast, ConstructShape};
//! use quintdb_query::rewrite::{compile_select, RewriteState};
//!
//! // { id: ?thing } where name = 'fish'
//! let mut ast = Ast::new();
//! let lab = ast.label("thing");
//! let subject = ast.construct_subject(lab).unwrap();
//! let construct = ast.construct(ConstructShape::Object, vec![subject]).unwrap();
//! let name = ast.property_project(&["name"], None);
//! let fish = ast.constant(quintdb_query::ast::Value::String("fish".to_string()));
//! let where_expr = ast.eq(name, fish).unwrap();
//! let select = ast.select(construct, Some(where_expr)).unwrap();
//!
//! let mut state = RewriteState::new();
//! let root = compile_select(&mut ast, &mut state, select).unwrap();
//! assert_eq!(ast.select_where(select), Some(root));
//! ```

mod construct;
mod labels;
mod projection;
mod relational;
mod state;

pub use construct::{compile_select, join_from_construct};
pub use labels::link_labels;
pub use projection::{project_to_filter_chain, FilterChain};
pub use relational::rewrite_expr;
pub use state::RewriteState;
