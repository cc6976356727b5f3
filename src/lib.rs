//! `QuintDB` Query
//!
//! This crate compiles JSON-shaped queries over a quint-tuple store,
//! statements of (subject, predicate, object, objecttype, context), into
//! trees of relational operators.
//!
//! # Overview
//!
//! A query pairs a *construction* (the JSON-like output shape) with a *where*
//! clause (a boolean filter expression that may contain nested
//! sub-constructions and correlated label references). The compiler rewrites
//! the where clause, together with the join conditions the construction
//! implies, into a normalized tree of joins, unions, set-differences, and
//! statement filters that a downstream evaluator executes against the store.
//!
//! The lexer/parser producing the initial tree and the evaluator consuming
//! the rewritten one are separate components; this crate is only the rewrite
//! engine between them, and it never touches storage.
//!
//! # Modules
//!
//! - [`ast`] - The query operator tree: node variants, arena, traversal,
//!   validation
//! - [`rewrite`] - The compiler passes: construct folding,
//!   logical-to-relational rewriting, label linking
//! - [`error`] - Error types for compilation failures
//!
//! # Quick Start
//!
//! Build and compile a small query programmatically:
//!
//! ```
//! use quintdb_query::{Ast, ConstructShape, RewriteState, Value};
//! use quintdb_query::rewrite::compile_select;
//!
//! // { name: title } where author = 'melville'
//! let mut ast = Ast::new();
//! let title = ast.property_project(&["title"], None);
//! let prop = ast
//!     .construct_prop(
//!         "name",
//!         title,
//!         quintdb_query::EmptyPolicy::Omit,
//!         quintdb_query::SingletonPolicy::NoList,
//!     )
//!     .unwrap();
//! let construct = ast.construct(ConstructShape::Object, vec![prop]).unwrap();
//!
//! let author = ast.property_project(&["author"], None);
//! let melville = ast.constant(Value::String("melville".to_string()));
//! let where_expr = ast.eq(author, melville).unwrap();
//! let select = ast.select(construct, Some(where_expr)).unwrap();
//!
//! let mut state = RewriteState::new();
//! let root = compile_select(&mut ast, &mut state, select).unwrap();
//! println!("{}", ast.display_tree(root));
//! ```

pub mod ast;
pub mod error;
pub mod rewrite;

// Re-export commonly used items at the crate root
pub use ast::{
    Ast, CmpOp, ConstructShape, CorrelationKey, DepthOrder, EmptyPolicy, FuncSig, JoinKind,
    NodeId, NodeKind, Position, ProjectStep, SingletonPolicy, Value, ValueType,
};
pub use error::{RewriteError, RewriteResult};
pub use rewrite::{FilterChain, RewriteState};
