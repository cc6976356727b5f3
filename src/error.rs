//! Error types for query compilation.

use thiserror::Error;

/// Errors that can occur while rewriting a query.
///
/// All of these are synchronous, compilation-scoped failures: the rewrite of
/// the current query is abandoned immediately and no partially rewritten tree
/// is returned. A malformed rewritten tree would silently produce wrong query
/// results, which is strictly worse than a hard failure.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A node was given a child of a variant it cannot accept.
    #[error("malformed AST: {0}")]
    MalformedAst(String),

    /// A join condition's predicate is not a simple equality on the subject
    /// position.
    #[error("only equi-joins on the subject position are supported: {0}")]
    UnsupportedJoin(String),

    /// More than two distinct labels appear in one comparison, or a two-label
    /// comparison is not a plain equality.
    #[error("unsupported correlation: {0}")]
    UnsupportedCorrelation(String),

    /// One or more deferred cross-references never found a declared join to
    /// attach to.
    #[error("unknown labels: {}", .names.join(", "))]
    UnknownLabel {
        /// The label names that could not be resolved, sorted and deduplicated.
        names: Vec<String>,
    },

    /// The same name was assigned to two different joins with conflicting
    /// identity.
    #[error("label `{name}` is already bound to a different join")]
    DuplicateLabel {
        /// The conflicting label name.
        name: String,
    },

    /// An attempted re-parent would make a node its own ancestor.
    #[error("re-parenting would make a node its own ancestor")]
    CyclicTree,
}

/// Result type for rewrite operations.
pub type RewriteResult<T> = Result<T, RewriteError>;
