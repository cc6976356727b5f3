//! Node vocabulary for the query operator tree.
//!
//! This module defines the closed set of node variants that make up a query
//! before and after rewriting, plus the small value types they carry:
//! statement column positions, join kinds, literal values, projection steps,
//! and function signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a node slot inside an [`Ast`](super::Ast) arena.
///
/// Ids are only meaningful for the arena that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the slot index backing this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A column position within a quint-tuple statement scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// The statement subject.
    Subject,
    /// The statement predicate (property name).
    Predicate,
    /// The statement object (property value).
    Object,
    /// The object type tag.
    ObjType,
    /// The position of the statement inside an rdf-style list.
    ListPos,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subject => "subject",
            Self::Predicate => "predicate",
            Self::Object => "object",
            Self::ObjType => "objtype",
            Self::ListPos => "listpos",
        };
        write!(f, "{name}")
    }
}

/// How a join condition correlates its wrapped operator to the enclosing
/// resource set.
///
/// A `Column` key names a fixed statement column of the wrapped operator. A
/// `Label` key defers to a named column: it is resolved at evaluation time
/// against the label table of the operator it targets, since label slot
/// positions are only known once that operator's filters have run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationKey {
    /// A fixed statement column.
    Column(Position),
    /// A named column, resolved at evaluation time.
    Label(String),
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(pos) => write!(f, "{pos}"),
            Self::Label(name) => write!(f, "?{name}"),
        }
    }
}

/// Join kind for a [`NodeKind::JoinCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    /// Plain inner join.
    Inner,
    /// Left outer join (rows without a match survive with nulls).
    LeftOuter,
    /// Anti join (rows with a match are excluded).
    Anti,
    /// Semi join (rows with a match are included, no columns emitted).
    Semi,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inner => "inner",
            Self::LeftOuter => "left outer",
            Self::Anti => "anti",
            Self::Semi => "semi",
        };
        write!(f, "{name}")
    }
}

/// A literal value in a query.
///
/// The query language is JSON-shaped, so constants arrive as JSON scalars and
/// are type-coerced into one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl Value {
    /// Converts a JSON scalar into a value.
    ///
    /// Returns `None` for arrays, objects, and `null`; those are not legal
    /// constants in a query expression.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Bool(b) => Some(Self::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Coerces raw text into the narrowest value type that accepts it.
    #[must_use]
    pub fn coerce(text: &str) -> Self {
        if let Ok(b) = text.parse::<bool>() {
            return Self::Boolean(b);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Self::Float(f);
        }
        Self::String(text.to_string())
    }

    /// Returns the value's type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) | Self::Float(_) => ValueType::Number,
            Self::String(_) => ValueType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

/// The type a value or function result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// Integer or float.
    Number,
    /// Boolean.
    Boolean,
    /// A resource (statement subject) reference.
    Resource,
}

/// Metadata describing an extension function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncSig {
    /// The function's return type.
    pub returns: ValueType,
    /// Whether the function is pure (same inputs, same output).
    pub pure: bool,
    /// Whether the function reads the evaluation context (current row,
    /// store handle) in addition to its arguments.
    pub needs_context: bool,
    /// Whether the function marks a recursive-closure correlation
    /// (`closure(?a) == ?b` joins `?b` transitively).
    pub recursive_closure: bool,
}

impl FuncSig {
    /// A pure, context-free function with the given return type.
    #[must_use]
    pub const fn scalar(returns: ValueType) -> Self {
        Self { returns, pure: true, needs_context: false, recursive_closure: false }
    }

    /// A pure function returning a string.
    #[must_use]
    pub const fn string() -> Self {
        Self::scalar(ValueType::String)
    }

    /// A pure function returning a number.
    #[must_use]
    pub const fn number() -> Self {
        Self::scalar(ValueType::Number)
    }

    /// A pure function returning a boolean.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::scalar(ValueType::Boolean)
    }

    /// The recursive-closure marker used in two-label correlations.
    #[must_use]
    pub const fn closure() -> Self {
        Self {
            returns: ValueType::Resource,
            pure: true,
            needs_context: true,
            recursive_closure: true,
        }
    }

    /// Marks the function as needing the evaluation context.
    #[must_use]
    pub const fn with_context(mut self) -> Self {
        self.needs_context = true;
        self
    }

    /// Marks the function as impure.
    #[must_use]
    pub const fn impure(mut self) -> Self {
        self.pure = false;
        self
    }
}

/// One step of a projection path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStep {
    /// Follow the property with this name.
    Property(String),
    /// Read a fixed statement column.
    Column(Position),
}

impl fmt::Display for ProjectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => write!(f, "{name}"),
            Self::Column(pos) => write!(f, "<{pos}>"),
        }
    }
}

/// Comparison operators other than plain equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// Less than.
    Lt,
    /// Less than or equal.
    LtEq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    GtEq,
    /// Not equal.
    NotEq,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::NotEq => "!=",
        };
        write!(f, "{op}")
    }
}

/// What a construction property emits when no rows matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyPolicy {
    /// Omit the property from the output object.
    Omit,
    /// Emit the property with a null value.
    UseNull,
    /// Emit the property as an empty list.
    UseList,
}

/// What a construction property emits for exactly one matched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingletonPolicy {
    /// Emit the bare value.
    NoList,
    /// Emit a one-element list.
    UseList,
}

/// The output shape of a construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructShape {
    /// A single JSON object.
    Object,
    /// A JSON list of objects.
    List,
}

/// The closed set of query operator variants.
///
/// Children live in the owning [`Ast`](super::Ast) as ordered `NodeId` lists;
/// a variant here carries only the node's own attributes. The per-variant
/// child conventions are:
///
/// - `Join`/`Union`/`Except`: join conditions (or bare filters / resource
///   sets, which the arena accepts for hand-built trees).
/// - `JoinCondition`: exactly one wrapped operator.
/// - `Filter`: boolean predicates over one statement scan.
/// - `And`/`Or`: two or more operands; `Not`/`IsNull`: one; `Eq`/`Cmp`: two;
///   `In`: a needle followed by its candidates.
/// - `Construct`: `ConstructProp`/`ConstructSubject` children.
/// - `ConstructProp`: the value, preceded by the name expression when the
///   name is data-dependent (`name: None`).
/// - `Select`: construct, then optional where / group-by / order-by as
///   flagged.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// AND-grouping over row sets, producing a resource set keyed by subject.
    Join,
    /// OR-grouping over row sets.
    Union,
    /// Set difference: the first child minus the remaining children.
    Except,
    /// Correlates one child row set to its siblings.
    JoinCondition {
        /// The correlation column or label.
        key: CorrelationKey,
        /// The join kind.
        kind: JoinKind,
        /// Whether the correlation closes transitively.
        transitive: bool,
    },
    /// A single scan over quint-tuples narrowed by predicates.
    Filter {
        /// Named columns this filter exports, in declaration order.
        labels: Vec<(String, Position)>,
    },
    /// A placeholder referring to a join or filter by name.
    Label {
        /// The referenced name.
        name: String,
    },
    /// A literal.
    Constant {
        /// The literal value.
        value: Value,
    },
    /// A column reference, possibly a dotted-path chain.
    Project {
        /// The projection path.
        path: Vec<ProjectStep>,
        /// Optional bound variable name exported by this projection.
        varref: Option<String>,
    },
    /// N-ary conjunction.
    And,
    /// N-ary disjunction.
    Or,
    /// Negation.
    Not,
    /// Equality. Compares equal under swapped arguments.
    Eq,
    /// Ordering / inequality comparison.
    Cmp {
        /// The comparison operator.
        op: CmpOp,
    },
    /// Membership test.
    In,
    /// Null test.
    IsNull,
    /// Extension function call.
    Func {
        /// The function name.
        name: String,
        /// The function's signature metadata.
        sig: FuncSig,
    },
    /// Top-level output template.
    Construct {
        /// The output shape.
        shape: ConstructShape,
    },
    /// Declares the construction's subject binding.
    ConstructSubject,
    /// Declares one output property.
    ConstructProp {
        /// The property name; `None` when the name is data-dependent, in
        /// which case the first child is the name expression.
        name: Option<String>,
        /// Cardinality policy for zero matched values.
        empty: EmptyPolicy,
        /// Cardinality policy for exactly one matched value.
        singleton: SingletonPolicy,
    },
    /// Grouping directive, passed through unchanged by the rewriter.
    GroupBy,
    /// Ordering directive, passed through unchanged by the rewriter.
    OrderBy,
    /// One ordering term.
    SortExp {
        /// Sort direction.
        ascending: bool,
    },
    /// Top-level query.
    Select {
        /// Whether a where expression child is present.
        has_where: bool,
        /// Whether a group-by child is present.
        has_group_by: bool,
        /// Whether an order-by child is present.
        has_order_by: bool,
        /// Row limit.
        limit: Option<u64>,
        /// Row offset.
        offset: Option<u64>,
        /// Maximum construction recursion depth.
        depth: Option<u32>,
    },
}

impl NodeKind {
    /// Returns the variant name (for display/debugging).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join => "Join",
            Self::Union => "Union",
            Self::Except => "Except",
            Self::JoinCondition { .. } => "JoinCondition",
            Self::Filter { .. } => "Filter",
            Self::Label { .. } => "Label",
            Self::Constant { .. } => "Constant",
            Self::Project { .. } => "Project",
            Self::And => "And",
            Self::Or => "Or",
            Self::Not => "Not",
            Self::Eq => "Eq",
            Self::Cmp { .. } => "Cmp",
            Self::In => "In",
            Self::IsNull => "IsNull",
            Self::Func { .. } => "Func",
            Self::Construct { .. } => "Construct",
            Self::ConstructSubject => "ConstructSubject",
            Self::ConstructProp { .. } => "ConstructProp",
            Self::GroupBy => "GroupBy",
            Self::OrderBy => "OrderBy",
            Self::SortExp { .. } => "SortExp",
            Self::Select { .. } => "Select",
        }
    }

    /// Returns true for `Join`, `Union`, and `Except`.
    #[must_use]
    pub const fn is_resource_set(&self) -> bool {
        matches!(self, Self::Join | Self::Union | Self::Except)
    }

    /// Returns true for operators whose argument order does not matter.
    #[must_use]
    pub const fn is_commutative(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Eq)
    }

    /// Returns true for boolean/comparison/value expression variants.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::And
                | Self::Or
                | Self::Not
                | Self::Eq
                | Self::Cmp { .. }
                | Self::In
                | Self::IsNull
                | Self::Func { .. }
                | Self::Constant { .. }
                | Self::Project { .. }
                | Self::Label { .. }
        )
    }
}

/// One arena slot: a variant plus its tree links.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) args: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_coercion() {
        assert_eq!(Value::coerce("true"), Value::Boolean(true));
        assert_eq!(Value::coerce("42"), Value::Integer(42));
        assert_eq!(Value::coerce("4.5"), Value::Float(4.5));
        assert_eq!(Value::coerce("fish"), Value::String("fish".to_string()));
    }

    #[test]
    fn value_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(7)), Some(Value::Integer(7)));
        assert_eq!(
            Value::from_json(&serde_json::json!("id")),
            Some(Value::String("id".to_string()))
        );
        assert_eq!(Value::from_json(&serde_json::json!(null)), None);
        assert_eq!(Value::from_json(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn closure_signature() {
        let sig = FuncSig::closure();
        assert!(sig.recursive_closure);
        assert_eq!(sig.returns, ValueType::Resource);
    }

    #[test]
    fn commutative_variants() {
        assert!(NodeKind::Eq.is_commutative());
        assert!(NodeKind::And.is_commutative());
        assert!(NodeKind::Or.is_commutative());
        assert!(!NodeKind::Not.is_commutative());
        assert!(!NodeKind::Cmp { op: CmpOp::Lt }.is_commutative());
    }

    #[test]
    fn display_forms() {
        assert_eq!(Position::Object.to_string(), "object");
        assert_eq!(CorrelationKey::Label("parent".to_string()).to_string(), "?parent");
        assert_eq!(CmpOp::GtEq.to_string(), ">=");
        assert_eq!(Value::String("a".to_string()).to_string(), "'a'");
    }
}
