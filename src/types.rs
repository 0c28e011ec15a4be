use std::fmt;

use crate::ast::Expr;

/// The scalar types of the query language.
///
/// Every [`Expr`] has exactly one of these, fixed when the node is built.
/// Predicates are `Bool`; the other three only appear as operands of
/// comparisons, folds, regex matches and bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    Float,
    Str,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Bool => "boolean",
            Type::Int => "integer",
            Type::Float => "floating point",
            Type::Str => "string",
        }
    }

    /// Whether values of this type have an ordering usable by `min`/`max`.
    pub fn is_ordered(self) -> bool {
        !matches!(self, Type::Bool)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Abort if `expr` is not of type `expected`.
///
/// The grammar checks argument types before building nodes, so a failure here
/// is a defect in the predicate table, not something a user can trigger.
pub fn assert_type(expr: &Expr, expected: Type) {
    if expr.ty() != expected {
        panic!(
            "internal type error: expected {} expression but got {} in `{}`",
            expected,
            expr.ty(),
            expr
        );
    }
}

/// Abort unless both operands share a type.
pub fn assert_same_type(left: &Expr, right: &Expr) {
    if left.ty() != right.ty() {
        panic!(
            "internal type error: operands `{}` ({}) and `{}` ({}) differ",
            left,
            left.ty(),
            right,
            right.ty()
        );
    }
}
