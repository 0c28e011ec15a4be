//! # Abstract Syntax Tree
//!
//! The parsed and type-checked form of a query.
//!
//! - **[expressions]** - the node set ([`Expr`], [`ExprKind`]) and its
//!   type-checking constructors
//! - **[operators]** - comparison operators, quantifiers, fold directions and
//!   capture decoding
//!
//! ## Node algebra
//!
//! Every node has a static type. Predicates are `Bool` nodes; values of the
//! other types only occur underneath comparisons, regex matches, folds and
//! bindings. The node set is closed, and each node can be lowered in two
//! modes (see [`crate::codegen`]):
//!
//! - **record mode** answers "does this record match?";
//! - **index mode** answers "could any record on this reference match?" and
//!   may only over-approximate.
//!
//! [`Expr::uses_index`] tells whether index mode knows anything better than
//! `true`.
//!
//! ## Example
//!
//! ```text
//! chr(1*) & mapping_quality(30) & !duplicate?
//! ```
//!
//! becomes `And[Chromosome(1*), Compare(>=, Call(read_mapq), 30),
//! Not(BitContains(Call(read_flag), 1024))]`, of which only the chromosome
//! test is index-accelerable.
pub mod expressions;
pub mod operators;

pub use expressions::{
    BindingId, Call, CallKind, Capture, Expr, ExprKind, LetDefinition, Literal, RegexSpec,
    glob_to_regex, strip_chr_prefix,
};
pub use operators::{CaptureKind, CmpOp, FoldDirection, Quantifier};

impl Expr {
    /// Whether the index form of this node can say anything more precise
    /// than "maybe".
    pub fn uses_index(&self) -> bool {
        match &self.kind {
            ExprKind::And(terms) | ExprKind::Or(terms) => terms.iter().any(Expr::uses_index),
            ExprKind::Xor(left, right) => left.uses_index() || right.uses_index(),
            ExprKind::Not(operand) => operand.uses_index(),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                (then.uses_index() && otherwise.uses_index())
                    || (condition.uses_index() && (then.uses_index() || otherwise.uses_index()))
            }
            ExprKind::Let { body, .. } => body.uses_index(),
            ExprKind::Chromosome { mate, .. } => !mate,
            ExprKind::Constant(_)
            | ExprKind::Compare { .. }
            | ExprKind::RegexMatch { .. }
            | ExprKind::BitContains { .. }
            | ExprKind::Bind { .. }
            | ExprKind::Use { .. }
            | ExprKind::Loop { .. }
            | ExprKind::Fold { .. }
            | ExprKind::Call(_) => false,
        }
    }
}
