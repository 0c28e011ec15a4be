/// Comparison operators.
///
/// The comparator is fixed when the node is built; code generation maps it
/// straight onto the matching IR comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// Less than (`<`)
    Lt,
    /// Less than or equal (`<=`)
    Le,
    /// Equal (`==`)
    Eq,
    /// Not equal (`!=`)
    Ne,
    /// Greater than (`>`)
    Gt,
    /// Greater than or equal (`>=`)
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// Two-character operators first so that `<=` is not read as `<`.
    pub const ALL: [CmpOp; 6] = [CmpOp::Le, CmpOp::Ge, CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Gt];

    pub fn apply<T: PartialOrd + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        }
    }
}

/// `all` or `any` over a literal list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
}

impl Quantifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Quantifier::All => "all",
            Quantifier::Any => "any",
        }
    }

    /// The body result that ends iteration early.
    pub fn short_circuit_on(self) -> bool {
        matches!(self, Quantifier::Any)
    }
}

/// Direction of a `min`/`max` fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldDirection {
    Min,
    Max,
}

impl FoldDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            FoldDirection::Min => "min",
            FoldDirection::Max => "max",
        }
    }
}

/// How a named regex capture is decoded, chosen by the name's suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Str,
    /// `_i`: parsed as a decimal integer.
    Int,
    /// `_d`: parsed as a floating point number.
    Float,
    /// `_c`: code point of the first matched character.
    Char,
}

impl CaptureKind {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with("_d") {
            CaptureKind::Float
        } else if name.ends_with("_i") {
            CaptureKind::Int
        } else if name.ends_with("_c") {
            CaptureKind::Char
        } else {
            CaptureKind::Str
        }
    }

    pub fn code(self) -> i64 {
        match self {
            CaptureKind::Str => 0,
            CaptureKind::Int => 1,
            CaptureKind::Float => 2,
            CaptureKind::Char => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => CaptureKind::Str,
            1 => CaptureKind::Int,
            2 => CaptureKind::Float,
            3 => CaptureKind::Char,
            _ => return None,
        })
    }
}
