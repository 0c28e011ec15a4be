use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::{
    ast::{CaptureKind, CmpOp, FoldDirection, Quantifier},
    lexer::SourceLoc,
    runtime::{HelperDecl, Param},
    types::{Type, assert_same_type, assert_type},
};

/// A constant value of one of the four scalar types.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Bool(_) => Type::Bool,
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Str(_) => Type::Str,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Source text of a regular expression and its flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegexSpec {
    pub source: String,
    pub case_insensitive: bool,
}

impl RegexSpec {
    pub fn new(source: impl Into<String>, case_insensitive: bool) -> Self {
        RegexSpec {
            source: source.into(),
            case_insensitive,
        }
    }

    pub fn compile(&self) -> Result<Regex, regex::Error> {
        RegexBuilder::new(&self.source)
            .case_insensitive(self.case_insensitive)
            .build()
    }

    /// Anchored, case-insensitive pattern for a glob (`*`, `?`).
    pub fn from_glob(glob: &str) -> Self {
        RegexSpec::new(format!("^{}$", glob_to_regex(glob)), true)
    }
}

impl fmt::Display for RegexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source.replace('/', "\\/"))?;
        if self.case_insensitive {
            f.write_str("i")?;
        }
        Ok(())
    }
}

/// Translate `*` and `?` wildcards; every other character is literal.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

/// Identity of a name introduced by `let`, a quantifier or `bind`.
///
/// Code generation keys its per-pass value table on this rather than on node
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub kind: CaptureKind,
    pub binding: BindingId,
}

impl Capture {
    pub fn ty(&self) -> Type {
        match self.kind {
            CaptureKind::Str => Type::Str,
            CaptureKind::Int | CaptureKind::Char => Type::Int,
            CaptureKind::Float => Type::Float,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetDefinition {
    pub name: String,
    pub binding: BindingId,
    pub value: Expr,
}

/// How a helper call produces its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// The helper's return value is the result.
    Direct,
    /// The helper returns a success flag and writes an integer or float
    /// through its trailing out-parameter.
    OutParam,
    /// The helper returns a string that is null on failure.
    NullableStr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub helper: &'static HelperDecl,
    pub args: Vec<Expr>,
    pub pattern: Option<RegexSpec>,
    pub kind: CallKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Literal),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    RegexMatch {
        operand: Box<Expr>,
        pattern: RegexSpec,
    },
    /// `(haystack & needle) == needle`
    BitContains {
        haystack: Box<Expr>,
        needle: Box<Expr>,
    },
    Bind {
        input: Box<Expr>,
        pattern: RegexSpec,
        captures: Vec<Capture>,
        body: Box<Expr>,
    },
    Let {
        definitions: Vec<LetDefinition>,
        body: Box<Expr>,
    },
    /// Reference to a `let` name, loop variable or capture.
    Use {
        name: String,
        binding: BindingId,
    },
    Loop {
        quantifier: Quantifier,
        name: String,
        binding: BindingId,
        values: Vec<Literal>,
        body: Box<Expr>,
    },
    Fold {
        direction: FoldDirection,
        operands: Vec<Expr>,
    },
    Call(Call),
    /// Reference (or mate reference) name against a glob.
    Chromosome {
        glob: String,
        pattern: RegexSpec,
        mate: bool,
    },
}

/// A typed AST node.
///
/// Nodes are built through the constructors below, which check operand types
/// and abort on a mismatch; an `Expr` that exists is well typed.
///
/// A node that a built-in predicate expands into keeps the built-in's query
/// text in `spelling`, and displays as that text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    ty: Type,
    pub loc: Option<SourceLoc>,
    pub spelling: Option<String>,
}

/// Chromosome names that refer to the same sequence.
const SYNONYMS: &[&[&str]] = &[&["23", "X"], &["24", "Y"], &["25", "M", "MT"]];

impl Expr {
    fn new(kind: ExprKind, ty: Type) -> Self {
        Expr {
            kind,
            ty,
            loc: None,
            spelling: None,
        }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Attach the source position the node came from.
    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Display as `text` instead of the expansion.
    pub fn spelled(mut self, text: impl Into<String>) -> Self {
        self.spelling = Some(text.into());
        self
    }

    pub fn constant(literal: Literal) -> Self {
        let ty = literal.ty();
        Expr::new(ExprKind::Constant(literal), ty)
    }

    pub fn bool(value: bool) -> Self {
        Expr::constant(Literal::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Expr::constant(Literal::Int(value))
    }

    pub fn as_constant(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Constant(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn and(terms: Vec<Expr>) -> Self {
        Expr::junction(terms, true)
    }

    pub fn or(terms: Vec<Expr>) -> Self {
        Expr::junction(terms, false)
    }

    fn junction(mut terms: Vec<Expr>, is_and: bool) -> Self {
        assert!(!terms.is_empty(), "empty conjunction or disjunction");
        for term in &terms {
            assert_type(term, Type::Bool);
        }
        if terms.len() == 1 {
            return terms.pop().unwrap_or_else(|| unreachable!());
        }
        let kind = if is_and {
            ExprKind::And(terms)
        } else {
            ExprKind::Or(terms)
        };
        Expr::new(kind, Type::Bool)
    }

    pub fn xor(left: Expr, right: Expr) -> Self {
        assert_type(&left, Type::Bool);
        assert_type(&right, Type::Bool);
        Expr::new(ExprKind::Xor(Box::new(left), Box::new(right)), Type::Bool)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Expr) -> Self {
        assert_type(&operand, Type::Bool);
        Expr::new(ExprKind::Not(Box::new(operand)), Type::Bool)
    }

    /// `!left | right`
    pub fn implies(left: Expr, right: Expr) -> Self {
        Expr::or(vec![Expr::not(left), right])
    }

    pub fn conditional(condition: Expr, then: Expr, otherwise: Expr) -> Self {
        assert_type(&condition, Type::Bool);
        assert_same_type(&then, &otherwise);
        let ty = then.ty();
        Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            ty,
        )
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        assert_same_type(&left, &right);
        Expr::new(
            ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::Bool,
        )
    }

    pub fn regex_match(operand: Expr, pattern: RegexSpec) -> Self {
        assert_type(&operand, Type::Str);
        Expr::new(
            ExprKind::RegexMatch {
                operand: Box::new(operand),
                pattern,
            },
            Type::Bool,
        )
    }

    pub fn bit_contains(haystack: Expr, needle: Expr) -> Self {
        assert_type(&haystack, Type::Int);
        assert_type(&needle, Type::Int);
        Expr::new(
            ExprKind::BitContains {
                haystack: Box::new(haystack),
                needle: Box::new(needle),
            },
            Type::Bool,
        )
    }

    pub fn bind(input: Expr, pattern: RegexSpec, captures: Vec<Capture>, body: Expr) -> Self {
        assert_type(&input, Type::Str);
        assert_type(&body, Type::Bool);
        Expr::new(
            ExprKind::Bind {
                input: Box::new(input),
                pattern,
                captures,
                body: Box::new(body),
            },
            Type::Bool,
        )
    }

    pub fn let_in(definitions: Vec<LetDefinition>, body: Expr) -> Self {
        let ty = body.ty();
        Expr::new(
            ExprKind::Let {
                definitions,
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn use_binding(name: impl Into<String>, binding: BindingId, ty: Type) -> Self {
        Expr::new(
            ExprKind::Use {
                name: name.into(),
                binding,
            },
            ty,
        )
    }

    pub fn quantify(
        quantifier: Quantifier,
        name: impl Into<String>,
        binding: BindingId,
        values: Vec<Literal>,
        body: Expr,
    ) -> Self {
        assert!(!values.is_empty(), "quantifier over an empty list");
        let ty = values[0].ty();
        for value in &values {
            if value.ty() != ty {
                panic!("internal type error: quantifier values of mixed types");
            }
        }
        assert_type(&body, Type::Bool);
        Expr::new(
            ExprKind::Loop {
                quantifier,
                name: name.into(),
                binding,
                values,
                body: Box::new(body),
            },
            Type::Bool,
        )
    }

    pub fn fold(direction: FoldDirection, operands: Vec<Expr>) -> Self {
        assert!(!operands.is_empty(), "fold over no operands");
        let ty = operands[0].ty();
        if !ty.is_ordered() {
            panic!("internal type error: cannot fold {} values", ty);
        }
        for operand in &operands[1..] {
            assert_same_type(&operands[0], operand);
        }
        Expr::new(ExprKind::Fold { direction, operands }, ty)
    }

    /// Call a runtime helper.
    ///
    /// The helper's parameters are walked in order: record, header and error
    /// callback slots are filled by the generator, `Pattern` takes `pattern`,
    /// and every user-typed slot takes the next element of `args`. A trailing
    /// out-parameter left over once `args` is exhausted makes this a failing
    /// call whose value is the out-parameter.
    pub fn call(helper: &'static HelperDecl, args: Vec<Expr>, pattern: Option<RegexSpec>) -> Self {
        let mut remaining = args.iter();
        let mut out = None;
        for param in helper.fixed_params() {
            if let Some(expected) = param.user_type() {
                match remaining.next() {
                    Some(arg) => assert_type(arg, expected),
                    None => panic!("helper {} is missing a {} argument", helper.name, expected),
                }
            } else if param.is_out() {
                out = Some(*param);
            } else if *param == Param::Pattern && pattern.is_none() {
                panic!("helper {} needs a pattern", helper.name);
            } else if *param == Param::RefId {
                panic!("helper {} is only callable from index functions", helper.name);
            }
        }
        if remaining.next().is_some() {
            panic!("too many arguments for helper {}", helper.name);
        }
        let (kind, ty) = match (out, helper.ret) {
            (Some(Param::OutInt), _) => (CallKind::OutParam, Type::Int),
            (Some(_), _) => (CallKind::OutParam, Type::Float),
            (None, Some(crate::ir::IrType::Str)) if helper.failure.is_some() => {
                (CallKind::NullableStr, Type::Str)
            }
            (None, Some(ret)) => (
                CallKind::Direct,
                ret.scalar()
                    .unwrap_or_else(|| panic!("helper {} returns a non-scalar", helper.name)),
            ),
            (None, None) => panic!("helper {} returns nothing", helper.name),
        };
        Expr::new(
            ExprKind::Call(Call {
                helper,
                args,
                pattern,
                kind,
            }),
            ty,
        )
    }

    /// `chr(glob)` / `mate_chr(glob)`.
    ///
    /// A glob without wildcards that names a member of a synonym set matches
    /// every member. A leading `chr` in the reference name is optional.
    pub fn chromosome(glob: &str, mate: bool) -> Self {
        let bare = strip_chr_prefix(glob);
        let body = SYNONYMS
            .iter()
            .find(|set| set.iter().any(|name| name.eq_ignore_ascii_case(bare)))
            .map(|set| set.iter().map(|name| regex::escape(name)).collect::<Vec<_>>().join("|"))
            .unwrap_or_else(|| glob_to_regex(bare));
        let pattern = RegexSpec::new(format!("^(chr)?({})$", body), true);
        Expr::new(
            ExprKind::Chromosome {
                glob: glob.to_string(),
                pattern,
                mate,
            },
            Type::Bool,
        )
    }
}

/// Drop a leading `chr` (any case).
pub fn strip_chr_prefix(name: &str) -> &str {
    match name.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") && name.len() > 3 => &name[3..],
        _ => name,
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(spelling) = &self.spelling {
            return f.write_str(spelling);
        }
        match &self.kind {
            ExprKind::Constant(literal) => write!(f, "{}", literal),
            ExprKind::And(terms) => {
                f.write_str("(")?;
                join(f, terms, " & ")?;
                f.write_str(")")
            }
            ExprKind::Or(terms) => {
                f.write_str("(")?;
                join(f, terms, " | ")?;
                f.write_str(")")
            }
            ExprKind::Xor(left, right) => write!(f, "({} ^ {})", left, right),
            ExprKind::Not(operand) => write!(f, "!{}", operand),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => write!(f, "({} then {} else {})", condition, then, otherwise),
            ExprKind::Compare { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ExprKind::RegexMatch { operand, pattern } => write!(f, "({} ~ {})", operand, pattern),
            ExprKind::BitContains { haystack, needle } => {
                write!(f, "contains({}, {})", haystack, needle)
            }
            ExprKind::Bind {
                input,
                pattern,
                body,
                ..
            } => write!(f, "(bind {} using {} in {})", input, pattern, body),
            ExprKind::Let { definitions, body } => {
                f.write_str("(let ")?;
                for (i, definition) in definitions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", definition.name, definition.value)?;
                }
                write!(f, " in {})", body)
            }
            ExprKind::Use { name, .. } => f.write_str(name),
            ExprKind::Loop {
                quantifier,
                name,
                values,
                body,
                ..
            } => {
                write!(f, "({} {} = ", quantifier.keyword(), name)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, " in {})", body)
            }
            ExprKind::Fold {
                direction,
                operands,
            } => {
                write!(f, "{}(", direction.keyword())?;
                join(f, operands, ", ")?;
                f.write_str(")")
            }
            ExprKind::Call(call) => {
                write!(f, "{}(", call.helper.name)?;
                join(f, &call.args, ", ")?;
                if let Some(pattern) = &call.pattern {
                    if !call.args.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", pattern)?;
                }
                f.write_str(")")
            }
            ExprKind::Chromosome { glob, mate, .. } => {
                write!(f, "{}({})", if *mate { "mate_chr" } else { "chr" }, glob)
            }
        }
    }
}
