use std::{io, rc::Rc};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    ast::{CmpOp, Expr, LetDefinition, Literal},
    lexer::{Definition, NumberLiteral, ParseError, ParseState, PredicateMap, SourceLoc, is_identifier_char},
    predicates,
    types::Type,
};

/// Words that can never name a predicate.
pub const RESERVED: [&str; 4] = ["let", "in", "then", "else"];

/// Recursive-descent parser over one query.
///
/// The built-in predicates form the outermost scope; scopes added with
/// [`with_scope`](Parser::with_scope) sit above them, so their names shadow
/// built-ins, and `let` or quantifier names shadow everything.
pub struct Parser<'a> {
    state: ParseState<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut state = ParseState::new(source);
        state.push_scope(Rc::new(predicates::builtins()));
        Parser { state }
    }

    pub fn with_scope(mut self, scope: Rc<PredicateMap>) -> Self {
        self.state.push_scope(scope);
        self
    }

    /// Parse the whole input as one predicate.
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        parse_query(&mut self.state)
    }
}

/// Parse `source` against the built-in predicates.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    Parser::new(source).parse()
}

/// Parse `source` with `extra` in scope above the built-ins.
pub fn parse_with(source: &str, extra: Rc<PredicateMap>) -> Result<Expr, ParseError> {
    Parser::new(source).with_scope(extra).parse()
}

/// Parse `source`; on failure write the message, the offending line and a
/// caret under the error column to `out`.
pub fn parse_or_report(source: &str, out: &mut impl io::Write) -> Option<Expr> {
    match parse(source) {
        Ok(expr) => Some(expr),
        Err(error) => {
            // Reporting is best effort; the parse already failed.
            let _ = out.write_all(render_error(source, &error).as_bytes());
            None
        }
    }
}

/// `error: line:column: message`, then the source line and a caret.
pub fn render_error(source: &str, error: &ParseError) -> String {
    let line = source.lines().nth(error.line.saturating_sub(1) as usize).unwrap_or("");
    let caret = " ".repeat(error.column.saturating_sub(1) as usize);
    format!("error: {}\n{}\n{}^\n", error, line, caret)
}

/// Command-line `NAME=QUERY` definitions as a scope of predicates.
///
/// Each definition is checked here and sees the built-ins plus the
/// definitions before it. Uses re-parse the stored text so that every use
/// gets fresh binding ids.
pub fn define_scope(defines: &[(String, String)]) -> Result<Rc<PredicateMap>, ParseError> {
    let builtins = Rc::new(predicates::builtins());
    let mut scope = PredicateMap::default();
    for (name, source) in defines {
        let valid_name = name
            .strip_suffix('?')
            .unwrap_or(name)
            .chars()
            .all(is_identifier_char);
        if name.is_empty() || !valid_name || RESERVED.contains(&name.as_str()) {
            return Err(ParseError {
                offset: 0,
                line: 1,
                column: 1,
                message: format!("`{}` is not a valid predicate name", name),
            });
        }
        let visible = vec![builtins.clone(), Rc::new(scope.clone())];
        let mut state = ParseState::new(source);
        for s in &visible {
            state.push_scope(s.clone());
        }
        parse_query(&mut state)?;
        debug!(name = %name, "defined predicate");

        let source = source.clone();
        scope.insert(
            name.clone(),
            predicates::predicate(move |state| {
                let mut nested = state.nested(&source, visible.clone());
                let expr = parse_query(&mut nested);
                state.adopt_bindings(&nested);
                expr
            }),
        );
    }
    Ok(Rc::new(scope))
}

fn parse_query(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let expr = parse_expression(state)?;
    let expr = expect_predicate(state, expr, offset, loc)?;
    state.skip_space();
    if let Some(c) = state.peek() {
        return Err(state.error(format!("unexpected `{}`", c)));
    }
    Ok(expr)
}

/// Skip space and report where the next token starts.
pub(crate) fn mark(state: &mut ParseState<'_>) -> (usize, SourceLoc) {
    state.skip_space();
    (state.offset(), state.location())
}

/// Reject non-`Bool` results where a predicate is required.
pub(crate) fn expect_predicate(
    state: &ParseState<'_>,
    expr: Expr,
    offset: usize,
    loc: SourceLoc,
) -> Result<Expr, ParseError> {
    if expr.ty() == Type::Bool {
        Ok(expr)
    } else {
        Err(state.error_at(
            offset,
            loc,
            format!("expected a comparison after {} value", expr.ty()),
        ))
    }
}

/// Run `body` with `scope` pushed; the scope is popped whatever `body`
/// returns.
pub(crate) fn with_scope<'a, T>(
    state: &mut ParseState<'a>,
    scope: Rc<PredicateMap>,
    body: impl FnOnce(&mut ParseState<'a>) -> T,
) -> T {
    state.push_scope(scope.clone());
    let result = body(state);
    state.pop_scope(&scope);
    result
}

/// A scope holding one name.
pub(crate) fn single_scope(name: &str, definition: Definition) -> Rc<PredicateMap> {
    let mut map = FxHashMap::default();
    map.insert(name.to_string(), definition);
    Rc::new(map)
}

/// Run `body` one nesting level deeper.
fn nested<'a, T>(
    state: &mut ParseState<'a>,
    body: impl FnOnce(&mut ParseState<'a>) -> Result<T, ParseError>,
) -> Result<T, ParseError> {
    state.descend()?;
    let result = body(state);
    state.ascend();
    result
}

pub(crate) fn parse_expression(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    nested(state, |state| {
        if state.parse_keyword("let") {
            parse_let(state, Vec::new())
        } else {
            parse_ternary(state)
        }
    })
}

/// `name = expr (, name = expr)* in expr`, one scope per name so later
/// definitions see earlier ones.
fn parse_let(state: &mut ParseState<'_>, mut definitions: Vec<LetDefinition>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let name = match state.parse_identifier(is_identifier_char) {
        Some(name) if !RESERVED.contains(&name) => name.to_string(),
        Some(name) => return Err(state.error_at(offset, loc, format!("`{}` is reserved", name))),
        None => return Err(state.error("expected a name after `let`")),
    };
    state.parse_char_in_space('=')?;
    let value = parse_expression(state)?;
    let binding = state.allocate_binding();
    let scope = single_scope(&name, predicates::binding(&name, binding, value.ty()));
    definitions.push(LetDefinition { name, binding, value });

    with_scope(state, scope, |state| {
        if state.consume_char(',') {
            nested(state, |state| parse_let(state, definitions))
        } else if state.parse_keyword("in") {
            let body = parse_expression(state)?;
            Ok(Expr::let_in(definitions, body))
        } else {
            Err(state.error("expected `,` or `in`"))
        }
    })
}

fn parse_ternary(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let condition = parse_disjunction(state)?;
    if !state.parse_keyword("then") {
        return Ok(condition);
    }
    let condition = expect_predicate(state, condition, offset, loc)?;
    let then = parse_disjunction(state)?;
    if !state.parse_keyword("else") {
        return Err(state.error("expected `else`"));
    }
    let (else_offset, else_loc) = mark(state);
    let otherwise = parse_disjunction(state)?;
    if then.ty() != otherwise.ty() {
        return Err(state.error_at(
            else_offset,
            else_loc,
            format!(
                "branches of a conditional differ in type: {} and {}",
                then.ty(),
                otherwise.ty()
            ),
        ));
    }
    Ok(Expr::conditional(condition, then, otherwise).at(loc))
}

/// Shared template for `|`, `^` and `&`: operands separated by `op`, all of
/// which must be predicates once there is more than one.
fn parse_nary(
    state: &mut ParseState<'_>,
    op: char,
    operand: fn(&mut ParseState<'_>) -> Result<Expr, ParseError>,
    combine: fn(Vec<Expr>) -> Expr,
) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let first = operand(state)?;
    if !state.consume_char(op) {
        return Ok(first);
    }
    let mut items = vec![expect_predicate(state, first, offset, loc)?];
    loop {
        let (offset, loc) = mark(state);
        let next = operand(state)?;
        items.push(expect_predicate(state, next, offset, loc)?);
        if !state.consume_char(op) {
            break;
        }
    }
    Ok(combine(items).at(loc))
}

fn parse_disjunction(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    parse_nary(state, '|', parse_xor, Expr::or)
}

fn parse_xor(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    parse_nary(state, '^', parse_conjunction, |items| {
        let mut items = items.into_iter().rev();
        let last = items.next().unwrap_or_else(|| unreachable!());
        items.fold(last, |acc, left| Expr::xor(left, acc))
    })
}

fn parse_conjunction(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    parse_nary(state, '&', parse_implication, Expr::and)
}

/// `a -> b -> c` is `(a -> b) -> c`.
fn parse_implication(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let mut left = parse_atom(state)?;
    while state.consume_str("->") {
        left = expect_predicate(state, left, offset, loc)?;
        let (right_offset, right_loc) = mark(state);
        let right = parse_atom(state)?;
        let right = expect_predicate(state, right, right_offset, right_loc)?;
        left = Expr::implies(left, right).at(loc);
    }
    Ok(left)
}

fn parse_atom(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    if state.peek() == Some('!') && !state.looking_at("!=") {
        state.advance();
        let (inner_offset, inner_loc) = mark(state);
        let operand = nested(state, parse_atom)?;
        let operand = expect_predicate(state, operand, inner_offset, inner_loc)?;
        return Ok(Expr::not(operand).at(loc));
    }
    if state.consume_char('(') {
        let inner = parse_expression(state)?;
        state.parse_char_in_space(')')?;
        return parse_comparison_tail(state, inner, loc);
    }
    if let Some(literal) = parse_literal(state)? {
        return parse_comparison_tail(state, Expr::constant(literal).at(loc), loc);
    }

    let name = state
        .parse_name()
        .ok_or_else(|| match state.peek() {
            Some(c) => state.error(format!("expected a predicate but found `{}`", c)),
            None => state.error("expected a predicate but found the end of the query"),
        })?;
    if RESERVED.contains(&name) {
        return Err(state.error_at(offset, loc, format!("unexpected keyword `{}`", name)));
    }
    match state.resolve(name, offset, loc)? {
        Definition::Predicate(build) => Ok(build(state)?.at(loc)),
        Definition::Value(build) => {
            let value = build(state)?.at(loc);
            parse_comparison_tail(state, value, loc)
        }
    }
}

/// Optional `op value` or `~ /regex/` after a value.
fn parse_comparison_tail(state: &mut ParseState<'_>, left: Expr, loc: SourceLoc) -> Result<Expr, ParseError> {
    state.skip_space();
    if state.peek() == Some('~') {
        let (offset, op_loc) = (state.offset(), state.location());
        state.advance();
        if left.ty() != Type::Str {
            return Err(state.error_at(
                offset,
                op_loc,
                format!("`~` needs a string on its left, got {} value", left.ty()),
            ));
        }
        let pattern = state.parse_regex()?;
        return Ok(Expr::regex_match(left, pattern).at(loc));
    }
    let Some(op) = CmpOp::ALL.into_iter().find(|op| state.looking_at(op.symbol())) else {
        return Ok(left);
    };
    state.consume_str(op.symbol());
    let (offset, right_loc) = mark(state);
    let right = parse_value(state)?;
    let (left, right) = unify(state, left, right, offset, right_loc)?;
    Ok(Expr::compare(op, left, right).at(loc))
}

/// Bring both sides of a comparison to one type. An integer literal next to
/// a floating point value is widened.
fn unify(
    state: &ParseState<'_>,
    left: Expr,
    right: Expr,
    offset: usize,
    loc: SourceLoc,
) -> Result<(Expr, Expr), ParseError> {
    let widen = |expr: &Expr| match expr.as_constant() {
        Some(Literal::Int(n)) => Some(Expr::constant(Literal::Float(*n as f64)).at_opt(expr.loc)),
        _ => None,
    };
    match (left.ty(), right.ty()) {
        (l, r) if l == r => Ok((left, right)),
        (Type::Float, Type::Int) => match widen(&right) {
            Some(right) => Ok((left, right)),
            None => Err(mismatch(state, &left, &right, offset, loc)),
        },
        (Type::Int, Type::Float) => match widen(&left) {
            Some(left) => Ok((left, right)),
            None => Err(mismatch(state, &left, &right, offset, loc)),
        },
        _ => Err(mismatch(state, &left, &right, offset, loc)),
    }
}

fn mismatch(state: &ParseState<'_>, left: &Expr, right: &Expr, offset: usize, loc: SourceLoc) -> ParseError {
    state.error_at(
        offset,
        loc,
        format!("cannot compare {} value with {} value", left.ty(), right.ty()),
    )
}

/// A literal, if one starts here.
pub(crate) fn parse_literal(state: &mut ParseState<'_>) -> Result<Option<Literal>, ParseError> {
    state.skip_space();
    let literal = match state.peek() {
        Some('"') => Literal::Str(state.parse_string_literal()?),
        Some('\'') => Literal::Int(state.parse_char_literal()?),
        _ if state.starts_number() => match state.parse_number()? {
            NumberLiteral::Int(n) => Literal::Int(n),
            NumberLiteral::Float(n) => Literal::Float(n),
        },
        _ => return Ok(None),
    };
    Ok(Some(literal))
}

/// A literal or a value name, without a comparison tail.
pub(crate) fn parse_value(state: &mut ParseState<'_>) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    if let Some(literal) = parse_literal(state)? {
        return Ok(Expr::constant(literal).at(loc));
    }
    let Some(name) = state.parse_name() else {
        return Err(state.error("expected a value"));
    };
    if RESERVED.contains(&name) {
        return Err(state.error_at(offset, loc, format!("unexpected keyword `{}`", name)));
    }
    match state.resolve(name, offset, loc)? {
        Definition::Value(build) => Ok(build(state)?.at(loc)),
        Definition::Predicate(_) => Err(state.error_at(
            offset,
            loc,
            format!("`{}` is a predicate, not a value", name),
        )),
    }
}

/// [`parse_value`] that must produce `expected` (integer literals widen to
/// floating point).
pub(crate) fn parse_value_of(state: &mut ParseState<'_>, expected: Type) -> Result<Expr, ParseError> {
    let (offset, loc) = mark(state);
    let value = parse_value(state)?;
    if value.ty() == expected {
        return Ok(value);
    }
    if let (Type::Float, Some(Literal::Int(n))) = (expected, value.as_constant()) {
        return Ok(Expr::constant(Literal::Float(*n as f64)).at(loc));
    }
    Err(state.error_at(
        offset,
        loc,
        format!("expected {} value but got {} value", expected, value.ty()),
    ))
}

impl Expr {
    fn at_opt(self, loc: Option<SourceLoc>) -> Self {
        match loc {
            Some(loc) => self.at(loc),
            None => self,
        }
    }
}
