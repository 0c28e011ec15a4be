//! The built-in predicate registry.
//!
//! Every built-in is a [`Definition`] whose builder parses the predicate's
//! arguments (if any) from the input and returns the node it stands for.
//! The map is built fresh for every compilation unit.

use std::rc::Rc;

use tracing::trace;

use crate::{
    ast::{BindingId, Capture, CaptureKind, CmpOp, Expr, FoldDirection, Literal, Quantifier, RegexSpec},
    lexer::{Definition, ParseError, ParseState, PredicateMap, is_glob_char, is_identifier_char},
    parser::{self, expect_predicate, mark, parse_expression, parse_literal, single_scope, with_scope},
    record::flags,
    runtime::{self, HelperDecl},
    types::Type,
};

pub fn predicate(
    build: impl Fn(&mut ParseState<'_>) -> Result<Expr, ParseError> + 'static,
) -> Definition {
    Definition::Predicate(Rc::new(build))
}

pub fn value(build: impl Fn(&mut ParseState<'_>) -> Result<Expr, ParseError> + 'static) -> Definition {
    Definition::Value(Rc::new(build))
}

/// Definition of a name bound by `let`, a quantifier or `bind`.
pub fn binding(name: &str, binding: BindingId, ty: Type) -> Definition {
    let name = name.to_string();
    value(move |_| Ok(Expr::use_binding(name.clone(), binding, ty)))
}

fn flag(name: &'static str, mask: u16) -> Definition {
    predicate(move |_| Ok(flag_test(mask as i64).spelled(name)))
}

fn flag_test(mask: i64) -> Expr {
    Expr::bit_contains(Expr::call(&runtime::READ_FLAG, Vec::new(), None), Expr::int(mask))
}

/// A helper call without arguments, spelled `name`.
fn plain(name: &'static str, helper: &'static HelperDecl) -> Expr {
    Expr::call(helper, Vec::new(), None).spelled(name)
}

/// `( ... )` around the arguments parsed by `body`.
fn parenthesized<'a, T>(
    state: &mut ParseState<'a>,
    body: impl FnOnce(&mut ParseState<'a>) -> Result<T, ParseError>,
) -> Result<T, ParseError> {
    state.parse_char_in_space('(')?;
    let result = body(state)?;
    state.parse_char_in_space(')')?;
    Ok(result)
}

fn parse_glob(state: &mut ParseState<'_>) -> Result<String, ParseError> {
    state.skip_space();
    state
        .parse_identifier(is_glob_char)
        .map(str::to_string)
        .ok_or_else(|| state.error("expected a name or a glob pattern"))
}

/// Two-character auxiliary tag as its character codes.
fn parse_tag(state: &mut ParseState<'_>) -> Result<(i64, i64), ParseError> {
    let (offset, loc) = mark(state);
    let tag = state.parse_identifier(is_identifier_char).unwrap_or("");
    let mut chars = tag.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(a), Some(b), None) => Ok((a as i64, b as i64)),
        _ => Err(state.error_at(offset, loc, "auxiliary tag must be two characters")),
    }
}

fn aux(name: &'static str, helper: &'static HelperDecl) -> Definition {
    value(move |state| {
        let (first, second) = parenthesized(state, parse_tag)?;
        let tag: String = [first, second]
            .iter()
            .filter_map(|c| u32::try_from(*c).ok().and_then(char::from_u32))
            .collect();
        Ok(Expr::call(helper, vec![Expr::int(first), Expr::int(second)], None)
            .spelled(format!("{}({})", name, tag)))
    })
}

fn chromosome(mate: bool) -> Definition {
    predicate(move |state| {
        let glob = parenthesized(state, parse_glob)?;
        Ok(Expr::chromosome(&glob, mate))
    })
}

fn nucleotide(exact: bool) -> Definition {
    predicate(move |state| {
        let (position, base, mask) = parenthesized(state, |state| {
            let position = state.parse_int()?;
            state.parse_char_in_space(',')?;
            state.skip_space();
            let base = state.peek().unwrap_or('N');
            let mask = state.parse_nt()?;
            Ok((position, base, mask))
        })?;
        let name = if exact { "nt_exact" } else { "nt" };
        Ok(Expr::call(
            &runtime::CHECK_NT,
            vec![Expr::int(position), Expr::int(mask as i64), Expr::bool(exact)],
            None,
        )
        .spelled(format!("{}({}, {})", name, position, base)))
    })
}

/// `min(v, ...)` / `max(v, ...)` over values of one ordered type.
fn fold(direction: FoldDirection) -> Definition {
    value(move |state| {
        let (offset, loc) = mark(state);
        let operands = parenthesized(state, |state| {
            let first = parser::parse_value(state)?;
            let ty = first.ty();
            let mut operands = vec![first];
            while state.consume_char(',') {
                operands.push(parser::parse_value_of(state, ty)?);
            }
            Ok(operands)
        })?;
        if !operands[0].ty().is_ordered() {
            return Err(state.error_at(
                offset,
                loc,
                format!("`{}` needs ordered values, not {}", direction.keyword(), operands[0].ty()),
            ));
        }
        Ok(Expr::fold(direction, operands))
    })
}

/// `all x = v1, v2, ... in body` / `any ...`
fn quantifier(quantifier: Quantifier) -> Definition {
    predicate(move |state| {
        let (offset, loc) = mark(state);
        let name = match state.parse_identifier(is_identifier_char) {
            Some(name) if !parser::RESERVED.contains(&name) => name.to_string(),
            _ => return Err(state.error_at(offset, loc, "expected a variable name")),
        };
        state.parse_char_in_space('=')?;
        let mut values = Vec::new();
        loop {
            let (offset, loc) = mark(state);
            let literal = parse_literal(state)?
                .ok_or_else(|| state.error_at(offset, loc, "expected a literal value"))?;
            if let Some(first) = values.first().map(Literal::ty) {
                if literal.ty() != first {
                    return Err(state.error_at(
                        offset,
                        loc,
                        format!("values of `{}` must all be {}", name, first),
                    ));
                }
            }
            values.push(literal);
            if !state.consume_char(',') {
                break;
            }
        }
        if !state.parse_keyword("in") {
            return Err(state.error("expected `in`"));
        }
        let binding = state.allocate_binding();
        let scope = single_scope(&name, self::binding(&name, binding, values[0].ty()));
        let body = with_scope(state, scope, |state| {
            let (offset, loc) = mark(state);
            let body = parse_expression(state)?;
            expect_predicate(state, body, offset, loc)
        })?;
        Ok(Expr::quantify(quantifier, name, binding, values, body))
    })
}

/// `bind value using /re/ in body`; each named group of the pattern becomes
/// a name in `body`, typed by its suffix.
fn bind() -> Definition {
    predicate(|state| {
        let input = parser::parse_value_of(state, Type::Str)?;
        if !state.parse_keyword("using") {
            return Err(state.error("expected `using`"));
        }
        let (offset, loc) = mark(state);
        let pattern = state.parse_regex()?;
        let regex = pattern
            .compile()
            .map_err(|e| state.error_at(offset, loc, format!("invalid regular expression: {}", e)))?;
        if !state.parse_keyword("in") {
            return Err(state.error("expected `in`"));
        }

        let mut scope = PredicateMap::default();
        let mut captures = Vec::new();
        for name in regex.capture_names().flatten() {
            let kind = CaptureKind::from_name(name);
            let capture = Capture {
                name: name.to_string(),
                kind,
                binding: state.allocate_binding(),
            };
            scope.insert(capture.name.clone(), binding(name, capture.binding, capture.ty()));
            captures.push(capture);
        }
        trace!(captures = captures.len(), "bind pattern");

        let body = with_scope(state, Rc::new(scope), |state| {
            let (offset, loc) = mark(state);
            let body = parse_expression(state)?;
            expect_predicate(state, body, offset, loc)
        })?;
        Ok(Expr::bind(input, pattern, captures, body))
    })
}

pub fn builtins() -> PredicateMap {
    let mut map = PredicateMap::default();
    let mut add = |name: &str, definition: Definition| {
        map.insert(name.to_string(), definition);
    };

    add("chr", chromosome(false));
    add("mate_chr", chromosome(true));
    add("chr_name", value(|_| Ok(plain("chr_name", &runtime::CHROMOSOME_NAME))));
    add("mate_chr_name", value(|_| Ok(plain("mate_chr_name", &runtime::MATE_CHROMOSOME_NAME))));

    add("paired?", flag("paired?", flags::PAIRED));
    add("proper_pair?", flag("proper_pair?", flags::PROPER_PAIR));
    add("unmapped?", flag("unmapped?", flags::UNMAPPED));
    add("mate_unmapped?", flag("mate_unmapped?", flags::MATE_UNMAPPED));
    add("mapped_to_reverse?", flag("mapped_to_reverse?", flags::REVERSE));
    add("mate_mapped_to_reverse?", flag("mate_mapped_to_reverse?", flags::MATE_REVERSE));
    add("read1?", flag("read1?", flags::READ1));
    add("read2?", flag("read2?", flags::READ2));
    add("secondary?", flag("secondary?", flags::SECONDARY));
    add("failed_qc?", flag("failed_qc?", flags::FAILED_QC));
    add("duplicate?", flag("duplicate?", flags::DUPLICATE));
    add("supplementary?", flag("supplementary?", flags::SUPPLEMENTARY));
    add(
        "raw_flag",
        predicate(|state| {
            let mask = parenthesized(state, |state| state.parse_int())?;
            Ok(flag_test(mask).spelled(format!("raw_flag({})", mask)))
        }),
    );

    add(
        "before",
        predicate(|state| {
            let position = parenthesized(state, |state| state.parse_int())?;
            Ok(Expr::call(&runtime::CHECK_BEFORE, vec![Expr::int(position)], None)
                .spelled(format!("before({})", position)))
        }),
    );
    add(
        "after",
        predicate(|state| {
            let position = parenthesized(state, |state| state.parse_int())?;
            Ok(Expr::call(&runtime::CHECK_AFTER, vec![Expr::int(position)], None)
                .spelled(format!("after({})", position)))
        }),
    );
    add(
        "position",
        predicate(|state| {
            let (start, end) = parenthesized(state, |state| {
                let start = state.parse_int()?;
                state.parse_char_in_space(',')?;
                Ok((start, state.parse_int()?))
            })?;
            Ok(position(start, end))
        }),
    );
    add("begin", value(|_| Ok(plain("begin", &runtime::READ_BEGIN))));
    add("end", value(|_| Ok(plain("end", &runtime::READ_END))));
    add(
        "mapping_quality",
        predicate(|state| {
            let quality = parenthesized(state, |state| state.parse_int())?;
            let mapq = Expr::call(&runtime::READ_MAPQ, Vec::new(), None);
            Ok(Expr::compare(CmpOp::Ge, mapq, Expr::int(quality))
                .spelled(format!("mapping_quality({})", quality)))
        }),
    );

    add("nt", nucleotide(false));
    add("nt_exact", nucleotide(true));
    add("split_pair?", predicate(|_| Ok(plain("split_pair?", &runtime::CHECK_SPLIT_PAIR))));
    add(
        "random",
        predicate(|state| {
            let (offset, loc) = mark(state);
            let probability = parenthesized(state, |state| state.parse_float())?;
            if !(0.0..=1.0).contains(&probability) {
                return Err(state.error_at(offset, loc, "probability must be between 0 and 1"));
            }
            Ok(Expr::call(
                &runtime::RANDOMLY,
                vec![Expr::constant(Literal::Float(probability))],
                None,
            )
            .spelled(format!("random({:?})", probability)))
        }),
    );
    add(
        "read_group",
        predicate(|state| {
            let glob = parenthesized(state, parse_glob)?;
            Ok(Expr::call(
                &runtime::CHECK_READ_GROUP,
                Vec::new(),
                Some(RegexSpec::from_glob(&glob)),
            )
            .spelled(format!("read_group({})", glob)))
        }),
    );
    add("aux_str", aux("aux_str", &runtime::AUX_STR));
    add("aux_int", aux("aux_int", &runtime::AUX_INT));
    add("aux_dbl", aux("aux_dbl", &runtime::AUX_DBL));
    add("header", value(|_| Ok(plain("header", &runtime::HEADER_TEXT))));
    add("true", value(|_| Ok(Expr::bool(true))));
    add("false", value(|_| Ok(Expr::bool(false))));

    add("min", fold(FoldDirection::Min));
    add("max", fold(FoldDirection::Max));
    add("all", quantifier(Quantifier::All));
    add("any", quantifier(Quantifier::Any));
    add("bind", bind());

    map
}

/// `position(start, end)`: mapped and overlapping the 1-based closed range.
pub fn position(start: i64, end: i64) -> Expr {
    Expr::call(&runtime::CHECK_POSITION, vec![Expr::int(start), Expr::int(end)], None)
        .spelled(format!("position({}, {})", start, end))
}

/// Every name [`builtins`] defines, for documentation and completion.
pub const NAMES: &[&str] = &[
    "chr",
    "mate_chr",
    "chr_name",
    "mate_chr_name",
    "paired?",
    "proper_pair?",
    "unmapped?",
    "mate_unmapped?",
    "mapped_to_reverse?",
    "mate_mapped_to_reverse?",
    "read1?",
    "read2?",
    "secondary?",
    "failed_qc?",
    "duplicate?",
    "supplementary?",
    "raw_flag",
    "before",
    "after",
    "position",
    "begin",
    "end",
    "mapping_quality",
    "nt",
    "nt_exact",
    "split_pair?",
    "random",
    "read_group",
    "aux_str",
    "aux_int",
    "aux_dbl",
    "header",
    "true",
    "false",
    "min",
    "max",
    "all",
    "any",
    "bind",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_registry() {
        let map = builtins();
        assert_eq!(map.len(), NAMES.len());
        for name in NAMES {
            assert!(map.contains_key(*name), "{} missing", name);
        }
    }
}
