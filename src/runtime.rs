//! Declarations of the runtime helper library.
//!
//! Generated code never touches records directly: every field access, pattern
//! match and random draw is a call to one of the helpers declared here. The
//! code generator only needs the signatures; backends link the names against
//! an implementation ([`helpers::lookup`] for the interpreter).
//!
//! A helper that can fail reports it through its return value:
//! * integer and float helpers return a `Bool` success flag and write the
//!   value through a trailing out-parameter;
//! * string helpers return a null string.
//!
//! `failure` holds the message the generated code passes to the error
//! callback in that case.

pub mod helpers;

use crate::{ir::IrType, types::Type};

/// One declared parameter of a helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Header,
    Record,
    /// Reference id, only available to index functions.
    RefId,
    ErrorFn,
    ErrorCtx,
    Bool,
    Int,
    Float,
    Str,
    Pattern,
    /// Trailing out-parameters, filled by failing helpers.
    OutInt,
    OutFloat,
    /// Any number of further arguments.
    Variadic,
}

impl Param {
    /// The query-language type of a user-supplied argument in this position.
    pub fn user_type(self) -> Option<Type> {
        match self {
            Param::Bool => Some(Type::Bool),
            Param::Int => Some(Type::Int),
            Param::Float => Some(Type::Float),
            Param::Str => Some(Type::Str),
            _ => None,
        }
    }

    pub fn is_out(self) -> bool {
        matches!(self, Param::OutInt | Param::OutFloat)
    }

    pub fn ir_type(self) -> IrType {
        match self {
            Param::Header => IrType::Header,
            Param::Record => IrType::Record,
            Param::RefId | Param::Int => IrType::Int,
            Param::ErrorFn => IrType::ErrorFn,
            Param::ErrorCtx => IrType::ErrorCtx,
            Param::Bool => IrType::Bool,
            Param::Float => IrType::Float,
            Param::Str => IrType::Str,
            Param::Pattern => IrType::Pattern,
            Param::OutInt | Param::OutFloat | Param::Variadic => IrType::Ptr,
        }
    }
}

#[derive(Debug)]
pub struct HelperDecl {
    pub name: &'static str,
    pub params: &'static [Param],
    pub ret: Option<IrType>,
    pub failure: Option<&'static str>,
}

/// Helper names are unique, so they identify a declaration.
impl PartialEq for HelperDecl {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HelperDecl {}

impl HelperDecl {
    pub fn is_variadic(&self) -> bool {
        self.params.last() == Some(&Param::Variadic)
    }

    /// Parameters a caller must supply in order (everything but `Variadic`).
    pub fn fixed_params(&self) -> &'static [Param] {
        if self.is_variadic() {
            &self.params[..self.params.len() - 1]
        } else {
            self.params
        }
    }
}

macro_rules! helper {
    ($ident:ident, $name:literal, [$($param:ident),*], $ret:expr) => {
        helper!($ident, $name, [$($param),*], $ret, None);
    };
    ($ident:ident, $name:literal, [$($param:ident),*], $ret:expr, $failure:expr) => {
        pub static $ident: HelperDecl = HelperDecl {
            name: $name,
            params: &[$(Param::$param),*],
            ret: $ret,
            failure: $failure,
        };
    };
}

const BOOL: Option<IrType> = Some(IrType::Bool);
const INT: Option<IrType> = Some(IrType::Int);
const STR: Option<IrType> = Some(IrType::Str);

helper!(READ_FLAG, "read_flag", [Record], INT);
helper!(READ_MAPQ, "read_mapq", [Record], INT);
helper!(CHECK_BEFORE, "check_before", [Record, Int], BOOL);
helper!(CHECK_AFTER, "check_after", [Record, Int], BOOL);
helper!(CHECK_POSITION, "check_position", [Record, Int, Int], BOOL);
helper!(READ_BEGIN, "read_begin", [Record, OutInt], BOOL, Some("read is unmapped, so it has no start position"));
helper!(READ_END, "read_end", [Record, OutInt], BOOL, Some("read is unmapped, so it has no end position"));
helper!(CHECK_CHROMOSOME, "check_chromosome", [Record, Header, Pattern], BOOL);
helper!(CHECK_MATE_CHROMOSOME, "check_mate_chromosome", [Record, Header, Pattern], BOOL);
helper!(CHECK_CHROMOSOME_ID, "check_chromosome_id", [Header, RefId, Pattern], BOOL);
helper!(CHROMOSOME_NAME, "chromosome_name", [Record, Header], STR, Some("read is not mapped to a reference"));
helper!(MATE_CHROMOSOME_NAME, "mate_chromosome_name", [Record, Header], STR, Some("mate is not mapped to a reference"));
helper!(CHECK_NT, "check_nt", [Record, Int, Int, Bool], BOOL);
helper!(CHECK_SPLIT_PAIR, "check_split_pair", [Record], BOOL);
helper!(RANDOMLY, "randomly", [Float], BOOL);
helper!(CHECK_READ_GROUP, "check_read_group", [Record, Pattern], BOOL);
helper!(AUX_INT, "aux_int", [Record, Int, Int, OutInt], BOOL, Some("auxiliary field is missing or not an integer"));
helper!(AUX_DBL, "aux_dbl", [Record, Int, Int, OutFloat], BOOL, Some("auxiliary field is missing or not a floating point number"));
helper!(AUX_STR, "aux_str", [Record, Int, Int], STR, Some("auxiliary field is missing or not a string"));
helper!(HEADER_TEXT, "header_text", [Header], STR);
helper!(RE_COMPILE, "re_compile", [Str, Bool], Some(IrType::Pattern));
helper!(RE_FREE, "re_free", [Pattern], None);
helper!(RE_MATCH, "re_match", [Pattern, Str], BOOL);
helper!(RE_BIND, "re_bind", [Pattern, Str, ErrorFn, ErrorCtx, Int, Variadic], BOOL);
helper!(STR_COMPARE, "str_compare", [Str, Str], INT);

pub static HELPERS: &[&HelperDecl] = &[
    &READ_FLAG,
    &READ_MAPQ,
    &CHECK_BEFORE,
    &CHECK_AFTER,
    &CHECK_POSITION,
    &READ_BEGIN,
    &READ_END,
    &CHECK_CHROMOSOME,
    &CHECK_MATE_CHROMOSOME,
    &CHECK_CHROMOSOME_ID,
    &CHROMOSOME_NAME,
    &MATE_CHROMOSOME_NAME,
    &CHECK_NT,
    &CHECK_SPLIT_PAIR,
    &RANDOMLY,
    &CHECK_READ_GROUP,
    &AUX_INT,
    &AUX_DBL,
    &AUX_STR,
    &HEADER_TEXT,
    &RE_COMPILE,
    &RE_FREE,
    &RE_MATCH,
    &RE_BIND,
    &STR_COMPARE,
];

pub fn declaration(name: &str) -> Option<&'static HelperDecl> {
    HELPERS.iter().copied().find(|decl| decl.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_declaration_is_linked() {
        for decl in HELPERS {
            assert!(helpers::lookup(decl.name).is_some(), "{} has no implementation", decl.name);
        }
    }

    #[test]
    fn test_failing_helpers_have_out_parameter_or_string_result() {
        for decl in HELPERS.iter().filter(|d| d.failure.is_some()) {
            let out = decl.params.last().is_some_and(|p| p.is_out());
            assert!(out || decl.ret == STR, "{}", decl.name);
        }
    }

    #[test]
    fn test_variadic_fixed_params() {
        assert!(RE_BIND.is_variadic());
        assert_eq!(RE_BIND.fixed_params().len(), 5);
        assert_eq!(READ_FLAG.fixed_params().len(), 1);
    }
}
