//! Parse and type-check a query without running it

use super::CliError;
use crate::parser::{self, render_error};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// The query to check
    pub query: String,
    /// `NAME=QUERY` definitions in scope
    pub defines: Vec<(String, String)>,
}

/// Result of a check operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// The query is well formed; carries its canonical text
    Valid { canonical: String, uses_index: bool },
    /// The query is rejected; carries the caret report
    Invalid(String),
}

/// Execute a readql check operation
///
/// A bad query is a normal outcome here, reported as `CheckResult::Invalid`.
/// Bad definitions are errors.
pub fn execute_check(options: &CheckOptions) -> Result<CheckResult, CliError> {
    let scope = parser::define_scope(&options.defines)?;
    match parser::parse_with(&options.query, scope) {
        Ok(expr) => Ok(CheckResult::Valid {
            canonical: expr.to_string(),
            uses_index: expr.uses_index(),
        }),
        Err(e) => Ok(CheckResult::Invalid(render_error(&options.query, &e))),
    }
}
