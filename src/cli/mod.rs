//! CLI support for readql
//!
//! Provides programmatic access to the readql subcommands so they can be
//! embedded in other tools; `main.rs` only parses arguments and prints.

mod check;
mod docs;
mod emit;
mod filter;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use docs::{DocCategory, get_doc_category, get_docs_overview};
pub use emit::execute_emit;
pub use filter::{FilterInput, FilterOptions, FilterOutput, execute_filter};

use std::io;

use thiserror::Error;

use crate::{BackendError, BedError, CompileError, ParseError};

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Bed(#[from] BedError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No input provided. Use --input or pipe JSON to stdin.")]
    NoInput,

    #[error("Invalid definition `{0}`: expected NAME=QUERY")]
    InvalidDefine(String),

    #[error("Unknown category: '{0}'\nRun 'readql docs' to see available categories.")]
    UnknownCategory(String),
}

impl From<CompileError> for CliError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Parse(e) => CliError::Parse(e),
            CompileError::Bed(e) => CliError::Bed(e),
        }
    }
}

/// Split a `NAME=QUERY` argument.
pub fn parse_define(text: &str) -> Result<(String, String), CliError> {
    match text.split_once('=') {
        Some((name, query)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), query.to_string()))
        }
        _ => Err(CliError::InvalidDefine(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("hq=mapping_quality(30)").unwrap(),
            ("hq".to_string(), "mapping_quality(30)".to_string())
        );
        assert!(matches!(parse_define("nope"), Err(CliError::InvalidDefine(_))));
        assert!(matches!(parse_define("=x"), Err(CliError::InvalidDefine(_))));
    }
}
