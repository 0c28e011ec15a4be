pub mod ast;
pub mod bed;
pub mod cli;
pub mod codegen;
pub mod engine;
pub mod harness;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod predicates;
pub mod record;
pub mod runtime;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

pub use ast::{Expr, ExprKind, Literal};
pub use bed::BedError;
pub use codegen::Session;
pub use engine::{Backend, BackendError, FilterFn, IndexFn, Interpreter, LoadedModule};
pub use harness::{Harness, Summary};
pub use ir::Module;
pub use lexer::{ParseError, ParseState};
pub use parser::{Parser, parse, parse_or_report, parse_with};
pub use record::{Header, Record};
pub use types::Type;

/// Settings shared by every entry point that turns query text into a module.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name of the filter function; the index function is `<name>_index`.
    pub name: String,
    /// `NAME=QUERY` predicates available to the query.
    pub defines: Vec<(String, String)>,
    /// BED file whose intervals the query is restricted to.
    pub bed: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            name: "filter".to_string(),
            defines: Vec::new(),
            bed: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Bed(#[from] BedError),
}

/// A query lowered to IR, with the AST it came from.
#[derive(Debug)]
pub struct Compiled {
    pub name: String,
    pub expr: Expr,
    pub module: Module,
}

impl Compiled {
    pub fn index_name(&self) -> String {
        codegen::index_name(&self.name)
    }

    pub fn uses_index(&self) -> bool {
        self.expr.uses_index()
    }
}

/// Parse `query` (plus any BED restriction) and lower it.
pub fn compile(query: &str, options: &CompileOptions) -> Result<Compiled, CompileError> {
    let scope = parser::define_scope(&options.defines)?;
    let mut expr = parse_with(query, scope)?;
    if let Some(path) = &options.bed {
        expr = Expr::and(vec![expr, bed::load(path)?]);
    }
    debug!(query = %expr, uses_index = expr.uses_index(), "query parsed");
    Ok(compile_expr(&options.name, expr))
}

/// Lower an already built predicate.
pub fn compile_expr(name: &str, expr: Expr) -> Compiled {
    let mut session = Session::new(name);
    session.compile(name, &expr);
    Compiled {
        name: name.to_string(),
        expr,
        module: session.finish(),
    }
}
