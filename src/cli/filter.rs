//! Compile a query and run it over a JSON document of records

use serde::{Deserialize, Serialize};
use tracing::info;

use super::CliError;
use crate::{
    Backend, CompileOptions, Harness, Interpreter, Summary, compile,
    record::{Header, Record},
};

/// The document `filter` reads: a header and the records to scan, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterInput {
    #[serde(default)]
    pub header: Header,
    pub records: Vec<Record>,
}

/// Options for the filter command
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub query: String,
    /// JSON text of a `FilterInput`
    pub input: String,
    pub compile: CompileOptions,
    /// Skip references the index function rules out
    pub use_index: bool,
    /// Print the rejected records instead of the accepted ones
    pub reject: bool,
}

/// Names of the selected records, the run summary and every error message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOutput {
    pub names: Vec<String>,
    pub summary: Summary,
    pub errors: Vec<String>,
}

/// Execute a readql filter operation
pub fn execute_filter(options: &FilterOptions) -> Result<FilterOutput, CliError> {
    let input: FilterInput = serde_json::from_str(&options.input)?;
    let compiled = compile(&options.query, &options.compile)?;
    let use_index = options.use_index && compiled.uses_index();
    let index_name = compiled.index_name();

    let backend = Interpreter;
    let loaded = backend.load(compiled.module)?;
    let mut harness = Harness::new(loaded.filter(&compiled.name)?);
    if use_index {
        harness = harness.with_index(loaded.index(&index_name)?);
    }

    let mut names = Vec::new();
    let mut errors = Vec::new();
    let summary = harness.run(
        &input.header,
        &input.records,
        &mut |record, accepted| {
            if accepted != options.reject {
                names.push(record.name.clone());
            }
        },
        &mut |message| errors.push(message.to_string()),
    );
    info!(
        backend = backend.name(),
        accepted = summary.accepted,
        rejected = summary.rejected,
        errors = summary.errors,
        "filter finished"
    );

    Ok(FilterOutput {
        names,
        summary,
        errors,
    })
}
