//! Print the IR of a query, the ahead-of-time counterpart of `filter`

use super::CliError;
use crate::{CompileOptions, compile};

/// Compile `query` and render the resulting module as text.
pub fn execute_emit(query: &str, options: &CompileOptions) -> Result<String, CliError> {
    let compiled = compile(query, options)?;
    Ok(compiled.module.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_names_both_functions() {
        let options = CompileOptions {
            name: "q".to_string(),
            ..CompileOptions::default()
        };
        let text = execute_emit("chr(1)", &options).unwrap();
        assert!(text.contains("define bool @q(header %0, record %1, errfn %2, errctx %3)"));
        assert!(text.contains("define bool @q_index(header %0, int %1, errfn %2, errctx %3)"));
        assert!(text.contains("call @check_chromosome_id"));
    }
}
