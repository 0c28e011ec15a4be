// tests/codegen_tests.rs

mod common;

use readql::{
    Backend, BackendError, CompileOptions, Compiled, Interpreter, compile,
    ir::{Function, Inst, IrType, Value},
};

fn compiled(query: &str) -> Compiled {
    compile(query, &CompileOptions::default()).unwrap_or_else(|e| panic!("{}: {}", query, e))
}

fn function<'m>(compiled: &'m Compiled, name: &str) -> &'m Function {
    let id = compiled
        .module
        .find_function(name)
        .unwrap_or_else(|| panic!("no function {}", name));
    compiled.module.function(id)
}

fn has_phi(function: &Function) -> bool {
    function.instructions().any(|i| matches!(i.inst, Inst::Phi(_)))
}

// ============================================================================
// Module Shape
// ============================================================================

#[test]
fn test_filter_and_index_signatures() {
    let c = compiled("chr(1)");
    let filter = function(&c, "filter");
    assert_eq!(
        filter.params,
        vec![IrType::Header, IrType::Record, IrType::ErrorFn, IrType::ErrorCtx]
    );
    assert_eq!(filter.ret, Some(IrType::Bool));

    let index = function(&c, "filter_index");
    assert_eq!(
        index.params,
        vec![IrType::Header, IrType::Int, IrType::ErrorFn, IrType::ErrorCtx]
    );
    assert_eq!(index.ret, Some(IrType::Bool));
}

#[test]
fn test_custom_name() {
    let options = CompileOptions {
        name: "keep".to_string(),
        ..CompileOptions::default()
    };
    let c = compile("duplicate?", &options).unwrap();
    assert_eq!(c.index_name(), "keep_index");
    assert!(c.module.find_function("keep").is_some());
    assert!(c.module.find_function("keep_index").is_some());
    assert!(c.module.find_function("keep.ctor").is_some());
    assert!(c.module.find_function("keep.dtor").is_some());
}

#[test]
fn test_every_block_is_terminated() {
    let c = compiled("let x = random(0.5) in (x | chr(1)) & (paired? then chr(2) else !x)");
    for function in &c.module.functions {
        for block in &function.blocks {
            assert!(block.terminator.is_some(), "unterminated block in {}", function.name);
        }
    }
}

// ============================================================================
// Filter Functions
// ============================================================================

#[test]
fn test_filter_uses_record_chromosome() {
    let c = compiled("chr(1)");
    assert_eq!(function(&c, "filter").called_helpers(), vec!["check_chromosome"]);
    assert_eq!(function(&c, "filter_index").called_helpers(), vec!["check_chromosome_id"]);
}

#[test]
fn test_and_short_circuits_through_blocks() {
    let c = compiled("duplicate? & chr(1)");
    let filter = function(&c, "filter");
    assert!(filter.blocks.len() >= 3);
    assert!(has_phi(filter));
}

#[test]
fn test_xor_does_not_branch() {
    let c = compiled("duplicate? ^ paired?");
    let filter = function(&c, "filter");
    assert_eq!(filter.blocks.len(), 1);
    assert_eq!(filter.called_helpers(), vec!["read_flag", "read_flag"]);
}

#[test]
fn test_float_comparison_uses_fcmp() {
    let c = compiled("aux_dbl(XS) < 0.5");
    let filter = function(&c, "filter");
    assert!(filter.instructions().any(|i| matches!(i.inst, Inst::FCmp(..))));
    assert!(filter.instructions().any(|i| matches!(i.inst, Inst::Alloca(IrType::Float))));
}

#[test]
fn test_string_comparison_calls_helper() {
    let c = compiled("chr_name == \"1\"");
    assert_eq!(
        function(&c, "filter").called_helpers(),
        vec!["chromosome_name", "str_compare"]
    );
}

#[test]
fn test_failure_messages_carry_location() {
    let c = compiled("chr(1) &\n  begin > 0");
    assert!(
        c.module
            .strings
            .iter()
            .any(|s| s == "2:3: read is unmapped, so it has no start position")
    );
}

#[test]
fn test_instruction_locations_in_text() {
    let c = compiled("chr(1) &\n  duplicate?");
    let text = c.module.to_string();
    assert!(text.contains("!1:1"));
    assert!(text.contains("!2:3"));
}

#[test]
fn test_error_callback_receives_message_then_context() {
    let c = compiled("begin > 0");
    let filter = function(&c, "filter");
    let (callee, args) = filter
        .instructions()
        .find_map(|i| match &i.inst {
            Inst::CallIndirect { callee, args } => Some((*callee, args.clone())),
            _ => None,
        })
        .expect("error call");
    // filter(header, record, error_fn, error_ctx)
    assert_eq!(callee, Value(2));
    assert_eq!(args.len(), 2);
    assert_eq!(args[1], Value(3));
    let message = filter
        .instructions()
        .find(|i| i.result == Some(args[0]))
        .expect("message definition");
    assert!(matches!(message.inst, Inst::ConstStr(_)));
}

// ============================================================================
// Index Functions
// ============================================================================

#[test]
fn test_index_is_constant_without_chromosomes() {
    let c = compiled("duplicate? | mapping_quality(20)");
    assert!(!c.uses_index());
    let index = function(&c, "filter_index");
    assert_eq!(index.blocks.len(), 1);
    assert!(index.called_helpers().is_empty());
}

#[test]
fn test_index_never_touches_the_record() {
    let c = compiled("chr(1) & duplicate? | chr(2) & begin > 5");
    let index = function(&c, "filter_index");
    assert_eq!(
        index.called_helpers(),
        vec!["check_chromosome_id", "check_chromosome_id"]
    );
}

#[test]
fn test_index_ignores_mate_chromosome() {
    let c = compiled("mate_chr(1)");
    assert!(!c.uses_index());
    assert!(function(&c, "filter_index").called_helpers().is_empty());
}

// ============================================================================
// Constants and Patterns
// ============================================================================

#[test]
fn test_patterns_are_pooled() {
    let c = compiled("chr_name ~ /a/ | chr_name ~ /a/ | mate_chr_name ~ /a/i");
    assert_eq!(c.module.globals.len(), 2);
    let ctor = c.module.function(c.module.constructor.unwrap());
    assert_eq!(ctor.called_helpers(), vec!["re_compile", "re_compile"]);
    let dtor = c.module.function(c.module.destructor.unwrap());
    assert_eq!(dtor.called_helpers(), vec!["re_free", "re_free"]);
}

#[test]
fn test_chromosome_patterns_are_shared_by_filter_and_index() {
    let c = compiled("chr(1) | chr(1)");
    assert_eq!(c.module.globals.len(), 1);
}

#[test]
fn test_strings_are_interned() {
    let c = compiled("aux_str(RG) == \"x\" | aux_str(XS) == \"x\"");
    assert_eq!(c.module.strings.iter().filter(|s| *s == "x").count(), 1);
}

#[test]
fn test_literals_are_emitted_unchanged() {
    let query = "3.14 == 3.14 & -1 < 0 & 'A == 65";
    let c = compiled(query);
    let filter = function(&c, "filter");
    let has = |wanted: &Inst| filter.instructions().any(|i| &i.inst == wanted);
    assert!(has(&Inst::ConstFloat(3.14)));
    assert!(has(&Inst::ConstInt(-1)));
    assert!(has(&Inst::ConstInt(65)));
    assert_eq!(common::accepted(query).len(), common::records().len());
}

#[test]
fn test_wrong_literals_reject_everything() {
    assert!(common::accepted("3.14 == 3.15").is_empty());
    assert!(common::accepted("-1 > 0").is_empty());
    assert!(common::accepted("'A == 66").is_empty());
}

#[test]
fn test_no_patterns_means_empty_constructor() {
    let c = compiled("duplicate?");
    assert!(c.module.globals.is_empty());
    let ctor = c.module.function(c.module.constructor.unwrap());
    assert!(ctor.called_helpers().is_empty());
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_and_lookup() {
    let c = compiled("chr(1)");
    let loaded = Interpreter.load(c.module).unwrap();
    assert!(loaded.filter("filter").is_ok());
    assert!(loaded.index("filter_index").is_ok());
    assert!(matches!(
        loaded.filter("nope"),
        Err(BackendError::MissingFunction(name)) if name == "nope"
    ));
    assert!(matches!(
        loaded.filter("filter_index"),
        Err(BackendError::Signature { .. })
    ));
}
