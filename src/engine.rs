//! Backends turn an IR [`Module`] into callable functions.
//!
//! The crate ships one backend, [`Interpreter`], which executes the IR
//! directly. Loading verifies the module, links every helper call against the
//! runtime library and runs the module constructor; dropping the
//! [`LoadedModule`] runs the destructor. [`FilterFn`] and [`IndexFn`] borrow the
//! loaded module, so they cannot outlive it.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    ast::CmpOp,
    ir::{Block, FuncId, Function, Inst, IrType, Module, Terminator, Value},
    record::{Header, Record},
    runtime::{self, helpers},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("function `{function}` calls unknown helper `{helper}`")]
    UnknownHelper { function: String, helper: String },

    #[error("function `{function}` calls `{helper}` with {found} arguments, expected {expected}")]
    Arity {
        function: String,
        helper: String,
        expected: usize,
        found: usize,
    },

    #[error("malformed function `{function}`: {message}")]
    Malformed { function: String, message: String },

    #[error("module has no function `{0}`")]
    MissingFunction(String),

    #[error("function `{name}` does not have the signature of {expected}")]
    Signature { name: String, expected: &'static str },

    #[error("module constructor failed: {0}")]
    Constructor(String),
}

/// A runtime value of the interpreter.
#[derive(Debug, Clone)]
pub enum RtValue<'a> {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// `None` is the null string returned by failing helpers.
    Str(Option<Arc<str>>),
    Pattern(Arc<Regex>),
    /// Index of an `alloca` slot in the current frame.
    Slot(usize),
    Header(&'a Header),
    Record(&'a Record),
    ErrorFn,
    ErrorCtx,
    Void,
}

impl<'a> RtValue<'a> {
    pub fn as_bool(&self) -> bool {
        match self {
            RtValue::Bool(b) => *b,
            other => malformed("bool", other),
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            RtValue::Int(n) => *n,
            other => malformed("int", other),
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            RtValue::Float(n) => *n,
            other => malformed("float", other),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RtValue::Str(s) => s.as_deref(),
            other => malformed("str", other),
        }
    }

    pub fn as_pattern(&self) -> &Regex {
        match self {
            RtValue::Pattern(re) => re,
            other => malformed("pattern", other),
        }
    }

    pub fn as_record(&self) -> &'a Record {
        match self {
            RtValue::Record(r) => *r,
            other => malformed("record", other),
        }
    }

    pub fn as_header(&self) -> &'a Header {
        match self {
            RtValue::Header(h) => *h,
            other => malformed("header", other),
        }
    }

    pub fn string(s: &str) -> Self {
        RtValue::Str(Some(Arc::from(s)))
    }

    /// Values that may live in a module global.
    fn into_static(self) -> Option<RtValue<'static>> {
        Some(match self {
            RtValue::Bool(b) => RtValue::Bool(b),
            RtValue::Int(n) => RtValue::Int(n),
            RtValue::Float(n) => RtValue::Float(n),
            RtValue::Str(s) => RtValue::Str(s),
            RtValue::Pattern(p) => RtValue::Pattern(p),
            RtValue::Void => RtValue::Void,
            RtValue::Slot(_)
            | RtValue::Header(_)
            | RtValue::Record(_)
            | RtValue::ErrorFn
            | RtValue::ErrorCtx => return None,
        })
    }
}

fn malformed(expected: &str, found: &RtValue<'_>) -> ! {
    panic!("malformed IR: expected {} value, found {:?}", expected, found)
}

/// What a helper sees of the calling frame.
pub struct HelperCtx<'s, 'a> {
    slots: &'s mut Vec<RtValue<'a>>,
    report: &'s mut dyn FnMut(&str),
}

impl<'s, 'a> HelperCtx<'s, 'a> {
    /// Pass `message` to the caller's error callback.
    pub fn report(&mut self, message: &str) {
        (self.report)(message);
    }

    /// Write through an out-parameter.
    pub fn store(&mut self, slot: &RtValue<'a>, value: RtValue<'a>) {
        match slot {
            RtValue::Slot(index) => self.slots[*index] = value,
            other => malformed("slot", other),
        }
    }
}

pub type HelperFn = for<'s, 'a> fn(&mut HelperCtx<'s, 'a>, &[RtValue<'a>]) -> RtValue<'a>;

/// "Load this IR module, give me callable functions."
pub trait Backend {
    fn name(&self) -> &'static str;

    fn load(&self, module: Module) -> Result<LoadedModule, BackendError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn load(&self, module: Module) -> Result<LoadedModule, BackendError> {
        let mut linked = FxHashMap::default();
        for function in &module.functions {
            verify(&module, function, &mut linked)?;
        }
        debug!(
            module = %module.name,
            functions = module.functions.len(),
            helpers = linked.len(),
            "module linked"
        );

        let loaded = LoadedModule {
            strings: module.strings.iter().map(|s| Arc::from(s.as_str())).collect(),
            globals: module.globals.iter().map(|_| OnceLock::new()).collect(),
            helpers: linked,
            module,
        };

        if let Some(ctor) = loaded.module.constructor {
            let mut failures = Vec::new();
            loaded.execute(ctor, Vec::new(), &mut |message| failures.push(message.to_string()));
            if !failures.is_empty() {
                return Err(BackendError::Constructor(failures.join("; ")));
            }
        }
        Ok(loaded)
    }
}

fn verify(
    module: &Module,
    function: &Function,
    linked: &mut FxHashMap<&'static str, HelperFn>,
) -> Result<(), BackendError> {
    let fail = |message: String| BackendError::Malformed {
        function: function.name.clone(),
        message,
    };
    if function.blocks.is_empty() {
        return Err(fail("no blocks".into()));
    }
    let values = function.value_types.len() as u32;
    let blocks = function.blocks.len() as u32;
    for (index, block) in function.blocks.iter().enumerate() {
        for instruction in &block.instructions {
            if let Some(v) = instruction.inst.operands().into_iter().find(|v| v.0 >= values) {
                return Err(fail(format!("bb{} uses undefined value %{}", index, v.0)));
            }
            match &instruction.inst {
                Inst::Call { helper, args } => {
                    let decl = runtime::declaration(helper).ok_or_else(|| BackendError::UnknownHelper {
                        function: function.name.clone(),
                        helper: helper.to_string(),
                    })?;
                    let expected = decl.fixed_params().len();
                    let ok = if decl.is_variadic() {
                        args.len() >= expected
                    } else {
                        args.len() == expected
                    };
                    if !ok {
                        return Err(BackendError::Arity {
                            function: function.name.clone(),
                            helper: helper.to_string(),
                            expected,
                            found: args.len(),
                        });
                    }
                    let implementation =
                        helpers::lookup(helper).ok_or_else(|| BackendError::UnknownHelper {
                            function: function.name.clone(),
                            helper: helper.to_string(),
                        })?;
                    linked.insert(decl.name, implementation);
                }
                Inst::ConstStr(id) if id.0 as usize >= module.strings.len() => {
                    return Err(fail(format!("string @str{} out of range", id.0)));
                }
                Inst::GlobalLoad(g) | Inst::GlobalStore(g, _) if g.0 as usize >= module.globals.len() => {
                    return Err(fail(format!("global @g{} out of range", g.0)));
                }
                Inst::Phi(incoming) if incoming.iter().any(|(b, _)| b.0 >= blocks) => {
                    return Err(fail(format!("phi in bb{} names a missing block", index)));
                }
                _ => {}
            }
        }
        match block.terminator {
            None => return Err(fail(format!("bb{} is not terminated", index))),
            Some(terminator) => {
                if terminator.successors().iter().any(|b| b.0 >= blocks) {
                    return Err(fail(format!("bb{} branches to a missing block", index)));
                }
            }
        }
    }
    Ok(())
}

/// A module ready to run.
pub struct LoadedModule {
    module: Module,
    strings: Vec<Arc<str>>,
    globals: Vec<OnceLock<RtValue<'static>>>,
    helpers: FxHashMap<&'static str, HelperFn>,
}

impl LoadedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    fn lookup(&self, name: &str, params: &[IrType], expected: &'static str) -> Result<FuncId, BackendError> {
        let id = self
            .module
            .find_function(name)
            .ok_or_else(|| BackendError::MissingFunction(name.to_string()))?;
        let function = self.module.function(id);
        if function.params != params || function.ret != Some(IrType::Bool) {
            return Err(BackendError::Signature {
                name: name.to_string(),
                expected,
            });
        }
        Ok(id)
    }

    /// The record filter called `name`.
    pub fn filter(&self, name: &str) -> Result<FilterFn<'_>, BackendError> {
        let id = self.lookup(
            name,
            &[IrType::Header, IrType::Record, IrType::ErrorFn, IrType::ErrorCtx],
            "a record filter",
        )?;
        Ok(FilterFn { module: self, id })
    }

    /// The reference predicate called `name` (conventionally `<filter>_index`).
    pub fn index(&self, name: &str) -> Result<IndexFn<'_>, BackendError> {
        let id = self.lookup(
            name,
            &[IrType::Header, IrType::Int, IrType::ErrorFn, IrType::ErrorCtx],
            "a reference index predicate",
        )?;
        Ok(IndexFn { module: self, id })
    }

    fn execute<'a>(
        &self,
        id: FuncId,
        args: Vec<RtValue<'a>>,
        report: &mut dyn FnMut(&str),
    ) -> RtValue<'a> {
        let function = self.module.function(id);
        let mut values: Vec<Option<RtValue<'a>>> = vec![None; function.value_types.len()];
        for (i, arg) in args.into_iter().enumerate() {
            values[i] = Some(arg);
        }
        let mut slots: Vec<RtValue<'a>> = Vec::new();
        let mut block = Block(0);
        let mut previous: Option<Block> = None;

        let get = |values: &[Option<RtValue<'a>>], v: Value| -> RtValue<'a> {
            match &values[v.0 as usize] {
                Some(value) => value.clone(),
                None => panic!("malformed IR: %{} used before definition in {}", v.0, function.name),
            }
        };

        loop {
            let data = function.block(block);
            for instruction in &data.instructions {
                let result = match &instruction.inst {
                    Inst::ConstBool(b) => RtValue::Bool(*b),
                    Inst::ConstInt(n) => RtValue::Int(*n),
                    Inst::ConstFloat(n) => RtValue::Float(*n),
                    Inst::ConstStr(id) => RtValue::Str(Some(self.strings[id.0 as usize].clone())),
                    Inst::Not(v) => RtValue::Bool(!get(&values, *v).as_bool()),
                    Inst::BitAnd(a, b) => {
                        RtValue::Int(get(&values, *a).as_int() & get(&values, *b).as_int())
                    }
                    Inst::ICmp(op, a, b) => {
                        RtValue::Bool(compare_integers(*op, &get(&values, *a), &get(&values, *b)))
                    }
                    Inst::FCmp(op, a, b) => RtValue::Bool(
                        op.apply(&get(&values, *a).as_float(), &get(&values, *b).as_float()),
                    ),
                    Inst::Select {
                        condition,
                        then,
                        otherwise,
                    } => {
                        if get(&values, *condition).as_bool() {
                            get(&values, *then)
                        } else {
                            get(&values, *otherwise)
                        }
                    }
                    Inst::Phi(incoming) => {
                        let from = previous.unwrap_or_else(|| {
                            panic!("malformed IR: phi in the entry block of {}", function.name)
                        });
                        match incoming.iter().find(|(b, _)| *b == from) {
                            Some((_, v)) => get(&values, *v),
                            None => panic!(
                                "malformed IR: phi in bb{} has no edge from bb{}",
                                block.0, from.0
                            ),
                        }
                    }
                    Inst::Call { helper, args } => {
                        let implementation = self.helpers[helper];
                        let args: Vec<RtValue<'a>> = args.iter().map(|v| get(&values, *v)).collect();
                        let mut ctx = HelperCtx {
                            slots: &mut slots,
                            report: &mut *report,
                        };
                        implementation(&mut ctx, &args)
                    }
                    Inst::CallIndirect { callee, args } => {
                        match get(&values, *callee) {
                            RtValue::ErrorFn => {}
                            other => malformed("error callback", &other),
                        }
                        // error_fn(message, error_ctx)
                        if let Some(message) = args.first().and_then(|v| get(&values, *v).as_str().map(str::to_owned)) {
                            report(&message);
                        }
                        RtValue::Void
                    }
                    Inst::IsNull(v) => RtValue::Bool(get(&values, *v).as_str().is_none()),
                    Inst::Alloca(_) => {
                        slots.push(RtValue::Void);
                        RtValue::Slot(slots.len() - 1)
                    }
                    Inst::Load(slot, _) => match get(&values, *slot) {
                        RtValue::Slot(index) => slots[index].clone(),
                        other => malformed("slot", &other),
                    },
                    Inst::Store { slot, value } => {
                        match get(&values, *slot) {
                            RtValue::Slot(index) => slots[index] = get(&values, *value),
                            other => malformed("slot", &other),
                        }
                        RtValue::Void
                    }
                    Inst::GlobalLoad(g) => match self.globals[g.0 as usize].get() {
                        Some(value) => value.clone(),
                        None => panic!("global @g{} read before the constructor set it", g.0),
                    },
                    Inst::GlobalStore(g, v) => {
                        let value = get(&values, *v)
                            .into_static()
                            .unwrap_or_else(|| panic!("malformed IR: frame value stored in @g{}", g.0));
                        if self.globals[g.0 as usize].set(value).is_err() {
                            panic!("global @g{} stored twice", g.0);
                        }
                        RtValue::Void
                    }
                };
                if let Some(v) = instruction.result {
                    values[v.0 as usize] = Some(result);
                }
            }

            let terminator = data
                .terminator
                .unwrap_or_else(|| panic!("malformed IR: bb{} is not terminated", block.0));
            previous = Some(block);
            block = match terminator {
                Terminator::Ret(v) => return get(&values, v),
                Terminator::RetVoid => return RtValue::Void,
                Terminator::Br(target) => target,
                Terminator::CondBr {
                    condition,
                    then,
                    otherwise,
                } => {
                    if get(&values, condition).as_bool() {
                        then
                    } else {
                        otherwise
                    }
                }
            };
        }
    }
}

fn compare_integers(op: CmpOp, left: &RtValue<'_>, right: &RtValue<'_>) -> bool {
    match (left, right) {
        (RtValue::Bool(a), RtValue::Bool(b)) => op.apply(a, b),
        _ => op.apply(&left.as_int(), &right.as_int()),
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        if let Some(dtor) = self.module.destructor {
            self.execute(dtor, Vec::new(), &mut |error| {
                warn!(module = %self.module.name, error, "destructor reported an error")
            });
        }
        trace!(module = %self.module.name, "module unloaded");
    }
}

/// `filter(header, record, error_fn, error_ctx) -> bool`
#[derive(Clone, Copy)]
pub struct FilterFn<'m> {
    module: &'m LoadedModule,
    id: FuncId,
}

impl FilterFn<'_> {
    /// Run the filter. `report` receives every runtime error message.
    pub fn call(&self, header: &Header, record: &Record, report: &mut dyn FnMut(&str)) -> bool {
        let args = vec![
            RtValue::Header(header),
            RtValue::Record(record),
            RtValue::ErrorFn,
            RtValue::ErrorCtx,
        ];
        self.module.execute(self.id, args, report).as_bool()
    }
}

/// `index(header, ref_id, error_fn, error_ctx) -> bool`
#[derive(Clone, Copy)]
pub struct IndexFn<'m> {
    module: &'m LoadedModule,
    id: FuncId,
}

impl IndexFn<'_> {
    /// `false` means no record on reference `ref_id` can pass the filter.
    pub fn call(&self, header: &Header, ref_id: u32, report: &mut dyn FnMut(&str)) -> bool {
        let args = vec![
            RtValue::Header(header),
            RtValue::Int(ref_id as i64),
            RtValue::ErrorFn,
            RtValue::ErrorCtx,
        ];
        self.module.execute(self.id, args, report).as_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_function_handles_are_thread_safe() {
        assert_send_sync::<FilterFn<'static>>();
        assert_send_sync::<IndexFn<'static>>();
        assert_send_sync::<LoadedModule>();
    }

    #[test]
    fn test_unknown_function() {
        let loaded = Interpreter.load(Module::new("empty")).unwrap();
        assert_eq!(
            loaded.filter("nope").err(),
            Some(BackendError::MissingFunction("nope".into()))
        );
    }

    #[test]
    fn test_signature_is_checked() {
        let mut module = Module::new("m");
        let mut b = FunctionBuilder::new("f", vec![], Some(IrType::Bool));
        let entry = b.create_block();
        b.switch_to_block(entry);
        let t = b.const_bool(true);
        b.ret(t);
        module.add_function(b.finish());
        let loaded = Interpreter.load(module).unwrap();
        assert!(matches!(loaded.filter("f"), Err(BackendError::Signature { .. })));
    }

    #[test]
    fn test_arity_is_verified() {
        let mut module = Module::new("m");
        let mut f = {
            let mut b = FunctionBuilder::new("f", vec![IrType::Record], Some(IrType::Int));
            let entry = b.create_block();
            b.switch_to_block(entry);
            let record = b.param(0);
            let flag = b.call_value(&runtime::READ_FLAG, vec![record]);
            b.ret(flag);
            b.finish()
        };
        if let Inst::Call { args, .. } = &mut f.blocks[0].instructions[0].inst {
            args.push(Value(0));
        }
        module.add_function(f);
        assert!(matches!(Interpreter.load(module), Err(BackendError::Arity { expected: 1, found: 2, .. })));
    }
}
