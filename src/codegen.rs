//! Lowering of typed ASTs into IR.
//!
//! A [`Session`] is one compilation unit. Each call to [`Session::compile`]
//! adds two functions to the module:
//!
//! ```text
//! bool name(header, record, error_fn, error_ctx)
//! bool name_index(header, ref_id, error_fn, error_ctx)
//! ```
//!
//! The first decides whether a record matches. The second answers "could any
//! record on this reference match?" and may only err towards `true`. Index
//! lowering tracks two approximations per node, `may` (some record on the
//! reference could satisfy the node) and `must` (every record on it does), so
//! that negation stays sound: `may(!a) = !must(a)`.
//!
//! Strings and regular expressions are pooled per session. Every pooled
//! pattern gets a global that the module constructor compiles once and the
//! destructor releases.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    ast::{BindingId, Call, CallKind, CmpOp, Expr, ExprKind, FoldDirection, Literal, RegexSpec},
    ir::{FunctionBuilder, Global, GlobalId, IrType, Module, StrId, Value},
    lexer::SourceLoc,
    runtime::{self, Param},
    types::{Type, assert_type},
};

pub struct Session {
    module: Module,
    strings: FxHashMap<String, StrId>,
    patterns: FxHashMap<RegexSpec, GlobalId>,
    pattern_order: Vec<(RegexSpec, GlobalId)>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Session {
            module: Module::new(name),
            strings: FxHashMap::default(),
            patterns: FxHashMap::default(),
            pattern_order: Vec::new(),
        }
    }

    /// Intern `text`; identical text always yields the same id.
    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(id) = self.strings.get(text) {
            return *id;
        }
        let id = StrId(self.module.strings.len() as u32);
        self.module.strings.push(text.to_string());
        self.strings.insert(text.to_string(), id);
        id
    }

    /// The global holding the compiled form of `spec`.
    pub fn pattern(&mut self, spec: &RegexSpec) -> GlobalId {
        if let Some(id) = self.patterns.get(spec) {
            return *id;
        }
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global {
            name: spec.to_string(),
            ty: IrType::Pattern,
        });
        self.patterns.insert(spec.clone(), id);
        self.pattern_order.push((spec.clone(), id));
        id
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Add `name` and `name_index` for the predicate `expr`.
    pub fn compile(&mut self, name: &str, expr: &Expr) {
        assert_type(expr, Type::Bool);
        let filter = self.lower(name.to_string(), IrType::Record, expr, false);
        let index = self.lower(index_name(name), IrType::Int, expr, true);
        self.module.add_function(filter);
        self.module.add_function(index);
    }

    fn lower(&mut self, name: String, subject: IrType, expr: &Expr, index: bool) -> crate::ir::Function {
        let mut b = FunctionBuilder::new(
            name,
            vec![IrType::Header, subject, IrType::ErrorFn, IrType::ErrorCtx],
            Some(IrType::Bool),
        );
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.set_location(expr.loc);
        let (header, subject, error_fn, error_ctx) = (b.param(0), b.param(1), b.param(2), b.param(3));
        let mut generator = Generator {
            session: self,
            b,
            header,
            subject,
            error_fn,
            error_ctx,
            bindings: FxHashMap::default(),
        };
        let result = if !index {
            generator.value(expr)
        } else if expr.uses_index() {
            generator.index(expr).may
        } else {
            generator.b.const_bool(true)
        };
        generator.b.ret(result);
        let function = generator.b.finish();
        debug!(
            function = %function.name,
            blocks = function.blocks.len(),
            values = function.value_types.len(),
            "generated function"
        );
        function
    }

    /// Emit the constructor and destructor and hand over the module.
    pub fn finish(mut self) -> Module {
        let name = self.module.name.clone();
        let patterns = std::mem::take(&mut self.pattern_order);

        let mut ctor = FunctionBuilder::new(format!("{}.ctor", name), Vec::new(), None);
        let entry = ctor.create_block();
        ctor.switch_to_block(entry);
        for (spec, global) in &patterns {
            let source = self.intern(&spec.source);
            let source = ctor.const_str(source);
            let case_insensitive = ctor.const_bool(spec.case_insensitive);
            let compiled = ctor.call_value(&runtime::RE_COMPILE, vec![source, case_insensitive]);
            ctor.global_store(*global, compiled);
        }
        ctor.ret_void();

        let mut dtor = FunctionBuilder::new(format!("{}.dtor", name), Vec::new(), None);
        let entry = dtor.create_block();
        dtor.switch_to_block(entry);
        for (_, global) in &patterns {
            let compiled = dtor.global_load(*global, IrType::Pattern);
            dtor.call(&runtime::RE_FREE, vec![compiled]);
        }
        dtor.ret_void();

        self.module.constructor = Some(self.module.add_function(ctor.finish()));
        self.module.destructor = Some(self.module.add_function(dtor.finish()));
        debug!(
            module = %name,
            strings = self.module.strings.len(),
            patterns = patterns.len(),
            "module finished"
        );
        self.module
    }
}

pub fn index_name(name: &str) -> String {
    format!("{}_index", name)
}

/// Index-mode result of one node.
#[derive(Debug, Clone, Copy)]
struct Approx {
    /// Some record on the reference could satisfy the node.
    may: Value,
    /// Every record on the reference satisfies the node.
    must: Value,
}

/// Per-function lowering state.
struct Generator<'s> {
    session: &'s mut Session,
    b: FunctionBuilder,
    header: Value,
    /// The record, or the reference id in index functions.
    subject: Value,
    error_fn: Value,
    error_ctx: Value,
    bindings: FxHashMap<BindingId, Value>,
}

impl Generator<'_> {
    fn value(&mut self, expr: &Expr) -> Value {
        let outer = self.b.location();
        if expr.loc.is_some() {
            self.b.set_location(expr.loc);
        }
        let result = self.lower_value(expr);
        self.b.set_location(outer);
        result
    }

    fn lower_value(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Constant(literal) => self.literal(literal),
            ExprKind::And(terms) => self.short_circuit(terms.len(), false, |g, i| g.value(&terms[i])),
            ExprKind::Or(terms) => self.short_circuit(terms.len(), true, |g, i| g.value(&terms[i])),
            ExprKind::Xor(left, right) => {
                let left = self.value(left);
                let right = self.value(right);
                self.b.icmp(CmpOp::Ne, left, right)
            }
            ExprKind::Not(operand) => {
                let operand = self.value(operand);
                self.b.not(operand)
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.value(condition);
                let then_block = self.b.create_block();
                let else_block = self.b.create_block();
                let merge = self.b.create_block();
                self.b.cond_br(condition, then_block, else_block);

                self.b.switch_to_block(then_block);
                let then_value = self.value(then);
                let then_end = self.b.current_block();
                self.b.br(merge);

                self.b.switch_to_block(else_block);
                let else_value = self.value(otherwise);
                let else_end = self.b.current_block();
                self.b.br(merge);

                self.b.switch_to_block(merge);
                self.b.phi(expr.ty().into(), vec![(then_end, then_value), (else_end, else_value)])
            }
            ExprKind::Compare { op, left, right } => {
                let ty = left.ty();
                let left = self.value(left);
                let right = self.value(right);
                self.compare(ty, *op, left, right)
            }
            ExprKind::RegexMatch { operand, pattern } => {
                let operand = self.value(operand);
                let pattern = self.pattern(pattern);
                self.b.call_value(&runtime::RE_MATCH, vec![pattern, operand])
            }
            ExprKind::BitContains { haystack, needle } => {
                let haystack = self.value(haystack);
                let needle = self.value(needle);
                let masked = self.b.bit_and(haystack, needle);
                self.b.icmp(CmpOp::Eq, masked, needle)
            }
            ExprKind::Bind {
                input,
                pattern,
                captures,
                body,
            } => {
                let input = self.value(input);
                let pattern = self.pattern(pattern);
                let count = self.b.const_int(captures.len() as i64);
                let mut args = vec![pattern, input, self.error_fn, self.error_ctx, count];
                let mut slots = Vec::with_capacity(captures.len());
                for capture in captures {
                    let ty: IrType = capture.ty().into();
                    let slot = self.b.alloca(ty);
                    let kind = self.b.const_int(capture.kind.code());
                    let name = self.string(&capture.name);
                    let message = self.located(&format!(
                        "capture `{}` did not match or is not a valid {}",
                        capture.name,
                        capture.ty()
                    ));
                    let message = self.string(&message);
                    args.extend([kind, name, slot, message]);
                    slots.push((capture.binding, slot, ty));
                }
                let matched = self.b.call_value(&runtime::RE_BIND, args);
                let failed = self.b.const_bool(false);
                let entry_end = self.b.current_block();
                let body_block = self.b.create_block();
                let merge = self.b.create_block();
                self.b.cond_br(matched, body_block, merge);

                self.b.switch_to_block(body_block);
                for (binding, slot, ty) in slots {
                    let value = self.b.load(slot, ty);
                    self.bindings.insert(binding, value);
                }
                let body = self.value(body);
                let body_end = self.b.current_block();
                self.b.br(merge);

                self.b.switch_to_block(merge);
                self.b.phi(IrType::Bool, vec![(entry_end, failed), (body_end, body)])
            }
            ExprKind::Let { definitions, body } => {
                for definition in definitions {
                    let value = self.value(&definition.value);
                    self.bindings.insert(definition.binding, value);
                }
                self.value(body)
            }
            ExprKind::Use { name, binding } => match self.bindings.get(binding) {
                Some(value) => *value,
                None => panic!("`{}` used outside the scope that defines it", name),
            },
            ExprKind::Loop {
                quantifier,
                binding,
                values,
                body,
                ..
            } => self.short_circuit(values.len(), quantifier.short_circuit_on(), |g, i| {
                let current = g.literal(&values[i]);
                g.bindings.insert(*binding, current);
                g.value(body)
            }),
            ExprKind::Fold {
                direction,
                operands,
            } => {
                let ty = expr.ty();
                let mut accumulator = self.value(&operands[0]);
                for operand in &operands[1..] {
                    let candidate = self.value(operand);
                    let better = match direction {
                        FoldDirection::Min => self.compare(ty, CmpOp::Lt, candidate, accumulator),
                        FoldDirection::Max => self.compare(ty, CmpOp::Lt, accumulator, candidate),
                    };
                    accumulator = self.b.select(better, candidate, accumulator);
                }
                accumulator
            }
            ExprKind::Call(call) => self.call(call),
            ExprKind::Chromosome { pattern, mate, .. } => {
                let pattern = self.pattern(pattern);
                let helper = if *mate {
                    &runtime::CHECK_MATE_CHROMOSOME
                } else {
                    &runtime::CHECK_CHROMOSOME
                };
                self.b.call_value(helper, vec![self.subject, self.header, pattern])
            }
        }
    }

    /// Evaluate `count` terms in order, leaving as soon as one equals
    /// `stop_on`. The result is `stop_on` in that case and the last term's
    /// value otherwise.
    fn short_circuit(
        &mut self,
        count: usize,
        stop_on: bool,
        mut term: impl FnMut(&mut Self, usize) -> Value,
    ) -> Value {
        let merge = self.b.create_block();
        let mut incoming = Vec::with_capacity(count);
        for i in 0..count {
            let value = term(self, i);
            if i + 1 == count {
                incoming.push((self.b.current_block(), value));
                self.b.br(merge);
            } else {
                let next = self.b.create_block();
                let sentinel = self.b.const_bool(stop_on);
                incoming.push((self.b.current_block(), sentinel));
                if stop_on {
                    self.b.cond_br(value, merge, next);
                } else {
                    self.b.cond_br(value, next, merge);
                }
                self.b.switch_to_block(next);
            }
        }
        self.b.switch_to_block(merge);
        self.b.phi(IrType::Bool, incoming)
    }

    fn literal(&mut self, literal: &Literal) -> Value {
        match literal {
            Literal::Bool(b) => self.b.const_bool(*b),
            Literal::Int(n) => self.b.const_int(*n),
            Literal::Float(n) => self.b.const_float(*n),
            Literal::Str(s) => self.string(s),
        }
    }

    fn string(&mut self, text: &str) -> Value {
        let id = self.session.intern(text);
        self.b.const_str(id)
    }

    fn pattern(&mut self, spec: &RegexSpec) -> Value {
        let global = self.session.pattern(spec);
        self.b.global_load(global, IrType::Pattern)
    }

    fn compare(&mut self, ty: Type, op: CmpOp, left: Value, right: Value) -> Value {
        match ty {
            Type::Bool | Type::Int => self.b.icmp(op, left, right),
            Type::Float => self.b.fcmp(op, left, right),
            Type::Str => {
                let ordering = self.b.call_value(&runtime::STR_COMPARE, vec![left, right]);
                let zero = self.b.const_int(0);
                self.b.icmp(op, ordering, zero)
            }
        }
    }

    /// Prefix `message` with the current source position.
    fn located(&self, message: &str) -> String {
        match self.b.location() {
            Some(SourceLoc { line, column }) => format!("{}:{}: {}", line, column, message),
            None => message.to_string(),
        }
    }

    fn report(&mut self, message: &str) {
        let message = self.located(message);
        let message = self.string(&message);
        self.b.call_indirect(self.error_fn, vec![message, self.error_ctx]);
    }

    fn call(&mut self, call: &Call) -> Value {
        let helper = call.helper;
        let mut user = call.args.iter();
        let mut out = None;
        let mut args = Vec::with_capacity(helper.params.len());
        for param in helper.fixed_params() {
            let arg = match param {
                Param::Header => self.header,
                Param::Record => self.subject,
                Param::ErrorFn => self.error_fn,
                Param::ErrorCtx => self.error_ctx,
                Param::Bool | Param::Int | Param::Float | Param::Str => match user.next() {
                    Some(arg) => self.value(arg),
                    None => panic!("helper {} is missing an argument", helper.name),
                },
                Param::Pattern => match &call.pattern {
                    Some(pattern) => self.pattern(pattern),
                    None => panic!("helper {} needs a pattern", helper.name),
                },
                Param::OutInt | Param::OutFloat => {
                    let (ty, sentinel) = if *param == Param::OutInt {
                        (IrType::Int, self.b.const_int(0))
                    } else {
                        (IrType::Float, self.b.const_float(f64::NAN))
                    };
                    let slot = self.b.alloca(ty);
                    self.b.store(slot, sentinel);
                    out = Some((slot, ty));
                    slot
                }
                Param::RefId | Param::Variadic => {
                    panic!("helper {} cannot be called from a record filter", helper.name)
                }
            };
            args.push(arg);
        }

        let failure = helper.failure.unwrap_or("runtime helper failed");
        match call.kind {
            CallKind::Direct => self.b.call_value(helper, args),
            CallKind::OutParam => {
                let Some((slot, ty)) = out else {
                    panic!("helper {} has no out-parameter", helper.name);
                };
                let ok = self.b.call_value(helper, args);
                let fail_block = self.b.create_block();
                let done = self.b.create_block();
                self.b.cond_br(ok, done, fail_block);
                self.b.switch_to_block(fail_block);
                self.report(failure);
                self.b.br(done);
                self.b.switch_to_block(done);
                self.b.load(slot, ty)
            }
            CallKind::NullableStr => {
                let text = self.b.call_value(helper, args);
                let missing = self.b.is_null(text);
                let fail_block = self.b.create_block();
                let done = self.b.create_block();
                self.b.cond_br(missing, fail_block, done);
                self.b.switch_to_block(fail_block);
                self.report(failure);
                self.b.br(done);
                self.b.switch_to_block(done);
                text
            }
        }
    }

    fn unknown(&mut self) -> Approx {
        Approx {
            may: self.b.const_bool(true),
            must: self.b.const_bool(false),
        }
    }

    fn exact(value: Value) -> Approx {
        Approx {
            may: value,
            must: value,
        }
    }

    fn and(&mut self, left: Value, right: Value) -> Value {
        let no = self.b.const_bool(false);
        self.b.select(left, right, no)
    }

    fn or(&mut self, left: Value, right: Value) -> Value {
        let yes = self.b.const_bool(true);
        self.b.select(left, yes, right)
    }

    fn index(&mut self, expr: &Expr) -> Approx {
        let outer = self.b.location();
        if expr.loc.is_some() {
            self.b.set_location(expr.loc);
        }
        let result = self.lower_index(expr);
        self.b.set_location(outer);
        result
    }

    fn lower_index(&mut self, expr: &Expr) -> Approx {
        if let ExprKind::Constant(Literal::Bool(b)) = expr.kind {
            return Self::exact(self.b.const_bool(b));
        }
        if !expr.uses_index() {
            return self.unknown();
        }
        assert_type(expr, Type::Bool);
        match &expr.kind {
            ExprKind::And(terms) | ExprKind::Or(terms) => {
                let is_and = matches!(expr.kind, ExprKind::And(_));
                let mut result = self.index(&terms[0]);
                for term in &terms[1..] {
                    let next = self.index(term);
                    result = if is_and {
                        Approx {
                            may: self.and(result.may, next.may),
                            must: self.and(result.must, next.must),
                        }
                    } else {
                        Approx {
                            may: self.or(result.may, next.may),
                            must: self.or(result.must, next.must),
                        }
                    };
                }
                result
            }
            ExprKind::Xor(left, right) => {
                let l = self.index(left);
                let r = self.index(right);
                let not_must_l = self.b.not(l.must);
                let not_must_r = self.b.not(r.must);
                let not_may_l = self.b.not(l.may);
                let not_may_r = self.b.not(r.may);
                let may_a = self.and(l.may, not_must_r);
                let may_b = self.and(not_must_l, r.may);
                let must_a = self.and(l.must, not_may_r);
                let must_b = self.and(not_may_l, r.must);
                Approx {
                    may: self.or(may_a, may_b),
                    must: self.or(must_a, must_b),
                }
            }
            ExprKind::Not(operand) => {
                let inner = self.index(operand);
                Approx {
                    may: self.b.not(inner.must),
                    must: self.b.not(inner.may),
                }
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let c = self.index(condition);
                let t = self.index(then);
                let e = self.index(otherwise);
                let not_must_c = self.b.not(c.must);
                let not_may_c = self.b.not(c.may);
                let may_then = self.and(c.may, t.may);
                let may_else = self.and(not_must_c, e.may);
                let must_then = self.and(c.must, t.must);
                let must_else = self.and(not_may_c, e.must);
                let must_both = self.and(t.must, e.must);
                let must = self.or(must_then, must_else);
                Approx {
                    may: self.or(may_then, may_else),
                    must: self.or(must, must_both),
                }
            }
            ExprKind::Let { body, .. } => self.index(body),
            ExprKind::Chromosome { pattern, mate: false, .. } => {
                let pattern = self.pattern(pattern);
                let matched = self.b.call_value(
                    &runtime::CHECK_CHROMOSOME_ID,
                    vec![self.header, self.subject, pattern],
                );
                Self::exact(matched)
            }
            _ => self.unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_by_text() {
        let mut session = Session::new("m");
        let a = session.intern("abc");
        let b = session.intern("abc");
        let c = session.intern("abd");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(session.module().strings.len(), 2);
    }

    #[test]
    fn test_pattern_pool_distinguishes_flags() {
        let mut session = Session::new("m");
        let a = session.pattern(&RegexSpec::new("x", false));
        let b = session.pattern(&RegexSpec::new("x", false));
        let c = session.pattern(&RegexSpec::new("x", true));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_index_is_trivial_without_index_information() {
        let mut session = Session::new("m");
        session.compile("q", &Expr::bool(true));
        let module = session.finish();
        let id = module.find_function("q_index").unwrap();
        let index = module.function(id);
        assert_eq!(index.blocks.len(), 1);
        assert!(index.called_helpers().is_empty());
    }

    #[test]
    fn test_finish_adds_constructor_and_destructor() {
        let mut session = Session::new("m");
        session.compile("q", &Expr::chromosome("1", false));
        let module = session.finish();
        let ctor = module.function(module.constructor.unwrap());
        let dtor = module.function(module.destructor.unwrap());
        assert_eq!(ctor.called_helpers(), vec!["re_compile"]);
        assert_eq!(dtor.called_helpers(), vec!["re_free"]);
    }
}
