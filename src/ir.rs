//! Block-structured SSA intermediate representation.
//!
//! A [`Module`] holds interned strings, globals and functions. Functions are
//! lists of basic blocks; every block ends in exactly one [`Terminator`].
//! Values are numbered per function, parameters first. Phi nodes must lead
//! their block.
//!
//! The textual form printed by `Display` is what `readql emit` writes.

pub mod builder;

use std::fmt;

pub use builder::FunctionBuilder;

use crate::{ast::CmpOp, lexer::SourceLoc, types::Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Bool,
    Int,
    Float,
    /// Nullable string.
    Str,
    /// Address of an `alloca` slot.
    Ptr,
    /// Compiled regular expression.
    Pattern,
    Header,
    Record,
    ErrorFn,
    ErrorCtx,
}

impl IrType {
    pub fn name(self) -> &'static str {
        match self {
            IrType::Bool => "bool",
            IrType::Int => "int",
            IrType::Float => "float",
            IrType::Str => "str",
            IrType::Ptr => "ptr",
            IrType::Pattern => "pattern",
            IrType::Header => "header",
            IrType::Record => "record",
            IrType::ErrorFn => "errfn",
            IrType::ErrorCtx => "errctx",
        }
    }

    /// The query-language type carried by this IR type, if any.
    pub fn scalar(self) -> Option<Type> {
        match self {
            IrType::Bool => Some(Type::Bool),
            IrType::Int => Some(Type::Int),
            IrType::Float => Some(Type::Float),
            IrType::Str => Some(Type::Str),
            _ => None,
        }
    }
}

impl From<Type> for IrType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Bool => IrType::Bool,
            Type::Int => IrType::Int,
            Type::Float => IrType::Float,
            Type::Str => IrType::Str,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    ConstBool(bool),
    ConstInt(i64),
    ConstFloat(f64),
    ConstStr(StrId),
    Not(Value),
    BitAnd(Value, Value),
    ICmp(CmpOp, Value, Value),
    FCmp(CmpOp, Value, Value),
    Select {
        condition: Value,
        then: Value,
        otherwise: Value,
    },
    Phi(Vec<(Block, Value)>),
    Call {
        helper: &'static str,
        args: Vec<Value>,
    },
    CallIndirect {
        callee: Value,
        args: Vec<Value>,
    },
    IsNull(Value),
    Alloca(IrType),
    Load(Value, IrType),
    Store {
        slot: Value,
        value: Value,
    },
    GlobalLoad(GlobalId),
    GlobalStore(GlobalId, Value),
}

impl Inst {
    /// Values read by this instruction.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Inst::ConstBool(_)
            | Inst::ConstInt(_)
            | Inst::ConstFloat(_)
            | Inst::ConstStr(_)
            | Inst::Alloca(_)
            | Inst::GlobalLoad(_) => Vec::new(),
            Inst::Not(v) | Inst::IsNull(v) | Inst::Load(v, _) | Inst::GlobalStore(_, v) => vec![*v],
            Inst::BitAnd(a, b) | Inst::ICmp(_, a, b) | Inst::FCmp(_, a, b) => vec![*a, *b],
            Inst::Select {
                condition,
                then,
                otherwise,
            } => vec![*condition, *then, *otherwise],
            Inst::Phi(incoming) => incoming.iter().map(|(_, v)| *v).collect(),
            Inst::Call { args, .. } => args.clone(),
            Inst::CallIndirect { callee, args } => {
                let mut all = vec![*callee];
                all.extend(args);
                all
            }
            Inst::Store { slot, value } => vec![*slot, *value],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<Value>,
    pub inst: Inst,
    pub loc: Option<SourceLoc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Terminator {
    Ret(Value),
    RetVoid,
    Br(Block),
    CondBr {
        condition: Value,
        then: Block,
        otherwise: Block,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<Block> {
        match self {
            Terminator::Ret(_) | Terminator::RetVoid => Vec::new(),
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr { then, otherwise, .. } => vec![*then, *otherwise],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: Option<IrType>,
    pub blocks: Vec<BasicBlock>,
    /// Type of every value, indexed by `Value`; `None` for instructions
    /// without a result.
    pub value_types: Vec<IrType>,
}

impl Function {
    pub fn block(&self, block: Block) -> &BasicBlock {
        &self.blocks[block.0 as usize]
    }

    pub fn value_type(&self, value: Value) -> IrType {
        self.value_types[value.0 as usize]
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Names of every helper this function calls, in order of appearance.
    pub fn called_helpers(&self) -> Vec<&'static str> {
        self.instructions()
            .filter_map(|i| match &i.inst {
                Inst::Call { helper, .. } => Some(*helper),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub strings: Vec<String>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    /// Run once when the module is loaded.
    pub constructor: Option<FuncId>,
    /// Run once when the loaded module is dropped.
    pub destructor: Option<FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.push(function);
        FuncId(self.functions.len() as u32 - 1)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn string(&self, id: StrId) -> &str {
        &self.strings[id.0 as usize]
    }
}

struct Operands<'a>(&'a [Value]);

impl fmt::Display for Operands<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "%{}", v.0)?;
        }
        Ok(())
    }
}

fn write_inst(f: &mut fmt::Formatter<'_>, inst: &Inst, strings: &[String]) -> fmt::Result {
    match inst {
        Inst::ConstBool(b) => write!(f, "const bool {}", b),
        Inst::ConstInt(n) => write!(f, "const int {}", n),
        Inst::ConstFloat(n) => write!(f, "const float {:?}", n),
        Inst::ConstStr(id) => write!(
            f,
            "const str @str{} ; {:?}",
            id.0,
            strings.get(id.0 as usize).map(String::as_str).unwrap_or("")
        ),
        Inst::Not(v) => write!(f, "not %{}", v.0),
        Inst::BitAnd(a, b) => write!(f, "and %{}, %{}", a.0, b.0),
        Inst::ICmp(op, a, b) => write!(f, "icmp {} %{}, %{}", cmp_name(*op), a.0, b.0),
        Inst::FCmp(op, a, b) => write!(f, "fcmp {} %{}, %{}", cmp_name(*op), a.0, b.0),
        Inst::Select {
            condition,
            then,
            otherwise,
        } => write!(f, "select %{}, %{}, %{}", condition.0, then.0, otherwise.0),
        Inst::Phi(incoming) => {
            f.write_str("phi ")?;
            for (i, (block, value)) in incoming.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "[bb{}: %{}]", block.0, value.0)?;
            }
            Ok(())
        }
        Inst::Call { helper, args } => write!(f, "call @{}({})", helper, Operands(args)),
        Inst::CallIndirect { callee, args } => {
            write!(f, "call_indirect %{}({})", callee.0, Operands(args))
        }
        Inst::IsNull(v) => write!(f, "is_null %{}", v.0),
        Inst::Alloca(ty) => write!(f, "alloca {}", ty),
        Inst::Load(slot, ty) => write!(f, "load {}, %{}", ty, slot.0),
        Inst::Store { slot, value } => write!(f, "store %{}, %{}", value.0, slot.0),
        Inst::GlobalLoad(g) => write!(f, "global_load @g{}", g.0),
        Inst::GlobalStore(g, v) => write!(f, "global_store %{}, @g{}", v.0, g.0),
    }
}

fn cmp_name(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "lt",
        CmpOp::Le => "le",
        CmpOp::Eq => "eq",
        CmpOp::Ne => "ne",
        CmpOp::Gt => "gt",
        CmpOp::Ge => "ge",
    }
}

impl Function {
    fn write(&self, f: &mut fmt::Formatter<'_>, strings: &[String]) -> fmt::Result {
        let ret = self.ret.map(IrType::name).unwrap_or("void");
        write!(f, "define {} @{}(", ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} %{}", param, i)?;
        }
        f.write_str(") {\n")?;
        for (index, block) in self.blocks.iter().enumerate() {
            writeln!(f, "bb{}:", index)?;
            for instruction in &block.instructions {
                f.write_str("  ")?;
                if let Some(result) = instruction.result {
                    write!(f, "%{} = ", result.0)?;
                }
                write_inst(f, &instruction.inst, strings)?;
                if let Some(loc) = instruction.loc {
                    write!(f, " !{}", loc)?;
                }
                f.write_str("\n")?;
            }
            match block.terminator {
                Some(Terminator::Ret(v)) => writeln!(f, "  ret %{}", v.0)?,
                Some(Terminator::RetVoid) => writeln!(f, "  ret void")?,
                Some(Terminator::Br(target)) => writeln!(f, "  br bb{}", target.0)?,
                Some(Terminator::CondBr {
                    condition,
                    then,
                    otherwise,
                }) => writeln!(f, "  cond_br %{}, bb{}, bb{}", condition.0, then.0, otherwise.0)?,
                None => writeln!(f, "  ; unterminated")?,
            }
        }
        f.write_str("}\n")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (i, s) in self.strings.iter().enumerate() {
            writeln!(f, "@str{} = {:?}", i, s)?;
        }
        for (i, global) in self.globals.iter().enumerate() {
            writeln!(f, "@g{} = global {} ; {}", i, global.ty, global.name)?;
        }
        if let Some(ctor) = self.constructor {
            writeln!(f, "; constructor @{}", self.function(ctor).name)?;
        }
        if let Some(dtor) = self.destructor {
            writeln!(f, "; destructor @{}", self.function(dtor).name)?;
        }
        for function in &self.functions {
            f.write_str("\n")?;
            function.write(f, &self.strings)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_function() {
        let mut module = Module::new("m");
        module.strings.push("hello".to_string());
        let mut b = FunctionBuilder::new("f", vec![IrType::Int], Some(IrType::Bool));
        let entry = b.create_block();
        b.switch_to_block(entry);
        let n = b.param(0);
        let zero = b.const_int(0);
        let cmp = b.icmp(CmpOp::Gt, n, zero);
        b.ret(cmp);
        module.add_function(b.finish());

        let text = module.to_string();
        assert!(text.contains("@str0 = \"hello\""));
        assert!(text.contains("define bool @f(int %0) {"));
        assert!(text.contains("%2 = icmp gt %0, %1"));
        assert!(text.contains("  ret %2"));
    }

    #[test]
    fn test_find_function() {
        let mut module = Module::new("m");
        let mut b = FunctionBuilder::new("g", vec![], None);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.ret_void();
        let id = module.add_function(b.finish());
        assert_eq!(module.find_function("g"), Some(id));
        assert_eq!(module.find_function("h"), None);
    }
}
