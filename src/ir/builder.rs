use crate::{
    ast::CmpOp,
    ir::{
        BasicBlock, Block, Function, GlobalId, Inst, Instruction, IrType, StrId, Terminator,
        Value,
    },
    lexer::SourceLoc,
    runtime::{HelperDecl, Param},
};

/// Appends instructions to one function under construction.
///
/// The builder tracks a current block and a current source location; every
/// emitted instruction is stamped with the location in effect.
pub struct FunctionBuilder {
    function: Function,
    current: Option<Block>,
    loc: Option<SourceLoc>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: Vec<IrType>, ret: Option<IrType>) -> Self {
        let value_types = params.clone();
        FunctionBuilder {
            function: Function {
                name: name.into(),
                params,
                ret,
                blocks: Vec::new(),
                value_types,
            },
            current: None,
            loc: None,
        }
    }

    pub fn param(&self, index: usize) -> Value {
        assert!(index < self.function.params.len(), "no parameter {}", index);
        Value(index as u32)
    }

    pub fn create_block(&mut self) -> Block {
        self.function.blocks.push(BasicBlock::default());
        Block(self.function.blocks.len() as u32 - 1)
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Block {
        self.current.expect("no current block")
    }

    pub fn location(&self) -> Option<SourceLoc> {
        self.loc
    }

    pub fn set_location(&mut self, loc: Option<SourceLoc>) {
        self.loc = loc;
    }

    pub fn value_type(&self, value: Value) -> IrType {
        self.function.value_types[value.0 as usize]
    }

    fn block_mut(&mut self) -> &mut BasicBlock {
        let block = self.current_block();
        let data = &mut self.function.blocks[block.0 as usize];
        assert!(data.terminator.is_none(), "emitting into terminated block bb{}", block.0);
        data
    }

    fn push(&mut self, inst: Inst, ty: Option<IrType>) -> Option<Value> {
        let result = ty.map(|ty| {
            self.function.value_types.push(ty);
            Value(self.function.value_types.len() as u32 - 1)
        });
        let loc = self.loc;
        self.block_mut().instructions.push(Instruction { result, inst, loc });
        result
    }

    fn push_value(&mut self, inst: Inst, ty: IrType) -> Value {
        self.push(inst, Some(ty)).unwrap_or_else(|| unreachable!())
    }

    pub fn const_bool(&mut self, value: bool) -> Value {
        self.push_value(Inst::ConstBool(value), IrType::Bool)
    }

    pub fn const_int(&mut self, value: i64) -> Value {
        self.push_value(Inst::ConstInt(value), IrType::Int)
    }

    pub fn const_float(&mut self, value: f64) -> Value {
        self.push_value(Inst::ConstFloat(value), IrType::Float)
    }

    pub fn const_str(&mut self, id: StrId) -> Value {
        self.push_value(Inst::ConstStr(id), IrType::Str)
    }

    pub fn not(&mut self, value: Value) -> Value {
        self.push_value(Inst::Not(value), IrType::Bool)
    }

    pub fn bit_and(&mut self, left: Value, right: Value) -> Value {
        self.push_value(Inst::BitAnd(left, right), IrType::Int)
    }

    pub fn icmp(&mut self, op: CmpOp, left: Value, right: Value) -> Value {
        self.push_value(Inst::ICmp(op, left, right), IrType::Bool)
    }

    pub fn fcmp(&mut self, op: CmpOp, left: Value, right: Value) -> Value {
        self.push_value(Inst::FCmp(op, left, right), IrType::Bool)
    }

    pub fn select(&mut self, condition: Value, then: Value, otherwise: Value) -> Value {
        let ty = self.value_type(then);
        self.push_value(
            Inst::Select {
                condition,
                then,
                otherwise,
            },
            ty,
        )
    }

    /// Phi at the current position; callers emit it first in a fresh block.
    pub fn phi(&mut self, ty: IrType, incoming: Vec<(Block, Value)>) -> Value {
        assert!(!incoming.is_empty(), "phi without incoming edges");
        self.push_value(Inst::Phi(incoming), ty)
    }

    /// Call a declared runtime helper. Returns the result value, if the
    /// helper has one.
    pub fn call(&mut self, decl: &'static HelperDecl, args: Vec<Value>) -> Option<Value> {
        let fixed = decl.fixed_params();
        if decl.is_variadic() {
            assert!(args.len() >= fixed.len(), "too few arguments to {}", decl.name);
        } else {
            assert_eq!(args.len(), fixed.len(), "wrong argument count for {}", decl.name);
        }
        for (param, arg) in fixed.iter().zip(&args) {
            let ty = self.value_type(*arg);
            let expected = param.ir_type();
            if ty != expected && !(*param == Param::RefId && ty == IrType::Int) {
                panic!(
                    "argument of type {} passed to {} parameter of {}",
                    ty, expected, decl.name
                );
            }
        }
        self.push(
            Inst::Call {
                helper: decl.name,
                args,
            },
            decl.ret,
        )
    }

    /// Call a helper that is known to produce a value.
    pub fn call_value(&mut self, decl: &'static HelperDecl, args: Vec<Value>) -> Value {
        self.call(decl, args)
            .unwrap_or_else(|| panic!("helper {} has no result", decl.name))
    }

    pub fn call_indirect(&mut self, callee: Value, args: Vec<Value>) {
        assert_eq!(self.value_type(callee), IrType::ErrorFn, "indirect call through a non-callback");
        self.push(Inst::CallIndirect { callee, args }, None);
    }

    pub fn is_null(&mut self, value: Value) -> Value {
        self.push_value(Inst::IsNull(value), IrType::Bool)
    }

    pub fn alloca(&mut self, ty: IrType) -> Value {
        self.push_value(Inst::Alloca(ty), IrType::Ptr)
    }

    pub fn load(&mut self, slot: Value, ty: IrType) -> Value {
        self.push_value(Inst::Load(slot, ty), ty)
    }

    pub fn store(&mut self, slot: Value, value: Value) {
        self.push(Inst::Store { slot, value }, None);
    }

    pub fn global_load(&mut self, global: GlobalId, ty: IrType) -> Value {
        self.push_value(Inst::GlobalLoad(global), ty)
    }

    pub fn global_store(&mut self, global: GlobalId, value: Value) {
        self.push(Inst::GlobalStore(global, value), None);
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.block_mut().terminator = Some(terminator);
    }

    pub fn ret(&mut self, value: Value) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn ret_void(&mut self) {
        self.terminate(Terminator::RetVoid);
    }

    pub fn br(&mut self, target: Block) {
        self.terminate(Terminator::Br(target));
    }

    pub fn cond_br(&mut self, condition: Value, then: Block, otherwise: Block) {
        self.terminate(Terminator::CondBr {
            condition,
            then,
            otherwise,
        });
    }

    pub fn finish(self) -> Function {
        for (index, block) in self.function.blocks.iter().enumerate() {
            if block.terminator.is_none() {
                panic!("block bb{} of {} is not terminated", index, self.function.name);
            }
        }
        self.function
    }
}
