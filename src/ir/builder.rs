//! Fluent construction of method bodies.
//!
//! [`BodyBuilder`] builds a [`MethodBody`] block by block, referring to
//! blocks through small integer labels so forward branches read naturally.
//! It is the construction surface for tests and for synthetic bodies;
//! the importer drives the body's primitives directly.
//!
//! # Example
//!
//! ```rust
//! use cilopt::ir::BodyBuilder;
//! use cilopt::types::Type;
//!
//! let body = BodyBuilder::new(&[("x", Type::I32)]).build_with(|f| {
//!     f.block(0, |b| {
//!         let x = b.arg(0);
//!         let seven = b.const_i32(7);
//!         let sum = b.add(x, seven);
//!         b.ret_val(sum);
//!     });
//! });
//! assert_eq!(body.num_blocks(), 1);
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ir::{
    ArgId, BinOp, BlockId, CilIntrinsic, CmpOp, Const, GuardKind, InstId, InstKind, MethodBody,
    Value, VarId,
};
use crate::types::{FieldDesc, MethodDesc, Type};

/// Builds a [`MethodBody`] out of labeled blocks.
pub struct BodyBuilder {
    body: MethodBody,
    labels: FxHashMap<usize, BlockId>,
}

impl BodyBuilder {
    /// Creates a builder for a body with the given arguments. Label `0` is
    /// the entry block.
    #[must_use]
    pub fn new(args: &[(&str, Type)]) -> Self {
        let body = MethodBody::new(
            args.iter()
                .map(|(name, ty)| (Arc::from(*name), ty.clone()))
                .collect(),
        );
        let mut labels = FxHashMap::default();
        labels.insert(0, body.entry_block());
        Self { body, labels }
    }

    /// Runs `build` against this builder and returns the finished body.
    #[must_use]
    pub fn build_with(mut self, build: impl FnOnce(&mut Self)) -> MethodBody {
        build(&mut self);
        self.body
    }

    /// Resolves a label, creating the block on first reference.
    pub fn block_id(&mut self, label: usize) -> BlockId {
        if let Some(id) = self.labels.get(&label) {
            return *id;
        }
        let id = self.body.create_block(None);
        self.labels.insert(label, id);
        id
    }

    /// Populates the block at `label`.
    pub fn block(&mut self, label: usize, f: impl FnOnce(&mut BlockBuilder<'_>)) {
        let block = self.block_id(label);
        let mut builder = BlockBuilder {
            owner: self,
            block,
        };
        f(&mut builder);
    }

    /// Declares a memory-backed variable.
    pub fn var(&mut self, name: &str, ty: Type, is_exposed: bool) -> VarId {
        self.body.new_var(Arc::from(name), ty, is_exposed)
    }
}

/// Appends instructions to one block of a [`BodyBuilder`].
pub struct BlockBuilder<'a> {
    owner: &'a mut BodyBuilder,
    block: BlockId,
}

impl BlockBuilder<'_> {
    /// Returns the block being built.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.block
    }

    fn push(&mut self, kind: InstKind, ty: Type, operands: Vec<Value>, blocks: Vec<BlockId>) -> InstId {
        let id = self.owner.body.create_inst(kind, ty, operands, blocks);
        self.owner.body.append(self.block, id);
        id
    }

    /// Returns argument `index` as a value.
    #[must_use]
    pub fn arg(&self, index: usize) -> Value {
        Value::Arg(ArgId::from_index(index))
    }

    /// An `int32` constant.
    #[must_use]
    pub fn const_i32(&self, value: i32) -> Value {
        Value::Const(Const::i32(value))
    }

    /// The null reference.
    #[must_use]
    pub fn const_null(&self) -> Value {
        Value::Const(Const::Null)
    }

    /// Emits a binary operation typed after its left operand.
    pub fn bin(&mut self, op: BinOp, left: Value, right: Value) -> Value {
        let ty = self.owner.body.value_type(&left);
        Value::Inst(self.push(InstKind::Bin(op), ty, vec![left, right], vec![]))
    }

    /// Emits an addition.
    pub fn add(&mut self, left: Value, right: Value) -> Value {
        self.bin(BinOp::Add, left, right)
    }

    /// Emits a multiplication.
    pub fn mul(&mut self, left: Value, right: Value) -> Value {
        self.bin(BinOp::Mul, left, right)
    }

    /// Emits a comparison producing `bool`.
    pub fn cmp(&mut self, op: CmpOp, left: Value, right: Value) -> Value {
        Value::Inst(self.push(InstKind::Cmp(op), Type::Bool, vec![left, right], vec![]))
    }

    /// Emits an indirect load of `ty` through `addr`.
    pub fn load(&mut self, ty: Type, addr: Value) -> Value {
        Value::Inst(self.push(InstKind::Load, ty, vec![addr], vec![]))
    }

    /// Emits an indirect store through `addr`.
    pub fn store(&mut self, addr: Value, value: Value) {
        self.push(InstKind::Store, Type::Void, vec![addr, value], vec![]);
    }

    /// Emits an array element address computation.
    pub fn array_addr(&mut self, elem_ty: Type, array: Value, index: Value) -> Value {
        Value::Inst(self.push(InstKind::ArrayAddr, elem_ty, vec![array, index], vec![]))
    }

    /// Emits a field address computation.
    pub fn field_addr(&mut self, field: Arc<FieldDesc>, obj: Option<Value>) -> Value {
        let ty = Type::Byref(Arc::new(field.ty.clone()));
        let operands = obj.into_iter().collect();
        Value::Inst(self.push(InstKind::FieldAddr(field), ty, operands, vec![]))
    }

    /// Emits a read of a memory-backed variable.
    pub fn load_var(&mut self, var: VarId) -> Value {
        let ty = self.owner.body.var(var).ty().clone();
        Value::Inst(self.push(InstKind::LoadVar, ty, vec![Value::Var(var)], vec![]))
    }

    /// Emits a write of a memory-backed variable.
    pub fn store_var(&mut self, var: VarId, value: Value) {
        self.push(
            InstKind::StoreVar,
            Type::Void,
            vec![Value::Var(var), value],
            vec![],
        );
    }

    /// Emits a call.
    pub fn call(&mut self, method: Arc<MethodDesc>, args: &[Value]) -> Value {
        let ty = method.sig.ret.clone();
        Value::Inst(self.push(InstKind::Call(method), ty, args.to_vec(), vec![]))
    }

    /// Emits an intrinsic.
    pub fn intrinsic(&mut self, intrinsic: CilIntrinsic, ty: Type, args: &[Value]) -> Value {
        Value::Inst(self.push(InstKind::Intrinsic(intrinsic), ty, args.to_vec(), vec![]))
    }

    /// Emits a phi as a header instruction, arguments given per label.
    pub fn phi(&mut self, ty: Type, args: &[(usize, Value)]) -> Value {
        let preds: Vec<BlockId> = args.iter().map(|(l, _)| self.owner.block_id(*l)).collect();
        let values: Vec<Value> = args.iter().map(|(_, v)| v.clone()).collect();
        let id = self.owner.body.create_inst(InstKind::Phi, ty, values, preds);
        self.owner.body.insert_header(self.block, id);
        Value::Inst(id)
    }

    /// Emits a guard as a header instruction.
    pub fn guard(
        &mut self,
        kind: GuardKind,
        catch_type: Option<Type>,
        handler: usize,
        filter: Option<usize>,
    ) -> Value {
        let mut blocks = vec![self.owner.block_id(handler)];
        if let Some(filter) = filter {
            blocks.push(self.owner.block_id(filter));
        }
        let ty = catch_type.clone().unwrap_or(Type::Object);
        let id = self
            .owner
            .body
            .create_inst(InstKind::Guard { kind, catch_type }, ty, vec![], blocks);
        self.owner.body.insert_header(self.block, id);
        Value::Inst(id)
    }

    /// Emits an unconditional jump.
    pub fn jump(&mut self, target: usize) {
        let target = self.owner.block_id(target);
        self.push(InstKind::Branch, Type::Void, vec![], vec![target]);
    }

    /// Emits a conditional branch.
    pub fn branch(&mut self, cond: Value, then_label: usize, else_label: usize) {
        let then_b = self.owner.block_id(then_label);
        let else_b = self.owner.block_id(else_label);
        self.push(InstKind::Branch, Type::Void, vec![cond], vec![then_b, else_b]);
    }

    /// Emits a void return.
    pub fn ret(&mut self) {
        self.push(InstKind::Return, Type::Void, vec![], vec![]);
    }

    /// Emits a valued return.
    pub fn ret_val(&mut self, value: Value) {
        self.push(InstKind::Return, Type::Void, vec![value], vec![]);
    }

    /// Emits a throw.
    pub fn throw(&mut self, exception: Value) {
        self.push(InstKind::Throw, Type::Void, vec![exception], vec![]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_diamond() {
        let body = BodyBuilder::new(&[("c", Type::Bool)]).build_with(|f| {
            f.block(0, |b| {
                let c = b.arg(0);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                let one = b.const_i32(1);
                let two = b.const_i32(2);
                let merged = b.phi(Type::I32, &[(1, one), (2, two)]);
                b.ret_val(merged);
            });
        });

        assert_eq!(body.num_blocks(), 4);
        let entry = body.entry_block();
        assert_eq!(body.block(entry).num_succs(), 2);
        assert_eq!(body.block(entry).num_preds(), 0);

        let merge = body
            .blocks()
            .find(|b| body.block(*b).num_preds() == 2)
            .expect("merge block");
        let phi = body.block_phis(merge).next().expect("phi");
        assert_eq!(body.inst(phi).operands().len(), 2);
    }

    #[test]
    fn test_builder_forward_reference() {
        let body = BodyBuilder::new(&[]).build_with(|f| {
            // Block 1 referenced before it is populated.
            f.block(0, |b| b.jump(1));
            f.block(1, |b| b.ret());
        });
        assert_eq!(body.num_blocks(), 2);
        let entry = body.entry_block();
        assert_eq!(body.block(entry).num_succs(), 1);
    }
}
