//! Decoded input bytecode model.
//!
//! The importer consumes instructions that the external metadata reader has
//! already decoded: opcodes are an enum, metadata tokens are resolved to
//! descriptor handles, and branch targets are byte offsets. Raw byte
//! decoding, token resolution and signature parsing all live outside the
//! core.

use std::sync::Arc;

use crate::regions::ExceptionRegion;
use crate::types::{FieldDesc, MethodDesc, Type};

/// Decoded CIL-style opcodes the importer understands.
///
/// Typed short forms (`ldc.i4.s`, `ldarg.0`, ..) are normalized away by the
/// decoder; the operand carries the payload. Opcodes outside this set are an
/// import error, not a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // variant names mirror the standard mnemonics
pub enum OpCode {
    Nop,
    Dup,
    Pop,
    Ldarg,
    Starg,
    Ldarga,
    Ldloc,
    Stloc,
    Ldloca,
    Ldc,
    Ldnull,
    Ldstr,
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    Neg,
    Not,
    ConvI1,
    ConvU1,
    ConvI2,
    ConvU2,
    ConvI4,
    ConvU4,
    ConvI8,
    ConvU8,
    ConvR4,
    ConvR8,
    ConvI,
    ConvU,
    Ceq,
    Cgt,
    CgtUn,
    Clt,
    CltUn,
    Br,
    Brtrue,
    Brfalse,
    Beq,
    Bge,
    BgeUn,
    Bgt,
    BgtUn,
    Ble,
    BleUn,
    Blt,
    BltUn,
    BneUn,
    Switch,
    Ret,
    Call,
    Callvirt,
    Newobj,
    Ldfld,
    Ldflda,
    Stfld,
    Ldsfld,
    Ldsflda,
    Stsfld,
    Ldelem,
    Ldelema,
    Stelem,
    Ldlen,
    Newarr,
    LdindI4,
    LdindI8,
    LdindR8,
    LdindRef,
    StindI4,
    StindI8,
    StindR8,
    StindRef,
    Throw,
    Rethrow,
    Leave,
    Endfinally,
    Endfilter,
    Sizeof,
}

/// How an opcode leaves the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Falls through to the next instruction.
    Next,
    /// Always transfers to the branch target.
    Branch,
    /// Transfers to the target or falls through.
    CondBranch,
    /// Ends the method or the handler; never falls through.
    Terminate,
}

impl OpCode {
    /// Classifies the opcode's control flow.
    #[must_use]
    pub fn flow(self) -> FlowKind {
        match self {
            OpCode::Br | OpCode::Leave => FlowKind::Branch,
            OpCode::Brtrue
            | OpCode::Brfalse
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::BgeUn
            | OpCode::Bgt
            | OpCode::BgtUn
            | OpCode::Ble
            | OpCode::BleUn
            | OpCode::Blt
            | OpCode::BltUn
            | OpCode::BneUn
            | OpCode::Switch => FlowKind::CondBranch,
            OpCode::Ret
            | OpCode::Throw
            | OpCode::Rethrow
            | OpCode::Endfinally
            | OpCode::Endfilter => FlowKind::Terminate,
            _ => FlowKind::Next,
        }
    }
}

/// Decoded operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// Branch target byte offset.
    Target(u32),
    /// Switch table of target byte offsets.
    Switch(Box<[u32]>),
    /// Local variable index.
    Local(u16),
    /// Argument index.
    Argument(u16),
    /// Inline 32-bit integer.
    I32(i32),
    /// Inline 64-bit integer.
    I64(i64),
    /// Inline 32-bit float.
    F32(f32),
    /// Inline 64-bit float.
    F64(f64),
    /// Resolved string literal.
    Str(Arc<str>),
    /// Resolved field handle.
    Field(Arc<FieldDesc>),
    /// Resolved method handle.
    Method(Arc<MethodDesc>),
    /// Resolved type.
    Type(Type),
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct CilInstr {
    /// Opcode.
    pub opcode: OpCode,
    /// Byte offset of this instruction.
    pub offset: u32,
    /// Decoded operand.
    pub operand: Operand,
}

impl CilInstr {
    /// Creates an instruction without an operand.
    #[must_use]
    pub fn new(opcode: OpCode, offset: u32) -> Self {
        Self {
            opcode,
            offset,
            operand: Operand::None,
        }
    }

    /// Creates an instruction with an operand.
    #[must_use]
    pub fn with_operand(opcode: OpCode, offset: u32, operand: Operand) -> Self {
        Self {
            opcode,
            offset,
            operand,
        }
    }
}

/// A method's raw code as handed to the importer: the decoded instruction
/// stream, the signature-derived slot types, and the exception table in
/// inner-first order.
#[derive(Debug, Clone)]
pub struct MethodCode {
    /// Argument names and types, including any implicit `this`.
    pub args: Vec<(Arc<str>, Type)>,
    /// Local slot types.
    pub locals: Vec<Type>,
    /// Return type.
    pub ret: Type,
    /// Decoded instructions in offset order.
    pub instrs: Vec<CilInstr>,
    /// Exception-handling clauses, inner-first.
    pub regions: Vec<ExceptionRegion>,
}

impl MethodCode {
    /// Creates a method with no locals, regions, and a void return.
    #[must_use]
    pub fn new(args: Vec<(Arc<str>, Type)>, instrs: Vec<CilInstr>) -> Self {
        Self {
            args,
            locals: Vec::new(),
            ret: Type::Void,
            instrs,
            regions: Vec::new(),
        }
    }

    /// Returns one past the highest instruction offset, or zero when empty.
    #[must_use]
    pub fn end_offset(&self) -> u32 {
        self.instrs.last().map_or(0, |i| i.offset + 1)
    }
}
