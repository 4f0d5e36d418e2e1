// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.
//!
//! Instructions address registers of the current frame. Every instruction
//! has a short form with 8-bit operands and a wide form, announced by the
//! [`WIDE_PREFIX`] byte, with 32-bit operands. Doubles are always 8 bytes.
//! Jump offsets are relative to the first byte of the jump instruction.

pub mod debug;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use debug::DebugInfo;

/// Format revision written into every module.
pub const FORMAT_VERSION: u32 = 1;

/// Byte preceding a wide instruction.
pub const WIDE_PREFIX: u8 = 0xFF;

/// A compiled compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BytecodeModule {
    /// Format revision
    pub version: u32,
    /// Source file
    pub file: String,
    /// Function table; index 0 is the top-level code
    pub functions: Vec<FunctionEntry>,
    /// String table
    pub strings: Vec<String>,
    /// BigInt literals in decimal
    pub bigints: Vec<String>,
    /// Regular expression literals
    pub regexps: Vec<RegExpEntry>,
    /// Key lists of literal objects, as string ids
    pub object_keys: Vec<Vec<u32>>,
    /// Value lists of literal objects
    pub object_values: Vec<Vec<BufferValue>>,
    /// Element lists of literal arrays
    pub arrays: Vec<Vec<BufferValue>>,
    /// Environment layouts used by `CreateEnvironment`
    pub environments: Vec<EnvDescriptor>,
    /// Runtime helpers, indexed by `CallBuiltin`
    pub builtins: Vec<String>,
    /// Concatenated instruction bytes of every function
    pub code: Vec<u8>,
    /// Debug section, absent at `-g0`
    pub debug: Option<DebugInfo>,
}

/// One row of the function table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// String id of the function name
    pub name: u32,
    /// Declared parameter count
    pub param_count: u32,
    /// Registers the frame needs
    pub frame_size: u32,
    /// Strict mode code
    pub strict: bool,
    /// Body of a generator or async function
    pub resumable: bool,
    /// Environment slots the function creates
    pub captured: u32,
    /// Reads the environment it was created in
    pub has_parent_env: bool,
    /// Byte offset into the module code
    pub offset: u32,
    /// Byte length
    pub length: u32,
    /// Protected ranges, innermost first
    pub exceptions: Vec<ExceptionEntry>,
    /// Decoded instructions, for listings
    pub instructions: Vec<Instruction>,
}

/// Maps a range of function-relative byte offsets to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    /// First covered byte
    pub start: u32,
    /// First byte past the range
    pub end: u32,
    /// Handler offset
    pub handler: u32,
}

/// Layout of a runtime environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDescriptor {
    /// Slot count
    pub slots: u32,
    /// Links to an enclosing environment
    pub has_parent: bool,
    /// Slots that only ever hold primitives
    pub primitive_slots: Vec<u32>,
}

/// A regular expression literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegExpEntry {
    /// String id of the pattern
    pub pattern: u32,
    /// String id of the flags
    pub flags: u32,
}

/// A constant stored in a literal buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BufferValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Array hole
    Hole,
    /// `true`
    True,
    /// `false`
    False,
    /// A number
    Number(f64),
    /// String id
    String(u32),
    /// BigInt id
    BigInt(u32),
}

// ============================================================================
// Instructions
// ============================================================================

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Operands in encoding order
    pub operands: Vec<Operand>,
    /// Uses the 32-bit operand encoding
    pub wide: bool,
}

impl Instruction {
    /// Creates an instruction in the narrowest encoding its operands allow.
    pub fn new(opcode: OpCode, operands: Vec<Operand>) -> Self {
        let wide = operands.iter().any(|op| !op.fits_short());
        Self { opcode, operands, wide }
    }

    /// Creates an instruction with no operands.
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// True if some operand does not fit the short encoding.
    pub fn needs_wide(&self) -> bool {
        self.operands.iter().any(|op| !op.fits_short())
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> u32 {
        let prefix = u32::from(self.wide);
        1 + prefix + self.operands.iter().map(|op| op.size(self.wide)).sum::<u32>()
    }

    /// Appends the encoding to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        if self.wide {
            out.push(WIDE_PREFIX);
        }
        out.push(self.opcode as u8);
        for op in &self.operands {
            op.encode(self.wide, out);
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.opcode)?;
        if self.wide {
            write!(f, ".w")?;
        }
        for (i, op) in self.operands.iter().enumerate() {
            write!(f, "{}{op}", if i == 0 { " " } else { ", " })?;
        }
        Ok(())
    }
}

/// Instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Frame register
    Reg(u32),
    /// Unsigned immediate
    UInt(u32),
    /// Signed immediate
    Int(i32),
    /// Double immediate
    Double(f64),
    /// String table index
    Str(u32),
    /// BigInt table index
    BigInt(u32),
    /// RegExp table index
    RegExp(u32),
    /// Object key buffer index
    ObjKeys(u32),
    /// Object value buffer index
    ObjValues(u32),
    /// Array buffer index
    Array(u32),
    /// Function table index
    Function(u32),
    /// Environment table index
    Env(u32),
    /// Jump offset
    Jump(i32),
}

impl Operand {
    /// True if the value fits one byte.
    pub fn fits_short(&self) -> bool {
        match *self {
            Operand::Double(_) => true,
            Operand::Int(v) | Operand::Jump(v) => i8::try_from(v).is_ok(),
            Operand::Reg(v)
            | Operand::UInt(v)
            | Operand::Str(v)
            | Operand::BigInt(v)
            | Operand::RegExp(v)
            | Operand::ObjKeys(v)
            | Operand::ObjValues(v)
            | Operand::Array(v)
            | Operand::Function(v)
            | Operand::Env(v) => v <= u32::from(u8::MAX),
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self, wide: bool) -> u32 {
        match self {
            Operand::Double(_) => 8,
            _ if wide => 4,
            _ => 1,
        }
    }

    fn encode(&self, wide: bool, out: &mut Vec<u8>) {
        match *self {
            Operand::Double(d) => out.extend_from_slice(&d.to_le_bytes()),
            Operand::Int(v) | Operand::Jump(v) => {
                if wide {
                    out.extend_from_slice(&v.to_le_bytes());
                } else {
                    out.push(v as i8 as u8);
                }
            }
            Operand::Reg(v)
            | Operand::UInt(v)
            | Operand::Str(v)
            | Operand::BigInt(v)
            | Operand::RegExp(v)
            | Operand::ObjKeys(v)
            | Operand::ObjValues(v)
            | Operand::Array(v)
            | Operand::Function(v)
            | Operand::Env(v) => {
                if wide {
                    out.extend_from_slice(&v.to_le_bytes());
                } else {
                    out.push(v as u8);
                }
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "r{r}"),
            Operand::UInt(v) => write!(f, "{v}"),
            Operand::Int(v) => write!(f, "{v}"),
            Operand::Double(v) => write!(f, "{v:?}"),
            Operand::Str(i) => write!(f, "s{i}"),
            Operand::BigInt(i) => write!(f, "n{i}"),
            Operand::RegExp(i) => write!(f, "re{i}"),
            Operand::ObjKeys(i) => write!(f, "keys{i}"),
            Operand::ObjValues(i) => write!(f, "vals{i}"),
            Operand::Array(i) => write!(f, "arr{i}"),
            Operand::Function(i) => write!(f, "fn{i}"),
            Operand::Env(i) => write!(f, "env{i}"),
            Operand::Jump(off) => write!(f, "{off:+}"),
        }
    }
}

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    // Constants
    /// `dst = undefined`
    LoadConstUndefined,
    /// `dst = null`
    LoadConstNull,
    /// `dst = <uninitialized marker>`
    LoadConstEmpty,
    /// `dst = true`
    LoadConstTrue,
    /// `dst = false`
    LoadConstFalse,
    /// `dst = +0`
    LoadConstZero,
    /// `dst, int`
    LoadConstInt,
    /// `dst, double`
    LoadConstDouble,
    /// `dst, string`
    LoadConstString,
    /// `dst, bigint`
    LoadConstBigInt,

    // Frame
    /// `dst, src`
    Mov,
    /// `dst, index`; index 0 is `this`
    LoadParam,
    /// `dst`
    CreateArguments,
    /// `dst`
    GetNewTarget,
    /// `dst`
    GetGlobalObject,
    /// `dst = thrown value`
    Catch,

    // Environments
    /// `dst, env descriptor`
    CreateEnvironment,
    /// `dst, parent, env descriptor`
    CreateInnerEnvironment,
    /// `dst = environment of the running closure`
    GetParentEnvironment,
    /// `dst, start, hops`
    ResolveEnvironment,
    /// `dst, closure`
    GetClosureEnvironment,
    /// `dst, env, slot`
    LoadFromEnvironment,
    /// `env, slot, value`
    StoreToEnvironment,
    /// `env, slot, value`; the value is a primitive
    StoreNPToEnvironment,
    /// `dst, value`; throws a ReferenceError on the uninitialized marker
    ThrowIfEmpty,

    // Globals
    /// `dst, name`; throws if missing
    GetGlobal,
    /// `dst, name`; undefined if missing
    TryGetGlobal,
    /// `name, value`
    PutGlobal,
    /// `name`
    DeclareGlobalVar,

    // Arithmetic
    /// Add
    Add,
    /// Add numbers
    AddN,
    /// Subtract
    Sub,
    /// Subtract numbers
    SubN,
    /// Multiply
    Mul,
    /// Multiply numbers
    MulN,
    /// Divide
    Div,
    /// Divide numbers
    DivN,
    /// Remainder
    Mod,
    /// Remainder of numbers
    ModN,
    /// Exponentiation
    Exp,
    /// Negate
    Neg,
    /// Negate a number
    NegN,
    /// Increment a numeric
    Inc,
    /// Increment a number
    IncN,
    /// Decrement a numeric
    Dec,
    /// Decrement a number
    DecN,
    /// ToNumber
    ToNumber,
    /// ToNumeric
    ToNumeric,
    /// ToString
    ToString,

    // Bitwise
    /// Bitwise AND
    BitAnd,
    /// Bitwise AND of numbers
    BitAndI,
    /// Bitwise OR
    BitOr,
    /// Bitwise OR of numbers
    BitOrI,
    /// Bitwise XOR
    BitXor,
    /// Bitwise XOR of numbers
    BitXorI,
    /// Bitwise NOT
    BitNot,
    /// Bitwise NOT of a number
    BitNotI,
    /// Left shift
    Shl,
    /// Left shift of numbers
    ShlI,
    /// Signed right shift
    Shr,
    /// Signed right shift of numbers
    ShrI,
    /// Unsigned right shift
    UShr,

    // Comparison
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `<`
    Less,
    /// `<` on numbers
    LessN,
    /// `<=`
    LessEq,
    /// `<=` on numbers
    LessEqN,
    /// `>`
    Greater,
    /// `>` on numbers
    GreaterN,
    /// `>=`
    GreaterEq,
    /// `>=` on numbers
    GreaterEqN,
    /// Logical NOT
    Not,
    /// `typeof`
    TypeOf,
    /// `in`
    IsIn,
    /// `instanceof`
    InstanceOf,

    // Functions
    /// `dst, env, function`
    CreateClosure,
    /// `dst, function`
    CreateClosureNoEnv,
    /// `dst, env, function`
    CreateGenerator,
    /// `dst, function`
    CreateGeneratorNoEnv,
    /// `dst, callee, this`
    Call1,
    /// `dst, callee, this, a0`
    Call2,
    /// `dst, callee, this, a0, a1`
    Call3,
    /// `dst, callee, this, a0, a1, a2`
    Call4,
    /// `dst, callee, argc`; `this` and arguments at the frame top
    Call,
    /// `dst, callee, new.target, argc`; arguments at the frame top
    Construct,
    /// `dst, callee, this, args array`
    CallWithArgsArray,
    /// `dst, callee, new.target, args array`
    ConstructWithArgsArray,
    /// `dst, builtin, argc`; arguments at the frame top
    CallBuiltin,

    // Properties
    /// `dst, object, name`
    GetById,
    /// `dst, object, key`
    GetByVal,
    /// `object, name, value`
    PutById,
    /// `object, key, value`
    PutByVal,
    /// `dst, object, name`
    DelById,
    /// `dst, object, key`
    DelByVal,
    /// `object, name, value, enumerable`
    PutOwnById,
    /// `object, key, value, enumerable`
    PutOwnByVal,
    /// `object, index, value`
    PutOwnByIndex,
    /// `object, key, getter, setter, flags`
    DefineAccessor,

    // Allocation
    /// `dst`
    NewObject,
    /// `dst, proto`
    NewObjectWithParent,
    /// `dst, keys, values`
    NewObjectWithBuffer,
    /// `dst, length`
    NewArray,
    /// `dst, elements, length`
    NewArrayWithBuffer,
    /// `array, iterable`
    SpreadIntoArray,
    /// `dst, regexp`
    CreateRegExp,

    // Iteration
    /// `dst, iterable`
    GetIterator,
    /// `iterator, on throw`
    IteratorClose,

    // Control flow
    /// Unconditional jump
    Jmp,
    /// Jump if truthy
    JmpTrue,
    /// Jump if falsy
    JmpFalse,
    /// `value, min, count, default, targets...`
    SwitchImm,
    /// Return a value
    Ret,
    /// Throw a value
    Throw,
    /// Trap; control cannot reach here
    Unreachable,
    /// `debugger`
    Debugger,
}

impl OpCode {
    /// True for instructions that may transfer control to a jump operand.
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jmp | OpCode::JmpTrue | OpCode::JmpFalse | OpCode::SwitchImm)
    }

    /// True if control never falls through to the next instruction.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpCode::Jmp | OpCode::SwitchImm | OpCode::Ret | OpCode::Throw | OpCode::Unreachable
        )
    }
}

// ============================================================================
// Listings
// ============================================================================

impl BytecodeModule {
    /// Human-readable listing of the whole module.
    pub fn disassemble(&self) -> String {
        self.to_string()
    }

    /// Looks up a string table entry.
    pub fn string(&self, id: u32) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }
}

impl fmt::Display for BytecodeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {} (format {})", self.file, self.version)?;
        for (i, func) in self.functions.iter().enumerate() {
            let name = self.string(func.name).unwrap_or("?");
            writeln!(f)?;
            writeln!(
                f,
                "fn{i} {name}: params={} frame={} offset={} length={}",
                func.param_count, func.frame_size, func.offset, func.length
            )?;
            let mut at = 0u32;
            for inst in &func.instructions {
                write!(f, "  {at:5}  {inst}")?;
                if let Some(Operand::Str(s)) = inst.operands.iter().find(|op| matches!(op, Operand::Str(_))) {
                    if let Some(text) = self.string(*s) {
                        write!(f, "  ; {text:?}")?;
                    }
                }
                writeln!(f)?;
                at += inst.size();
            }
            for e in &func.exceptions {
                writeln!(f, "  ; try [{}, {}) -> {}", e.start, e.end, e.handler)?;
            }
        }
        if !self.strings.is_empty() {
            writeln!(f)?;
            writeln!(f, "; strings")?;
            for (i, s) in self.strings.iter().enumerate() {
                writeln!(f, "  s{i} = {s:?}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_wide_sizes() {
        let short = Instruction::new(OpCode::Add, vec![Operand::Reg(0), Operand::Reg(1), Operand::Reg(2)]);
        assert!(!short.wide);
        assert_eq!(short.size(), 4);

        let wide = Instruction::new(OpCode::Add, vec![Operand::Reg(0), Operand::Reg(300), Operand::Reg(2)]);
        assert!(wide.wide);
        assert_eq!(wide.size(), 2 + 12);

        let double = Instruction::new(OpCode::LoadConstDouble, vec![Operand::Reg(0), Operand::Double(0.5)]);
        assert_eq!(double.size(), 1 + 1 + 8);
    }

    #[test]
    fn test_encoding_matches_size() {
        let insts = [
            Instruction::new(OpCode::Jmp, vec![Operand::Jump(-3)]),
            Instruction::new(OpCode::Jmp, vec![Operand::Jump(-300)]),
            Instruction::new(OpCode::LoadConstInt, vec![Operand::Reg(1), Operand::Int(70_000)]),
            Instruction::simple(OpCode::Debugger),
        ];
        for inst in &insts {
            let mut out = Vec::new();
            inst.encode(&mut out);
            assert_eq!(out.len() as u32, inst.size(), "{inst}");
        }
        let mut out = Vec::new();
        insts[1].encode(&mut out);
        assert_eq!(out[0], WIDE_PREFIX);
        assert_eq!(out[1], OpCode::Jmp as u8);
        assert_eq!(i32::from_le_bytes([out[2], out[3], out[4], out[5]]), -300);
    }

    #[test]
    fn test_display() {
        let inst = Instruction::new(OpCode::GetById, vec![Operand::Reg(0), Operand::Reg(1), Operand::Str(4)]);
        assert_eq!(inst.to_string(), "GetById r0, r1, s4");
        let jump = Instruction::new(OpCode::JmpTrue, vec![Operand::Reg(2), Operand::Jump(6)]);
        assert_eq!(jump.to_string(), "JmpTrue r2, +6");
    }
}
