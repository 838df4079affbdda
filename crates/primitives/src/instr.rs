//! The Ralph VM instruction set.
//!
//! Every instruction owns a fixed one-byte opcode. Operands are encoded
//! inline: a single byte for index operands, a big-endian `i16` for jump
//! offsets, a length-prefixed byte string for constants. The numbering is
//! stable; debug and production bytecode share one table.

use crate::codec::{write_byte_string, DecodeError, Decoder};
use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

/// A single Ralph VM instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    // Constants.
    BoolConst(bool),
    U256Const0,
    U256Const1,
    U256Const2,
    U256Const3,
    U256Const4,
    U256Const5,
    U256Const(U256),
    I256Const0,
    I256ConstN1,
    I256Const(I256),
    BytesConst(Vec<u8>),
    AddressConst(Vec<u8>),
    /// Placeholder for a script template variable, substituted before
    /// execution.
    TemplateVariable(u8),

    // Arithmetic and logic. Binary numeric instructions dispatch on the
    // runtime tag of their operands; ordering comparisons are typed.
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    ModExp,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Neq,
    Not,
    ByteVecConcat,
    U256Lt,
    U256Le,
    U256Gt,
    U256Ge,
    I256Lt,
    I256Le,
    I256Gt,
    I256Ge,

    // Control flow. Offsets are relative to the next instruction.
    Jump(i16),
    IfTrue(i16),
    IfFalse(i16),
    Return,
    Assert,
    AssertWithErrorCode,
    Panic,

    // Locals and stack.
    LoadLocal(u8),
    StoreLocal(u8),
    LoadLocalByIndex,
    StoreLocalByIndex,
    Dup,
    Pop,

    // Contract fields.
    LoadImmField(u8),
    LoadMutField(u8),
    StoreMutField(u8),
    LoadImmFieldByIndex,
    LoadMutFieldByIndex,
    StoreMutFieldByIndex,

    // Calls.
    CallLocal(u8),
    CallExternal(u8),

    // Events and field serialization.
    Log(u8),
    Encode,
    /// Pops a message `ByteVec`. Present only in debug bytecode.
    DebugMessage,

    // Asset movement.
    ApproveAlph,
    ApproveToken,
    AlphRemaining,
    TokenRemaining,
    TransferAlph,
    TransferAlphFromSelf,
    TransferAlphToSelf,
    TransferToken,
    TransferTokenFromSelf,
    TransferTokenToSelf,

    // Transaction and chain introspection.
    TxId,
    CallerAddress,
    SelfContractId,
    MigrateWithFields,
    GetSegregatedSignature,
    VerifyBIP340Schnorr,
}

impl Instr {
    /// The smallest constant instruction pushing `value`.
    pub fn u256_const(value: U256) -> Self {
        match u64::try_from(value) {
            Ok(0) => Self::U256Const0,
            Ok(1) => Self::U256Const1,
            Ok(2) => Self::U256Const2,
            Ok(3) => Self::U256Const3,
            Ok(4) => Self::U256Const4,
            Ok(5) => Self::U256Const5,
            _ => Self::U256Const(value),
        }
    }

    /// The smallest constant instruction pushing `value`.
    pub fn i256_const(value: I256) -> Self {
        if value == I256::ZERO {
            Self::I256Const0
        } else if value == I256::MINUS_ONE {
            Self::I256ConstN1
        } else {
            Self::I256Const(value)
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::BoolConst(_) => 0x00,
            Self::U256Const0 => 0x01,
            Self::U256Const1 => 0x02,
            Self::U256Const2 => 0x03,
            Self::U256Const3 => 0x04,
            Self::U256Const4 => 0x05,
            Self::U256Const5 => 0x06,
            Self::U256Const(_) => 0x07,
            Self::I256Const0 => 0x08,
            Self::I256ConstN1 => 0x09,
            Self::I256Const(_) => 0x0a,
            Self::BytesConst(_) => 0x0b,
            Self::AddressConst(_) => 0x0c,
            Self::TemplateVariable(_) => 0x0d,

            Self::Add => 0x10,
            Self::Sub => 0x11,
            Self::Mul => 0x12,
            Self::Div => 0x13,
            Self::Mod => 0x14,
            Self::Exp => 0x15,
            Self::ModExp => 0x16,
            Self::Shl => 0x17,
            Self::Shr => 0x18,
            Self::BitAnd => 0x19,
            Self::BitOr => 0x1a,
            Self::BitXor => 0x1b,
            Self::Eq => 0x1c,
            Self::Neq => 0x1d,
            Self::Not => 0x1e,
            Self::ByteVecConcat => 0x1f,
            Self::U256Lt => 0x20,
            Self::U256Le => 0x21,
            Self::U256Gt => 0x22,
            Self::U256Ge => 0x23,
            Self::I256Lt => 0x24,
            Self::I256Le => 0x25,
            Self::I256Gt => 0x26,
            Self::I256Ge => 0x27,

            Self::Jump(_) => 0x30,
            Self::IfTrue(_) => 0x31,
            Self::IfFalse(_) => 0x32,
            Self::Return => 0x33,
            Self::Assert => 0x34,
            Self::AssertWithErrorCode => 0x35,
            Self::Panic => 0x36,

            Self::LoadLocal(_) => 0x40,
            Self::StoreLocal(_) => 0x41,
            Self::LoadLocalByIndex => 0x42,
            Self::StoreLocalByIndex => 0x43,
            Self::Dup => 0x44,
            Self::Pop => 0x45,

            Self::LoadImmField(_) => 0x50,
            Self::LoadMutField(_) => 0x51,
            Self::StoreMutField(_) => 0x52,
            Self::LoadImmFieldByIndex => 0x53,
            Self::LoadMutFieldByIndex => 0x54,
            Self::StoreMutFieldByIndex => 0x55,

            Self::CallLocal(_) => 0x60,
            Self::CallExternal(_) => 0x61,

            Self::Log(_) => 0x68,
            Self::Encode => 0x69,
            Self::DebugMessage => 0x6a,

            Self::ApproveAlph => 0x70,
            Self::ApproveToken => 0x71,
            Self::AlphRemaining => 0x72,
            Self::TokenRemaining => 0x73,
            Self::TransferAlph => 0x74,
            Self::TransferAlphFromSelf => 0x75,
            Self::TransferAlphToSelf => 0x76,
            Self::TransferToken => 0x77,
            Self::TransferTokenFromSelf => 0x78,
            Self::TransferTokenToSelf => 0x79,

            Self::TxId => 0x80,
            Self::CallerAddress => 0x81,
            Self::SelfContractId => 0x82,
            Self::MigrateWithFields => 0x83,
            Self::GetSegregatedSignature => 0x84,
            Self::VerifyBIP340Schnorr => 0x85,
        }
    }

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match self {
            Self::BoolConst(b) => out.push(*b as u8),
            Self::U256Const(v) => {
                let bytes = v.to_be_bytes_trimmed_vec();
                out.push(bytes.len() as u8);
                out.extend_from_slice(&bytes);
            }
            Self::I256Const(v) => out.extend_from_slice(&v.into_raw().to_be_bytes::<32>()),
            Self::BytesConst(bs) | Self::AddressConst(bs) => write_byte_string(out, bs),
            Self::TemplateVariable(i)
            | Self::LoadLocal(i)
            | Self::StoreLocal(i)
            | Self::LoadImmField(i)
            | Self::LoadMutField(i)
            | Self::StoreMutField(i)
            | Self::CallLocal(i)
            | Self::CallExternal(i)
            | Self::Log(i) => out.push(*i),
            Self::Jump(off) | Self::IfTrue(off) | Self::IfFalse(off) => {
                out.extend_from_slice(&off.to_be_bytes())
            }
            _ => {}
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let at = decoder.position();
        let opcode = decoder.u8()?;
        let instr = match opcode {
            0x00 => Self::BoolConst(decoder.bool()?),
            0x01 => Self::U256Const0,
            0x02 => Self::U256Const1,
            0x03 => Self::U256Const2,
            0x04 => Self::U256Const3,
            0x05 => Self::U256Const4,
            0x06 => Self::U256Const5,
            0x07 => {
                let len = decoder.u8()? as usize;
                if len > 32 {
                    return Err(DecodeError::OversizedConst(len));
                }
                Self::U256Const(U256::from_be_slice(decoder.bytes(len)?))
            }
            0x08 => Self::I256Const0,
            0x09 => Self::I256ConstN1,
            0x0a => {
                let raw = U256::from_be_slice(decoder.bytes(32)?);
                Self::I256Const(I256::from_raw(raw))
            }
            0x0b => Self::BytesConst(decoder.byte_string()?),
            0x0c => Self::AddressConst(decoder.byte_string()?),
            0x0d => Self::TemplateVariable(decoder.u8()?),

            0x10 => Self::Add,
            0x11 => Self::Sub,
            0x12 => Self::Mul,
            0x13 => Self::Div,
            0x14 => Self::Mod,
            0x15 => Self::Exp,
            0x16 => Self::ModExp,
            0x17 => Self::Shl,
            0x18 => Self::Shr,
            0x19 => Self::BitAnd,
            0x1a => Self::BitOr,
            0x1b => Self::BitXor,
            0x1c => Self::Eq,
            0x1d => Self::Neq,
            0x1e => Self::Not,
            0x1f => Self::ByteVecConcat,
            0x20 => Self::U256Lt,
            0x21 => Self::U256Le,
            0x22 => Self::U256Gt,
            0x23 => Self::U256Ge,
            0x24 => Self::I256Lt,
            0x25 => Self::I256Le,
            0x26 => Self::I256Gt,
            0x27 => Self::I256Ge,

            0x30 => Self::Jump(decoder.i16()?),
            0x31 => Self::IfTrue(decoder.i16()?),
            0x32 => Self::IfFalse(decoder.i16()?),
            0x33 => Self::Return,
            0x34 => Self::Assert,
            0x35 => Self::AssertWithErrorCode,
            0x36 => Self::Panic,

            0x40 => Self::LoadLocal(decoder.u8()?),
            0x41 => Self::StoreLocal(decoder.u8()?),
            0x42 => Self::LoadLocalByIndex,
            0x43 => Self::StoreLocalByIndex,
            0x44 => Self::Dup,
            0x45 => Self::Pop,

            0x50 => Self::LoadImmField(decoder.u8()?),
            0x51 => Self::LoadMutField(decoder.u8()?),
            0x52 => Self::StoreMutField(decoder.u8()?),
            0x53 => Self::LoadImmFieldByIndex,
            0x54 => Self::LoadMutFieldByIndex,
            0x55 => Self::StoreMutFieldByIndex,

            0x60 => Self::CallLocal(decoder.u8()?),
            0x61 => Self::CallExternal(decoder.u8()?),

            0x68 => Self::Log(decoder.u8()?),
            0x69 => Self::Encode,
            0x6a => Self::DebugMessage,

            0x70 => Self::ApproveAlph,
            0x71 => Self::ApproveToken,
            0x72 => Self::AlphRemaining,
            0x73 => Self::TokenRemaining,
            0x74 => Self::TransferAlph,
            0x75 => Self::TransferAlphFromSelf,
            0x76 => Self::TransferAlphToSelf,
            0x77 => Self::TransferToken,
            0x78 => Self::TransferTokenFromSelf,
            0x79 => Self::TransferTokenToSelf,

            0x80 => Self::TxId,
            0x81 => Self::CallerAddress,
            0x82 => Self::SelfContractId,
            0x83 => Self::MigrateWithFields,
            0x84 => Self::GetSegregatedSignature,
            0x85 => Self::VerifyBIP340Schnorr,

            other => return Err(DecodeError::UnknownOpcode(other, at)),
        };
        Ok(instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_u256_constants() {
        assert_eq!(Instr::u256_const(U256::ZERO), Instr::U256Const0);
        assert_eq!(Instr::u256_const(U256::from(5u64)), Instr::U256Const5);
        assert_eq!(Instr::u256_const(U256::from(6u64)), Instr::U256Const(U256::from(6u64)));
    }

    #[test]
    fn u256_const_trims_leading_zeroes() {
        let instr = Instr::U256Const(U256::from(0x1234u64));
        assert_eq!(instr.serialize(), vec![0x07, 2, 0x12, 0x34]);
    }

    #[test]
    fn negative_i256_round_trips() {
        let value = I256::unchecked_from(-123456789i64);
        let bytes = Instr::I256Const(value).serialize();
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(Instr::decode(&mut decoder).unwrap(), Instr::I256Const(value));
        decoder.finish().unwrap();
    }

    #[test]
    fn jump_offsets_are_signed() {
        let bytes = Instr::Jump(-7).serialize();
        let mut decoder = Decoder::new(&bytes);
        assert_eq!(Instr::decode(&mut decoder).unwrap(), Instr::Jump(-7));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut decoder = Decoder::new(&[0xff]);
        assert_eq!(Instr::decode(&mut decoder), Err(DecodeError::UnknownOpcode(0xff, 0)));
    }
}
