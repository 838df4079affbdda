//! Runtime values used for template-variable substitution.

use crate::instr::Instr;
use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

/// A fully evaluated Ralph scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Val {
    Bool(bool),
    U256(U256),
    I256(I256),
    ByteVec(Vec<u8>),
    Address(Vec<u8>),
}

impl Val {
    /// The constant instruction pushing this value.
    pub fn to_const_instr(&self) -> Instr {
        match self {
            Self::Bool(b) => Instr::BoolConst(*b),
            Self::U256(v) => Instr::u256_const(*v),
            Self::I256(v) => Instr::i256_const(*v),
            Self::ByteVec(bs) => Instr::BytesConst(bs.clone()),
            Self::Address(bs) => Instr::AddressConst(bs.clone()),
        }
    }
}
