//! Compiled method representation.

use crate::codec::{DecodeError, Decoder};
use crate::instr::Instr;
use serde::{Deserialize, Serialize};

const FLAG_PUBLIC: u8 = 0b001;
const FLAG_PREAPPROVED_ASSETS: u8 = 0b010;
const FLAG_CONTRACT_ASSETS: u8 = 0b100;

/// One compiled function: header flags, slot counts, and the flat
/// instruction vector. All counts are in flattened scalar slots; the first
/// `args_length` locals hold the arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_contract_assets: bool,
    pub args_length: u16,
    pub locals_length: u16,
    pub return_length: u16,
    pub instrs: Vec<Instr>,
}

impl Method {
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.is_public {
            flags |= FLAG_PUBLIC;
        }
        if self.use_preapproved_assets {
            flags |= FLAG_PREAPPROVED_ASSETS;
        }
        if self.use_contract_assets {
            flags |= FLAG_CONTRACT_ASSETS;
        }
        out.push(flags);
        out.extend_from_slice(&self.args_length.to_be_bytes());
        out.extend_from_slice(&self.locals_length.to_be_bytes());
        out.extend_from_slice(&self.return_length.to_be_bytes());
        debug_assert!(self.instrs.len() <= u16::MAX as usize);
        out.extend_from_slice(&(self.instrs.len() as u16).to_be_bytes());
        for instr in &self.instrs {
            instr.serialize_into(out);
        }
    }

    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let flags = decoder.u8()?;
        let args_length = decoder.u16()?;
        let locals_length = decoder.u16()?;
        let return_length = decoder.u16()?;
        let count = decoder.u16()? as usize;
        let mut instrs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            instrs.push(Instr::decode(decoder)?);
        }
        Ok(Self {
            is_public: flags & FLAG_PUBLIC != 0,
            use_preapproved_assets: flags & FLAG_PREAPPROVED_ASSETS != 0,
            use_contract_assets: flags & FLAG_CONTRACT_ASSETS != 0,
            args_length,
            locals_length,
            return_length,
            instrs,
        })
    }
}
