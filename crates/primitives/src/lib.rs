//! Bytecode primitives for the Ralph virtual machine.
//!
//! This crate defines the instruction set ([`Instr`]), the compiled method
//! representation ([`Method`]), the top-level bytecode containers
//! ([`StatefulContract`], [`StatefulScript`], [`StatelessScript`]) and the
//! binary codec connecting them to their on-chain wire form.
//!
//! Serialization is exact: `deserialize(serialize(x)) == x` for every value
//! these types can represent.

mod codec;
mod contract;
mod instr;
mod method;
mod val;

pub use codec::{Decoder, DecodeError};
pub use contract::{StatefulContract, StatefulScript, StatelessScript, SubstituteError};
pub use instr::Instr;
pub use method::Method;
pub use val::Val;
