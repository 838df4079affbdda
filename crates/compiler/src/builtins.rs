//! Builtin functions, looked up by their source name (without the `!`).

use crate::types::Type;
use std::str::FromStr;

/// How a builtin touches transaction or contract assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetUse {
    None,
    /// Spends assets preapproved by the caller.
    Preapproved,
    /// Moves assets owned by the contract itself.
    Contract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Builtin {
    #[strum(serialize = "approveToken")]
    ApproveToken,
    #[strum(serialize = "tokenRemaining")]
    TokenRemaining,
    #[strum(serialize = "transferToken")]
    TransferToken,
    #[strum(serialize = "transferTokenFromSelf")]
    TransferTokenFromSelf,
    #[strum(serialize = "transferTokenToSelf")]
    TransferTokenToSelf,
    #[strum(serialize = "txId")]
    TxId,
    #[strum(serialize = "callerAddress")]
    CallerAddress,
    #[strum(serialize = "selfContractId")]
    SelfContractId,
    #[strum(serialize = "checkCaller")]
    CheckCaller,
    #[strum(serialize = "assert")]
    Assert,
    #[strum(serialize = "panic")]
    Panic,
    #[strum(serialize = "debug")]
    Debug,
    #[strum(serialize = "migrateWithFields")]
    MigrateWithFields,
    #[strum(serialize = "getSegregatedSignature")]
    GetSegregatedSignature,
    #[strum(serialize = "verifyBIP340Schnorr")]
    VerifyBIP340Schnorr,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }

    pub fn asset_use(&self) -> AssetUse {
        match self {
            Self::ApproveToken | Self::TokenRemaining | Self::TransferToken => AssetUse::Preapproved,
            Self::TransferTokenFromSelf | Self::TransferTokenToSelf => AssetUse::Contract,
            _ => AssetUse::None,
        }
    }

    /// Position of the token-id argument, where the literal `ALPH` selects
    /// the `…Alph` instruction variant.
    pub fn token_arg_index(&self) -> Option<usize> {
        match self {
            Self::TokenRemaining | Self::ApproveToken => Some(1),
            Self::TransferToken => Some(2),
            Self::TransferTokenFromSelf | Self::TransferTokenToSelf => Some(1),
            _ => None,
        }
    }

    /// Fixed parameter types; `None` for the variable-arity builtins
    /// (`assert!`, `panic!`, `debug!`), which the checker handles itself.
    pub fn params(&self) -> Option<Vec<Type>> {
        Some(match self {
            Self::ApproveToken => vec![Type::Address, Type::ByteVec, Type::U256],
            Self::TokenRemaining => vec![Type::Address, Type::ByteVec],
            Self::TransferToken => vec![Type::Address, Type::Address, Type::ByteVec, Type::U256],
            Self::TransferTokenFromSelf | Self::TransferTokenToSelf => {
                vec![Type::Address, Type::ByteVec, Type::U256]
            }
            Self::TxId | Self::CallerAddress | Self::SelfContractId => vec![],
            Self::CheckCaller => vec![Type::Bool, Type::U256],
            Self::MigrateWithFields => vec![Type::ByteVec, Type::ByteVec, Type::ByteVec],
            Self::GetSegregatedSignature => vec![],
            Self::VerifyBIP340Schnorr => vec![Type::ByteVec, Type::ByteVec, Type::ByteVec],
            Self::Assert | Self::Panic | Self::Debug => return None,
        })
    }

    pub fn returns(&self) -> Vec<Type> {
        match self {
            Self::TokenRemaining => vec![Type::U256],
            Self::TxId | Self::SelfContractId | Self::GetSegregatedSignature => vec![Type::ByteVec],
            Self::CallerAddress => vec![Type::Address],
            _ => vec![],
        }
    }

    /// `panic!` ends the enclosing path unconditionally.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Panic)
    }
}

/// Static builtins called on a contract type, e.g.
/// `Token.encodeImmFields!(…)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum StaticBuiltin {
    #[strum(serialize = "encodeImmFields")]
    EncodeImmFields,
    #[strum(serialize = "encodeMutFields")]
    EncodeMutFields,
    #[strum(serialize = "encodeFields")]
    EncodeFields,
}

impl StaticBuiltin {
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_uses_source_spelling() {
        assert_eq!(Builtin::lookup("approveToken"), Some(Builtin::ApproveToken));
        assert_eq!(Builtin::lookup("approve_token"), None);
        assert_eq!(StaticBuiltin::lookup("encodeFields"), Some(StaticBuiltin::EncodeFields));
    }

    #[test]
    fn asset_classification() {
        assert_eq!(Builtin::TransferToken.asset_use(), AssetUse::Preapproved);
        assert_eq!(Builtin::TransferTokenToSelf.asset_use(), AssetUse::Contract);
        assert_eq!(Builtin::CheckCaller.asset_use(), AssetUse::None);
    }
}
