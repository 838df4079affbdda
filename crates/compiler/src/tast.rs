//! Typed intermediate tree produced by the checker and consumed by the code
//! generator. Every name is resolved to a slot, method index, or event
//! index; every expression carries its type tuple.

use crate::ast::{BinOp, ContractKind};
use crate::types::Type;
use ralphc_primitives::Val;

/// A resolved storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    Local { slot: u16, ty: Type },
    ImmField { slot: u16, ty: Type },
    MutField { slot: u16, ty: Type },
    Template { index: u8, ty: Type },
}

impl Place {
    pub fn ty(&self) -> &Type {
        match self {
            Self::Local { ty, .. }
            | Self::ImmField { ty, .. }
            | Self::MutField { ty, .. }
            | Self::Template { ty, .. } => ty,
        }
    }
}

/// One approval emitted ahead of a call; `token` is `None` for the ALPH
/// literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TApprove {
    pub address: TExpr,
    pub token: Option<TExpr>,
    pub amount: TExpr,
}

/// A builtin with its instruction variant already selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinCall {
    ApproveAlph,
    ApproveToken,
    AlphRemaining,
    TokenRemaining,
    TransferAlph,
    TransferToken,
    TransferAlphFromSelf,
    TransferTokenFromSelf,
    TransferAlphToSelf,
    TransferTokenToSelf,
    TxId,
    CallerAddress,
    SelfContractId,
    CheckCaller,
    Assert,
    AssertWithErrorCode,
    Panic { has_code: bool },
    MigrateWithFields,
    GetSegregatedSignature,
    VerifyBIP340Schnorr,
    Debug { message: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeRegion {
    Imm,
    Mut,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TExpr {
    pub tys: Vec<Type>,
    pub kind: TExprKind,
}

impl TExpr {
    pub fn new(ty: Type, kind: TExprKind) -> Self {
        Self { tys: vec![ty], kind }
    }

    /// The single type of a non-call expression.
    pub fn ty(&self) -> &Type {
        debug_assert_eq!(self.tys.len(), 1);
        &self.tys[0]
    }

    pub fn flattened_size(&self) -> usize {
        crate::types::flattened_size(&self.tys)
    }

    pub fn as_const(&self) -> Option<&Val> {
        match &self.kind {
            TExprKind::Const(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TExprKind {
    Const(Val),
    /// A (possibly indexed) read of a variable, field, or template
    /// variable. `offset_temp` holds the scratch local used when a dynamic
    /// index selects a whole sub-array.
    Load { place: Place, indices: Vec<TExpr>, offset_temp: Option<u16> },
    /// Indexing into an array-valued expression: the array is materialized
    /// into locals starting at `temp_slot` first, so its side effects run
    /// exactly once.
    IndexTemp {
        array: Box<TExpr>,
        temp_slot: u16,
        indices: Vec<TExpr>,
        offset_temp: Option<u16>,
    },
    Binary { op: BinOp, operand_ty: Type, lhs: Box<TExpr>, rhs: Box<TExpr> },
    Not(Box<TExpr>),
    ArrayLit(Vec<TExpr>),
    /// `[value; count]`; `temp_slot` is `None` when the value is a constant
    /// and can simply be pushed `count` times.
    Repeat { value: Box<TExpr>, count: usize, temp_slot: Option<u16> },
    IfExpr { cond: Box<TExpr>, then_expr: Box<TExpr>, else_expr: Box<TExpr> },
    LocalCall { index: u8, approvals: Vec<TApprove>, args: Vec<TExpr> },
    ExternalCall { receiver: Box<TExpr>, index: u8, approvals: Vec<TApprove>, args: Vec<TExpr> },
    Builtin { call: BuiltinCall, args: Vec<TExpr> },
    /// `T.encodeImmFields!` / `T.encodeMutFields!` / `T.encodeFields!`.
    EncodeFields {
        region: EncodeRegion,
        imm_args: Vec<TExpr>,
        mut_args: Vec<TExpr>,
        std_id: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TLetTarget {
    Bind { slot: u16, size: u16 },
    Anon { size: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TAssignTarget {
    Place { place: Place, indices: Vec<TExpr>, offset_temp: Option<u16> },
    Anon { size: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TStmt {
    Let { targets: Vec<TLetTarget>, value: TExpr },
    Assign { targets: Vec<TAssignTarget>, value: TExpr },
    Expr(TExpr),
    If { branches: Vec<(TExpr, Vec<TStmt>)>, else_body: Option<Vec<TStmt>> },
    While { cond: TExpr, body: Vec<TStmt> },
    For { init: Box<TStmt>, cond: TExpr, update: Box<TStmt>, body: Vec<TStmt> },
    Return(Vec<TExpr>),
    Emit { event_index: usize, args: Vec<TExpr> },
}

/// A checked function ready for lowering.
#[derive(Debug, Clone)]
pub struct TFunc {
    pub name: String,
    pub is_public: bool,
    pub use_preapproved_assets: bool,
    pub use_contract_assets: bool,
    pub args_length: u16,
    pub locals_length: u16,
    pub return_length: u16,
    pub body: Option<Vec<TStmt>>,
}

/// A checked declaration; `functions[0]` is the synthesized `main` for
/// scripts.
#[derive(Debug, Clone)]
pub struct TContract {
    pub kind: ContractKind,
    pub name: String,
    pub field_length: u16,
    pub functions: Vec<TFunc>,
}
