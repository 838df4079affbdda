//! Abstract syntax tree produced by the parser.
//!
//! Nodes are plain owned values; the tree for one source unit is immutable
//! after parsing. Names are kept as strings and resolved during semantic
//! analysis.

use crate::error::SourcePos;
use crate::types::Type;
use alloy_primitives::{I256, U256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    U256(U256),
    I256(I256),
    Bytes(Vec<u8>),
    Address(Vec<u8>),
    /// The distinguished ALPH token id, only meaningful in token positions.
    Alph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
    Concat,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Exp => "**",
            Self::ModExp => "|**|",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Concat => "++",
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One `addr -> tokenId: amount` clause of the braces approval syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveClause {
    pub address: Expr,
    pub token: Expr,
    pub amount: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Lit(Literal, SourcePos),
    Var(Ident),
    /// `Base.member`, an enum variant access.
    Member { base: Ident, member: Ident },
    /// `[a, b, c]`
    ArrayLit(Vec<Expr>, SourcePos),
    /// `[value; size]` with a compile-time constant size.
    ArrayRepeat { value: Box<Expr>, size: Box<Expr>, pos: SourcePos },
    Index { base: Box<Expr>, index: Box<Expr>, pos: SourcePos },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, pos: SourcePos },
    Not { expr: Box<Expr>, pos: SourcePos },
    /// `name(args)`, `name!(args)`, or `name{approvals}(args)`; resolves to
    /// a local call, a builtin, or a contract-reference conversion.
    Call {
        name: Ident,
        is_builtin: bool,
        approvals: Vec<ApproveClause>,
        args: Vec<Expr>,
    },
    /// `receiver.name(args)`: an external call, or a static builtin call
    /// such as `Token.encodeImmFields!(…)` when the receiver is a bare
    /// contract name.
    MemberCall {
        receiver: Box<Expr>,
        name: Ident,
        is_builtin: bool,
        approvals: Vec<ApproveClause>,
        args: Vec<Expr>,
    },
    /// `if (cond) a else b`
    IfExpr { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr>, pos: SourcePos },
    /// A backtick string, accepted only by `debug!`.
    DebugString(String, SourcePos),
}

impl Expr {
    pub fn pos(&self) -> SourcePos {
        match self {
            Self::Lit(_, pos)
            | Self::ArrayLit(_, pos)
            | Self::ArrayRepeat { pos, .. }
            | Self::Index { pos, .. }
            | Self::Binary { pos, .. }
            | Self::Not { pos, .. }
            | Self::IfExpr { pos, .. }
            | Self::DebugString(_, pos) => *pos,
            Self::Var(ident) | Self::Call { name: ident, .. } => ident.pos,
            Self::Member { base, .. } => base.pos,
            Self::MemberCall { receiver, .. } => receiver.pos(),
        }
    }
}

/// Left-hand side of a `let` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetTarget {
    pub mutable: bool,
    /// `None` for the anonymous `_` binder.
    pub name: Option<Ident>,
    pub pos: SourcePos,
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTarget {
    /// `x = …`
    Var(Ident),
    /// `x[i][j] = …`
    Index { base: Ident, indices: Vec<Expr> },
    /// `_ = …`
    Anonymous(SourcePos),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Let { targets: Vec<LetTarget>, value: Expr, pos: SourcePos },
    Assign { targets: Vec<AssignTarget>, value: Expr, pos: SourcePos },
    If { branches: Vec<(Expr, Vec<Stmt>)>, else_body: Option<Vec<Stmt>>, pos: SourcePos },
    While { cond: Expr, body: Vec<Stmt>, pos: SourcePos },
    For { init: Box<Stmt>, cond: Expr, update: Box<Stmt>, body: Vec<Stmt>, pos: SourcePos },
    Return { values: Vec<Expr>, pos: SourcePos },
    Emit { event: Ident, args: Vec<Expr>, pos: SourcePos },
    Expr(Expr),
}

impl Stmt {
    pub fn pos(&self) -> SourcePos {
        match self {
            Self::Let { pos, .. }
            | Self::Assign { pos, .. }
            | Self::If { pos, .. }
            | Self::While { pos, .. }
            | Self::For { pos, .. }
            | Self::Return { pos, .. }
            | Self::Emit { pos, .. } => *pos,
            Self::Expr(expr) => expr.pos(),
        }
    }
}

/// `@using(…)` flags; `None` means the key was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsingAnnotation {
    pub preapproved_assets: Option<bool>,
    pub assets_in_contract: Option<bool>,
    pub check_external_caller: Option<bool>,
    pub update_fields: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub ident: Ident,
    pub ty: Type,
    pub mutable: bool,
    pub unused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDef {
    pub annotations: UsingAnnotation,
    pub is_public: bool,
    pub name: Ident,
    pub args: Vec<Argument>,
    pub returns: Vec<Type>,
    /// `None` for interface signatures and abstract declarations.
    pub body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub ident: Ident,
    pub ty: Type,
    pub mutable: bool,
    pub unused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDef {
    pub name: Ident,
    pub params: Vec<(Ident, Type)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDef {
    pub name: Ident,
    pub value: Literal,
    pub unused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: Ident,
    pub variants: Vec<(Ident, Literal)>,
}

/// `extends Parent(a, b)`: the arguments name fields of the child that are
/// forwarded to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inheritance {
    pub parent: Ident,
    pub fields: Vec<Ident>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    AbstractContract,
    Interface,
    TxScript,
    AssetScript,
}

impl ContractKind {
    pub fn is_script(&self) -> bool {
        matches!(self, Self::TxScript | Self::AssetScript)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Contract => "Contract",
            Self::AbstractContract => "Abstract Contract",
            Self::Interface => "Interface",
            Self::TxScript => "TxScript",
            Self::AssetScript => "AssetScript",
        }
    }
}

/// `@std` data attached to a declaration header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StdAnnotation {
    pub id: Option<Vec<u8>>,
    pub enabled: Option<bool>,
}

/// One top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDef {
    pub kind: ContractKind,
    pub std: StdAnnotation,
    pub using: UsingAnnotation,
    pub name: Ident,
    pub fields: Vec<Field>,
    pub extends: Vec<Inheritance>,
    pub implements: Vec<Ident>,
    pub events: Vec<EventDef>,
    pub constants: Vec<ConstantDef>,
    pub enums: Vec<EnumDef>,
    pub functions: Vec<FuncDef>,
    /// Main statements of a script, empty otherwise.
    pub main: Vec<Stmt>,
}

/// A parsed multi-contract source unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub contracts: Vec<ContractDef>,
}
