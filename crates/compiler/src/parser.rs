//! Recursive-descent parser producing a [`SourceUnit`].
//!
//! The grammar is newline-insensitive: every statement starts with a keyword
//! or an identifier, so no terminators are needed. Expression parsing is
//! precedence climbing; nesting depth is bounded to fail cleanly on
//! pathological input.

use crate::ast::*;
use crate::error::{CompilerError, Result, SourcePos};
use crate::lexer::{Keyword, Tok, Token};
use crate::types::Type;
use alloy_primitives::{I256, Sign, U256};
use std::str::FromStr;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
enum UsingKey {
    #[strum(serialize = "preapprovedAssets")]
    PreapprovedAssets,
    #[strum(serialize = "assetsInContract")]
    AssetsInContract,
    #[strum(serialize = "checkExternalCaller")]
    CheckExternalCaller,
    #[strum(serialize = "updateFields")]
    UpdateFields,
}

/// Annotations collected in front of a declaration or parameter.
#[derive(Debug, Default)]
struct Annotations {
    using: UsingAnnotation,
    std: StdAnnotation,
    unused: bool,
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self { source, tokens, pos: 0, depth: 0 }
    }

    pub fn parse_source_unit(mut self) -> Result<SourceUnit> {
        let mut contracts = Vec::new();
        while self.peek().is_some() {
            contracts.push(self.parse_contract()?);
        }
        Ok(SourceUnit { contracts })
    }

    // Token plumbing.

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn current_pos(&self) -> SourcePos {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token) => token.pos,
            None => SourcePos::default(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> CompilerError {
        let got = match self.peek() {
            Some(tok) => tok.describe(),
            None => "end of input".into(),
        };
        CompilerError::syntax_at(
            format!("Expected {expected}, got {got}"),
            self.current_pos(),
            self.source,
        )
    }

    fn error_here(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::syntax_at(message, self.current_pos(), self.source)
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<SourcePos> {
        let pos = self.current_pos();
        if self.eat(&tok) { Ok(pos) } else { Err(self.unexpected(expected)) }
    }

    fn expect_kw(&mut self, kw: Keyword, expected: &str) -> Result<SourcePos> {
        self.expect(Tok::Kw(kw), expected)
    }

    fn expect_ident(&mut self, expected: &str) -> Result<Ident> {
        let pos = self.current_pos();
        match self.peek() {
            Some(Tok::Ident(_)) => {
                let Some(Token { tok: Tok::Ident(name), .. }) = self.advance() else {
                    unreachable!()
                };
                Ok(Ident { name, pos })
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn with_depth<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error_here("Nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // Annotations.

    fn parse_annotations(&mut self) -> Result<Annotations> {
        let mut annotations = Annotations::default();
        while self.eat(&Tok::At) {
            let key = self.expect_ident("an annotation")?;
            match key.name.as_str() {
                "using" => self.parse_using(&mut annotations.using)?,
                "std" => self.parse_std(&mut annotations.std)?,
                "unused" => annotations.unused = true,
                other => {
                    return Err(self
                        .error_here(format!("Unknown annotation \"@{other}\""))
                        .at(key.pos));
                }
            }
        }
        Ok(annotations)
    }

    fn parse_using(&mut self, using: &mut UsingAnnotation) -> Result<()> {
        self.expect(Tok::LParen, "\"(\"")?;
        loop {
            let key = self.expect_ident("an annotation key")?;
            let parsed = UsingKey::from_str(&key.name).map_err(|_| {
                self.error_here(format!("Invalid annotation field \"{}\"", key.name)).at(key.pos)
            })?;
            self.expect(Tok::Assign, "\"=\"")?;
            let value = self.parse_bool_value()?;
            let slot = match parsed {
                UsingKey::PreapprovedAssets => &mut using.preapproved_assets,
                UsingKey::AssetsInContract => &mut using.assets_in_contract,
                UsingKey::CheckExternalCaller => &mut using.check_external_caller,
                UsingKey::UpdateFields => &mut using.update_fields,
            };
            if slot.replace(value).is_some() {
                return Err(self
                    .error_here(format!("Duplicate annotation field \"{}\"", key.name))
                    .at(key.pos));
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "\")\"")?;
        Ok(())
    }

    fn parse_std(&mut self, std: &mut StdAnnotation) -> Result<()> {
        self.expect(Tok::LParen, "\"(\"")?;
        loop {
            let key = self.expect_ident("an annotation key")?;
            self.expect(Tok::Assign, "\"=\"")?;
            match key.name.as_str() {
                "id" => match self.advance().map(|t| t.tok) {
                    Some(Tok::Bytes(bytes)) if !bytes.is_empty() => std.id = Some(bytes),
                    _ => return Err(self.error_here("Expected a non-empty byte string for the std id")),
                },
                "enabled" => std.enabled = Some(self.parse_bool_value()?),
                other => {
                    return Err(self
                        .error_here(format!("Invalid annotation field \"{other}\""))
                        .at(key.pos));
                }
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "\")\"")?;
        Ok(())
    }

    fn parse_bool_value(&mut self) -> Result<bool> {
        if self.eat(&Tok::Kw(Keyword::True)) {
            Ok(true)
        } else if self.eat(&Tok::Kw(Keyword::False)) {
            Ok(false)
        } else {
            Err(self.unexpected("\"true\" or \"false\""))
        }
    }

    // Declarations.

    fn parse_contract(&mut self) -> Result<ContractDef> {
        let annotations = self.parse_annotations()?;
        if annotations.unused {
            return Err(self.error_here("\"@unused\" is not a top level annotation"));
        }
        let kind = match self.peek() {
            Some(Tok::Kw(Keyword::Contract)) => {
                self.advance();
                ContractKind::Contract
            }
            Some(Tok::Kw(Keyword::Abstract)) => {
                self.advance();
                self.expect_kw(Keyword::Contract, "\"Contract\"")?;
                ContractKind::AbstractContract
            }
            Some(Tok::Kw(Keyword::Interface)) => {
                self.advance();
                ContractKind::Interface
            }
            Some(Tok::Kw(Keyword::TxScript)) => {
                self.advance();
                ContractKind::TxScript
            }
            Some(Tok::Kw(Keyword::AssetScript)) => {
                self.advance();
                ContractKind::AssetScript
            }
            _ => return Err(self.unexpected("a top level declaration")),
        };
        let name = self.expect_ident("a declaration name")?;

        let mut fields = Vec::new();
        if kind != ContractKind::Interface && self.eat(&Tok::LParen) {
            if !self.eat(&Tok::RParen) {
                loop {
                    fields.push(self.parse_field()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RParen, "\")\"")?;
            }
        }

        let mut extends = Vec::new();
        let mut implements = Vec::new();
        if self.eat(&Tok::Kw(Keyword::Extends)) {
            loop {
                let parent = self.expect_ident("a parent name")?;
                let mut forwarded = Vec::new();
                if self.eat(&Tok::LParen) {
                    if !self.eat(&Tok::RParen) {
                        loop {
                            forwarded.push(self.expect_ident("a field name")?);
                            if !self.eat(&Tok::Comma) {
                                break;
                            }
                        }
                        self.expect(Tok::RParen, "\")\"")?;
                    }
                }
                extends.push(Inheritance { parent, fields: forwarded });
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        if self.eat(&Tok::Kw(Keyword::Implements)) {
            loop {
                implements.push(self.expect_ident("an interface name")?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }

        self.expect(Tok::LBrace, "\"{\"")?;
        let mut def = ContractDef {
            kind,
            std: annotations.std,
            using: annotations.using,
            name,
            fields,
            extends,
            implements,
            events: Vec::new(),
            constants: Vec::new(),
            enums: Vec::new(),
            functions: Vec::new(),
            main: Vec::new(),
        };
        self.parse_contract_body(&mut def)?;
        if kind == ContractKind::TxScript && def.main.is_empty() {
            return Err(CompilerError::syntax(format!(
                "Expected main statements for type \"{}\"",
                def.name.name
            )));
        }
        if kind == ContractKind::Interface && def.functions.is_empty() {
            return Err(CompilerError::inheritance(format!(
                "No function definition in Interface {}",
                def.name.name
            )));
        }
        Ok(def)
    }

    fn parse_contract_body(&mut self, def: &mut ContractDef) -> Result<()> {
        loop {
            if self.eat(&Tok::RBrace) {
                return Ok(());
            }
            match self.peek() {
                Some(Tok::Kw(Keyword::Event)) => {
                    self.advance();
                    def.events.push(self.parse_event()?);
                }
                Some(Tok::Kw(Keyword::Const)) => {
                    self.advance();
                    def.constants.push(self.parse_constant(false)?);
                }
                Some(Tok::Kw(Keyword::Enum)) => {
                    self.advance();
                    def.enums.push(self.parse_enum()?);
                }
                Some(Tok::Kw(Keyword::Pub) | Tok::Kw(Keyword::Fn) | Tok::At) => {
                    let annotations = self.parse_annotations()?;
                    if let Some(Tok::Kw(Keyword::Const)) = self.peek() {
                        self.advance();
                        def.constants.push(self.parse_constant(annotations.unused)?);
                        continue;
                    }
                    def.functions.push(self.parse_function(annotations)?);
                }
                Some(_) if def.kind == ContractKind::TxScript => {
                    let stmt = self.parse_stmt()?;
                    def.main.push(stmt);
                }
                _ => return Err(self.unexpected("a contract member")),
            }
        }
    }

    fn parse_field(&mut self) -> Result<Field> {
        let annotations = self.parse_annotations()?;
        let mutable = self.eat(&Tok::Kw(Keyword::Mut));
        let ident = self.expect_ident("a field name")?;
        self.expect(Tok::Colon, "\":\"")?;
        let ty = self.parse_type()?;
        Ok(Field { ident, ty, mutable, unused: annotations.unused })
    }

    fn parse_event(&mut self) -> Result<EventDef> {
        let name = self.expect_ident("an event name")?;
        self.expect(Tok::LParen, "\"(\"")?;
        let mut params = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                let param = self.expect_ident("a parameter name")?;
                self.expect(Tok::Colon, "\":\"")?;
                let ty = self.parse_type()?;
                params.push((param, ty));
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "\")\"")?;
        }
        Ok(EventDef { name, params })
    }

    fn parse_constant(&mut self, unused: bool) -> Result<ConstantDef> {
        let name = self.expect_ident("a constant name")?;
        self.expect(Tok::Assign, "\"=\"")?;
        let value = self.parse_literal()?;
        Ok(ConstantDef { name, value, unused })
    }

    fn parse_enum(&mut self) -> Result<EnumDef> {
        let name = self.expect_ident("an enum name")?;
        self.expect(Tok::LBrace, "\"{\"")?;
        let mut variants = Vec::new();
        while !self.eat(&Tok::RBrace) {
            let variant = self.expect_ident("an enum field name")?;
            self.expect(Tok::Assign, "\"=\"")?;
            let value = self.parse_literal()?;
            variants.push((variant, value));
        }
        Ok(EnumDef { name, variants })
    }

    fn parse_function(&mut self, annotations: Annotations) -> Result<FuncDef> {
        let is_public = self.eat(&Tok::Kw(Keyword::Pub));
        self.expect_kw(Keyword::Fn, "\"fn\"")?;
        let name = self.expect_ident("a function name")?;
        self.expect(Tok::LParen, "\"(\"")?;
        let mut args = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                let arg_annotations = self.parse_annotations()?;
                let mutable = self.eat(&Tok::Kw(Keyword::Mut));
                let ident = self.expect_ident("an argument name")?;
                self.expect(Tok::Colon, "\":\"")?;
                let ty = self.parse_type()?;
                args.push(Argument { ident, ty, mutable, unused: arg_annotations.unused });
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "\")\"")?;
        }
        self.expect(Tok::Arrow, "\"->\"")?;
        let returns = self.parse_return_types()?;
        let body = if self.peek() == Some(&Tok::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(FuncDef { annotations: annotations.using, is_public, name, args, returns, body })
    }

    fn parse_return_types(&mut self) -> Result<Vec<Type>> {
        if self.eat(&Tok::LParen) {
            let mut types = Vec::new();
            if !self.eat(&Tok::RParen) {
                loop {
                    types.push(self.parse_type()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RParen, "\")\"")?;
            }
            Ok(types)
        } else {
            Ok(vec![self.parse_type()?])
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        if self.eat(&Tok::LBracket) {
            let elem = self.parse_type()?;
            self.expect(Tok::Semi, "\";\"")?;
            let size = match self.advance().map(|t| t.tok) {
                Some(Tok::Int { value, suffix: None | Some('u') }) => {
                    usize::try_from(value).map_err(|_| self.error_here("Array size too large"))?
                }
                _ => return Err(self.unexpected("an array size")),
            };
            self.expect(Tok::RBracket, "\"]\"")?;
            return Ok(Type::FixedArray(Box::new(elem), size));
        }
        let ident = match self.peek() {
            Some(Tok::Ident(_)) => self.expect_ident("a type")?,
            _ => return Err(self.unexpected("a type")),
        };
        Ok(match ident.name.as_str() {
            "Bool" => Type::Bool,
            "U256" => Type::U256,
            "I256" => Type::I256,
            "ByteVec" => Type::ByteVec,
            "Address" => Type::Address,
            _ => Type::Contract(ident.name),
        })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let pos = self.current_pos();
        match self.peek() {
            Some(Tok::Kw(Keyword::True)) => {
                self.advance();
                Ok(Literal::Bool(true))
            }
            Some(Tok::Kw(Keyword::False)) => {
                self.advance();
                Ok(Literal::Bool(false))
            }
            Some(&Tok::Int { value, suffix }) => {
                self.advance();
                self.int_literal(value, suffix, false, pos)
            }
            Some(Tok::Minus) => {
                self.advance();
                match self.peek() {
                    Some(&Tok::Int { value, suffix }) => {
                        self.advance();
                        self.int_literal(value, suffix, true, pos)
                    }
                    _ => Err(self.unexpected("an integer")),
                }
            }
            Some(Tok::Bytes(_)) => {
                let Some(Token { tok: Tok::Bytes(bytes), .. }) = self.advance() else {
                    unreachable!()
                };
                Ok(Literal::Bytes(bytes))
            }
            Some(Tok::Address(_)) => {
                let Some(Token { tok: Tok::Address(bytes), .. }) = self.advance() else {
                    unreachable!()
                };
                Ok(Literal::Address(bytes))
            }
            _ => Err(self.unexpected("a literal")),
        }
    }

    fn int_literal(
        &self,
        value: U256,
        suffix: Option<char>,
        negative: bool,
        pos: SourcePos,
    ) -> Result<Literal> {
        if negative && suffix == Some('u') {
            return Err(CompilerError::syntax_at("U256 literals cannot be negative", pos, self.source));
        }
        if negative || suffix == Some('i') {
            let sign = if negative { Sign::Negative } else { Sign::Positive };
            let value = I256::checked_from_sign_and_abs(sign, value).ok_or_else(|| {
                CompilerError::syntax_at("Integer literal does not fit in I256", pos, self.source)
            })?;
            Ok(Literal::I256(value))
        } else {
            Ok(Literal::U256(value))
        }
    }

    // Statements.

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Tok::LBrace, "\"{\"")?;
        let mut stmts = Vec::new();
        while !self.eat(&Tok::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        self.with_depth(|p| p.parse_stmt_inner())
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt> {
        let pos = self.current_pos();
        match self.peek() {
            Some(Tok::Kw(Keyword::Let)) => self.parse_let(),
            Some(Tok::Kw(Keyword::If)) => self.parse_if_stmt(),
            Some(Tok::Kw(Keyword::While)) => {
                self.advance();
                self.expect(Tok::LParen, "\"(\"")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "\")\"")?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body, pos })
            }
            Some(Tok::Kw(Keyword::For)) => self.parse_for(),
            Some(Tok::Kw(Keyword::Return)) => {
                self.advance();
                let mut values = Vec::new();
                if self.starts_expr() {
                    values.push(self.parse_expr()?);
                    while self.eat(&Tok::Comma) {
                        values.push(self.parse_expr()?);
                    }
                }
                Ok(Stmt::Return { values, pos })
            }
            Some(Tok::Kw(Keyword::Emit)) => {
                self.advance();
                let event = self.expect_ident("an event name")?;
                self.expect(Tok::LParen, "\"(\"")?;
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                    self.expect(Tok::RParen, "\")\"")?;
                }
                Ok(Stmt::Emit { event, args, pos })
            }
            _ => self.parse_assign_or_expr(),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt> {
        let pos = self.current_pos();
        self.advance();
        let mut targets = Vec::new();
        if self.eat(&Tok::LParen) {
            loop {
                targets.push(self.parse_let_target()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "\")\"")?;
        } else {
            targets.push(self.parse_let_target()?);
        }
        self.expect(Tok::Assign, "\"=\"")?;
        let value = self.parse_expr()?;
        Ok(Stmt::Let { targets, value, pos })
    }

    fn parse_let_target(&mut self) -> Result<LetTarget> {
        let pos = self.current_pos();
        let mutable = self.eat(&Tok::Kw(Keyword::Mut));
        let ident = self.expect_ident("a variable name")?;
        let name = if ident.name == "_" {
            if mutable {
                return Err(self.error_here("Anonymous variables cannot be mutable").at(pos));
            }
            None
        } else {
            Some(ident)
        };
        Ok(LetTarget { mutable, name, pos })
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt> {
        let pos = self.current_pos();
        let mut branches = Vec::new();
        let mut else_body = None;
        loop {
            self.expect_kw(Keyword::If, "\"if\"")?;
            self.expect(Tok::LParen, "\"(\"")?;
            let cond = self.parse_expr()?;
            self.expect(Tok::RParen, "\")\"")?;
            let body = self.parse_block()?;
            branches.push((cond, body));
            if !self.eat(&Tok::Kw(Keyword::Else)) {
                break;
            }
            if self.peek() != Some(&Tok::Kw(Keyword::If)) {
                else_body = Some(self.parse_block()?);
                break;
            }
        }
        Ok(Stmt::If { branches, else_body, pos })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let pos = self.current_pos();
        self.advance();
        self.expect(Tok::LParen, "\"(\"")?;
        if self.peek() == Some(&Tok::Semi) {
            return Err(self.error_here("Expected an init statement in the for loop"));
        }
        let init = self.parse_stmt()?;
        if !matches!(init, Stmt::Let { .. } | Stmt::Assign { .. }) {
            return Err(CompilerError::syntax_at(
                "Expected an init statement in the for loop",
                pos,
                self.source,
            ));
        }
        self.expect(Tok::Semi, "\";\"")?;
        if self.peek() == Some(&Tok::Semi) {
            return Err(self.error_here("Expected a condition expression in the for loop"));
        }
        let cond = self.parse_expr()?;
        self.expect(Tok::Semi, "\";\"")?;
        if self.peek() == Some(&Tok::RParen) {
            return Err(self.error_here("Expected an update statement in the for loop"));
        }
        let update = self.parse_stmt()?;
        if !matches!(update, Stmt::Assign { .. } | Stmt::Expr(_)) {
            return Err(CompilerError::syntax_at(
                "Expected an update statement in the for loop",
                pos,
                self.source,
            ));
        }
        self.expect(Tok::RParen, "\")\"")?;
        let body = self.parse_block()?;
        Ok(Stmt::For { init: Box::new(init), cond, update: Box::new(update), body, pos })
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt> {
        let pos = self.current_pos();
        let first = self.parse_expr()?;
        if self.peek() != Some(&Tok::Comma) && self.peek() != Some(&Tok::Assign) {
            if !matches!(first, Expr::Call { .. } | Expr::MemberCall { .. }) {
                return Err(CompilerError::syntax_at("Expected a statement", pos, self.source));
            }
            return Ok(Stmt::Expr(first));
        }
        let mut exprs = vec![first];
        while self.eat(&Tok::Comma) {
            exprs.push(self.parse_expr()?);
        }
        self.expect(Tok::Assign, "\"=\"")?;
        let targets =
            exprs.into_iter().map(|e| self.to_assign_target(e)).collect::<Result<Vec<_>>>()?;
        let value = self.parse_expr()?;
        Ok(Stmt::Assign { targets, value, pos })
    }

    fn to_assign_target(&self, expr: Expr) -> Result<AssignTarget> {
        match expr {
            Expr::Var(ident) if ident.name == "_" => Ok(AssignTarget::Anonymous(ident.pos)),
            Expr::Var(ident) => Ok(AssignTarget::Var(ident)),
            Expr::Index { .. } => {
                let mut indices = Vec::new();
                let mut cursor = expr;
                loop {
                    match cursor {
                        Expr::Index { base, index, .. } => {
                            indices.push(*index);
                            cursor = *base;
                        }
                        Expr::Var(ident) => {
                            indices.reverse();
                            return Ok(AssignTarget::Index { base: ident, indices });
                        }
                        other => {
                            return Err(CompilerError::syntax_at(
                                "Invalid assignment target",
                                other.pos(),
                                self.source,
                            ));
                        }
                    }
                }
            }
            other => {
                Err(CompilerError::syntax_at("Invalid assignment target", other.pos(), self.source))
            }
        }
    }

    // Expressions.

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Tok::Ident(_)
                    | Tok::Int { .. }
                    | Tok::Bytes(_)
                    | Tok::Address(_)
                    | Tok::Str(_)
                    | Tok::Kw(Keyword::True | Keyword::False | Keyword::Alph)
                    | Tok::LParen
                    | Tok::LBracket
                    | Tok::Bang
                    | Tok::Minus
            )
        )
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.with_depth(|p| p.parse_or())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Tok::OrOr) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some(&Tok::AndAnd) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_bit_or()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinOp::Eq,
            Some(Tok::NotEq) => BinOp::Ne,
            Some(Tok::Lt) => BinOp::Lt,
            Some(Tok::Le) => BinOp::Le,
            Some(Tok::Gt) => BinOp::Gt,
            Some(Tok::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        let pos = self.current_pos();
        self.advance();
        let rhs = self.parse_bit_or()?;
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos })
    }

    fn parse_bit_or(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[(Tok::Pipe, BinOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[(Tok::Caret, BinOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[(Tok::Amp, BinOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        self.parse_left_assoc(&[(Tok::Shl, BinOp::Shl), (Tok::Shr, BinOp::Shr)], Self::parse_add)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        self.parse_left_assoc(
            &[(Tok::Plus, BinOp::Add), (Tok::Minus, BinOp::Sub), (Tok::PlusPlus, BinOp::Concat)],
            Self::parse_mul,
        )
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        self.parse_left_assoc(
            &[(Tok::Star, BinOp::Mul), (Tok::Slash, BinOp::Div), (Tok::Percent, BinOp::Mod)],
            Self::parse_exp,
        )
    }

    fn parse_exp(&mut self) -> Result<Expr> {
        self.parse_left_assoc(
            &[(Tok::DoubleStar, BinOp::Exp), (Tok::ModExpOp, BinOp::ModExp)],
            Self::parse_unary,
        )
    }

    fn parse_left_assoc(
        &mut self,
        ops: &[(Tok, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.peek() == Some(tok) {
                    let pos = self.current_pos();
                    self.advance();
                    let rhs = next(self)?;
                    lhs = Expr::Binary { op: *op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let pos = self.current_pos();
        if self.eat(&Tok::Bang) {
            let expr = self.with_depth(|p| p.parse_unary())?;
            return Ok(Expr::Not { expr: Box::new(expr), pos });
        }
        if self.peek() == Some(&Tok::Minus) {
            let literal = self.parse_literal()?;
            return Ok(Expr::Lit(literal, pos));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::LBracket) => {
                    let pos = self.current_pos();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "\"]\"")?;
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index), pos };
                }
                Some(Tok::Dot) => {
                    self.advance();
                    let name = self.expect_ident("a member name")?;
                    let is_builtin = self.eat(&Tok::Bang);
                    let approvals = if self.peek() == Some(&Tok::LBrace) {
                        self.parse_approvals()?
                    } else {
                        Vec::new()
                    };
                    if self.peek() == Some(&Tok::LParen) {
                        let args = self.parse_call_args()?;
                        expr = Expr::MemberCall {
                            receiver: Box::new(expr),
                            name,
                            is_builtin,
                            approvals,
                            args,
                        };
                    } else {
                        if is_builtin || !approvals.is_empty() {
                            return Err(self.unexpected("\"(\""));
                        }
                        match expr {
                            Expr::Var(base) => expr = Expr::Member { base, member: name },
                            _ => return Err(self.unexpected("\"(\"")),
                        }
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let pos = self.current_pos();
        match self.peek() {
            Some(Tok::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Tok::RParen, "\")\"")?;
                Ok(expr)
            }
            Some(Tok::LBracket) => {
                self.advance();
                let first = self.parse_expr()?;
                if self.eat(&Tok::Semi) {
                    let size = self.parse_expr()?;
                    self.expect(Tok::RBracket, "\"]\"")?;
                    return Ok(Expr::ArrayRepeat {
                        value: Box::new(first),
                        size: Box::new(size),
                        pos,
                    });
                }
                let mut elements = vec![first];
                while self.eat(&Tok::Comma) {
                    elements.push(self.parse_expr()?);
                }
                self.expect(Tok::RBracket, "\"]\"")?;
                Ok(Expr::ArrayLit(elements, pos))
            }
            Some(Tok::Kw(Keyword::If)) => {
                self.advance();
                self.expect(Tok::LParen, "\"(\"")?;
                let cond = self.parse_expr()?;
                self.expect(Tok::RParen, "\")\"")?;
                let then_expr = self.parse_expr()?;
                self.expect_kw(Keyword::Else, "\"else\"")?;
                let else_expr = self.parse_expr()?;
                Ok(Expr::IfExpr {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                    pos,
                })
            }
            Some(Tok::Kw(Keyword::True)) => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(true), pos))
            }
            Some(Tok::Kw(Keyword::False)) => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(false), pos))
            }
            Some(Tok::Kw(Keyword::Alph)) => {
                self.advance();
                Ok(Expr::Lit(Literal::Alph, pos))
            }
            Some(Tok::Int { .. } | Tok::Bytes(_) | Tok::Address(_)) => {
                let literal = self.parse_literal()?;
                Ok(Expr::Lit(literal, pos))
            }
            Some(Tok::Str(_)) => {
                let Some(Token { tok: Tok::Str(text), .. }) = self.advance() else {
                    unreachable!()
                };
                Ok(Expr::DebugString(text, pos))
            }
            Some(Tok::Ident(_)) => {
                let name = self.expect_ident("an expression")?;
                let is_builtin = self.eat(&Tok::Bang);
                let approvals = if self.peek() == Some(&Tok::LBrace) {
                    self.parse_approvals()?
                } else {
                    Vec::new()
                };
                if self.peek() == Some(&Tok::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call { name, is_builtin, approvals, args })
                } else {
                    if is_builtin || !approvals.is_empty() {
                        return Err(self.unexpected("\"(\""));
                    }
                    Ok(Expr::Var(name))
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(Tok::LParen, "\"(\"")?;
        let mut args = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "\")\"")?;
        }
        Ok(args)
    }

    /// `{addr -> tokenId: amount, …}`. A comma either starts a new
    /// `addr -> …` clause or adds another `tokenId: amount` pair for the
    /// current address.
    fn parse_approvals(&mut self) -> Result<Vec<ApproveClause>> {
        self.expect(Tok::LBrace, "\"{\"")?;
        let mut clauses: Vec<ApproveClause> = Vec::new();
        let mut address = {
            let addr = self.parse_expr()?;
            self.expect(Tok::Arrow, "\"->\"")?;
            addr
        };
        loop {
            let token = self.parse_expr()?;
            self.expect(Tok::Colon, "\":\"")?;
            let amount = self.parse_expr()?;
            clauses.push(ApproveClause { address: address.clone(), token, amount });
            if self.eat(&Tok::Comma) {
                let next = self.parse_expr()?;
                if self.eat(&Tok::Arrow) {
                    address = next;
                    continue;
                }
                // Another token/amount pair for the same address.
                self.expect(Tok::Colon, "\":\"")?;
                let amount = self.parse_expr()?;
                clauses.push(ApproveClause { address: address.clone(), token: next, amount });
                continue;
            }
            break;
        }
        self.expect(Tok::RBrace, "\"}\"")?;
        Ok(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<SourceUnit> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(source, tokens).parse_source_unit()
    }

    #[test]
    fn parses_a_minimal_contract() {
        let unit = parse(
            "Contract Foo(mut a: U256, b: Bool) extends Bar(a) implements IFoo {\n\
             \x20 pub fn get() -> U256 { return a }\n\
             }",
        )
        .unwrap();
        let contract = &unit.contracts[0];
        assert_eq!(contract.kind, ContractKind::Contract);
        assert_eq!(contract.fields.len(), 2);
        assert!(contract.fields[0].mutable);
        assert_eq!(contract.extends[0].parent.name, "Bar");
        assert_eq!(contract.implements[0].name, "IFoo");
        assert_eq!(contract.functions.len(), 1);
    }

    #[test]
    fn txscript_without_main_statements_is_rejected() {
        let err = parse("TxScript Foo {}").unwrap_err();
        assert_eq!(err.to_string(), "Expected main statements for type \"Foo\"");
    }

    #[test]
    fn interface_needs_a_function() {
        let err = parse("Interface Foo {}").unwrap_err();
        assert_eq!(err.to_string(), "No function definition in Interface Foo");
    }

    #[test]
    fn parses_braces_approvals() {
        let unit = parse(
            "TxScript Main(swap: Swap) {\n\
             \x20 swap.trade{callerAddress!() -> ALPH: 100, token: 2}(true)\n\
             }",
        )
        .unwrap();
        let main = &unit.contracts[0].main;
        let Stmt::Expr(Expr::MemberCall { approvals, .. }) = &main[0] else {
            panic!("expected a member call, got {main:?}");
        };
        assert_eq!(approvals.len(), 2);
        assert_eq!(approvals[0].address, approvals[1].address);
        assert!(matches!(approvals[0].token, Expr::Lit(Literal::Alph, _)));
    }

    #[test]
    fn parses_for_loops_and_tuple_lets() {
        let unit = parse(
            "Contract Foo() {\n\
               fn sum(n: U256) -> U256 {\n\
                 let (mut acc, _) = two()\n\
                 for (let mut i = 0; i < n; i = i + 1) {\n\
                   acc = acc + i\n\
                 }\n\
                 return acc\n\
               }\n\
               fn two() -> (U256, U256) { return 1, 2 }\n\
             }",
        )
        .unwrap();
        let func = &unit.contracts[0].functions[0];
        let body = func.body.as_ref().unwrap();
        assert!(matches!(&body[0], Stmt::Let { targets, .. } if targets.len() == 2));
        assert!(matches!(&body[1], Stmt::For { .. }));
    }

    #[test]
    fn annotations_attach_to_functions() {
        let unit = parse(
            "Contract Foo() {\n\
               @using(preapprovedAssets = true, updateFields = false)\n\
               pub fn go() -> () {}\n\
             }",
        )
        .unwrap();
        let func = &unit.contracts[0].functions[0];
        assert_eq!(func.annotations.preapproved_assets, Some(true));
        assert_eq!(func.annotations.update_fields, Some(false));
        assert_eq!(func.annotations.assets_in_contract, None);
    }

    #[test]
    fn nesting_depth_is_bounded() {
        // Run on a thread with a larger stack: the recursive-descent call
        // chain for 200 levels of nesting exceeds the default 2MiB test
        // thread stack in debug builds before the depth check can trip.
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let source = format!(
                    "Contract A() {{ fn f() -> U256 {{ return {}1{} }} }}",
                    "(".repeat(200),
                    ")".repeat(200)
                );
                let err = parse(&source).unwrap_err();
                assert!(err.to_string().starts_with("Nesting too deep"));
            })
            .unwrap()
            .join()
            .unwrap();
    }
}
