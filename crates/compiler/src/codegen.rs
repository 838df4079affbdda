//! Lowering of checked functions to flat instruction vectors.
//!
//! Branch offsets are assembled by generating each arm into a scratch
//! buffer first; offsets are relative to the instruction after the jump.
//! Array accesses resolve to direct slot loads where every index is
//! constant, and to guarded `…ByIndex` sequences otherwise.

use crate::ast::{BinOp, ContractKind};
use crate::check::block_terminates;
use crate::error::{CompilerError, Result};
use crate::tast::*;
use crate::types::Type;
use alloy_primitives::U256;
use ralphc_primitives::{Instr, Method, StatefulContract, StatefulScript, StatelessScript};

pub fn gen_contract(tc: &TContract, debug: bool) -> Result<StatefulContract> {
    debug_assert_eq!(tc.kind, ContractKind::Contract);
    Ok(StatefulContract { field_length: tc.field_length, methods: gen_methods(tc, debug)? })
}

pub fn gen_tx_script(tc: &TContract, debug: bool) -> Result<StatefulScript> {
    debug_assert_eq!(tc.kind, ContractKind::TxScript);
    Ok(StatefulScript { methods: gen_methods(tc, debug)? })
}

pub fn gen_asset_script(tc: &TContract, debug: bool) -> Result<StatelessScript> {
    debug_assert_eq!(tc.kind, ContractKind::AssetScript);
    Ok(StatelessScript { methods: gen_methods(tc, debug)? })
}

fn gen_methods(tc: &TContract, debug: bool) -> Result<Vec<Method>> {
    tc.functions.iter().map(|func| gen_method(tc, func, debug)).collect()
}

fn gen_method(tc: &TContract, func: &TFunc, debug: bool) -> Result<Method> {
    let body = func.body.as_ref().ok_or_else(|| {
        CompilerError::internal(format!(
            "code generation for bodyless function \"{}.{}\"",
            tc.name, func.name
        ))
    })?;
    let mut generator = MethodGen { buf: Vec::new(), debug };
    generator.gen_block(body)?;
    if func.return_length == 0 && !block_terminates(body) {
        generator.buf.push(Instr::Return);
    }
    Ok(Method {
        is_public: func.is_public,
        use_preapproved_assets: func.use_preapproved_assets,
        use_contract_assets: func.use_contract_assets,
        args_length: func.args_length,
        locals_length: func.locals_length,
        return_length: func.return_length,
        instrs: generator.buf,
    })
}

/// One dynamic index level: the index expression, the dimension it is
/// checked against, and the flattened stride it scales by.
struct DynLevel<'a> {
    index: &'a TExpr,
    dim: usize,
    stride: usize,
}

/// Split view of an index chain: the statically folded part of the offset
/// plus the dynamic levels.
struct Access<'a> {
    base: usize,
    dynamic: Vec<DynLevel<'a>>,
    elem_size: usize,
}

struct MethodGen {
    buf: Vec<Instr>,
    debug: bool,
}

impl MethodGen {
    fn push(&mut self, instr: Instr) {
        self.buf.push(instr);
    }

    fn u256(&mut self, value: usize) {
        self.push(Instr::u256_const(U256::from(value)));
    }

    fn offset(len: usize) -> Result<i16> {
        i16::try_from(len).map_err(|_| CompilerError::internal("jump offset overflow"))
    }

    /// Generates into a scratch buffer, for branch length computation.
    fn gen_into(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<Vec<Instr>> {
        let saved = std::mem::take(&mut self.buf);
        f(self)?;
        Ok(std::mem::replace(&mut self.buf, saved))
    }

    fn gen_block(&mut self, stmts: &[TStmt]) -> Result<()> {
        for stmt in stmts {
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &TStmt) -> Result<()> {
        match stmt {
            TStmt::Let { targets, value } => {
                self.gen_expr(value)?;
                for target in targets.iter().rev() {
                    match target {
                        TLetTarget::Bind { slot, size } => {
                            for cell in (0..*size).rev() {
                                self.push(Instr::StoreLocal((slot + cell) as u8));
                            }
                        }
                        TLetTarget::Anon { size } => {
                            for _ in 0..*size {
                                self.push(Instr::Pop);
                            }
                        }
                    }
                }
                Ok(())
            }
            TStmt::Assign { targets, value } => {
                self.gen_expr(value)?;
                for target in targets.iter().rev() {
                    self.gen_store(target)?;
                }
                Ok(())
            }
            TStmt::Expr(expr) => self.gen_expr(expr),
            TStmt::If { branches, else_body } => self.gen_if(branches, else_body.as_deref()),
            TStmt::While { cond, body } => {
                let cond_buf = self.gen_into(|g| g.gen_expr(cond))?;
                let body_buf = self.gen_into(|g| g.gen_block(body))?;
                let total = cond_buf.len() + body_buf.len() + 2;
                self.buf.extend(cond_buf);
                self.push(Instr::IfFalse(Self::offset(body_buf.len() + 1)?));
                self.buf.extend(body_buf);
                self.push(Instr::Jump(-Self::offset(total)?));
                Ok(())
            }
            TStmt::For { init, cond, update, body } => {
                self.gen_stmt(init)?;
                let cond_buf = self.gen_into(|g| g.gen_expr(cond))?;
                let body_buf = self.gen_into(|g| {
                    g.gen_block(body)?;
                    g.gen_stmt(update)
                })?;
                let total = cond_buf.len() + body_buf.len() + 2;
                self.buf.extend(cond_buf);
                self.push(Instr::IfFalse(Self::offset(body_buf.len() + 1)?));
                self.buf.extend(body_buf);
                self.push(Instr::Jump(-Self::offset(total)?));
                Ok(())
            }
            TStmt::Return(values) => {
                for value in values {
                    self.gen_expr(value)?;
                }
                self.push(Instr::Return);
                Ok(())
            }
            TStmt::Emit { event_index, args } => {
                self.u256(*event_index);
                for arg in args {
                    self.gen_expr(arg)?;
                }
                let count = u8::try_from(args.len() + 1)
                    .map_err(|_| CompilerError::internal("event field overflow"))?;
                self.push(Instr::Log(count));
                Ok(())
            }
        }
    }

    fn gen_if(
        &mut self,
        branches: &[(TExpr, Vec<TStmt>)],
        else_body: Option<&[TStmt]>,
    ) -> Result<()> {
        let (cond, body) = &branches[0];
        self.gen_expr(cond)?;
        let then_buf = self.gen_into(|g| g.gen_block(body))?;
        let rest = &branches[1..];
        if rest.is_empty() && else_body.is_none() {
            self.push(Instr::IfFalse(Self::offset(then_buf.len())?));
            self.buf.extend(then_buf);
            return Ok(());
        }
        let else_buf = self.gen_into(|g| match (rest.is_empty(), else_body) {
            (false, _) => g.gen_if(rest, else_body),
            (true, Some(body)) => g.gen_block(body),
            (true, None) => unreachable!("checked above"),
        })?;
        self.push(Instr::IfFalse(Self::offset(then_buf.len() + 1)?));
        self.buf.extend(then_buf);
        self.push(Instr::Jump(Self::offset(else_buf.len())?));
        self.buf.extend(else_buf);
        Ok(())
    }

    fn gen_expr(&mut self, expr: &TExpr) -> Result<()> {
        match &expr.kind {
            TExprKind::Const(value) => {
                self.push(value.to_const_instr());
                Ok(())
            }
            TExprKind::Load { place, indices, offset_temp } => {
                self.gen_load(place, indices, *offset_temp)
            }
            TExprKind::IndexTemp { array, temp_slot, indices, offset_temp } => {
                self.gen_expr(array)?;
                let size = array.flattened_size() as u16;
                for cell in (0..size).rev() {
                    self.push(Instr::StoreLocal((temp_slot + cell) as u8));
                }
                let place = Place::Local { slot: *temp_slot, ty: array.ty().clone() };
                self.gen_load(&place, indices, *offset_temp)
            }
            TExprKind::Binary { op: BinOp::And, lhs, rhs, .. } => {
                self.gen_expr(lhs)?;
                let rhs_buf = self.gen_into(|g| g.gen_expr(rhs))?;
                self.push(Instr::IfFalse(Self::offset(rhs_buf.len() + 1)?));
                self.buf.extend(rhs_buf);
                self.push(Instr::Jump(1));
                self.push(Instr::BoolConst(false));
                Ok(())
            }
            TExprKind::Binary { op: BinOp::Or, lhs, rhs, .. } => {
                self.gen_expr(lhs)?;
                let rhs_buf = self.gen_into(|g| g.gen_expr(rhs))?;
                self.push(Instr::IfTrue(Self::offset(rhs_buf.len() + 1)?));
                self.buf.extend(rhs_buf);
                self.push(Instr::Jump(1));
                self.push(Instr::BoolConst(true));
                Ok(())
            }
            TExprKind::Binary { op, operand_ty, lhs, rhs } => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)?;
                self.push(binary_instr(*op, operand_ty)?);
                Ok(())
            }
            TExprKind::Not(operand) => {
                self.gen_expr(operand)?;
                self.push(Instr::Not);
                Ok(())
            }
            TExprKind::ArrayLit(elements) => {
                for element in elements {
                    self.gen_expr(element)?;
                }
                Ok(())
            }
            TExprKind::Repeat { value, count, temp_slot } => {
                match temp_slot {
                    // Constant element, safe to push repeatedly.
                    None => {
                        for _ in 0..*count {
                            self.gen_expr(value)?;
                        }
                    }
                    Some(temp) => {
                        self.gen_expr(value)?;
                        let size = value.flattened_size() as u16;
                        for cell in (0..size).rev() {
                            self.push(Instr::StoreLocal((temp + cell) as u8));
                        }
                        for _ in 0..*count {
                            for cell in 0..size {
                                self.push(Instr::LoadLocal((temp + cell) as u8));
                            }
                        }
                    }
                }
                Ok(())
            }
            TExprKind::IfExpr { cond, then_expr, else_expr } => {
                self.gen_expr(cond)?;
                let then_buf = self.gen_into(|g| g.gen_expr(then_expr))?;
                let else_buf = self.gen_into(|g| g.gen_expr(else_expr))?;
                self.push(Instr::IfFalse(Self::offset(then_buf.len() + 1)?));
                self.buf.extend(then_buf);
                self.push(Instr::Jump(Self::offset(else_buf.len())?));
                self.buf.extend(else_buf);
                Ok(())
            }
            TExprKind::LocalCall { index, approvals, args } => {
                self.gen_approvals(approvals)?;
                for arg in args {
                    self.gen_expr(arg)?;
                }
                self.push(Instr::CallLocal(*index));
                Ok(())
            }
            TExprKind::ExternalCall { receiver, index, approvals, args } => {
                self.gen_approvals(approvals)?;
                for arg in args {
                    self.gen_expr(arg)?;
                }
                self.gen_expr(receiver)?;
                self.push(Instr::CallExternal(*index));
                Ok(())
            }
            TExprKind::Builtin { call, args } => self.gen_builtin(call, args),
            TExprKind::EncodeFields { region, imm_args, mut_args, std_id } => {
                if matches!(region, EncodeRegion::Imm | EncodeRegion::Both) {
                    for arg in imm_args {
                        self.gen_expr(arg)?;
                    }
                    let mut count = imm_args.len();
                    if let Some(id) = std_id {
                        self.push(Instr::BytesConst(id.clone()));
                        count += 1;
                    }
                    self.u256(count);
                    self.push(Instr::Encode);
                }
                if matches!(region, EncodeRegion::Mut | EncodeRegion::Both) {
                    for arg in mut_args {
                        self.gen_expr(arg)?;
                    }
                    self.u256(mut_args.len());
                    self.push(Instr::Encode);
                }
                Ok(())
            }
        }
    }

    fn gen_approvals(&mut self, approvals: &[TApprove]) -> Result<()> {
        for approval in approvals {
            self.gen_expr(&approval.address)?;
            match &approval.token {
                None => {
                    self.gen_expr(&approval.amount)?;
                    self.push(Instr::ApproveAlph);
                }
                Some(token) => {
                    self.gen_expr(token)?;
                    self.gen_expr(&approval.amount)?;
                    self.push(Instr::ApproveToken);
                }
            }
        }
        Ok(())
    }

    fn gen_builtin(&mut self, call: &BuiltinCall, args: &[TExpr]) -> Result<()> {
        if let BuiltinCall::Debug { message } = call {
            if self.debug {
                self.push(Instr::BytesConst(message.clone()));
                self.push(Instr::DebugMessage);
            }
            return Ok(());
        }
        for arg in args {
            self.gen_expr(arg)?;
        }
        let instr = match call {
            BuiltinCall::ApproveAlph => Instr::ApproveAlph,
            BuiltinCall::ApproveToken => Instr::ApproveToken,
            BuiltinCall::AlphRemaining => Instr::AlphRemaining,
            BuiltinCall::TokenRemaining => Instr::TokenRemaining,
            BuiltinCall::TransferAlph => Instr::TransferAlph,
            BuiltinCall::TransferToken => Instr::TransferToken,
            BuiltinCall::TransferAlphFromSelf => Instr::TransferAlphFromSelf,
            BuiltinCall::TransferTokenFromSelf => Instr::TransferTokenFromSelf,
            BuiltinCall::TransferAlphToSelf => Instr::TransferAlphToSelf,
            BuiltinCall::TransferTokenToSelf => Instr::TransferTokenToSelf,
            BuiltinCall::TxId => Instr::TxId,
            BuiltinCall::CallerAddress => Instr::CallerAddress,
            BuiltinCall::SelfContractId => Instr::SelfContractId,
            BuiltinCall::CheckCaller => Instr::AssertWithErrorCode,
            BuiltinCall::Assert => Instr::Assert,
            BuiltinCall::AssertWithErrorCode => Instr::AssertWithErrorCode,
            BuiltinCall::Panic { .. } => Instr::Panic,
            BuiltinCall::MigrateWithFields => Instr::MigrateWithFields,
            BuiltinCall::GetSegregatedSignature => Instr::GetSegregatedSignature,
            BuiltinCall::VerifyBIP340Schnorr => Instr::VerifyBIP340Schnorr,
            BuiltinCall::Debug { .. } => unreachable!("handled above"),
        };
        self.push(instr);
        Ok(())
    }

    /// Splits an index chain into the statically folded offset and the
    /// dynamic levels.
    fn access<'a>(place_ty: &Type, indices: &'a [TExpr]) -> Access<'a> {
        let mut cursor = place_ty;
        let mut base = 0usize;
        let mut dynamic = Vec::new();
        for index in indices {
            let Type::FixedArray(elem, dim) = cursor else {
                unreachable!("checked index chain")
            };
            let stride = elem.flattened_size();
            match index.as_const() {
                Some(ralphc_primitives::Val::U256(value)) => {
                    base += usize::try_from(*value).expect("bounds-checked index") * stride;
                }
                _ => dynamic.push(DynLevel { index, dim: *dim, stride }),
            }
            cursor = elem;
        }
        Access { base, dynamic, elem_size: cursor.flattened_size() }
    }

    /// Emits the guarded dynamic offset: each level is bounds-checked with
    /// `Dup, U256Const(dim), U256Lt, Assert` before scaling.
    fn gen_dynamic_offset(&mut self, levels: &[DynLevel<'_>]) -> Result<()> {
        for (position, level) in levels.iter().enumerate() {
            self.gen_expr(level.index)?;
            self.push(Instr::Dup);
            self.u256(level.dim);
            self.push(Instr::U256Lt);
            self.push(Instr::Assert);
            if level.stride > 1 {
                self.u256(level.stride);
                self.push(Instr::Mul);
            }
            if position > 0 {
                self.push(Instr::Add);
            }
        }
        Ok(())
    }

    /// Absolute base of a place: its slot plus the statically folded part
    /// of the index chain. `…ByIndex` instructions address the whole
    /// region, so the place's own slot participates.
    fn place_base(place: &Place, access: &Access<'_>) -> usize {
        let slot = match place {
            Place::Local { slot, .. }
            | Place::ImmField { slot, .. }
            | Place::MutField { slot, .. } => *slot,
            Place::Template { .. } => unreachable!("indexed template"),
        };
        slot as usize + access.base
    }

    fn gen_load(&mut self, place: &Place, indices: &[TExpr], offset_temp: Option<u16>) -> Result<()> {
        if let Place::Template { index, .. } = place {
            debug_assert!(indices.is_empty());
            self.push(Instr::TemplateVariable(*index));
            return Ok(());
        }
        let access = Self::access(place.ty(), indices);
        if access.dynamic.is_empty() {
            for cell in 0..access.elem_size {
                self.push(Self::load_direct(place, access.base + cell)?);
            }
            return Ok(());
        }
        let base = Self::place_base(place, &access);
        self.gen_dynamic_offset(&access.dynamic)?;
        if access.elem_size == 1 {
            self.u256(base);
            self.push(Instr::Add);
            self.push(Self::load_by_index(place));
            return Ok(());
        }
        let temp = offset_temp.ok_or_else(|| CompilerError::internal("missing offset temp"))?;
        self.push(Instr::StoreLocal(temp as u8));
        for cell in 0..access.elem_size {
            self.push(Instr::LoadLocal(temp as u8));
            self.u256(base + cell);
            self.push(Instr::Add);
            self.push(Self::load_by_index(place));
        }
        Ok(())
    }

    fn gen_store(&mut self, target: &TAssignTarget) -> Result<()> {
        match target {
            TAssignTarget::Anon { size } => {
                for _ in 0..*size {
                    self.push(Instr::Pop);
                }
                Ok(())
            }
            TAssignTarget::Place { place, indices, offset_temp } => {
                let access = Self::access(place.ty(), indices);
                if access.dynamic.is_empty() {
                    for cell in (0..access.elem_size).rev() {
                        self.push(Self::store_direct(place, access.base + cell)?);
                    }
                    return Ok(());
                }
                let base = Self::place_base(place, &access);
                self.gen_dynamic_offset(&access.dynamic)?;
                if access.elem_size == 1 {
                    self.u256(base);
                    self.push(Instr::Add);
                    self.push(Self::store_by_index(place)?);
                    return Ok(());
                }
                let temp =
                    offset_temp.ok_or_else(|| CompilerError::internal("missing offset temp"))?;
                self.push(Instr::StoreLocal(temp as u8));
                for cell in (0..access.elem_size).rev() {
                    self.push(Instr::LoadLocal(temp as u8));
                    self.u256(base + cell);
                    self.push(Instr::Add);
                    self.push(Self::store_by_index(place)?);
                }
                Ok(())
            }
        }
    }

    fn load_direct(place: &Place, offset: usize) -> Result<Instr> {
        let slot = |base: u16| -> Result<u8> {
            u8::try_from(base as usize + offset)
                .map_err(|_| CompilerError::internal("slot overflow"))
        };
        Ok(match place {
            Place::Local { slot: base, .. } => Instr::LoadLocal(slot(*base)?),
            Place::ImmField { slot: base, .. } => Instr::LoadImmField(slot(*base)?),
            Place::MutField { slot: base, .. } => Instr::LoadMutField(slot(*base)?),
            Place::Template { .. } => return Err(CompilerError::internal("indexed template")),
        })
    }

    fn store_direct(place: &Place, offset: usize) -> Result<Instr> {
        let slot = |base: u16| -> Result<u8> {
            u8::try_from(base as usize + offset)
                .map_err(|_| CompilerError::internal("slot overflow"))
        };
        Ok(match place {
            Place::Local { slot: base, .. } => Instr::StoreLocal(slot(*base)?),
            Place::MutField { slot: base, .. } => Instr::StoreMutField(slot(*base)?),
            Place::ImmField { .. } | Place::Template { .. } => {
                return Err(CompilerError::internal("store to immutable place"));
            }
        })
    }

    fn load_by_index(place: &Place) -> Instr {
        match place {
            Place::Local { .. } => Instr::LoadLocalByIndex,
            Place::ImmField { .. } => Instr::LoadImmFieldByIndex,
            Place::MutField { .. } => Instr::LoadMutFieldByIndex,
            Place::Template { .. } => unreachable!("indexed template"),
        }
    }

    fn store_by_index(place: &Place) -> Result<Instr> {
        match place {
            Place::Local { .. } => Ok(Instr::StoreLocalByIndex),
            Place::MutField { .. } => Ok(Instr::StoreMutFieldByIndex),
            Place::ImmField { .. } | Place::Template { .. } => {
                Err(CompilerError::internal("store to immutable place"))
            }
        }
    }
}

fn binary_instr(op: BinOp, operand_ty: &Type) -> Result<Instr> {
    let signed = operand_ty == &Type::I256;
    Ok(match op {
        BinOp::Add => Instr::Add,
        BinOp::Sub => Instr::Sub,
        BinOp::Mul => Instr::Mul,
        BinOp::Div => Instr::Div,
        BinOp::Mod => Instr::Mod,
        BinOp::Exp => Instr::Exp,
        BinOp::ModExp => Instr::ModExp,
        BinOp::Shl => Instr::Shl,
        BinOp::Shr => Instr::Shr,
        BinOp::BitAnd => Instr::BitAnd,
        BinOp::BitOr => Instr::BitOr,
        BinOp::BitXor => Instr::BitXor,
        BinOp::Concat => Instr::ByteVecConcat,
        BinOp::Eq => Instr::Eq,
        BinOp::Ne => Instr::Neq,
        BinOp::Lt => {
            if signed {
                Instr::I256Lt
            } else {
                Instr::U256Lt
            }
        }
        BinOp::Le => {
            if signed {
                Instr::I256Le
            } else {
                Instr::U256Le
            }
        }
        BinOp::Gt => {
            if signed {
                Instr::I256Gt
            } else {
                Instr::U256Gt
            }
        }
        BinOp::Ge => {
            if signed {
                Instr::I256Ge
            } else {
                Instr::U256Ge
            }
        }
        BinOp::And | BinOp::Or => {
            return Err(CompilerError::internal("short-circuit operators lower to branches"));
        }
    })
}
