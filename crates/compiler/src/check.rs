//! Type checking and lowering to the typed tree.
//!
//! Each declaration is checked in its own context: inherited functions are
//! re-checked against the child's field layout, since slot assignment
//! depends on the full field list. Checking also records the usage facts
//! (read fields, assigned fields, called builtins) the diagnostics pass
//! consumes.

use crate::ast::{self, *};
use crate::builtins::{AssetUse, Builtin, StaticBuiltin};
use crate::error::{CompilerError, Result, SourcePos};
use crate::inherit::{ResolvedContract, ResolvedUnit};
use crate::tast::*;
use crate::types::{flattened_size, format_type_list, Type};
use alloy_primitives::U256;
use ralphc_primitives::Val;
use std::collections::{HashMap, HashSet};

/// Usage facts collected for one function, consumed by the diagnostics
/// pass.
#[derive(Debug, Clone)]
pub struct FuncAnalysis {
    pub name: String,
    pub is_public: bool,
    pub has_body: bool,
    pub annotations: UsingAnnotation,
    pub uses_preapproved: bool,
    pub uses_contract_assets: bool,
    pub writes_fields: bool,
    pub calls_check_caller: bool,
    pub unused_locals: Vec<String>,
}

/// Usage facts collected per contract.
#[derive(Debug, Clone, Default)]
pub struct ContractUsage {
    pub used_fields: HashSet<String>,
    pub assigned_fields: HashSet<String>,
    pub used_constants: HashSet<String>,
    pub used_enum_variants: HashSet<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct CheckedContract {
    pub tc: TContract,
    pub usage: ContractUsage,
    pub functions: Vec<FuncAnalysis>,
}

#[derive(Debug)]
pub struct CheckedUnit {
    pub contracts: Vec<CheckedContract>,
}

/// Checks every declaration, abstract declarations first, and returns the
/// checked unit in source order.
pub fn check(unit: &ResolvedUnit) -> Result<CheckedUnit> {
    let mut checked: Vec<Option<CheckedContract>> = vec![None; unit.contracts.len()];
    for pass in 0..2 {
        for (index, contract) in unit.contracts.iter().enumerate() {
            let is_abstract = matches!(
                contract.kind,
                ContractKind::Interface | ContractKind::AbstractContract
            );
            if (pass == 0) == is_abstract {
                checked[index] = Some(check_contract(unit, contract)?);
            }
        }
    }
    Ok(CheckedUnit { contracts: checked.into_iter().map(|c| c.expect("two passes")).collect() })
}

const MAX_SLOTS: usize = u8::MAX as usize + 1;

/// Scalar slot assignment for contract fields: the immutable region first,
/// then the mutable region, each indexed from zero. An `@std` id occupies
/// the last immutable slot.
#[derive(Debug, Default)]
struct FieldLayout {
    imm: HashMap<String, (u16, Type)>,
    mutable: HashMap<String, (u16, Type)>,
    templates: HashMap<String, (u8, Type)>,
    imm_len: usize,
    mut_len: usize,
}

impl FieldLayout {
    fn build(contract: &ResolvedContract) -> Result<Self> {
        let mut layout = Self::default();
        if contract.kind.is_script() {
            for field in &contract.fields {
                if field.ty.is_array() {
                    return Err(CompilerError::type_error(format!(
                        "Fields of script \"{}\" must have primitive types, got \"{}\" for \"{}\"",
                        contract.name, field.ty, field.ident.name
                    )));
                }
                let index = layout.templates.len();
                if index >= MAX_SLOTS {
                    return Err(CompilerError::type_error(format!(
                        "Too many fields in script \"{}\"",
                        contract.name
                    )));
                }
                layout
                    .templates
                    .insert(field.ident.name.clone(), (index as u8, field.ty.clone()));
            }
            return Ok(layout);
        }
        for field in &contract.fields {
            let size = field.ty.flattened_size();
            let (region, len) = if field.mutable {
                (&mut layout.mutable, &mut layout.mut_len)
            } else {
                (&mut layout.imm, &mut layout.imm_len)
            };
            region.insert(field.ident.name.clone(), (*len as u16, field.ty.clone()));
            *len += size;
        }
        if contract.std_id.is_some() {
            layout.imm_len += 1;
        }
        if layout.imm_len > MAX_SLOTS || layout.mut_len > MAX_SLOTS {
            return Err(CompilerError::type_error(format!(
                "Too many fields in contract \"{}\"",
                contract.name
            )));
        }
        Ok(layout)
    }

    fn field_length(&self) -> u16 {
        (self.imm_len + self.mut_len) as u16
    }
}

/// Rejects references to undeclared contract types.
fn validate_type(unit: &ResolvedUnit, ty: &Type) -> Result<()> {
    match ty {
        Type::Contract(name) => match unit.get(name) {
            Some(decl) if !decl.kind.is_script() => Ok(()),
            _ => Err(CompilerError::name(format!("Contract \"{name}\" does not exist"))),
        },
        Type::FixedArray(elem, _) => validate_type(unit, elem),
        _ => Ok(()),
    }
}

fn check_contract(unit: &ResolvedUnit, contract: &ResolvedContract) -> Result<CheckedContract> {
    tracing::debug!(name = %contract.name, kind = ?contract.kind, "type checking");
    for field in &contract.fields {
        validate_type(unit, &field.ty)?;
    }
    for func in &contract.functions {
        for arg in &func.def.args {
            validate_type(unit, &arg.ty)?;
        }
        for ret in &func.def.returns {
            validate_type(unit, ret)?;
        }
    }
    let layout = FieldLayout::build(contract)?;
    let mut usage = ContractUsage::default();
    let mut functions = Vec::new();
    let mut analyses = Vec::new();

    if contract.kind == ContractKind::TxScript {
        let main = FuncChecker::new(unit, contract, &layout, &mut usage).check_main()?;
        functions.push(main.0);
        analyses.push(main.1);
    }

    for resolved in &contract.functions {
        tracing::trace!(func = %resolved.def.name.name, origin = %resolved.origin, "checking");
        let (func, analysis) =
            FuncChecker::new(unit, contract, &layout, &mut usage).check_func(resolved)?;
        functions.push(func);
        analyses.push(analysis);
    }

    if contract.is_concrete_contract() {
        let unassigned: Vec<_> = contract
            .fields
            .iter()
            .filter(|f| f.mutable && !usage.assigned_fields.contains(&f.ident.name))
            .map(|f| f.ident.name.clone())
            .collect();
        if !unassigned.is_empty() {
            return Err(CompilerError::mutability(format!(
                "There are unassigned mutable fields in contract {}: {}",
                contract.name,
                unassigned.join(", ")
            )));
        }
    }

    let tc = TContract {
        kind: contract.kind,
        name: contract.name.clone(),
        field_length: layout.field_length(),
        functions,
    };
    Ok(CheckedContract { tc, usage, functions: analyses })
}

#[derive(Debug)]
struct VarInfo {
    name: String,
    ty: Type,
    mutable: bool,
    is_arg: bool,
    slot: u16,
    used: bool,
    assigned: bool,
    suppress_unused: bool,
}

struct FuncChecker<'a> {
    unit: &'a ResolvedUnit,
    contract: &'a ResolvedContract,
    layout: &'a FieldLayout,
    usage: &'a mut ContractUsage,
    func_name: String,
    ret_types: Vec<Type>,
    scopes: Vec<HashMap<String, usize>>,
    vars: Vec<VarInfo>,
    next_slot: usize,
    uses_preapproved: bool,
    uses_contract_assets: bool,
    writes_fields: bool,
    calls_check_caller: bool,
}

impl<'a> FuncChecker<'a> {
    fn new(
        unit: &'a ResolvedUnit,
        contract: &'a ResolvedContract,
        layout: &'a FieldLayout,
        usage: &'a mut ContractUsage,
    ) -> Self {
        Self {
            unit,
            contract,
            layout,
            usage,
            func_name: String::new(),
            ret_types: Vec::new(),
            scopes: vec![HashMap::new()],
            vars: Vec::new(),
            next_slot: 0,
            uses_preapproved: false,
            uses_contract_assets: false,
            writes_fields: false,
            calls_check_caller: false,
        }
    }

    fn qualified(&self) -> String {
        format!("{}.{}", self.contract.name, self.func_name)
    }

    /// Checks the synthesized `main` method of a script.
    fn check_main(mut self) -> Result<(TFunc, FuncAnalysis)> {
        self.func_name = "main".into();
        let contract = self.contract;
        let body = self.check_block(&contract.main)?;
        let using = contract.using;
        let locals_length = self.next_slot as u16;
        self.finish(
            TFunc {
                name: "main".into(),
                is_public: true,
                use_preapproved_assets: false,
                use_contract_assets: false,
                args_length: 0,
                locals_length,
                return_length: 0,
                body: Some(body),
            },
            true,
            using,
        )
    }

    fn check_func(mut self, resolved: &crate::inherit::ResolvedFunc) -> Result<(TFunc, FuncAnalysis)> {
        let def = &resolved.def;
        self.func_name = def.name.name.clone();
        self.ret_types = def.returns.clone();
        for arg in &def.args {
            self.define_var(&arg.ident, arg.ty.clone(), arg.mutable, true, arg.unused)?;
        }
        let args_length = self.next_slot as u16;

        let body = match &def.body {
            Some(stmts) => {
                let body = self.check_block(stmts)?;
                if !self.ret_types.is_empty() && !block_terminates(&body) {
                    return Err(CompilerError::invalid_return(format!(
                        "Expected return statement for function \"{}\"",
                        def.name.name
                    )));
                }
                let unassigned: Vec<_> = self
                    .vars
                    .iter()
                    .filter(|v| v.mutable && !v.is_arg && !v.assigned)
                    .map(|v| v.name.clone())
                    .collect();
                if !unassigned.is_empty() {
                    return Err(CompilerError::mutability(format!(
                        "There are unassigned mutable local vars in function {}: {}",
                        self.qualified(),
                        unassigned.join(", ")
                    )));
                }
                Some(body)
            }
            None => None,
        };

        let annotations = def.annotations;
        let func = TFunc {
            name: def.name.name.clone(),
            is_public: def.is_public,
            use_preapproved_assets: annotations.preapproved_assets.unwrap_or(false),
            use_contract_assets: annotations.assets_in_contract.unwrap_or(false),
            args_length,
            locals_length: self.next_slot as u16,
            return_length: flattened_size(&def.returns) as u16,
            body,
        };
        self.finish(func, false, annotations)
    }

    fn finish(
        self,
        mut func: TFunc,
        is_main: bool,
        annotations: UsingAnnotation,
    ) -> Result<(TFunc, FuncAnalysis)> {
        if self.contract.kind.is_script() && self.uses_contract_assets {
            return Err(CompilerError::assets(format!(
                "Contract asset builtins are not allowed in script \"{}\"",
                self.contract.name
            )));
        }
        if is_main {
            // The script main has no annotation surface of its own;
            // `@using` on the script overrides the computed flags.
            func.use_preapproved_assets =
                annotations.preapproved_assets.unwrap_or(self.uses_preapproved);
            func.use_contract_assets = false;
        }
        let unused_locals = self
            .vars
            .iter()
            .filter(|v| !v.used && !v.suppress_unused)
            .map(|v| format!("{}.{}", func.name, v.name))
            .collect();
        let analysis = FuncAnalysis {
            name: func.name.clone(),
            is_public: func.is_public,
            has_body: func.body.is_some(),
            annotations,
            uses_preapproved: self.uses_preapproved,
            uses_contract_assets: self.uses_contract_assets,
            writes_fields: self.writes_fields,
            calls_check_caller: self.calls_check_caller,
            unused_locals,
        };
        Ok((func, analysis))
    }

    // Scope management.

    fn alloc_slots(&mut self, size: usize) -> Result<u16> {
        let slot = self.next_slot;
        self.next_slot += size;
        if self.next_slot > MAX_SLOTS {
            return Err(CompilerError::type_error(format!(
                "Too many local variables in function \"{}\"",
                self.qualified()
            )));
        }
        Ok(slot as u16)
    }

    fn define_var(
        &mut self,
        ident: &Ident,
        ty: Type,
        mutable: bool,
        is_arg: bool,
        suppress_unused: bool,
    ) -> Result<u16> {
        if self.vars.iter().any(|v| v.name == ident.name) {
            return Err(CompilerError::name(format!(
                "These local variables are defined multiple times: {}",
                ident.name
            ))
            .at(ident.pos));
        }
        let slot = self.alloc_slots(ty.flattened_size())?;
        let id = self.vars.len();
        self.vars.push(VarInfo {
            name: ident.name.clone(),
            ty,
            mutable,
            is_arg,
            slot,
            used: false,
            assigned: false,
            suppress_unused,
        });
        self.scopes.last_mut().expect("scope stack").insert(ident.name.clone(), id);
        Ok(slot)
    }

    fn lookup_var(&mut self, name: &str) -> Option<usize> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        None
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    // Statements.

    fn check_block(&mut self, stmts: &[Stmt]) -> Result<Vec<TStmt>> {
        self.scoped(|this| stmts.iter().map(|s| this.check_stmt(s)).collect())
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<TStmt> {
        match stmt {
            Stmt::Let { targets, value, .. } => self.check_let(targets, value),
            Stmt::Assign { targets, value, .. } => self.check_assign(targets, value),
            Stmt::Expr(expr) => {
                let texpr = self.check_expr_multi(expr)?;
                if !texpr.tys.is_empty() {
                    return Err(CompilerError::type_error(format!(
                        "Expected no return values, got {}",
                        format_type_list(&texpr.tys)
                    ))
                    .at(expr.pos()));
                }
                Ok(TStmt::Expr(texpr))
            }
            Stmt::If { branches, else_body, .. } => {
                let branches = branches
                    .iter()
                    .map(|(cond, body)| {
                        let cond = self.check_bool(cond)?;
                        let body = self.check_block(body)?;
                        Ok((cond, body))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let else_body = else_body.as_ref().map(|body| self.check_block(body)).transpose()?;
                Ok(TStmt::If { branches, else_body })
            }
            Stmt::While { cond, body, .. } => {
                let cond = self.check_bool(cond)?;
                let body = self.check_block(body)?;
                Ok(TStmt::While { cond, body })
            }
            Stmt::For { init, cond, update, body, .. } => self.scoped(|this| {
                let init = this.check_stmt(init)?;
                let cond = this.check_bool(cond)?;
                let update = this.check_stmt(update)?;
                let body = this.check_block(body)?;
                Ok(TStmt::For { init: Box::new(init), cond, update: Box::new(update), body })
            }),
            Stmt::Return { values, pos } => {
                let values =
                    values.iter().map(|v| self.check_expr_multi(v)).collect::<Result<Vec<_>>>()?;
                let got: Vec<Type> = values.iter().flat_map(|v| v.tys.clone()).collect();
                if got != self.ret_types {
                    return Err(CompilerError::invalid_return(format!(
                        "Invalid return types: expected {}, got {}",
                        format_type_list(&self.ret_types),
                        format_type_list(&got)
                    ))
                    .at(*pos));
                }
                Ok(TStmt::Return(values))
            }
            Stmt::Emit { event, args, pos } => {
                let Some(event_index) = self.contract.event_index(&event.name) else {
                    return Err(CompilerError::name(format!(
                        "Event \"{}\" does not exist",
                        event.name
                    ))
                    .at(event.pos));
                };
                let def = self.contract.events[event_index].clone();
                let args = args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
                let got: Vec<Type> = args.iter().map(|a| a.ty().clone()).collect();
                let expected: Vec<Type> = def.params.iter().map(|(_, ty)| ty.clone()).collect();
                if got != expected {
                    use itertools::Itertools;
                    return Err(CompilerError::type_error(format!(
                        "Invalid args type {} for event {}({})",
                        format_type_list(&got),
                        def.name.name,
                        expected.iter().format(", ")
                    ))
                    .at(*pos));
                }
                Ok(TStmt::Emit { event_index, args })
            }
        }
    }

    fn check_let(&mut self, targets: &[LetTarget], value: &Expr) -> Result<TStmt> {
        let value = self.check_expr_multi(value)?;
        if value.tys.len() != targets.len() {
            return Err(CompilerError::type_error(format!(
                "Invalid number of assignment targets: expected {}, got {}",
                value.tys.len(),
                targets.len()
            ))
            .at(targets[0].pos));
        }
        let mut lowered = Vec::with_capacity(targets.len());
        for (target, ty) in targets.iter().zip(value.tys.clone()) {
            let size = ty.flattened_size() as u16;
            match &target.name {
                None => lowered.push(TLetTarget::Anon { size }),
                Some(ident) => {
                    let slot = self.define_var(ident, ty, target.mutable, false, false)?;
                    lowered.push(TLetTarget::Bind { slot, size });
                }
            }
        }
        Ok(TStmt::Let { targets: lowered, value })
    }

    fn check_assign(&mut self, targets: &[AssignTarget], value: &Expr) -> Result<TStmt> {
        let value = self.check_expr_multi(value)?;
        if value.tys.len() != targets.len() {
            let pos = match &targets[0] {
                AssignTarget::Var(ident) | AssignTarget::Index { base: ident, .. } => ident.pos,
                AssignTarget::Anonymous(pos) => *pos,
            };
            return Err(CompilerError::type_error(format!(
                "Invalid number of assignment targets: expected {}, got {}",
                value.tys.len(),
                targets.len()
            ))
            .at(pos));
        }
        let mut lowered = Vec::with_capacity(targets.len());
        for (target, ty) in targets.iter().zip(value.tys.clone()) {
            lowered.push(self.check_assign_target(target, &ty)?);
        }
        Ok(TStmt::Assign { targets: lowered, value })
    }

    fn check_assign_target(&mut self, target: &AssignTarget, ty: &Type) -> Result<TAssignTarget> {
        match target {
            AssignTarget::Anonymous(_) => {
                Ok(TAssignTarget::Anon { size: ty.flattened_size() as u16 })
            }
            AssignTarget::Var(ident) => {
                let place = self.resolve_assignable(ident)?;
                if place.ty() != ty {
                    return Err(CompilerError::type_error(format!(
                        "Invalid assignment type for \"{}\": expected \"{}\", got \"{ty}\"",
                        ident.name,
                        place.ty()
                    ))
                    .at(ident.pos));
                }
                Ok(TAssignTarget::Place { place, indices: Vec::new(), offset_temp: None })
            }
            AssignTarget::Index { base, indices } => {
                let place = self.resolve_assignable(base)?;
                let (indices, elem_ty) = self.check_indices(place.ty().clone(), indices)?;
                if &elem_ty != ty {
                    return Err(CompilerError::type_error(format!(
                        "Invalid assignment type for \"{}\": expected \"{elem_ty}\", got \"{ty}\"",
                        base.name
                    ))
                    .at(base.pos));
                }
                let offset_temp = self.index_offset_temp(&indices, &elem_ty)?;
                Ok(TAssignTarget::Place { place, indices, offset_temp })
            }
        }
    }

    /// Resolves an assignment base and enforces mutability.
    fn resolve_assignable(&mut self, ident: &Ident) -> Result<Place> {
        let name = &ident.name;
        if let Some(id) = self.lookup_var(name) {
            let var = &mut self.vars[id];
            if !var.mutable {
                return Err(CompilerError::mutability(format!(
                    "Cannot assign to immutable variable \"{name}\""
                ))
                .at(ident.pos));
            }
            var.used = true;
            var.assigned = true;
            return Ok(Place::Local { slot: var.slot, ty: var.ty.clone() });
        }
        if let Some((slot, ty)) = self.layout.mutable.get(name) {
            self.usage.used_fields.insert(name.clone());
            self.usage.assigned_fields.insert(name.clone());
            self.writes_fields = true;
            return Ok(Place::MutField { slot: *slot, ty: ty.clone() });
        }
        if self.layout.imm.get(name).is_some() {
            return Err(CompilerError::mutability(format!(
                "Cannot assign to immutable field \"{name}\""
            ))
            .at(ident.pos));
        }
        if self.layout.templates.contains_key(name) {
            return Err(CompilerError::mutability(format!(
                "Cannot assign to template variable \"{name}\""
            ))
            .at(ident.pos));
        }
        Err(CompilerError::name(format!("Variable \"{name}\" is not defined")).at(ident.pos))
    }

    fn check_bool(&mut self, expr: &Expr) -> Result<TExpr> {
        let texpr = self.check_expr(expr)?;
        if texpr.ty() != &Type::Bool {
            return Err(CompilerError::type_error(format!(
                "Expected a \"Bool\" condition, got \"{}\"",
                texpr.ty()
            ))
            .at(expr.pos()));
        }
        Ok(texpr)
    }

    /// Checks an expression that must produce exactly one value.
    fn check_expr(&mut self, expr: &Expr) -> Result<TExpr> {
        let texpr = self.check_expr_multi(expr)?;
        if texpr.tys.len() != 1 {
            return Err(CompilerError::type_error(format!(
                "Expected a single value, got {}",
                format_type_list(&texpr.tys)
            ))
            .at(expr.pos()));
        }
        Ok(texpr)
    }
}

/// Whether every path through the block ends in `return` or `panic!`.
pub(crate) fn block_terminates(stmts: &[TStmt]) -> bool {
    stmts.iter().any(stmt_terminates)
}

fn stmt_terminates(stmt: &TStmt) -> bool {
    match stmt {
        TStmt::Return(_) => true,
        TStmt::Expr(expr) => {
            matches!(&expr.kind, TExprKind::Builtin { call: BuiltinCall::Panic { .. }, .. })
        }
        TStmt::If { branches, else_body: Some(else_body) } => {
            branches.iter().all(|(_, body)| block_terminates(body)) && block_terminates(else_body)
        }
        _ => false,
    }
}

impl FuncChecker<'_> {
    fn check_expr_multi(&mut self, expr: &Expr) -> Result<TExpr> {
        match expr {
            Expr::Lit(literal, pos) => match literal_value(literal) {
                Some((ty, value)) => Ok(TExpr::new(ty, TExprKind::Const(value))),
                None => Err(CompilerError::type_error("ALPH can only be used as a token id")
                    .at(*pos)),
            },
            Expr::DebugString(_, pos) => Err(CompilerError::type_error(
                "String literals can only be used with debug!",
            )
            .at(*pos)),
            Expr::Var(ident) => self.resolve_value(ident),
            Expr::Member { base, member } => self.resolve_enum_variant(base, member),
            Expr::ArrayLit(elements, pos) => self.check_array_lit(elements, *pos),
            Expr::ArrayRepeat { value, size, pos } => self.check_array_repeat(value, size, *pos),
            Expr::Index { .. } => self.check_index_expr(expr),
            Expr::Binary { op, lhs, rhs, pos } => self.check_binary(*op, lhs, rhs, *pos),
            Expr::Not { expr, pos } => {
                let operand = self.check_expr(expr)?;
                if operand.ty() != &Type::Bool {
                    return Err(CompilerError::type_error(format!(
                        "Invalid operand type \"{}\" for operator \"!\"",
                        operand.ty()
                    ))
                    .at(*pos));
                }
                Ok(TExpr::new(Type::Bool, TExprKind::Not(Box::new(operand))))
            }
            Expr::IfExpr { cond, then_expr, else_expr, pos } => {
                let cond = self.check_bool(cond)?;
                let then_expr = self.check_expr(then_expr)?;
                let else_expr = self.check_expr(else_expr)?;
                if then_expr.tys != else_expr.tys {
                    return Err(CompilerError::type_error(format!(
                        "Invalid if-else expression branches: expected {}, got {}",
                        format_type_list(&then_expr.tys),
                        format_type_list(&else_expr.tys)
                    ))
                    .at(*pos));
                }
                let ty = then_expr.ty().clone();
                Ok(TExpr::new(
                    ty,
                    TExprKind::IfExpr {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                ))
            }
            Expr::Call { name, is_builtin, approvals, args } => {
                if *is_builtin {
                    self.check_builtin(name, approvals, args)
                } else {
                    self.check_call(name, approvals, args)
                }
            }
            Expr::MemberCall { receiver, name, is_builtin, approvals, args } => {
                self.check_member_call(receiver, name, *is_builtin, approvals, args)
            }
        }
    }

    fn resolve_value(&mut self, ident: &Ident) -> Result<TExpr> {
        let name = &ident.name;
        if name == "_" {
            return Err(CompilerError::name("Anonymous variables can not be read").at(ident.pos));
        }
        if let Some(id) = self.lookup_var(name) {
            let var = &mut self.vars[id];
            var.used = true;
            let place = Place::Local { slot: var.slot, ty: var.ty.clone() };
            return Ok(TExpr::new(
                var.ty.clone(),
                TExprKind::Load { place, indices: Vec::new(), offset_temp: None },
            ));
        }
        if let Some((slot, ty)) = self.layout.imm.get(name) {
            self.usage.used_fields.insert(name.clone());
            let place = Place::ImmField { slot: *slot, ty: ty.clone() };
            return Ok(TExpr::new(
                ty.clone(),
                TExprKind::Load { place, indices: Vec::new(), offset_temp: None },
            ));
        }
        if let Some((slot, ty)) = self.layout.mutable.get(name) {
            self.usage.used_fields.insert(name.clone());
            let place = Place::MutField { slot: *slot, ty: ty.clone() };
            return Ok(TExpr::new(
                ty.clone(),
                TExprKind::Load { place, indices: Vec::new(), offset_temp: None },
            ));
        }
        if let Some((index, ty)) = self.layout.templates.get(name) {
            self.usage.used_fields.insert(name.clone());
            let place = Place::Template { index: *index, ty: ty.clone() };
            return Ok(TExpr::new(
                ty.clone(),
                TExprKind::Load { place, indices: Vec::new(), offset_temp: None },
            ));
        }
        if let Some(constant) = self.contract.constants.iter().find(|c| c.def.name.name == *name) {
            self.usage.used_constants.insert(name.clone());
            let (ty, value) = literal_value(&constant.def.value)
                .ok_or_else(|| CompilerError::internal("ALPH constant"))?;
            return Ok(TExpr::new(ty, TExprKind::Const(value)));
        }
        Err(CompilerError::name(format!("Variable \"{name}\" is not defined")).at(ident.pos))
    }

    fn resolve_enum_variant(&mut self, base: &Ident, member: &Ident) -> Result<TExpr> {
        let Some(enum_def) = self.contract.enums.iter().find(|e| e.name.name == base.name) else {
            return Err(CompilerError::name(format!("Enum \"{}\" does not exist", base.name))
                .at(base.pos));
        };
        let Some((_, literal)) =
            enum_def.variants.iter().find(|(v, _)| v.name == member.name)
        else {
            return Err(CompilerError::name(format!(
                "Enum field {}.{} does not exist",
                base.name, member.name
            ))
            .at(member.pos));
        };
        let (ty, value) =
            literal_value(literal).ok_or_else(|| CompilerError::internal("ALPH enum field"))?;
        self.usage.used_enum_variants.insert((base.name.clone(), member.name.clone()));
        Ok(TExpr::new(ty, TExprKind::Const(value)))
    }

    fn check_array_lit(&mut self, elements: &[Expr], pos: SourcePos) -> Result<TExpr> {
        let checked =
            elements.iter().map(|e| self.check_expr(e)).collect::<Result<Vec<_>>>()?;
        let elem_ty = checked[0].ty().clone();
        for element in &checked[1..] {
            if element.ty() != &elem_ty {
                return Err(CompilerError::type_error(format!(
                    "Invalid array element type: expected \"{elem_ty}\", got \"{}\"",
                    element.ty()
                ))
                .at(pos));
            }
        }
        let ty = Type::FixedArray(Box::new(elem_ty), checked.len());
        Ok(TExpr::new(ty, TExprKind::ArrayLit(checked)))
    }

    fn check_array_repeat(
        &mut self,
        value: &Expr,
        size: &Expr,
        pos: SourcePos,
    ) -> Result<TExpr> {
        let value = self.check_expr(value)?;
        let size_expr = self.check_expr(size)?;
        let count = fold_u256(&size_expr)
            .and_then(|v| usize::try_from(v).ok())
            .filter(|count| *count > 0)
            .ok_or_else(|| {
                CompilerError::type_error("Invalid array size, expected a positive constant U256")
                    .at(pos)
            })?;
        let temp_slot = if value.as_const().is_some() {
            None
        } else {
            Some(self.alloc_slots(value.flattened_size())?)
        };
        let ty = Type::FixedArray(Box::new(value.ty().clone()), count);
        Ok(TExpr::new(ty, TExprKind::Repeat { value: Box::new(value), count, temp_slot }))
    }

    /// Flattens an index chain, resolving the root to a place when it is a
    /// plain variable and materializing it into a temp otherwise.
    fn check_index_expr(&mut self, expr: &Expr) -> Result<TExpr> {
        let mut indices = Vec::new();
        let mut cursor = expr;
        while let Expr::Index { base, index, .. } = cursor {
            indices.push((**index).clone());
            cursor = base;
        }
        indices.reverse();

        if let Expr::Var(ident) = cursor {
            if let Some(place) = self.try_resolve_place(ident)? {
                let (indices, elem_ty) = self.check_indices(place.ty().clone(), &indices)?;
                let offset_temp = self.index_offset_temp(&indices, &elem_ty)?;
                return Ok(TExpr::new(
                    elem_ty,
                    TExprKind::Load { place, indices, offset_temp },
                ));
            }
        }

        let array = self.check_expr(cursor)?;
        let temp_slot = self.alloc_slots(array.flattened_size())?;
        let (indices, elem_ty) = self.check_indices(array.ty().clone(), &indices)?;
        let offset_temp = self.index_offset_temp(&indices, &elem_ty)?;
        Ok(TExpr::new(
            elem_ty,
            TExprKind::IndexTemp { array: Box::new(array), temp_slot, indices, offset_temp },
        ))
    }

    /// Resolves a variable, field, or template read to a place without
    /// consuming constants.
    fn try_resolve_place(&mut self, ident: &Ident) -> Result<Option<Place>> {
        let name = &ident.name;
        if let Some(id) = self.lookup_var(name) {
            let var = &mut self.vars[id];
            var.used = true;
            return Ok(Some(Place::Local { slot: var.slot, ty: var.ty.clone() }));
        }
        if let Some((slot, ty)) = self.layout.imm.get(name) {
            self.usage.used_fields.insert(name.clone());
            return Ok(Some(Place::ImmField { slot: *slot, ty: ty.clone() }));
        }
        if let Some((slot, ty)) = self.layout.mutable.get(name) {
            self.usage.used_fields.insert(name.clone());
            return Ok(Some(Place::MutField { slot: *slot, ty: ty.clone() }));
        }
        if let Some((index, ty)) = self.layout.templates.get(name) {
            self.usage.used_fields.insert(name.clone());
            return Ok(Some(Place::Template { index: *index, ty: ty.clone() }));
        }
        Ok(None)
    }

    /// Type checks an index list against `base_ty`, folding constant
    /// indices and bounds-checking them at compile time.
    fn check_indices(&mut self, base_ty: Type, indices: &[Expr]) -> Result<(Vec<TExpr>, Type)> {
        let mut ty = base_ty;
        let mut lowered = Vec::with_capacity(indices.len());
        for index in indices {
            let Type::FixedArray(elem, size) = ty else {
                return Err(CompilerError::type_error(format!("\"{ty}\" is not an array"))
                    .at(index.pos()));
            };
            let mut idx = self.check_expr(index)?;
            if idx.ty() != &Type::U256 {
                return Err(CompilerError::type_error(format!(
                    "Invalid array index type \"{}\", expected \"U256\"",
                    idx.ty()
                ))
                .at(index.pos()));
            }
            if let Some(value) = fold_u256(&idx) {
                let out_of_bounds =
                    usize::try_from(value).map(|v| v >= size).unwrap_or(true);
                if out_of_bounds {
                    return Err(CompilerError::type_error(format!(
                        "Invalid array index: {value}, array size is {size}"
                    ))
                    .at(index.pos()));
                }
                idx = TExpr::new(Type::U256, TExprKind::Const(Val::U256(value)));
            }
            lowered.push(idx);
            ty = *elem;
        }
        Ok((lowered, ty))
    }

    /// A dynamic index selecting a whole sub-array needs a scratch local
    /// for the computed offset.
    fn index_offset_temp(&mut self, indices: &[TExpr], elem_ty: &Type) -> Result<Option<u16>> {
        let dynamic = indices.iter().any(|i| i.as_const().is_none());
        if dynamic && elem_ty.flattened_size() > 1 {
            Ok(Some(self.alloc_slots(1)?))
        } else {
            Ok(None)
        }
    }

    fn check_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, pos: SourcePos) -> Result<TExpr> {
        let lhs = self.check_expr(lhs)?;
        let rhs = self.check_expr(rhs)?;
        let invalid = || {
            CompilerError::type_error(format!(
                "Invalid operand types {} for operator \"{}\"",
                format_type_list(&[lhs.ty().clone(), rhs.ty().clone()]),
                op.symbol()
            ))
            .at(pos)
        };
        let (operand_ty, result_ty) = match op {
            BinOp::And | BinOp::Or => {
                if lhs.ty() != &Type::Bool || rhs.ty() != &Type::Bool {
                    return Err(invalid());
                }
                (Type::Bool, Type::Bool)
            }
            BinOp::Eq | BinOp::Ne => {
                if lhs.ty() != rhs.ty() || !lhs.ty().is_primitive() {
                    return Err(invalid());
                }
                (lhs.ty().clone(), Type::Bool)
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if lhs.ty() != rhs.ty() || !lhs.ty().is_numeric() {
                    return Err(invalid());
                }
                (lhs.ty().clone(), Type::Bool)
            }
            BinOp::Exp => {
                if !lhs.ty().is_numeric() || rhs.ty() != &Type::U256 {
                    return Err(invalid());
                }
                (lhs.ty().clone(), lhs.ty().clone())
            }
            BinOp::ModExp => {
                if lhs.ty() != &Type::U256 || rhs.ty() != &Type::U256 {
                    return Err(invalid());
                }
                (Type::U256, Type::U256)
            }
            BinOp::Concat => {
                if lhs.ty() != &Type::ByteVec || rhs.ty() != &Type::ByteVec {
                    return Err(invalid());
                }
                (Type::ByteVec, Type::ByteVec)
            }
            _ => {
                if lhs.ty() != rhs.ty() || !lhs.ty().is_numeric() {
                    return Err(invalid());
                }
                (lhs.ty().clone(), lhs.ty().clone())
            }
        };
        Ok(TExpr::new(
            result_ty,
            TExprKind::Binary { op, operand_ty, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        ))
    }

    fn check_call(
        &mut self,
        name: &Ident,
        approvals: &[ApproveClause],
        args: &[Expr],
    ) -> Result<TExpr> {
        let unit = self.unit;
        // A call on a contract name converts a contract id to a reference.
        if self.lookup_var(&name.name).is_none() {
            if let Some(target) = unit.get(&name.name) {
                if target.kind.is_script() {
                    return Err(CompilerError::type_error(format!(
                        "\"{}\" is not a contract type",
                        name.name
                    ))
                    .at(name.pos));
                }
                if !approvals.is_empty() {
                    return Err(CompilerError::assets(
                        "Braces syntax is not allowed for contract conversions",
                    )
                    .at(name.pos));
                }
                let mut checked =
                    args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
                let got: Vec<Type> = checked.iter().map(|a| a.ty().clone()).collect();
                if got != [Type::ByteVec] {
                    return Err(CompilerError::type_error(format!(
                        "Invalid args type {} for contract \"{}\", expected List(ByteVec)",
                        format_type_list(&got),
                        name.name
                    ))
                    .at(name.pos));
                }
                let id = checked.pop().expect("one argument");
                return Ok(TExpr {
                    tys: vec![Type::Contract(name.name.clone())],
                    kind: id.kind,
                });
            }
        }

        let contract = self.contract;
        let Some(position) = contract.func_index(&name.name) else {
            return Err(CompilerError::name(format!(
                "Function \"{}\" does not exist",
                name.name
            ))
            .at(name.pos));
        };
        let func = &contract.functions[position];
        let index = self.method_index(position, contract.kind)?;
        let args = self.check_args(&func.def, &name.name, args, name.pos)?;
        let approvals = self.check_call_approvals(&func.def, &name.name, approvals, name.pos)?;
        Ok(TExpr {
            tys: func.def.returns.clone(),
            kind: TExprKind::LocalCall { index, approvals, args },
        })
    }

    /// Transaction scripts reserve method slot 0 for the synthesized
    /// `main`.
    fn method_index(&self, position: usize, kind: ContractKind) -> Result<u8> {
        let index = position + usize::from(kind == ContractKind::TxScript);
        u8::try_from(index).map_err(|_| {
            CompilerError::type_error(format!(
                "Too many functions in contract \"{}\"",
                self.contract.name
            ))
        })
    }

    fn check_member_call(
        &mut self,
        receiver: &Expr,
        name: &Ident,
        is_builtin: bool,
        approvals: &[ApproveClause],
        args: &[Expr],
    ) -> Result<TExpr> {
        let unit = self.unit;
        if let Expr::Var(base) = receiver {
            let shadowed = self.lookup_var(&base.name).is_some()
                || self.layout.imm.contains_key(&base.name)
                || self.layout.mutable.contains_key(&base.name)
                || self.layout.templates.contains_key(&base.name);
            if !shadowed {
                if let Some(target) = unit.get(&base.name) {
                    return self.check_static_call(target, name, is_builtin, approvals, args);
                }
            }
        }

        let receiver = self.check_expr(receiver)?;
        let Type::Contract(target_name) = receiver.ty().clone() else {
            return Err(CompilerError::type_error(format!(
                "Expected a contract instance, got \"{}\"",
                receiver.ty()
            ))
            .at(name.pos));
        };
        if is_builtin {
            return Err(CompilerError::type_error(format!(
                "Function \"{}!\" is not defined on contract instances",
                name.name
            ))
            .at(name.pos));
        }
        let target = unit.get(&target_name).ok_or_else(|| {
            CompilerError::name(format!("Contract \"{target_name}\" does not exist"))
        })?;
        let Some(position) = target.func_index(&name.name) else {
            return Err(CompilerError::name(format!(
                "Function \"{}.{}\" does not exist",
                target_name, name.name
            ))
            .at(name.pos));
        };
        let func = &target.functions[position];
        if !func.def.is_public {
            return Err(CompilerError::type_error(format!(
                "Function \"{}.{}\" is private",
                target_name, name.name
            ))
            .at(name.pos));
        }
        let index = u8::try_from(position).map_err(|_| {
            CompilerError::type_error(format!("Too many functions in contract \"{target_name}\""))
        })?;
        let args = self.check_args(&func.def, &name.name, args, name.pos)?;
        let approvals = self.check_call_approvals(&func.def, &name.name, approvals, name.pos)?;
        Ok(TExpr {
            tys: func.def.returns.clone(),
            kind: TExprKind::ExternalCall { receiver: Box::new(receiver), index, approvals, args },
        })
    }

    fn check_static_call(
        &mut self,
        target: &ResolvedContract,
        name: &Ident,
        is_builtin: bool,
        approvals: &[ApproveClause],
        args: &[Expr],
    ) -> Result<TExpr> {
        if !approvals.is_empty() {
            return Err(CompilerError::assets(
                "Braces syntax is not allowed for static function calls",
            )
            .at(name.pos));
        }
        let static_builtin = is_builtin.then(|| StaticBuiltin::lookup(&name.name)).flatten();
        let Some(static_builtin) = static_builtin else {
            if target.func_index(&name.name).is_some() {
                return Err(CompilerError::type_error(format!(
                    "Can not call function \"{}\" on contract type \"{}\"",
                    name.name, target.name
                ))
                .at(name.pos));
            }
            return Err(CompilerError::name(format!(
                "Function \"{}.{}\" does not exist",
                target.name, name.name
            ))
            .at(name.pos));
        };
        if !matches!(target.kind, ContractKind::Contract | ContractKind::AbstractContract) {
            return Err(CompilerError::type_error(format!(
                "\"{}\" is not a contract",
                target.name
            ))
            .at(name.pos));
        }

        let region = match static_builtin {
            StaticBuiltin::EncodeImmFields => EncodeRegion::Imm,
            StaticBuiltin::EncodeMutFields => EncodeRegion::Mut,
            StaticBuiltin::EncodeFields => EncodeRegion::Both,
        };
        let wanted: Vec<&ast::Field> = target
            .fields
            .iter()
            .filter(|f| match region {
                EncodeRegion::Imm => !f.mutable,
                EncodeRegion::Mut => f.mutable,
                EncodeRegion::Both => true,
            })
            .collect();
        let checked = args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
        let got: Vec<Type> = checked.iter().map(|a| a.ty().clone()).collect();
        let expected: Vec<Type> = wanted.iter().map(|f| f.ty.clone()).collect();
        if got != expected {
            return Err(CompilerError::type_error(format!(
                "Invalid args type {} for function \"{}!\", expected {}",
                format_type_list(&got),
                name.name,
                format_type_list(&expected)
            ))
            .at(name.pos));
        }
        let mut imm_args = Vec::new();
        let mut mut_args = Vec::new();
        for (field, arg) in wanted.iter().zip(checked) {
            if field.mutable {
                mut_args.push(arg);
            } else {
                imm_args.push(arg);
            }
        }
        let includes_imm = matches!(region, EncodeRegion::Imm | EncodeRegion::Both);
        let std_id = if includes_imm { target.std_id.clone() } else { None };
        let tys = match region {
            EncodeRegion::Imm | EncodeRegion::Mut => vec![Type::ByteVec],
            EncodeRegion::Both => vec![Type::ByteVec, Type::ByteVec],
        };
        Ok(TExpr { tys, kind: TExprKind::EncodeFields { region, imm_args, mut_args, std_id } })
    }

    fn check_args(
        &mut self,
        def: &FuncDef,
        name: &str,
        args: &[Expr],
        pos: SourcePos,
    ) -> Result<Vec<TExpr>> {
        let checked = args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
        let got: Vec<Type> = checked.iter().map(|a| a.ty().clone()).collect();
        let expected: Vec<Type> = def.args.iter().map(|a| a.ty.clone()).collect();
        if got != expected {
            return Err(CompilerError::type_error(format!(
                "Invalid args type {} for function \"{name}\", expected {}",
                format_type_list(&got),
                format_type_list(&expected)
            ))
            .at(pos));
        }
        Ok(checked)
    }

    fn check_call_approvals(
        &mut self,
        def: &FuncDef,
        name: &str,
        approvals: &[ApproveClause],
        pos: SourcePos,
    ) -> Result<Vec<TApprove>> {
        let needs_approvals = def.annotations.preapproved_assets.unwrap_or(false);
        if needs_approvals && approvals.is_empty() {
            return Err(CompilerError::assets(format!(
                "Function \"{name}\" uses preapproved assets, please use the braces syntax to approve assets"
            ))
            .at(pos));
        }
        if !needs_approvals && !approvals.is_empty() {
            return Err(CompilerError::assets(format!(
                "Function \"{name}\" does not use preapproved assets, the braces syntax is not allowed"
            ))
            .at(pos));
        }
        self.check_approvals(approvals)
    }

    fn check_approvals(&mut self, approvals: &[ApproveClause]) -> Result<Vec<TApprove>> {
        if !approvals.is_empty() {
            self.uses_preapproved = true;
        }
        approvals
            .iter()
            .map(|clause| {
                let address = self.check_expr(&clause.address)?;
                if address.ty() != &Type::Address {
                    return Err(CompilerError::type_error(format!(
                        "Expected an \"Address\" in the braces syntax, got \"{}\"",
                        address.ty()
                    ))
                    .at(clause.address.pos()));
                }
                let token = match &clause.token {
                    Expr::Lit(Literal::Alph, _) => None,
                    other => {
                        let token = self.check_expr(other)?;
                        if token.ty() != &Type::ByteVec {
                            return Err(CompilerError::type_error(format!(
                                "Expected a \"ByteVec\" token id, got \"{}\"",
                                token.ty()
                            ))
                            .at(other.pos()));
                        }
                        Some(token)
                    }
                };
                let amount = self.check_expr(&clause.amount)?;
                if amount.ty() != &Type::U256 {
                    return Err(CompilerError::type_error(format!(
                        "Expected a \"U256\" amount, got \"{}\"",
                        amount.ty()
                    ))
                    .at(clause.amount.pos()));
                }
                Ok(TApprove { address, token, amount })
            })
            .collect()
    }

    fn check_builtin(
        &mut self,
        name: &Ident,
        approvals: &[ApproveClause],
        args: &[Expr],
    ) -> Result<TExpr> {
        if !approvals.is_empty() {
            return Err(CompilerError::assets("Braces syntax is not allowed for builtin functions")
                .at(name.pos));
        }
        let Some(builtin) = Builtin::lookup(&name.name) else {
            return Err(CompilerError::name(format!(
                "Builtin function \"{}!\" does not exist",
                name.name
            ))
            .at(name.pos));
        };

        match builtin {
            Builtin::Assert => {
                let checked =
                    args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
                let got: Vec<Type> = checked.iter().map(|a| a.ty().clone()).collect();
                let call = match got.as_slice() {
                    [Type::Bool] => BuiltinCall::Assert,
                    [Type::Bool, Type::U256] => BuiltinCall::AssertWithErrorCode,
                    _ => {
                        return Err(CompilerError::type_error(format!(
                            "Invalid args type {} for builtin \"assert!\", expected List(Bool) or List(Bool, U256)",
                            format_type_list(&got)
                        ))
                        .at(name.pos));
                    }
                };
                return Ok(TExpr { tys: Vec::new(), kind: TExprKind::Builtin { call, args: checked } });
            }
            Builtin::Panic => {
                let checked =
                    args.iter().map(|a| self.check_expr(a)).collect::<Result<Vec<_>>>()?;
                let got: Vec<Type> = checked.iter().map(|a| a.ty().clone()).collect();
                let has_code = match got.as_slice() {
                    [] => false,
                    [Type::U256] => true,
                    _ => {
                        return Err(CompilerError::type_error(format!(
                            "Invalid args type {} for builtin \"panic!\", expected List() or List(U256)",
                            format_type_list(&got)
                        ))
                        .at(name.pos));
                    }
                };
                return Ok(TExpr {
                    tys: Vec::new(),
                    kind: TExprKind::Builtin { call: BuiltinCall::Panic { has_code }, args: checked },
                });
            }
            Builtin::Debug => {
                let [Expr::DebugString(message, _)] = args else {
                    return Err(CompilerError::type_error(
                        "Builtin \"debug!\" expects a single string literal",
                    )
                    .at(name.pos));
                };
                return Ok(TExpr {
                    tys: Vec::new(),
                    kind: TExprKind::Builtin {
                        call: BuiltinCall::Debug { message: message.clone().into_bytes() },
                        args: Vec::new(),
                    },
                });
            }
            _ => {}
        }

        let params = builtin.params().expect("fixed-arity builtin");
        let token_index = builtin.token_arg_index();
        if args.len() != params.len() {
            return Err(CompilerError::type_error(format!(
                "Invalid number of args for builtin \"{}!\", expected {}",
                name.name,
                params.len()
            ))
            .at(name.pos));
        }
        let mut alph = false;
        let mut checked = Vec::with_capacity(args.len());
        for (position, (arg, param)) in args.iter().zip(&params).enumerate() {
            if token_index == Some(position) {
                if let Expr::Lit(Literal::Alph, _) = arg {
                    alph = true;
                    continue;
                }
            }
            let arg = self.check_expr(arg)?;
            if arg.ty() != param {
                return Err(CompilerError::type_error(format!(
                    "Invalid args type for builtin \"{}!\": expected \"{param}\", got \"{}\"",
                    name.name,
                    arg.ty()
                ))
                .at(name.pos));
            }
            checked.push(arg);
        }

        match builtin.asset_use() {
            AssetUse::Preapproved => self.uses_preapproved = true,
            AssetUse::Contract => self.uses_contract_assets = true,
            AssetUse::None => {}
        }
        if builtin == Builtin::CheckCaller {
            self.calls_check_caller = true;
        }

        let call = match (builtin, alph) {
            (Builtin::ApproveToken, true) => BuiltinCall::ApproveAlph,
            (Builtin::ApproveToken, false) => BuiltinCall::ApproveToken,
            (Builtin::TokenRemaining, true) => BuiltinCall::AlphRemaining,
            (Builtin::TokenRemaining, false) => BuiltinCall::TokenRemaining,
            (Builtin::TransferToken, true) => BuiltinCall::TransferAlph,
            (Builtin::TransferToken, false) => BuiltinCall::TransferToken,
            (Builtin::TransferTokenFromSelf, true) => BuiltinCall::TransferAlphFromSelf,
            (Builtin::TransferTokenFromSelf, false) => BuiltinCall::TransferTokenFromSelf,
            (Builtin::TransferTokenToSelf, true) => BuiltinCall::TransferAlphToSelf,
            (Builtin::TransferTokenToSelf, false) => BuiltinCall::TransferTokenToSelf,
            (Builtin::TxId, _) => BuiltinCall::TxId,
            (Builtin::CallerAddress, _) => BuiltinCall::CallerAddress,
            (Builtin::SelfContractId, _) => BuiltinCall::SelfContractId,
            (Builtin::CheckCaller, _) => BuiltinCall::CheckCaller,
            (Builtin::MigrateWithFields, _) => BuiltinCall::MigrateWithFields,
            (Builtin::GetSegregatedSignature, _) => BuiltinCall::GetSegregatedSignature,
            (Builtin::VerifyBIP340Schnorr, _) => BuiltinCall::VerifyBIP340Schnorr,
            (Builtin::Assert | Builtin::Panic | Builtin::Debug, _) => {
                unreachable!("handled above")
            }
        };
        Ok(TExpr { tys: builtin.returns(), kind: TExprKind::Builtin { call, args: checked } })
    }
}

fn literal_value(literal: &Literal) -> Option<(Type, Val)> {
    match literal {
        Literal::Bool(b) => Some((Type::Bool, Val::Bool(*b))),
        Literal::U256(v) => Some((Type::U256, Val::U256(*v))),
        Literal::I256(v) => Some((Type::I256, Val::I256(*v))),
        Literal::Bytes(bs) => Some((Type::ByteVec, Val::ByteVec(bs.clone()))),
        Literal::Address(bs) => Some((Type::Address, Val::Address(bs.clone()))),
        Literal::Alph => None,
    }
}

/// Folds `+ - * / % << >> & | ^` over constant `U256` operands. Anything
/// else, including overflow and division by zero, is left for runtime.
fn fold_u256(expr: &TExpr) -> Option<U256> {
    match &expr.kind {
        TExprKind::Const(Val::U256(value)) => Some(*value),
        TExprKind::Binary { op, operand_ty: Type::U256, lhs, rhs } => {
            let lhs = fold_u256(lhs)?;
            let rhs = fold_u256(rhs)?;
            match op {
                BinOp::Add => lhs.checked_add(rhs),
                BinOp::Sub => lhs.checked_sub(rhs),
                BinOp::Mul => lhs.checked_mul(rhs),
                BinOp::Div => lhs.checked_div(rhs),
                BinOp::Mod => lhs.checked_rem(rhs),
                BinOp::Shl => usize::try_from(rhs).ok().and_then(|s| lhs.checked_shl(s)),
                BinOp::Shr => usize::try_from(rhs).ok().map(|s| lhs >> s),
                BinOp::BitAnd => Some(lhs & rhs),
                BinOp::BitOr => Some(lhs | rhs),
                BinOp::BitXor => Some(lhs ^ rhs),
                _ => None,
            }
        }
        _ => None,
    }
}
