//! Post-check diagnostics: asset-annotation validation (fatal) and the
//! warning sweep (unused symbols, annotation over/under-claims, missing
//! external caller checks). Warnings never change the emitted bytecode.

use crate::ast::ContractKind;
use crate::check::{CheckedContract, CheckedUnit, FuncAnalysis};
use crate::error::{CompilerError, Result};
use crate::inherit::{ResolvedContract, ResolvedUnit};

pub fn analyze(unit: &ResolvedUnit, checked: &CheckedUnit) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    for (resolved, checked) in unit.contracts.iter().zip(&checked.contracts) {
        analyze_contract(resolved, checked, &mut warnings)?;
    }
    Ok(warnings)
}

fn analyze_contract(
    resolved: &ResolvedContract,
    checked: &CheckedContract,
    warnings: &mut Vec<String>,
) -> Result<()> {
    for (position, func) in checked.functions.iter().enumerate() {
        // The synthesized script main carries computed flags, not
        // annotations.
        let is_main = resolved.kind == ContractKind::TxScript && position == 0;
        if is_main || !func.has_body {
            continue;
        }
        check_asset_annotations(resolved, func)?;
        push_update_fields_warnings(resolved, func, warnings);
        push_external_caller_warning(resolved, func, warnings);
    }
    push_unused_warnings(resolved, checked, warnings);
    Ok(())
}

fn check_asset_annotations(resolved: &ResolvedContract, func: &FuncAnalysis) -> Result<()> {
    let name = format!("{}.{}", resolved.name, func.name);
    let preapproved = func.annotations.preapproved_assets.unwrap_or(false);
    if func.uses_preapproved && !preapproved {
        return Err(CompilerError::assets(format!(
            "Function \"{name}\" uses preapproved assets, please use \"@using(preapprovedAssets = true)\" for the function"
        )));
    }
    if !func.uses_preapproved && preapproved {
        return Err(CompilerError::assets(format!(
            "Function \"{name}\" does not use preapproved assets, please remove \"@using(preapprovedAssets = true)\" for the function"
        )));
    }
    let contract_assets = func.annotations.assets_in_contract.unwrap_or(false);
    if func.uses_contract_assets && !contract_assets {
        return Err(CompilerError::assets(format!(
            "Function \"{name}\" uses contract assets, please use \"@using(assetsInContract = true)\" for the function"
        )));
    }
    if !func.uses_contract_assets && contract_assets {
        return Err(CompilerError::assets(format!(
            "Function \"{name}\" does not use contract assets, please remove \"@using(assetsInContract = true)\" for the function"
        )));
    }
    Ok(())
}

fn push_update_fields_warnings(
    resolved: &ResolvedContract,
    func: &FuncAnalysis,
    warnings: &mut Vec<String>,
) {
    let name = format!("{}.{}", resolved.name, func.name);
    let update_fields = func.annotations.update_fields.unwrap_or(false);
    if func.writes_fields && !update_fields {
        warnings.push(format!(
            "Function \"{name}\" updates fields. Please use \"@using(updateFields = true)\" for the function"
        ));
    }
    if !func.writes_fields && update_fields {
        warnings.push(format!(
            "Function \"{name}\" does not update fields. Please remove \"@using(updateFields = true)\" for the function"
        ));
    }
}

fn push_external_caller_warning(
    resolved: &ResolvedContract,
    func: &FuncAnalysis,
    warnings: &mut Vec<String>,
) {
    if !resolved.is_concrete_contract() || !func.is_public {
        return;
    }
    if func.annotations.check_external_caller == Some(false) || func.calls_check_caller {
        return;
    }
    warnings.push(format!(
        "No external caller check for function \"{}.{}\"",
        resolved.name, func.name
    ));
}

fn push_unused_warnings(
    resolved: &ResolvedContract,
    checked: &CheckedContract,
    warnings: &mut Vec<String>,
) {
    if resolved.kind == ContractKind::Interface {
        return;
    }

    let unused_vars: Vec<_> =
        checked.functions.iter().flat_map(|f| f.unused_locals.clone()).collect();
    if !unused_vars.is_empty() {
        warnings.push(format!(
            "Found unused variables in {}: {}",
            resolved.name,
            unused_vars.join(", ")
        ));
    }

    let unused_fields: Vec<_> = resolved
        .fields
        .iter()
        .filter(|f| !f.unused && !checked.usage.used_fields.contains(&f.ident.name))
        .map(|f| f.ident.name.clone())
        .collect();
    if !unused_fields.is_empty() {
        warnings.push(format!(
            "Found unused fields in {}: {}",
            resolved.name,
            unused_fields.join(", ")
        ));
    }

    let unused_constants: Vec<_> = resolved
        .constants
        .iter()
        .filter(|c| {
            c.origin == resolved.name
                && !c.def.unused
                && !checked.usage.used_constants.contains(&c.def.name.name)
        })
        .map(|c| c.def.name.name.clone())
        .collect();
    if !unused_constants.is_empty() {
        warnings.push(format!(
            "Found unused constants in {}: {}",
            resolved.name,
            unused_constants.join(", ")
        ));
    }

    let unused_variants: Vec<_> = resolved
        .enums
        .iter()
        .filter(|e| e.origin == resolved.name)
        .flat_map(|e| {
            let usage = &checked.usage;
            let enum_name = e.name.name.clone();
            e.variants
                .iter()
                .filter(|(variant, _)| {
                    !usage.used_enum_variants.contains(&(enum_name.clone(), variant.name.clone()))
                })
                .map(|(variant, _)| format!("{}.{}", enum_name, variant.name))
                .collect::<Vec<_>>()
        })
        .collect();
    if !unused_variants.is_empty() {
        warnings.push(format!(
            "Found unused enum fields in {}: {}",
            resolved.name,
            unused_variants.join(", ")
        ));
    }
}
