//! Compiler for the Ralph smart-contract language.
//!
//! Ralph is a statically-typed language targeting a stateful stack-based
//! virtual machine. The compiler turns a multi-declaration source unit into
//! deterministic bytecode: [`StatefulContract`] values for concrete
//! contracts and stateful/stateless script values for `TxScript` and
//! `AssetScript` declarations, together with an ordered warning list.
//!
//! ```
//! let source = r#"
//!     Contract Counter(mut count: U256) {
//!         @using(updateFields = true, checkExternalCaller = false)
//!         pub fn bump() -> U256 {
//!             count = count + 1
//!             return count
//!         }
//!     }
//! "#;
//! let compiled = ralphc_compiler::compile_project(source).unwrap();
//! assert_eq!(compiled.contracts.len(), 1);
//! assert!(compiled.warnings.is_empty());
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod types;

mod analyze;
mod builtins;
mod check;
mod codegen;
mod inherit;
mod tast;

pub use error::{CompilerError, ErrorKind, SourcePos};
pub use types::Type;

use ast::ContractKind;
use error::Result;
use ralphc_primitives::{StatefulContract, StatefulScript, StatelessScript};
use serde::{Deserialize, Serialize};

/// A script parameter substituted before execution, rendered as `{n}` in
/// the template string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVar {
    pub name: String,
    pub ty: Type,
    pub index: u8,
}

/// Production and debug bytecode of one concrete contract. The two differ
/// only for contracts using debug-only builtins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledContract {
    pub name: String,
    pub bytecode: StatefulContract,
    pub debug_bytecode: StatefulContract,
}

/// Bytecode of one script declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompiledScript {
    Tx {
        name: String,
        bytecode: StatefulScript,
        debug_bytecode: StatefulScript,
        template_vars: Vec<TemplateVar>,
    },
    Asset {
        name: String,
        bytecode: StatelessScript,
        debug_bytecode: StatelessScript,
        template_vars: Vec<TemplateVar>,
    },
}

impl CompiledScript {
    pub fn name(&self) -> &str {
        match self {
            Self::Tx { name, .. } | Self::Asset { name, .. } => name,
        }
    }

    pub fn template_vars(&self) -> &[TemplateVar] {
        match self {
            Self::Tx { template_vars, .. } | Self::Asset { template_vars, .. } => template_vars,
        }
    }
}

/// Output of a whole-unit compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub contracts: Vec<CompiledContract>,
    pub scripts: Vec<CompiledScript>,
    /// Ordered, human readable, prefixed with contract/function identity.
    pub warnings: Vec<String>,
}

/// Compiles a multi-declaration source unit.
///
/// Declarations are parsed, resolved against their inheritance graphs,
/// type checked abstract-first, analyzed for diagnostics, and emitted in
/// source order. Only concrete declarations produce bytecode; the first
/// error aborts the unit.
pub fn compile_project(source: &str) -> Result<CompileResult> {
    let _span = tracing::debug_span!("compile_project", len = source.len()).entered();
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let unit = parser::Parser::new(source, tokens).parse_source_unit()?;
    tracing::debug!(declarations = unit.contracts.len(), "parsed");
    let resolved = inherit::resolve(&unit)?;
    let checked = check::check(&resolved)?;
    let warnings = analyze::analyze(&resolved, &checked)?;

    let mut contracts = Vec::new();
    let mut scripts = Vec::new();
    for (rc, cc) in resolved.contracts.iter().zip(&checked.contracts) {
        match rc.kind {
            ContractKind::Contract => contracts.push(CompiledContract {
                name: rc.name.clone(),
                bytecode: codegen::gen_contract(&cc.tc, false)?,
                debug_bytecode: codegen::gen_contract(&cc.tc, true)?,
            }),
            ContractKind::TxScript => scripts.push(CompiledScript::Tx {
                name: rc.name.clone(),
                bytecode: codegen::gen_tx_script(&cc.tc, false)?,
                debug_bytecode: codegen::gen_tx_script(&cc.tc, true)?,
                template_vars: template_vars(rc),
            }),
            ContractKind::AssetScript => scripts.push(CompiledScript::Asset {
                name: rc.name.clone(),
                bytecode: codegen::gen_asset_script(&cc.tc, false)?,
                debug_bytecode: codegen::gen_asset_script(&cc.tc, true)?,
                template_vars: template_vars(rc),
            }),
            ContractKind::AbstractContract | ContractKind::Interface => {}
        }
    }
    tracing::debug!(
        contracts = contracts.len(),
        scripts = scripts.len(),
        warnings = warnings.len(),
        "compiled"
    );
    Ok(CompileResult { contracts, scripts, warnings })
}

/// Compiles a unit and returns the first contract declaration's bytecode.
///
/// Pointing this at an abstract contract is an error: abstract contracts
/// never emit code.
pub fn compile_contract(source: &str) -> Result<CompiledContract> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let unit = parser::Parser::new(source, tokens).parse_source_unit()?;
    let target = unit
        .contracts
        .iter()
        .find(|c| matches!(c.kind, ContractKind::Contract | ContractKind::AbstractContract))
        .ok_or_else(|| CompilerError::name("There is no contract to compile"))?;
    if target.kind == ContractKind::AbstractContract {
        return Err(CompilerError::type_error(format!(
            "Code generation is not supported for abstract contract \"{}\"",
            target.name.name
        )));
    }
    let name = target.name.name.clone();
    let result = compile_project(source)?;
    result
        .contracts
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| CompilerError::internal("concrete contract missing from output"))
}

/// Compiles a unit and returns the first script declaration's bytecode.
pub fn compile_script(source: &str) -> Result<CompiledScript> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let unit = parser::Parser::new(source, tokens).parse_source_unit()?;
    let target = unit
        .contracts
        .iter()
        .find(|c| c.kind.is_script())
        .ok_or_else(|| CompilerError::name("There is no script to compile"))?;
    let name = target.name.name.clone();
    let result = compile_project(source)?;
    result
        .scripts
        .into_iter()
        .find(|s| s.name() == name)
        .ok_or_else(|| CompilerError::internal("script missing from output"))
}

fn template_vars(rc: &inherit::ResolvedContract) -> Vec<TemplateVar> {
    rc.fields
        .iter()
        .enumerate()
        .map(|(index, field)| TemplateVar {
            name: field.ident.name.clone(),
            ty: field.ty.clone(),
            index: index as u8,
        })
        .collect()
}
