//! Inheritance and interface resolution.
//!
//! Linearization is a depth-first walk over `extends`/`implements` edges,
//! ancestors before descendants, deduplicated by name. Cycles are detected
//! with three-color marking. Resolution flattens every declaration into a
//! [`ResolvedContract`] carrying the merged method table, events, constants
//! and enums its code generator and type checker work from.

use crate::ast::*;
use crate::error::{CompilerError, Result};
use itertools::Itertools;
use std::collections::HashMap;

/// A function in the flattened method table.
#[derive(Debug, Clone)]
pub struct ResolvedFunc {
    pub def: FuncDef,
    /// Name of the declaration the (possibly overriding) body came from.
    pub origin: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConstant {
    pub def: ConstantDef,
    pub origin: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedEnum {
    pub name: Ident,
    pub variants: Vec<(Ident, Literal)>,
    pub origin: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedContract {
    pub kind: ContractKind,
    pub name: String,
    pub using: UsingAnnotation,
    /// Declared fields; script fields are template variables.
    pub fields: Vec<Field>,
    /// Effective std id, materialized as a trailing immutable field on
    /// concrete contracts.
    pub std_id: Option<Vec<u8>>,
    pub functions: Vec<ResolvedFunc>,
    pub events: Vec<EventDef>,
    pub constants: Vec<ResolvedConstant>,
    pub enums: Vec<ResolvedEnum>,
    pub main: Vec<Stmt>,
}

impl ResolvedContract {
    pub fn is_concrete_contract(&self) -> bool {
        self.kind == ContractKind::Contract
    }

    pub fn func_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.def.name.name == name)
    }

    pub fn event_index(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name.name == name)
    }
}

#[derive(Debug)]
pub struct ResolvedUnit {
    pub contracts: Vec<ResolvedContract>,
    by_name: HashMap<String, usize>,
}

impl ResolvedUnit {
    pub fn get(&self, name: &str) -> Option<&ResolvedContract> {
        self.by_name.get(name).map(|&i| &self.contracts[i])
    }
}

pub fn resolve(unit: &SourceUnit) -> Result<ResolvedUnit> {
    let mut decls = HashMap::new();
    for def in &unit.contracts {
        if decls.insert(def.name.name.clone(), def).is_some() {
            return Err(CompilerError::name(format!(
                "These top level statements are defined multiple times: {}",
                def.name.name
            )));
        }
    }

    let resolver = Resolver { decls };
    let mut contracts = Vec::with_capacity(unit.contracts.len());
    let mut by_name = HashMap::new();
    for (index, def) in unit.contracts.iter().enumerate() {
        contracts.push(resolver.resolve_contract(def)?);
        by_name.insert(def.name.name.clone(), index);
    }
    Ok(ResolvedUnit { contracts, by_name })
}

struct Resolver<'a> {
    decls: HashMap<String, &'a ContractDef>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl<'a> Resolver<'a> {
    fn get(&self, name: &Ident) -> Result<&'a ContractDef> {
        self.decls.get(&name.name).copied().ok_or_else(|| {
            CompilerError::name(format!("Contract \"{}\" does not exist", name.name))
                .at(name.pos)
        })
    }

    fn parents(&self, def: &'a ContractDef) -> Result<Vec<&'a ContractDef>> {
        let mut parents = Vec::new();
        for inheritance in &def.extends {
            let parent = self.get(&inheritance.parent)?;
            match (def.kind, parent.kind) {
                (ContractKind::Contract | ContractKind::AbstractContract, ContractKind::Contract)
                | (
                    ContractKind::Contract | ContractKind::AbstractContract,
                    ContractKind::AbstractContract,
                ) => self.check_forwarded_fields(def, parent, inheritance)?,
                (ContractKind::Interface, ContractKind::Interface) => {
                    if !inheritance.fields.is_empty() {
                        return Err(CompilerError::inheritance(format!(
                            "Interface \"{}\" has no fields",
                            parent.name.name
                        )));
                    }
                }
                (ContractKind::TxScript | ContractKind::AssetScript, _) => {
                    return Err(CompilerError::inheritance(format!(
                        "{} \"{}\" can not extend or implement other definitions",
                        def.kind.keyword(),
                        def.name.name
                    )));
                }
                (ContractKind::Interface, _) => {
                    return Err(CompilerError::inheritance(format!(
                        "Interface \"{}\" can only inherit from an interface",
                        def.name.name
                    )));
                }
                _ => {
                    return Err(CompilerError::inheritance(format!(
                        "Contract \"{}\" can only extend a contract or abstract contract",
                        def.name.name
                    )));
                }
            }
            parents.push(parent);
        }
        if def.kind == ContractKind::Interface && def.extends.len() > 1 {
            return Err(CompilerError::inheritance(format!(
                "Only single inheritance is allowed. Interface {} does not inherit from {}",
                def.extends[1].parent.name, def.extends[0].parent.name
            )));
        }
        for interface in &def.implements {
            if def.kind.is_script() {
                return Err(CompilerError::inheritance(format!(
                    "{} \"{}\" can not extend or implement other definitions",
                    def.kind.keyword(),
                    def.name.name
                )));
            }
            let parent = self.get(interface)?;
            if parent.kind != ContractKind::Interface {
                return Err(CompilerError::inheritance(format!(
                    "Contract \"{}\" can only implement an interface, \"{}\" is not one",
                    def.name.name, parent.name.name
                )));
            }
            parents.push(parent);
        }
        Ok(parents)
    }

    fn check_forwarded_fields(
        &self,
        child: &ContractDef,
        parent: &ContractDef,
        inheritance: &Inheritance,
    ) -> Result<()> {
        if inheritance.fields.len() != parent.fields.len() {
            return Err(CompilerError::inheritance(format!(
                "Invalid number of fields for parent contract \"{}\": expected {}, got {}",
                parent.name.name,
                parent.fields.len(),
                inheritance.fields.len()
            )));
        }
        for (forwarded, parent_field) in inheritance.fields.iter().zip(&parent.fields) {
            let child_field =
                child.fields.iter().find(|f| f.ident.name == forwarded.name).ok_or_else(|| {
                    CompilerError::inheritance(format!(
                        "Contract \"{}\" does not define field \"{}\"",
                        child.name.name, forwarded.name
                    ))
                    .at(forwarded.pos)
                })?;
            let matches = child_field.ident.name == parent_field.ident.name
                && child_field.mutable == parent_field.mutable
                && child_field.ty == parent_field.ty;
            if !matches {
                return Err(CompilerError::inheritance(format!(
                    "Invalid field \"{}\" for parent contract \"{}\": expected \"{}\", got \"{}\"",
                    forwarded.name,
                    parent.name.name,
                    field_signature(parent_field),
                    field_signature(child_field)
                )));
            }
        }
        Ok(())
    }

    /// Ancestors-first linearization with cycle detection.
    fn linearize(&self, def: &'a ContractDef) -> Result<Vec<&'a ContractDef>> {
        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut order = Vec::new();
        self.visit(def, def, &mut marks, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        def: &'a ContractDef,
        root: &'a ContractDef,
        marks: &mut HashMap<String, Mark>,
        order: &mut Vec<&'a ContractDef>,
    ) -> Result<()> {
        match marks.get(&def.name.name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(CompilerError::inheritance(format!(
                    "Cyclic inheritance detected for contract {}",
                    root.name.name
                )));
            }
            None => {}
        }
        marks.insert(def.name.name.clone(), Mark::Visiting);
        for parent in self.parents(def)? {
            self.visit(parent, root, marks, order)?;
        }
        marks.insert(def.name.name.clone(), Mark::Done);
        order.push(def);
        Ok(())
    }

    fn resolve_contract(&self, def: &'a ContractDef) -> Result<ResolvedContract> {
        let order = self.linearize(def)?;
        self.check_interface_chain(&order)?;
        self.check_own_fields(def)?;

        let mut functions: Vec<ResolvedFunc> = Vec::new();
        let mut events: Vec<(EventDef, String)> = Vec::new();
        let mut constants: Vec<ResolvedConstant> = Vec::new();
        let mut enums: Vec<ResolvedEnum> = Vec::new();
        for ancestor in &order {
            let origin = ancestor.name.name.clone();
            for event in &ancestor.events {
                collect_event(&mut events, event, &origin)?;
            }
            for constant in &ancestor.constants {
                if constants.iter().any(|c| c.def.name.name == constant.name.name) {
                    return Err(CompilerError::name(format!(
                        "These constants are defined multiple times: {}",
                        constant.name.name
                    )));
                }
                constants.push(ResolvedConstant { def: constant.clone(), origin: origin.clone() });
            }
            for enum_def in &ancestor.enums {
                merge_enum(&mut enums, enum_def, &origin)?;
            }
            for func in &ancestor.functions {
                collect_function(&mut functions, func, &origin)?;
            }
        }

        if def.kind == ContractKind::Contract {
            for func in &functions {
                if func.def.body.is_none() {
                    return Err(CompilerError::inheritance(format!(
                        "Function \"{}\" is not implemented in contract \"{}\"",
                        func.def.name.name, def.name.name
                    )));
                }
            }
        }

        if def.kind.is_script() {
            if let Some(field) = def.fields.iter().find(|f| f.mutable) {
                return Err(CompilerError::mutability(format!(
                    "Script \"{}\" can not have mutable fields: {}",
                    def.name.name, field.ident.name
                )));
            }
        }

        let std_id = self.resolve_std_id(def, &order)?;

        Ok(ResolvedContract {
            kind: def.kind,
            name: def.name.name.clone(),
            using: def.using,
            fields: def.fields.clone(),
            std_id,
            functions,
            events: events.into_iter().map(|(e, _)| e).collect(),
            constants,
            enums,
            main: def.main.clone(),
        })
    }

    fn check_own_fields(&self, def: &ContractDef) -> Result<()> {
        let duplicates: Vec<_> =
            def.fields.iter().map(|f| &f.ident.name).duplicates().collect();
        if !duplicates.is_empty() {
            return Err(CompilerError::name(format!(
                "These fields are defined multiple times: {}",
                duplicates.iter().format(", ")
            )));
        }
        Ok(())
    }

    /// All interfaces reachable from a contract must lie on one `extends`
    /// chain.
    fn check_interface_chain(&self, order: &[&ContractDef]) -> Result<()> {
        let interfaces: Vec<_> =
            order.iter().filter(|d| d.kind == ContractKind::Interface).collect();
        for pair in interfaces.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if !self.interface_inherits(later, &earlier.name.name)? {
                return Err(CompilerError::inheritance(format!(
                    "Only single inheritance is allowed. Interface {} does not inherit from {}",
                    later.name.name, earlier.name.name
                )));
            }
        }
        Ok(())
    }

    fn interface_inherits(&self, interface: &ContractDef, ancestor: &str) -> Result<bool> {
        let mut cursor = interface;
        loop {
            if cursor.name.name == ancestor {
                return Ok(true);
            }
            match cursor.extends.first() {
                Some(inheritance) => cursor = self.get(&inheritance.parent)?,
                None => return Ok(false),
            }
        }
    }

    /// Effective std id: the most derived interface id in the chain, unless
    /// the contract opts out with `@std(enabled = false)`.
    fn resolve_std_id(&self, def: &ContractDef, order: &[&ContractDef]) -> Result<Option<Vec<u8>>> {
        for ancestor in order {
            if ancestor.kind != ContractKind::Interface && ancestor.std.id.is_some() {
                return Err(CompilerError::inheritance(format!(
                    "The std id annotation is only allowed on interfaces, found on \"{}\"",
                    ancestor.name.name
                )));
            }
        }
        for interface in order.iter().filter(|d| d.kind == ContractKind::Interface) {
            if let (Some(child_id), Some(parent_id)) =
                (&interface.std.id, self.parent_std_id(interface)?)
            {
                if !child_id.starts_with(&parent_id) {
                    return Err(CompilerError::inheritance(format!(
                        "The std id of interface \"{}\" should start with the std id of its parent",
                        interface.name.name
                    )));
                }
            }
        }
        if def.kind != ContractKind::Contract || def.std.enabled == Some(false) {
            return Ok(None);
        }
        let id = order
            .iter()
            .rev()
            .filter(|d| d.kind == ContractKind::Interface)
            .find_map(|d| self.effective_std_id(d));
        Ok(id)
    }

    fn parent_std_id(&self, interface: &ContractDef) -> Result<Option<Vec<u8>>> {
        match interface.extends.first() {
            Some(inheritance) => Ok(self.effective_std_id(self.get(&inheritance.parent)?)),
            None => Ok(None),
        }
    }

    fn effective_std_id(&self, interface: &ContractDef) -> Option<Vec<u8>> {
        let mut cursor = interface;
        loop {
            if let Some(id) = &cursor.std.id {
                return Some(id.clone());
            }
            let parent = cursor.extends.first()?;
            cursor = self.decls.get(&parent.parent.name).copied()?;
        }
    }
}

fn field_signature(field: &Field) -> String {
    let mutability = if field.mutable { "mut " } else { "" };
    format!("{}{}: {}", mutability, field.ident.name, field.ty)
}

fn collect_event(events: &mut Vec<(EventDef, String)>, event: &EventDef, origin: &str) -> Result<()> {
    if event.params.len() > 8 {
        return Err(CompilerError::type_error("Max 8 fields allowed for contract events"));
    }
    if let Some((_, ty)) = event.params.iter().find(|(_, ty)| !ty.is_primitive()) {
        return Err(CompilerError::type_error(format!(
            "Array fields are not supported for event \"{}\": {ty}",
            event.name.name
        )));
    }
    if events.iter().any(|(e, _)| e.name.name == event.name.name) {
        return Err(CompilerError::name(format!(
            "These events are defined multiple times: {}",
            event.name.name
        )));
    }
    events.push((event.clone(), origin.to_string()));
    Ok(())
}

fn literal_type_name(literal: &Literal) -> &'static str {
    match literal {
        Literal::Bool(_) => "Bool",
        Literal::U256(_) => "U256",
        Literal::I256(_) => "I256",
        Literal::Bytes(_) | Literal::Alph => "ByteVec",
        Literal::Address(_) => "Address",
    }
}

fn merge_enum(enums: &mut Vec<ResolvedEnum>, def: &EnumDef, origin: &str) -> Result<()> {
    let shared_type = match def.variants.first() {
        Some((_, literal)) => literal_type_name(literal),
        None => {
            return Err(CompilerError::type_error(format!(
                "No field definition in enum \"{}\"",
                def.name.name
            )));
        }
    };
    if def.variants.iter().any(|(_, literal)| literal_type_name(literal) != shared_type) {
        return Err(CompilerError::type_error(format!(
            "Fields have different types in enum \"{}\"",
            def.name.name
        )));
    }
    match enums.iter_mut().find(|e| e.name.name == def.name.name) {
        None => {
            enums.push(ResolvedEnum {
                name: def.name.clone(),
                variants: def.variants.clone(),
                origin: origin.to_string(),
            });
        }
        Some(merged) => {
            let merged_type = literal_type_name(&merged.variants[0].1);
            if merged_type != shared_type {
                return Err(CompilerError::type_error(format!(
                    "Fields have different types in enum \"{}\"",
                    def.name.name
                )));
            }
            for (variant, literal) in &def.variants {
                if merged.variants.iter().any(|(v, _)| v.name == variant.name) {
                    return Err(CompilerError::name(format!(
                        "These enum fields are defined multiple times: {}.{}",
                        def.name.name, variant.name
                    )));
                }
                merged.variants.push((variant.clone(), literal.clone()));
            }
        }
    }
    Ok(())
}

fn collect_function(functions: &mut Vec<ResolvedFunc>, func: &FuncDef, origin: &str) -> Result<()> {
    let existing = functions.iter_mut().find(|f| f.def.name.name == func.name.name);
    let Some(existing) = existing else {
        functions.push(ResolvedFunc { def: func.clone(), origin: origin.to_string() });
        return Ok(());
    };
    // One body at most; an implementation may replace an inherited
    // signature at its original method index.
    if existing.def.body.is_some() || func.body.is_none() {
        return Err(CompilerError::inheritance(format!(
            "These functions are defined multiple times: {}",
            func.name.name
        )));
    }
    check_signature(&existing.def, func)?;
    existing.def = func.clone();
    existing.origin = origin.to_string();
    Ok(())
}

/// Declared signatures must agree with their implementation: visibility,
/// argument and return types, and `preapprovedAssets` exactly; the other
/// `@using` flags may only be strengthened by the implementation.
fn check_signature(declared: &FuncDef, implemented: &FuncDef) -> Result<()> {
    let wrong_signature = || {
        CompilerError::inheritance(format!(
            "Function \"{}\" is implemented with wrong signature",
            implemented.name.name
        ))
    };
    if declared.is_public != implemented.is_public
        || declared.args.len() != implemented.args.len()
        || declared.returns != implemented.returns
    {
        return Err(wrong_signature());
    }
    if declared.args.iter().zip(&implemented.args).any(|(a, b)| a.ty != b.ty) {
        return Err(wrong_signature());
    }
    let declared_flags = effective_flags(&declared.annotations);
    let implemented_flags = effective_flags(&implemented.annotations);
    if declared_flags.0 != implemented_flags.0 {
        return Err(wrong_signature());
    }
    // assetsInContract, checkExternalCaller, updateFields: true on the
    // declaration forces true on the implementation.
    let one_way = [
        (declared_flags.1, implemented_flags.1),
        (declared_flags.2, implemented_flags.2),
        (declared_flags.3, implemented_flags.3),
    ];
    if one_way.iter().any(|(decl, implem)| *decl && !implem) {
        return Err(wrong_signature());
    }
    Ok(())
}

fn effective_flags(annotations: &UsingAnnotation) -> (bool, bool, bool, bool) {
    (
        annotations.preapproved_assets.unwrap_or(false),
        annotations.assets_in_contract.unwrap_or(false),
        annotations.check_external_caller.unwrap_or(true),
        annotations.update_fields.unwrap_or(false),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn resolve_source(source: &str) -> Result<ResolvedUnit> {
        let tokens = Lexer::new(source).tokenize()?;
        let unit = Parser::new(source, tokens).parse_source_unit()?;
        resolve(&unit)
    }

    #[test]
    fn cyclic_inheritance_is_detected() {
        let err = resolve_source(
            "Contract A() extends B() { fn a() -> () {} }\n\
             Contract B() extends C() { fn b() -> () {} }\n\
             Contract C() extends A() { fn c() -> () {} }",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Cyclic inheritance detected for contract A");
    }

    #[test]
    fn parent_functions_come_first() {
        let resolved = resolve_source(
            "Abstract Contract Base(x: U256) { fn base() -> U256 { return x } }\n\
             Contract Child(x: U256) extends Base(x) { fn child() -> U256 { return base() } }",
        )
        .unwrap();
        let child = resolved.get("Child").unwrap();
        assert_eq!(child.func_index("base"), Some(0));
        assert_eq!(child.func_index("child"), Some(1));
    }

    #[test]
    fn unrelated_interfaces_are_rejected() {
        let err = resolve_source(
            "Interface Foo { pub fn foo() -> () }\n\
             Interface Bar { pub fn bar() -> () }\n\
             Contract Baz() implements Foo, Bar {\n\
               pub fn foo() -> () {}\n\
               pub fn bar() -> () {}\n\
             }",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Only single inheritance is allowed. Interface Bar does not inherit from Foo"
        );
    }

    #[test]
    fn interface_chains_are_allowed() {
        let resolved = resolve_source(
            "Interface Base { pub fn base() -> () }\n\
             Interface Child extends Base { pub fn child() -> () }\n\
             Contract Impl() implements Child {\n\
               pub fn base() -> () {}\n\
               pub fn child() -> () {}\n\
             }",
        )
        .unwrap();
        let contract = resolved.get("Impl").unwrap();
        assert_eq!(contract.func_index("base"), Some(0));
        assert_eq!(contract.func_index("child"), Some(1));
    }

    #[test]
    fn forwarded_fields_must_match_shape() {
        let err = resolve_source(
            "Abstract Contract Base(mut x: U256) { fn b() -> () {} }\n\
             Contract Child(x: U256) extends Base(x) { fn c() -> () {} }",
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid field \"x\" for parent contract \"Base\""));
    }

    #[test]
    fn enum_variants_merge_across_ancestors() {
        let resolved = resolve_source(
            "Abstract Contract Base() {\n\
               enum Codes { A = 0 }\n\
               fn b() -> () {}\n\
             }\n\
             Contract Child() extends Base() {\n\
               enum Codes { B = 1 }\n\
               fn c() -> () {}\n\
             }",
        )
        .unwrap();
        let child = resolved.get("Child").unwrap();
        assert_eq!(child.enums[0].variants.len(), 2);

        let err = resolve_source(
            "Abstract Contract Base() {\n\
               enum Codes { A = 0 }\n\
               fn b() -> () {}\n\
             }\n\
             Contract Child() extends Base() {\n\
               enum Codes { A = 1 }\n\
               fn c() -> () {}\n\
             }",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "These enum fields are defined multiple times: Codes.A");
    }

    #[test]
    fn std_id_must_extend_the_parent_id() {
        let err = resolve_source(
            "@std(id = #0001)\n\
             Interface Base { pub fn base() -> () }\n\
             @std(id = #0100)\n\
             Interface Child extends Base { pub fn child() -> () }\n\
             Contract Impl() implements Child {\n\
               pub fn base() -> () {}\n\
               pub fn child() -> () {}\n\
             }",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The std id of interface \"Child\" should start with the std id of its parent"
        );
    }

    #[test]
    fn wrong_override_signature_is_rejected() {
        let err = resolve_source(
            "Interface Foo { pub fn foo(a: U256) -> U256 }\n\
             Contract Bar() implements Foo { pub fn foo(a: Bool) -> U256 { return 1 } }",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Function \"foo\" is implemented with wrong signature");
    }
}
