//! End-to-end scenarios exercising the documented error messages.

use crate::{compile_err, compile_ok};

#[test]
fn asset_script_with_addition_compiles_cleanly() {
    let result = compile_ok(
        "AssetScript Foo {\n\
           pub fn bar(a: U256, b: U256) -> (U256) {\n\
             return a + b\n\
           }\n\
         }",
    );
    assert_eq!(result.scripts.len(), 1);
    assert_eq!(result.scripts[0].name(), "Foo");
    assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
}

#[test]
fn empty_tx_script_needs_main_statements() {
    let err = compile_err("TxScript Foo {}");
    assert_eq!(err.message, "Expected main statements for type \"Foo\"");
}

#[test]
fn missing_return_path_is_rejected() {
    let err = compile_err(
        "Contract Foo() {\n\
           fn foo() -> U256 {\n\
             if (true) {\n\
               return 1\n\
             }\n\
           }\n\
         }",
    );
    assert_eq!(err.message, "Expected return statement for function \"foo\"");
}

#[test]
fn returning_a_value_from_a_unit_function_is_rejected() {
    let err = compile_err(
        "Contract Foo() {\n\
           fn foo() -> () {\n\
             return 1\n\
           }\n\
         }",
    );
    assert!(err.message.starts_with("Invalid return types:"), "got: {}", err.message);
}

#[test]
fn unassigned_mutable_field_is_rejected() {
    let err = compile_err(
        "Contract Foo(mut a: U256) {\n\
           pub fn foo() -> U256 {\n\
             return a\n\
           }\n\
         }",
    );
    assert_eq!(err.message, "There are unassigned mutable fields in contract Foo: a");
}

#[test]
fn cyclic_inheritance_is_rejected() {
    let err = compile_err(
        "Contract A() extends B() { fn a() -> () {} }\n\
         Contract B() extends C() { fn b() -> () {} }\n\
         Contract C() extends A() { fn c() -> () {} }",
    );
    assert_eq!(err.message, "Cyclic inheritance detected for contract A");
}

#[test]
fn interface_without_functions_is_rejected() {
    let err = compile_err("Interface Foo {}");
    assert_eq!(err.message, "No function definition in Interface Foo");
}

#[test]
fn event_argument_types_must_match() {
    let err = compile_err(
        "Contract Foo() {\n\
           event Add(a: U256, b: U256)\n\
           @using(checkExternalCaller = false)\n\
           pub fn foo(a: U256, z: Bool) -> () {\n\
             emit Add(a, z)\n\
           }\n\
         }",
    );
    assert_eq!(err.message, "Invalid args type List(U256, Bool) for event Add(U256, U256)");
}

#[test]
fn events_are_capped_at_eight_fields() {
    let err = compile_err(
        "Contract Foo() {\n\
           event Big(a: U256, b: U256, c: U256, d: U256, e: U256, f: U256, g: U256, h: U256, i: U256)\n\
           fn foo() -> () {}\n\
         }",
    );
    assert_eq!(err.message, "Max 8 fields allowed for contract events");
}

#[test]
fn abstract_contracts_do_not_generate_code() {
    let err = ralphc_compiler::compile_contract(
        "Abstract Contract Foo() {\n\
           fn foo() -> U256\n\
         }",
    )
    .unwrap_err();
    assert_eq!(err.message, "Code generation is not supported for abstract contract \"Foo\"");
}
