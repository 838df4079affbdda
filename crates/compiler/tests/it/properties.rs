//! Universal properties of the compiler output.

use crate::{compile_ok, vm};
use alloy_primitives::U256;
use ralphc_primitives::{Instr, StatefulContract, StatelessScript, Val};
use similar_asserts::assert_eq;

const EXCHANGE: &str = "Contract Exchange(mut reserves: [U256; 2], mut swaps: U256) {\n\
       event Swapped(amount: U256, out: U256)\n\
       enum Errors { Empty = 0 }\n\
       @using(updateFields = true, checkExternalCaller = false)\n\
       pub fn swap(amount: U256) -> U256 {\n\
         assert!(reserves[1] > 0, Errors.Empty)\n\
         let out = reserves[1] * amount / (reserves[0] + amount)\n\
         reserves[0] = reserves[0] + amount\n\
         reserves[1] = reserves[1] - out\n\
         swaps = swaps + 1\n\
         emit Swapped(amount, out)\n\
         return out\n\
       }\n\
     }";

#[test]
fn contract_bytecode_round_trips() {
    let result = compile_ok(EXCHANGE);
    let compiled = &result.contracts[0];
    let decoded = StatefulContract::deserialize(&compiled.bytecode.serialize()).unwrap();
    assert_eq!(decoded, compiled.bytecode);
    let decoded = StatefulContract::deserialize(&compiled.debug_bytecode.serialize()).unwrap();
    assert_eq!(decoded, compiled.debug_bytecode);
}

#[test]
fn asset_script_bytecode_round_trips() {
    let result = compile_ok(
        "AssetScript Check {\n\
           pub fn verify(sig: ByteVec, key: ByteVec) -> () {\n\
             verifyBIP340Schnorr!(txId!(), key, sig)\n\
           }\n\
         }",
    );
    let ralphc_compiler::CompiledScript::Asset { bytecode, .. } = &result.scripts[0] else {
        panic!("expected an asset script");
    };
    let decoded = StatelessScript::deserialize(&bytecode.serialize()).unwrap();
    assert_eq!(&decoded, bytecode);
}

#[test]
fn debug_bytecode_matches_production_without_debug_builtins() {
    let result = compile_ok(EXCHANGE);
    let compiled = &result.contracts[0];
    assert_eq!(compiled.bytecode, compiled.debug_bytecode);
}

#[test]
fn debug_builtins_only_appear_in_debug_bytecode() {
    let result = compile_ok(
        "Contract Foo(mut hits: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn hit() -> () {\n\
             debug!(`hit`)\n\
             hits = hits + 1\n\
           }\n\
         }",
    );
    let compiled = &result.contracts[0];
    assert_ne!(compiled.bytecode, compiled.debug_bytecode);
    let debug_instrs = &compiled.debug_bytecode.methods[0].instrs;
    assert!(debug_instrs.contains(&Instr::DebugMessage));
    assert!(!compiled.bytecode.methods[0].instrs.contains(&Instr::DebugMessage));
    // Stripping the debug prefix leaves the production body.
    assert_eq!(debug_instrs[2..], compiled.bytecode.methods[0].instrs[..]);
}

#[test]
fn compilation_is_deterministic() {
    let source = format!(
        "{EXCHANGE}\n\
         TxScript Run(exchange: Exchange, amount: U256) {{\n\
           let out = exchange.swap(amount)\n\
           assert!(out > 0, 1)\n\
         }}"
    );
    let first = compile_ok(&source);
    let second = compile_ok(&source);
    assert_eq!(first, second);
}

#[test]
fn abstract_contracts_are_not_emitted() {
    let result = compile_ok(
        "Abstract Contract Base(x: U256) {\n\
           fn base() -> U256 {\n\
             return x\n\
           }\n\
         }\n\
         Contract Leaf(x: U256) extends Base(x) {\n\
           @using(checkExternalCaller = false)\n\
           pub fn leaf() -> U256 {\n\
             return base()\n\
           }\n\
         }",
    );
    let names: Vec<_> = result.contracts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Leaf"]);
}

#[test]
fn field_length_counts_flattened_scalars_and_the_std_slot() {
    let result = compile_ok(
        "@std(id = #beef)\n\
         Interface IToken {\n\
           @using(checkExternalCaller = false)\n\
           pub fn total() -> U256\n\
         }\n\
         Contract Token(@unused symbols: [ByteVec; 2], mut reserves: [[U256; 2]; 2], mut total: U256) implements IToken {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn total() -> U256 {\n\
             reserves[0][0] = total\n\
             total = total + 1\n\
             return total\n\
           }\n\
         }",
    );
    // 2 immutable ByteVecs + the std slot, then 4 + 1 mutable scalars.
    assert_eq!(result.contracts[0].bytecode.field_length, 8);
}

#[test]
fn dynamic_array_indexing_is_bounds_checked() {
    let result = compile_ok(
        "Contract Foo(xs: [U256; 3]) {\n\
           @using(checkExternalCaller = false)\n\
           pub fn get(i: U256) -> U256 {\n\
             return xs[i]\n\
           }\n\
         }",
    );
    let instrs = &result.contracts[0].bytecode.methods[0].instrs;
    assert_eq!(
        instrs,
        &vec![
            Instr::LoadLocal(0),
            Instr::Dup,
            Instr::U256Const3,
            Instr::U256Lt,
            Instr::Assert,
            Instr::U256Const0,
            Instr::Add,
            Instr::LoadImmFieldByIndex,
            Instr::Return,
        ]
    );
}

#[test]
fn template_variables_render_and_substitute() {
    let result = compile_ok(
        "Contract Counter(mut count: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn add(n: U256) -> () {\n\
             count = count + n\n\
           }\n\
         }\n\
         TxScript AddTo(counter: Counter, n: U256) {\n\
           counter.add(n)\n\
         }",
    );
    let ralphc_compiler::CompiledScript::Tx { bytecode, template_vars, .. } = &result.scripts[0]
    else {
        panic!("expected a TxScript");
    };
    assert_eq!(template_vars.len(), 2);
    assert_eq!(template_vars[0].name, "counter");
    assert_eq!(template_vars[1].index, 1);

    let rendered = bytecode.to_template_string();
    assert!(rendered.contains("{0}"), "missing placeholder: {rendered}");
    assert!(rendered.contains("{1}"), "missing placeholder: {rendered}");

    let substituted = bytecode
        .substitute(&[Val::ByteVec(vec![0xaa; 32]), Val::U256(U256::from(7u64))])
        .unwrap();
    assert!(!substituted.to_template_string().contains('{'));
    let reparsed =
        ralphc_primitives::StatefulScript::deserialize(&substituted.serialize()).unwrap();
    assert_eq!(reparsed, substituted);
}

#[test]
fn uniswap_style_swap_returns_expected_amount() {
    let result = compile_ok(
        "Contract Uniswap(mut alphReserve: U256, mut btcReserve: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn swap(amount: U256) -> U256 {\n\
             let out = btcReserve * amount / (alphReserve + amount)\n\
             alphReserve = alphReserve + amount\n\
             btcReserve = btcReserve - out\n\
             return out\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    assert_eq!(contract.field_length, 2);

    let mut machine = vm::Vm::new(vec![], vec![vm::u(1_000_000), vm::u(100_000)]);
    let returned = machine.execute(contract, 0, 0, vec![vm::u(1000)]);
    assert_eq!(returned.len(), 1);
    assert_eq!(vm::as_u64(&returned[0]), 99);
    assert_eq!(machine.fields, vec![vm::u(1_001_000), vm::u(99_901)]);
}

#[test]
fn warning_list_is_ordered_and_prefixed() {
    let result = compile_ok(
        "Contract Foo(a: U256, mut b: U256) {\n\
           pub fn set() -> () {\n\
             b = 1\n\
           }\n\
           fn helper(x: U256) -> () {}\n\
         }",
    );
    assert_eq!(
        result.warnings,
        vec![
            "Function \"Foo.set\" updates fields. Please use \"@using(updateFields = true)\" for the function",
            "No external caller check for function \"Foo.set\"",
            "Found unused variables in Foo: helper.x",
            "Found unused fields in Foo: a",
        ]
    );
}

#[test]
fn unused_annotations_suppress_warnings() {
    let result = compile_ok(
        "Contract Foo(@unused a: U256, mut b: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn set() -> () {\n\
             b = 1\n\
           }\n\
           fn helper(@unused x: U256) -> () {}\n\
         }",
    );
    assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
}
