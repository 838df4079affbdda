//! Instruction-level expectations for the code generator, plus executable
//! checks through the test interpreter.

use crate::{compile_ok, vm};
use ralphc_primitives::Instr;
use similar_asserts::assert_eq;

fn method_instrs(source: &str, method: usize) -> Vec<Instr> {
    let result = compile_ok(source);
    result.contracts[0].bytecode.methods[method].instrs.clone()
}

#[test]
fn if_else_statement_shape() {
    let instrs = method_instrs(
        "Contract Foo() {\n\
           fn pick(c: Bool) -> U256 {\n\
             if (c) {\n\
               return 1\n\
             } else {\n\
               return 2\n\
             }\n\
           }\n\
         }",
        0,
    );
    assert_eq!(
        instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::IfFalse(3),
            Instr::U256Const1,
            Instr::Return,
            Instr::Jump(2),
            Instr::U256Const2,
            Instr::Return,
        ]
    );
}

#[test]
fn while_loop_jumps_back_over_condition_and_body() {
    let instrs = method_instrs(
        "Contract Foo() {\n\
           fn spin(mut n: U256) -> () {\n\
             while (n > 0) {\n\
               n = n - 1\n\
             }\n\
           }\n\
         }",
        0,
    );
    assert_eq!(
        instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::U256Const0,
            Instr::U256Gt,
            Instr::IfFalse(5),
            Instr::LoadLocal(0),
            Instr::U256Const1,
            Instr::Sub,
            Instr::StoreLocal(0),
            Instr::Jump(-9),
            Instr::Return,
        ]
    );
}

#[test]
fn logical_and_short_circuits() {
    let instrs = method_instrs(
        "Contract Foo() {\n\
           fn both(a: Bool, b: Bool) -> Bool {\n\
             return a && b\n\
           }\n\
         }",
        0,
    );
    assert_eq!(
        instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::IfFalse(2),
            Instr::LoadLocal(1),
            Instr::Jump(1),
            Instr::BoolConst(false),
            Instr::Return,
        ]
    );
}

#[test]
fn constant_indices_fold_into_direct_loads() {
    let instrs = method_instrs(
        "Contract Foo(xs: [U256; 4]) {\n\
           fn third() -> U256 {\n\
             return xs[1 + 2]\n\
           }\n\
         }",
        0,
    );
    assert_eq!(instrs, vec![Instr::LoadImmField(3), Instr::Return]);
}

#[test]
fn enum_variants_lower_to_constants() {
    let instrs = method_instrs(
        "Contract Foo() {\n\
           enum Codes { Ok = 0, Bad = 4 }\n\
           fn code(fine: Bool) -> U256 {\n\
             if (fine) {\n\
               return Codes.Ok\n\
             }\n\
             return Codes.Bad\n\
           }\n\
         }",
        0,
    );
    assert_eq!(
        instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::IfFalse(2),
            Instr::U256Const0,
            Instr::Return,
            Instr::U256Const4,
            Instr::Return,
        ]
    );
}

#[test]
fn braces_approvals_precede_the_call() {
    let result = compile_ok(
        "Contract Foo() {\n\
           @using(preapprovedAssets = true, checkExternalCaller = false)\n\
           pub fn pay(amount: U256) -> () {\n\
             deposit{callerAddress!() -> ALPH: amount}(callerAddress!(), amount)\n\
           }\n\
           @using(preapprovedAssets = true)\n\
           fn deposit(from: Address, amount: U256) -> () {\n\
             transferToken!(from, from, ALPH, amount)\n\
           }\n\
         }",
    );
    let methods = &result.contracts[0].bytecode.methods;
    assert_eq!(
        methods[0].instrs,
        vec![
            Instr::CallerAddress,
            Instr::LoadLocal(0),
            Instr::ApproveAlph,
            Instr::CallerAddress,
            Instr::LoadLocal(0),
            Instr::CallLocal(1),
            Instr::Return,
        ]
    );
    assert!(methods[0].use_preapproved_assets);
    assert_eq!(
        methods[1].instrs,
        vec![
            Instr::LoadLocal(0),
            Instr::LoadLocal(0),
            Instr::LoadLocal(1),
            Instr::TransferAlph,
            Instr::Return,
        ]
    );
}

#[test]
fn external_calls_push_args_then_receiver() {
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
    let ralphc_compiler::CompiledScript::Tx { bytecode, .. } = &result.scripts[0] else {
        panic!("expected a TxScript");
    };
    assert_eq!(
        bytecode.methods[0].instrs,
        vec![
            Instr::TemplateVariable(1),
            Instr::TemplateVariable(0),
            Instr::CallExternal(0),
            Instr::Return,
        ]
    );
}

#[test]
fn encode_fields_emits_one_encode_per_region() {
    let result = compile_ok(
        "Contract Token(symbol: ByteVec, mut total: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn touch() -> () {\n\
             total = total + 1\n\
           }\n\
         }\n\
         TxScript Deploy() {\n\
           let (_, _) = Token.encodeFields!(#00, 5)\n\
         }",
    );
    let ralphc_compiler::CompiledScript::Tx { bytecode, .. } = &result.scripts[0] else {
        panic!("expected a TxScript");
    };
    assert_eq!(
        bytecode.methods[0].instrs,
        vec![
            Instr::BytesConst(vec![0x00]),
            Instr::U256Const1,
            Instr::Encode,
            Instr::U256Const5,
            Instr::U256Const1,
            Instr::Encode,
            Instr::Pop,
            Instr::Pop,
            Instr::Return,
        ]
    );
}

#[test]
fn multi_returns_store_right_to_left_and_pop_anonymous_slots() {
    let result = compile_ok(
        "Contract Foo() {\n\
           fn three() -> (U256, U256, U256) {\n\
             return 1, 2, 3\n\
           }\n\
           @using(checkExternalCaller = false)\n\
           pub fn run() -> U256 {\n\
             let (a, _, c) = three()\n\
             return a * 10 + c\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    let mut machine = vm::Vm::new(vec![], vec![]);
    let returned = machine.execute(contract, 0, 1, vec![]);
    assert_eq!(vm::as_u64(&returned[0]), 13);
}

#[test]
fn array_subexpressions_are_evaluated_exactly_once() {
    let result = compile_ok(
        "Contract Foo(mut counter: U256) {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn run() -> U256 {\n\
             let x = make()[1]\n\
             return x + counter\n\
           }\n\
           @using(updateFields = true)\n\
           fn make() -> [U256; 2] {\n\
             counter = counter + 1\n\
             return [counter, counter + 10]\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    let mut machine = vm::Vm::new(vec![], vec![vm::u(0)]);
    let returned = machine.execute(contract, 0, 0, vec![]);
    // make() must run once: counter becomes 1, the indexed cell is 11.
    assert_eq!(vm::as_u64(&returned[0]), 12);
    assert_eq!(machine.fields, vec![vm::u(1)]);
}

#[test]
fn for_loops_accumulate() {
    let result = compile_ok(
        "Contract Foo() {\n\
           @using(checkExternalCaller = false)\n\
           pub fn sum(n: U256) -> U256 {\n\
             let mut acc = 0\n\
             for (let mut i = 0; i < n; i = i + 1) {\n\
               acc = acc + i\n\
             }\n\
             return acc\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    let mut machine = vm::Vm::new(vec![], vec![]);
    let returned = machine.execute(contract, 0, 0, vec![vm::u(5)]);
    assert_eq!(vm::as_u64(&returned[0]), 10);
}

#[test]
fn dynamic_writes_to_nested_arrays_execute_correctly() {
    let result = compile_ok(
        "Contract Foo() {\n\
           @using(checkExternalCaller = false)\n\
           pub fn transpose(i: U256, j: U256) -> U256 {\n\
             let mut grid = [[0, 1], [2, 3]]\n\
             grid[i][j] = grid[j][i] + 10\n\
             return grid[i][j]\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    let mut machine = vm::Vm::new(vec![], vec![]);
    let returned = machine.execute(contract, 0, 0, vec![vm::u(0), vm::u(1)]);
    // grid[0][1] = grid[1][0] + 10 = 12.
    assert_eq!(vm::as_u64(&returned[0]), 12);
}

#[test]
fn if_expressions_leave_a_single_value() {
    let result = compile_ok(
        "Contract Foo() {\n\
           @using(checkExternalCaller = false)\n\
           pub fn max(a: U256, b: U256) -> U256 {\n\
             let winner = if (a > b) a else b\n\
             return winner\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    let mut machine = vm::Vm::new(vec![], vec![]);
    assert_eq!(vm::as_u64(&machine.execute(contract, 0, 0, vec![vm::u(3), vm::u(9)])[0]), 9);
    assert_eq!(vm::as_u64(&machine.execute(contract, 0, 0, vec![vm::u(12), vm::u(9)])[0]), 12);
}

#[test]
fn inherited_methods_keep_their_interface_indices() {
    let result = compile_ok(
        "Interface Adder {\n\
           @using(checkExternalCaller = false)\n\
           pub fn add(n: U256) -> U256\n\
         }\n\
         Contract Calc(mut acc: U256) implements Adder {\n\
           @using(updateFields = true, checkExternalCaller = false)\n\
           pub fn add(n: U256) -> U256 {\n\
             acc = acc + n\n\
             return acc\n\
           }\n\
           @using(checkExternalCaller = false)\n\
           pub fn double(n: U256) -> U256 {\n\
             return add(n) + 0\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    // `add` keeps interface slot 0; `double` calls it through CallLocal(0).
    assert!(contract.methods[1].instrs.contains(&Instr::CallLocal(0)));
    let mut machine = vm::Vm::new(vec![], vec![vm::u(5)]);
    let returned = machine.execute(contract, 0, 1, vec![vm::u(7)]);
    assert_eq!(vm::as_u64(&returned[0]), 12);
}

#[test]
fn emitted_events_log_the_event_index_first() {
    let result = compile_ok(
        "Contract Foo() {\n\
           event First(a: U256)\n\
           event Second(a: U256, b: Bool)\n\
           @using(checkExternalCaller = false)\n\
           pub fn fire(a: U256) -> () {\n\
             emit Second(a, true)\n\
           }\n\
         }",
    );
    let contract = &result.contracts[0].bytecode;
    assert_eq!(
        contract.methods[0].instrs,
        vec![
            Instr::U256Const1,
            Instr::LoadLocal(0),
            Instr::BoolConst(true),
            Instr::Log(3),
            Instr::Return,
        ]
    );
    let mut machine = vm::Vm::new(vec![], vec![]);
    machine.execute(contract, 0, 0, vec![vm::u(41)]);
    assert_eq!(machine.logs, vec![vec![vm::u(1), vm::u(41), ralphc_primitives::Val::Bool(true)]]);
}
