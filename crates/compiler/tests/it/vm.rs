//! A minimal interpreter over the emitted instruction set, enough to
//! execute compiled methods in tests and observe their behavior.

use alloy_primitives::U256;
use ralphc_primitives::{Instr, Method, StatefulContract, Val};

#[derive(Debug, Default)]
pub struct Vm {
    pub fields: Vec<Val>,
    pub logs: Vec<Vec<Val>>,
    pub debug_messages: Vec<Vec<u8>>,
}

pub struct Runner<'a> {
    vm: &'a mut Vm,
    methods: &'a [Method],
    imm_field_count: usize,
}

impl Vm {
    pub fn new(imm_fields: Vec<Val>, mut_fields: Vec<Val>) -> Self {
        let mut fields = imm_fields;
        fields.extend(mut_fields);
        Self { fields, logs: Vec::new(), debug_messages: Vec::new() }
    }

    /// Executes a method of `contract`; `imm_field_count` splits the field
    /// vector into the immutable and mutable regions.
    pub fn execute(
        &mut self,
        contract: &StatefulContract,
        imm_field_count: usize,
        method: usize,
        args: Vec<Val>,
    ) -> Vec<Val> {
        let methods = contract.methods.clone();
        Runner { vm: self, methods: &methods, imm_field_count }.call(method, args)
    }
}

fn as_u256(value: &Val) -> U256 {
    match value {
        Val::U256(v) => *v,
        other => panic!("expected U256, got {other:?}"),
    }
}

fn as_bool(value: &Val) -> bool {
    match value {
        Val::Bool(b) => *b,
        other => panic!("expected Bool, got {other:?}"),
    }
}

impl Runner<'_> {
    fn call(&mut self, method_index: usize, args: Vec<Val>) -> Vec<Val> {
        let methods = self.methods;
        let method = &methods[method_index];
        assert_eq!(args.len(), method.args_length as usize, "argument count");
        let mut locals = vec![Val::U256(U256::ZERO); method.locals_length as usize];
        locals[..args.len()].clone_from_slice(&args);
        let mut stack: Vec<Val> = Vec::new();
        let mut pc = 0i64;

        macro_rules! binop_u256 {
            ($f:expr) => {{
                let rhs = as_u256(&stack.pop().unwrap());
                let lhs = as_u256(&stack.pop().unwrap());
                let f: fn(U256, U256) -> U256 = $f;
                stack.push(Val::U256(f(lhs, rhs)));
            }};
        }
        macro_rules! cmp_u256 {
            ($f:expr) => {{
                let rhs = as_u256(&stack.pop().unwrap());
                let lhs = as_u256(&stack.pop().unwrap());
                let f: fn(&U256, &U256) -> bool = $f;
                stack.push(Val::Bool(f(&lhs, &rhs)));
            }};
        }

        while (pc as usize) < method.instrs.len() {
            let instr = &method.instrs[pc as usize];
            pc += 1;
            match instr {
                Instr::BoolConst(b) => stack.push(Val::Bool(*b)),
                Instr::U256Const0 => stack.push(Val::U256(U256::from(0u64))),
                Instr::U256Const1 => stack.push(Val::U256(U256::from(1u64))),
                Instr::U256Const2 => stack.push(Val::U256(U256::from(2u64))),
                Instr::U256Const3 => stack.push(Val::U256(U256::from(3u64))),
                Instr::U256Const4 => stack.push(Val::U256(U256::from(4u64))),
                Instr::U256Const5 => stack.push(Val::U256(U256::from(5u64))),
                Instr::U256Const(v) => stack.push(Val::U256(*v)),
                Instr::I256Const0 | Instr::I256ConstN1 | Instr::I256Const(_) => {
                    panic!("I256 is not exercised by the test programs")
                }
                Instr::BytesConst(bs) => stack.push(Val::ByteVec(bs.clone())),
                Instr::AddressConst(bs) => stack.push(Val::Address(bs.clone())),

                Instr::Add => binop_u256!(|a, b| a.checked_add(b).expect("overflow")),
                Instr::Sub => binop_u256!(|a, b| a.checked_sub(b).expect("underflow")),
                Instr::Mul => binop_u256!(|a, b| a.checked_mul(b).expect("overflow")),
                Instr::Div => binop_u256!(|a, b| a.checked_div(b).expect("div by zero")),
                Instr::Mod => binop_u256!(|a, b| a.checked_rem(b).expect("mod by zero")),
                Instr::BitAnd => binop_u256!(|a, b| a & b),
                Instr::BitOr => binop_u256!(|a, b| a | b),
                Instr::BitXor => binop_u256!(|a, b| a ^ b),
                Instr::Shl => binop_u256!(|a, b| a << usize::try_from(b).unwrap()),
                Instr::Shr => binop_u256!(|a, b| a >> usize::try_from(b).unwrap()),
                Instr::Eq => {
                    let rhs = stack.pop().unwrap();
                    let lhs = stack.pop().unwrap();
                    stack.push(Val::Bool(lhs == rhs));
                }
                Instr::Neq => {
                    let rhs = stack.pop().unwrap();
                    let lhs = stack.pop().unwrap();
                    stack.push(Val::Bool(lhs != rhs));
                }
                Instr::Not => {
                    let operand = as_bool(&stack.pop().unwrap());
                    stack.push(Val::Bool(!operand));
                }
                Instr::ByteVecConcat => {
                    let rhs = stack.pop().unwrap();
                    let mut lhs = match stack.pop().unwrap() {
                        Val::ByteVec(bs) => bs,
                        other => panic!("expected ByteVec, got {other:?}"),
                    };
                    match rhs {
                        Val::ByteVec(bs) => lhs.extend(bs),
                        other => panic!("expected ByteVec, got {other:?}"),
                    }
                    stack.push(Val::ByteVec(lhs));
                }
                Instr::U256Lt => cmp_u256!(|a, b| a < b),
                Instr::U256Le => cmp_u256!(|a, b| a <= b),
                Instr::U256Gt => cmp_u256!(|a, b| a > b),
                Instr::U256Ge => cmp_u256!(|a, b| a >= b),

                Instr::Jump(offset) => pc += *offset as i64,
                Instr::IfTrue(offset) => {
                    if as_bool(&stack.pop().unwrap()) {
                        pc += *offset as i64;
                    }
                }
                Instr::IfFalse(offset) => {
                    if !as_bool(&stack.pop().unwrap()) {
                        pc += *offset as i64;
                    }
                }
                Instr::Return => {
                    let keep = method.return_length as usize;
                    return stack.split_off(stack.len() - keep);
                }
                Instr::Assert => {
                    assert!(as_bool(&stack.pop().unwrap()), "assertion failed");
                }
                Instr::AssertWithErrorCode => {
                    let code = as_u256(&stack.pop().unwrap());
                    assert!(as_bool(&stack.pop().unwrap()), "assertion failed with code {code}");
                }
                Instr::Panic => panic!("explicit panic"),

                Instr::LoadLocal(slot) => stack.push(locals[*slot as usize].clone()),
                Instr::StoreLocal(slot) => locals[*slot as usize] = stack.pop().unwrap(),
                Instr::LoadLocalByIndex => {
                    let index = usize::try_from(as_u256(&stack.pop().unwrap())).unwrap();
                    stack.push(locals[index].clone());
                }
                Instr::StoreLocalByIndex => {
                    let index = usize::try_from(as_u256(&stack.pop().unwrap())).unwrap();
                    locals[index] = stack.pop().unwrap();
                }
                Instr::Dup => {
                    let top = stack.last().unwrap().clone();
                    stack.push(top);
                }
                Instr::Pop => {
                    stack.pop().unwrap();
                }

                Instr::LoadImmField(slot) => stack.push(self.vm.fields[*slot as usize].clone()),
                Instr::LoadMutField(slot) => {
                    stack.push(self.vm.fields[self.imm_field_count + *slot as usize].clone());
                }
                Instr::StoreMutField(slot) => {
                    let value = stack.pop().unwrap();
                    self.vm.fields[self.imm_field_count + *slot as usize] = value;
                }
                Instr::LoadImmFieldByIndex => {
                    let index = usize::try_from(as_u256(&stack.pop().unwrap())).unwrap();
                    stack.push(self.vm.fields[index].clone());
                }
                Instr::LoadMutFieldByIndex => {
                    let index = usize::try_from(as_u256(&stack.pop().unwrap())).unwrap();
                    stack.push(self.vm.fields[self.imm_field_count + index].clone());
                }
                Instr::StoreMutFieldByIndex => {
                    let index = usize::try_from(as_u256(&stack.pop().unwrap())).unwrap();
                    let value = stack.pop().unwrap();
                    self.vm.fields[self.imm_field_count + index] = value;
                }

                Instr::CallLocal(index) => {
                    let arg_count = methods[*index as usize].args_length as usize;
                    let args = stack.split_off(stack.len() - arg_count);
                    let returned = self.call(*index as usize, args);
                    stack.extend(returned);
                }

                Instr::Log(count) => {
                    let split = stack.len() - *count as usize;
                    self.vm.logs.push(stack.split_off(split));
                }
                Instr::DebugMessage => match stack.pop().unwrap() {
                    Val::ByteVec(message) => self.vm.debug_messages.push(message),
                    other => panic!("expected ByteVec, got {other:?}"),
                },

                other => panic!("instruction {other:?} is not exercised by the test programs"),
            }
        }
        assert_eq!(method.return_length, 0, "fell off a value-returning method");
        Vec::new()
    }
}

pub fn u(value: u64) -> Val {
    Val::U256(U256::from(value))
}

pub fn as_u64(value: &Val) -> u64 {
    u64::try_from(as_u256(value)).unwrap()
}
