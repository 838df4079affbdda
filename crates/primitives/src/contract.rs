//! Top-level bytecode containers and the script template form.

use crate::codec::{DecodeError, Decoder};
use crate::instr::Instr;
use crate::method::Method;
use crate::val::Val;
use alloy_primitives::hex;
use serde::{Deserialize, Serialize};

/// Errors produced when substituting template variables into a script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstituteError {
    #[error("template variable {0} has no substitution value")]
    MissingValue(u8),
    #[error("{0} substitution values provided but only {1} template variables exist")]
    TooManyValues(usize, usize),
}

/// Bytecode of a deployed contract: flattened field count plus the ordered
/// method table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulContract {
    pub field_length: u16,
    pub methods: Vec<Method>,
}

impl StatefulContract {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.field_length.to_be_bytes());
        serialize_methods(&mut out, &self.methods);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let field_length = decoder.u16()?;
        let methods = decode_methods(&mut decoder)?;
        decoder.finish()?;
        Ok(Self { field_length, methods })
    }
}

/// Bytecode of a transaction script. May contain [`Instr::TemplateVariable`]
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulScript {
    pub methods: Vec<Method>,
}

impl StatefulScript {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        serialize_methods(&mut out, &self.methods);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let methods = decode_methods(&mut decoder)?;
        decoder.finish()?;
        Ok(Self { methods })
    }

    /// Hex rendering with each template variable shown as `{n}`.
    pub fn to_template_string(&self) -> String {
        template_string(&self.methods)
    }

    /// Replaces every template variable with the constant for its value.
    pub fn substitute(&self, values: &[Val]) -> Result<Self, SubstituteError> {
        let methods = substitute_methods(&self.methods, values)?;
        Ok(Self { methods })
    }
}

/// Bytecode of an asset (stateless) script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatelessScript {
    pub methods: Vec<Method>,
}

impl StatelessScript {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        serialize_methods(&mut out, &self.methods);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let methods = decode_methods(&mut decoder)?;
        decoder.finish()?;
        Ok(Self { methods })
    }

    pub fn to_template_string(&self) -> String {
        template_string(&self.methods)
    }

    pub fn substitute(&self, values: &[Val]) -> Result<Self, SubstituteError> {
        let methods = substitute_methods(&self.methods, values)?;
        Ok(Self { methods })
    }
}

fn serialize_methods(out: &mut Vec<u8>, methods: &[Method]) {
    debug_assert!(methods.len() <= u16::MAX as usize);
    out.extend_from_slice(&(methods.len() as u16).to_be_bytes());
    for method in methods {
        method.serialize_into(out);
    }
}

fn decode_methods(decoder: &mut Decoder<'_>) -> Result<Vec<Method>, DecodeError> {
    let count = decoder.u16()? as usize;
    let mut methods = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        methods.push(Method::decode(decoder)?);
    }
    Ok(methods)
}

fn template_string(methods: &[Method]) -> String {
    let mut rendered = String::new();
    let mut out = Vec::new();
    out.extend_from_slice(&(methods.len() as u16).to_be_bytes());
    for method in methods {
        let mut header_only = method.clone();
        header_only.instrs.clear();
        header_only.serialize_into(&mut out);
        // Restore the real instruction count clobbered by the empty header.
        out.truncate(out.len() - 2);
        out.extend_from_slice(&(method.instrs.len() as u16).to_be_bytes());
        for instr in &method.instrs {
            if let Instr::TemplateVariable(n) = instr {
                rendered.push_str(&hex::encode(&out));
                out.clear();
                rendered.push('{');
                rendered.push_str(&n.to_string());
                rendered.push('}');
            } else {
                instr.serialize_into(&mut out);
            }
        }
    }
    rendered.push_str(&hex::encode(&out));
    rendered
}

fn substitute_methods(methods: &[Method], values: &[Val]) -> Result<Vec<Method>, SubstituteError> {
    let mut max_index = None::<u8>;
    let mut out = Vec::with_capacity(methods.len());
    for method in methods {
        let mut substituted = method.clone();
        for instr in &mut substituted.instrs {
            if let Instr::TemplateVariable(n) = instr {
                max_index = Some(max_index.map_or(*n, |m| m.max(*n)));
                let value = values.get(*n as usize).ok_or(SubstituteError::MissingValue(*n))?;
                *instr = value.to_const_instr();
            }
        }
        out.push(substituted);
    }
    let used = max_index.map_or(0, |m| m as usize + 1);
    if values.len() > used {
        return Err(SubstituteError::TooManyValues(values.len(), used));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    fn method(instrs: Vec<Instr>) -> Method {
        Method {
            is_public: true,
            use_preapproved_assets: false,
            use_contract_assets: false,
            args_length: 1,
            locals_length: 2,
            return_length: 1,
            instrs,
        }
    }

    #[test]
    fn contract_round_trip() {
        let contract = StatefulContract {
            field_length: 3,
            methods: vec![method(vec![
                Instr::LoadLocal(0),
                Instr::U256Const1,
                Instr::Add,
                Instr::Return,
            ])],
        };
        let decoded = StatefulContract::deserialize(&contract.serialize()).unwrap();
        assert_eq!(decoded, contract);
    }

    #[test]
    fn template_string_renders_placeholders() {
        let script = StatefulScript {
            methods: vec![method(vec![
                Instr::TemplateVariable(0),
                Instr::TemplateVariable(1),
                Instr::Add,
                Instr::Return,
            ])],
        };
        let rendered = script.to_template_string();
        assert!(rendered.contains("{0}"));
        assert!(rendered.contains("{1}"));

        let substituted =
            script.substitute(&[Val::U256(U256::from(7u64)), Val::U256(U256::ZERO)]).unwrap();
        assert_eq!(
            substituted.methods[0].instrs,
            vec![
                Instr::U256Const(U256::from(7u64)),
                Instr::U256Const0,
                Instr::Add,
                Instr::Return
            ]
        );
        assert!(!substituted.to_template_string().contains('{'));
    }

    #[test]
    fn substitute_rejects_extra_values() {
        let script = StatefulScript {
            methods: vec![method(vec![Instr::TemplateVariable(0), Instr::Return])],
        };
        let err = script
            .substitute(&[Val::Bool(true), Val::Bool(false)])
            .unwrap_err();
        assert_eq!(err, SubstituteError::TooManyValues(2, 1));
    }

    fn arb_instr() -> impl Strategy<Value = Instr> {
        prop_oneof![
            any::<bool>().prop_map(Instr::BoolConst),
            any::<[u8; 32]>().prop_map(|b| Instr::U256Const(U256::from_be_bytes(b))),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Instr::BytesConst),
            any::<i16>().prop_map(Instr::Jump),
            any::<u8>().prop_map(Instr::LoadLocal),
            any::<u8>().prop_map(Instr::StoreMutField),
            any::<u8>().prop_map(Instr::CallExternal),
            Just(Instr::Add),
            Just(Instr::U256Lt),
            Just(Instr::Dup),
            Just(Instr::Return),
            Just(Instr::ApproveToken),
            Just(Instr::TxId),
        ]
    }

    proptest! {
        #[test]
        fn serialization_round_trips(
            field_length in 0u16..512,
            instrs in proptest::collection::vec(arb_instr(), 0..48),
        ) {
            let contract = StatefulContract { field_length, methods: vec![method(instrs)] };
            let decoded = StatefulContract::deserialize(&contract.serialize()).unwrap();
            prop_assert_eq!(decoded, contract);
        }
    }
}
