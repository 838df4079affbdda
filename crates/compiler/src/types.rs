//! The Ralph type system: primitive scalars, fixed-size arrays, and
//! contract reference types. Multi-value returns are modeled as `&[Type]`
//! tuples at function boundaries rather than first-class values.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Bool,
    U256,
    I256,
    ByteVec,
    Address,
    /// `[T; n]`, possibly nested.
    FixedArray(Box<Type>, usize),
    /// A reference to a contract or interface by name, held as a contract
    /// id on the stack.
    Contract(String),
}

impl Type {
    /// Number of scalar slots this type occupies once arrays are flattened
    /// row-major.
    pub fn flattened_size(&self) -> usize {
        match self {
            Self::FixedArray(elem, size) => elem.flattened_size() * size,
            _ => 1,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::FixedArray(..))
    }

    /// Numeric scalars admit the arithmetic operators.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::U256 | Self::I256)
    }

    /// Scalars occupy one slot and admit `==`/`!=`.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Bool | Self::U256 | Self::I256 | Self::ByteVec | Self::Address)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("Bool"),
            Self::U256 => f.write_str("U256"),
            Self::I256 => f.write_str("I256"),
            Self::ByteVec => f.write_str("ByteVec"),
            Self::Address => f.write_str("Address"),
            Self::FixedArray(elem, size) => write!(f, "[{elem}; {size}]"),
            Self::Contract(name) => f.write_str(name),
        }
    }
}

/// Renders a tuple of types the way diagnostics expect it:
/// `List(U256, Bool)`.
pub fn format_type_list(types: &[Type]) -> String {
    use itertools::Itertools;
    format!("List({})", types.iter().format(", "))
}

/// Total flattened slot count of a type tuple.
pub fn flattened_size(types: &[Type]) -> usize {
    types.iter().map(Type::flattened_size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_arrays_flatten_row_major() {
        let ty = Type::FixedArray(Box::new(Type::FixedArray(Box::new(Type::U256), 2)), 3);
        assert_eq!(ty.flattened_size(), 6);
        assert_eq!(ty.to_string(), "[[U256; 2]; 3]");
    }

    #[test]
    fn type_lists_render_for_diagnostics() {
        assert_eq!(format_type_list(&[Type::U256, Type::Bool]), "List(U256, Bool)");
        assert_eq!(format_type_list(&[]), "List()");
    }
}
