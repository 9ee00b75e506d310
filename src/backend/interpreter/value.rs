use std::fmt;
use std::rc::Rc;

use crate::ast::{Literal, Type};

/// Runtime value produced by evaluating an expression.
///
/// Arrays are immutable snapshots; writing an element builds a new snapshot
/// and rebinds the name, so other bindings holding the old array never see
/// the change.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i32),
    String(String),
    Bool(bool),
    Array(Rc<[Value]>),
}

impl Value {
    /// Value bound by a declaration without an initializer.
    pub fn zero(ty: Type) -> Option<Self> {
        match ty {
            Type::Number => Some(Value::Number(0)),
            Type::String => Some(Value::String(String::new())),
            Type::Bool => Some(Value::Bool(false)),
            Type::Array => Some(Value::Array(Rc::from(Vec::new()))),
            Type::Void => None,
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Number(value) => Value::Number(*value),
            Literal::String(value) => Value::String(value.clone()),
            Literal::Bool(value) => Value::Bool(*value),
        }
    }

    /// Builds a zero-padded array of `size` elements seeded from `initializer`.
    ///
    /// Strings seed their character codes and are truncated to fit.
    pub fn array(size: usize, initializer: Option<&Literal>) -> Self {
        let mut elements = vec![Value::Number(0); size];
        match initializer {
            Some(Literal::String(text)) => {
                for (slot, ch) in elements.iter_mut().zip(text.chars()) {
                    *slot = Value::Number(ch as i32);
                }
            }
            Some(literal) => {
                if let Some(slot) = elements.first_mut() {
                    *slot = Value::from_literal(literal);
                }
            }
            None => {}
        }
        Value::Array(Rc::from(elements))
    }

    /// Interprets a command-line argument: numbers when they parse, strings otherwise.
    pub fn parse_argument(raw: &str) -> Self {
        match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => raw
                .parse::<i32>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::Number),
        }
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Bool(_) => Type::Bool,
            Value::Array(_) => Type::Array,
        }
    }

    pub fn matches(&self, ty: Type) -> bool {
        self.type_of() == ty
    }

    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Array(elements) => {
                f.write_str("[")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_arrays_from_string_literals() {
        let value = Value::array(4, Some(&Literal::String("Hi".to_string())));
        assert_eq!(value.to_string(), "[72, 105, 0, 0]");

        let truncated = Value::array(1, Some(&Literal::String("Hi".to_string())));
        assert_eq!(truncated.to_string(), "[72]");
    }

    #[test]
    fn seeds_first_element_from_scalar_literal() {
        let value = Value::array(3, Some(&Literal::Number(9)));
        assert_eq!(value.to_string(), "[9, 0, 0]");
    }

    #[test]
    fn formats_values_for_output() {
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Number(-4).to_string(), "-4");
        assert_eq!(Value::String("raw".to_string()).to_string(), "raw");
    }

    #[test]
    fn parses_command_line_arguments() {
        assert_eq!(Value::parse_argument("42"), Value::Number(42));
        assert_eq!(Value::parse_argument("-7"), Value::Number(-7));
        assert_eq!(Value::parse_argument("true"), Value::Bool(true));
        assert_eq!(
            Value::parse_argument("hello"),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn void_has_no_zero_value() {
        assert_eq!(Value::zero(Type::Void), None);
        assert_eq!(Value::zero(Type::Number), Some(Value::Number(0)));
    }
}
