use thiserror::Error;

use crate::error::{ErrorCategory, located};

/// Failures raised while evaluating a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Entrypoint '{name}' not found")]
    EntrypointNotFound { name: String },
    #[error("Duplicate declaration '{name}'")]
    DuplicateDeclaration { name: String },
    #[error("Invalid arguments for '{name}': expected {expected}, got {found}")]
    InvalidArguments {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Invalid type: expected {expected}, got {found}")]
    InvalidType { expected: String, found: String },
    #[error("Variable '{name}' cannot be declared as void")]
    VoidDeclaration { name: String },
    #[error("Operation '{operation}' is not supported for {left} and {right}")]
    UnsupportedOperation {
        operation: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Value of type {type_name} cannot be indexed")]
    NotIndexable { type_name: &'static str },
    #[error("Invalid implicit return")]
    InvalidImplicitReturn,
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i32, len: usize },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Empty range {low}..={high} for 'rand'")]
    EmptyRange { low: i32, high: i32 },
}

impl RuntimeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RuntimeError::UndefinedVariable { .. }
            | RuntimeError::UndefinedFunction { .. }
            | RuntimeError::EntrypointNotFound { .. }
            | RuntimeError::DuplicateDeclaration { .. }
            | RuntimeError::InvalidArguments { .. } => ErrorCategory::Structural,
            RuntimeError::InvalidType { .. }
            | RuntimeError::VoidDeclaration { .. }
            | RuntimeError::UnsupportedOperation { .. }
            | RuntimeError::NotIndexable { .. } => ErrorCategory::Type,
            RuntimeError::InvalidImplicitReturn => ErrorCategory::Scope,
            RuntimeError::IndexOutOfBounds { .. }
            | RuntimeError::DivisionByZero
            | RuntimeError::EmptyRange { .. } => ErrorCategory::Bounds,
        }
    }
}

/// A [`RuntimeError`] together with the source line it was raised on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", located(.line, .error))]
pub struct InterpreterError {
    pub line: Option<usize>,
    pub error: RuntimeError,
}

impl InterpreterError {
    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }

    /// Attaches `line` unless a more specific one was recorded already.
    pub(super) fn or_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

impl From<RuntimeError> for InterpreterError {
    fn from(error: RuntimeError) -> Self {
        Self { line: None, error }
    }
}
