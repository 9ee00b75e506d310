use thiserror::Error;

use crate::error::{ErrorCategory, located};

/// Failures raised while lowering a program to assembly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Entrypoint '{name}' not found")]
    EntrypointNotFound { name: String },
    #[error("Duplicate declaration '{name}'")]
    DuplicateDeclaration { name: String },
    #[error("Static variable '{name}' is already declared")]
    StaticRedeclared { name: String },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Entrypoint '{name}' cannot take parameters")]
    EntrypointParameters { name: String },
    #[error("Function '{name}' takes {count} parameters, at most 1 is supported")]
    TooManyParameters { name: String, count: usize },
    #[error("Invalid arguments for '{name}': expected {expected}, got {found}")]
    InvalidArguments {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Variable '{name}' cannot be declared as void")]
    VoidDeclaration { name: String },
    #[error("Call to '{name}' does not produce a value")]
    VoidValue { name: String },
    #[error("Array '{name}' must be declared static")]
    ArrayMustBeStatic { name: String },
    #[error("Invalid implicit return")]
    InvalidImplicitReturn,
    #[error("Variable limit reached: no register left for '{name}'")]
    VariableLimitReached { name: String },
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i32, len: usize },
    #[error("Unsupported in compiled code: {feature}")]
    Unsupported { feature: String },
}

impl CodegenError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CodegenError::EntrypointNotFound { .. }
            | CodegenError::DuplicateDeclaration { .. }
            | CodegenError::StaticRedeclared { .. }
            | CodegenError::UndefinedFunction { .. }
            | CodegenError::EntrypointParameters { .. }
            | CodegenError::TooManyParameters { .. }
            | CodegenError::InvalidArguments { .. } => ErrorCategory::Structural,
            CodegenError::VoidDeclaration { .. }
            | CodegenError::VoidValue { .. }
            | CodegenError::ArrayMustBeStatic { .. }
            | CodegenError::Unsupported { .. } => ErrorCategory::Type,
            CodegenError::UndefinedVariable { .. } | CodegenError::InvalidImplicitReturn => {
                ErrorCategory::Scope
            }
            CodegenError::VariableLimitReached { .. } => ErrorCategory::ResourceLimit,
            CodegenError::IndexOutOfBounds { .. } => ErrorCategory::Bounds,
        }
    }

    pub(super) fn unsupported(feature: impl Into<String>) -> Self {
        CodegenError::Unsupported {
            feature: feature.into(),
        }
    }
}

/// A [`CodegenError`] together with the source line it was raised on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", located(.line, .error))]
pub struct CompileError {
    pub line: Option<usize>,
    pub error: CodegenError,
}

impl CompileError {
    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }

    pub(super) fn or_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

impl From<CodegenError> for CompileError {
    fn from(error: CodegenError) -> Self {
        Self { line: None, error }
    }
}
