use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Error on line {line}. Expected {expected}, but found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("Error on line {line}. Number literal {value} does not fit in 32 bits")]
    NumberOutOfRange { value: i64, line: usize },
    #[error(
        "Error on line {line}. Array size must be between 0 and {}, got {value}",
        super::MAX_ARRAY_SIZE
    )]
    InvalidArraySize { value: i64, line: usize },
    #[error("Error on line {line}. Array initializer must be a literal")]
    NonLiteralArrayInitializer { line: usize },
}
