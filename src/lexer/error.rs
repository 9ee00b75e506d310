use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Error on line {line}. Unexpected character '{character}' at column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Error on line {line}. Invalid number literal '{literal}'")]
    InvalidNumberLiteral { literal: String, line: usize },
    #[error("Error on line {line}. Unterminated string literal starting at column {column}")]
    UnterminatedString { line: usize, column: usize },
    #[error("Error on line {line}. Invalid escape sequence '\\{escape}' in string literal")]
    InvalidEscape { escape: char, line: usize },
}

pub type LexResult<T> = Result<T, LexError>;
