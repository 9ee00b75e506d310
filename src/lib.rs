pub mod ast;
pub mod backend;
pub mod builtins;
pub mod error;
pub mod fixtures;
pub mod lexer;
pub mod parser;
pub mod token;

pub use error::ErrorCategory;

/// Tokenizes and parses a source file into a [`ast::Program`].
pub fn parse_source(source: &str) -> anyhow::Result<ast::Program> {
    parser::parse(source)
}
