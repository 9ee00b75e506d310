use anyhow::Result;

use crate::ast::Program;

pub mod compiler;
pub mod interpreter;

/// Common interface implemented by each execution backend.
///
/// `run` turns a parsed program into the backend's textual artifact: the
/// captured program output for the interpreter, assembly for the compiler.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn run(&self, program: &Program) -> Result<String>;
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(interpreter::Interpreter::default()),
        Box::new(compiler::Compiler::default()),
    ]
}
