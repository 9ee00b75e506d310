use std::fmt;

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::{Declaration, Expression, Function, Program, Type};
use crate::backend::Backend;
use crate::builtins::symbols;

mod asm;
mod codegen;
mod error;
mod labels;
mod registers;
mod statics;

pub use error::{CodegenError, CompileError};

use asm::{Instruction, Register};
use codegen::{CompileResult, FunctionCodegen, Signature};
use labels::LabelGenerator;
use statics::StaticTable;

/// Shape of a value once it sits in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueKind {
    Number,
    Bool,
    /// A single byte read out of a string.
    Char,
    /// Address of a zero-terminated string.
    Text,
    /// Address of a word array.
    Array,
}

impl ValueKind {
    fn from_type(ty: Type) -> Self {
        match ty {
            Type::Number | Type::Void => ValueKind::Number,
            Type::String => ValueKind::Text,
            Type::Bool => ValueKind::Bool,
            Type::Array => ValueKind::Array,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Bool => "bool",
            ValueKind::Char => "char",
            ValueKind::Text => "string",
            ValueKind::Array => "array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Function exported as the program entry.
    pub entrypoint: String,
    /// Fixes generated labels and the target's random seed; `None` seeds from
    /// the OS.
    pub seed: Option<u64>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            entrypoint: "main".to_string(),
            seed: None,
        }
    }
}

/// Backend that lowers programs to Cortex-M0 Thumb assembly.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Produces a complete assembly file for `program`.
    ///
    /// The entrypoint is exported as `smickelscript_entry`; non-literal
    /// top-level statics are stored at the start of it.
    pub fn compile(&self, program: &Program) -> std::result::Result<String, CompileError> {
        let entrypoint = self.options.entrypoint.as_str();
        if program.find_function(entrypoint).is_none() {
            return Err(CodegenError::EntrypointNotFound {
                name: entrypoint.to_string(),
            }
            .into());
        }
        let signatures = collect_signatures(program, entrypoint)?;

        let mut statics = StaticTable::new();
        let mut deferred = Vec::new();
        for declaration in &program.declarations {
            if let Declaration::Static { variable, line } = declaration
                && let Some((label, value)) = codegen::declare_static(&mut statics, variable)
                    .map_err(|error| error.or_line(*line))?
            {
                deferred.push((label, value, *line));
            }
        }

        let mut labels = LabelGenerator::new(self.options.seed);
        for function in program.functions() {
            labels.reserve(&function.name);
        }
        let mut blocks = Vec::new();
        for function in program.functions() {
            let is_entry = function.name == entrypoint;
            let initializers = if is_entry { deferred.as_slice() } else { &[] };
            let block = compile_function(
                function,
                is_entry,
                initializers,
                &signatures,
                &mut statics,
                &mut labels,
            )
            .map_err(|error| error.or_line(function.line))?;
            blocks.push(block);
        }

        let assembly = render(&statics, labels.seed_byte(), &blocks);
        let entry_label = format!("{}:", symbols::ENTRY);
        if !assembly.lines().any(|line| line == entry_label) {
            return Err(CodegenError::EntrypointNotFound {
                name: entrypoint.to_string(),
            }
            .into());
        }

        debug!(
            entrypoint,
            functions = blocks.len(),
            bytes = assembly.len(),
            "compiled program"
        );
        Ok(assembly)
    }
}

impl Backend for Compiler {
    fn name(&self) -> &'static str {
        "compiler"
    }

    fn run(&self, program: &Program) -> Result<String> {
        Ok(self.compile(program)?)
    }
}

/// Compiles `program` with the default options.
pub fn compile(program: &Program) -> std::result::Result<String, CompileError> {
    Compiler::default().compile(program)
}

fn collect_signatures(
    program: &Program,
    entrypoint: &str,
) -> CompileResult<FxHashMap<String, Signature>> {
    let mut names = FxHashSet::default();
    let mut signatures = FxHashMap::default();
    for declaration in &program.declarations {
        if !names.insert(declaration.name()) {
            return Err(CompileError::from(CodegenError::DuplicateDeclaration {
                name: declaration.name().to_string(),
            })
            .or_line(declaration.line()));
        }
        if let Declaration::Function(function) = declaration {
            if symbols::is_reserved(&function.name) {
                return Err(CompileError::from(CodegenError::DuplicateDeclaration {
                    name: function.name.clone(),
                })
                .or_line(function.line));
            }
            let label = if function.name == entrypoint {
                symbols::ENTRY.to_string()
            } else {
                function.name.clone()
            };
            signatures.insert(
                function.name.clone(),
                Signature {
                    label,
                    params: function.params.len(),
                    return_type: function.return_type,
                },
            );
        }
    }
    Ok(signatures)
}

fn compile_function(
    function: &Function,
    is_entry: bool,
    initializers: &[(String, &Expression, usize)],
    signatures: &FxHashMap<String, Signature>,
    statics: &mut StaticTable,
    labels: &mut LabelGenerator,
) -> CompileResult<Vec<Instruction>> {
    let name = &function.name;
    if is_entry && !function.params.is_empty() {
        return Err(CodegenError::EntrypointParameters { name: name.clone() }.into());
    }
    if function.params.len() > 1 {
        return Err(CodegenError::TooManyParameters {
            name: name.clone(),
            count: function.params.len(),
        }
        .into());
    }

    let mut codegen = FunctionCodegen::new(signatures, statics, labels);
    for (label, value, line) in initializers {
        codegen
            .initialize_static(label, value)
            .map_err(|error| error.or_line(*line))?;
    }
    if let Some(param) = function.params.first() {
        if param.ty == Some(Type::Void) {
            return Err(CodegenError::VoidDeclaration {
                name: param.name.clone(),
            }
            .into());
        }
        codegen.bind_parameter(&param.name, param.ty)?;
    }
    codegen.emit_body(&function.body)?;

    let label = if is_entry { symbols::ENTRY } else { name.as_str() };
    let code = codegen.finish(label);
    debug!(function = %name, instructions = code.len(), "compiled function");
    Ok(code)
}

fn render(statics: &StaticTable, seed: u8, blocks: &[Vec<Instruction>]) -> String {
    let mut out = String::from(".cpu cortex-m0\n.align 2\n\n");
    if !statics.is_empty() {
        out.push_str(&statics.render());
        out.push('\n');
    }
    out.push_str(".text\n.syntax unified\n.thumb\n");
    out.push_str(&format!(".global {}\n", symbols::ENTRY));
    out.push_str(&format!(".global {}\n\n", symbols::INIT));

    // Seeds the target's generator before the entrypoint runs.
    let init = vec![
        Instruction::Label(symbols::INIT.to_string()),
        Instruction::Push(vec![Register::Lr]),
        Instruction::MoveImmediate {
            dst: Register::R0,
            value: seed,
        },
        Instruction::BranchLink(symbols::SEED.to_string()),
        Instruction::Pop(vec![Register::Pc]),
    ];
    for block in std::iter::once(&init).chain(blocks) {
        for instruction in block {
            out.push_str(&format!("{instruction}\n"));
        }
        out.push('\n');
    }
    out
}
