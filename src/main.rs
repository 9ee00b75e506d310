use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use smickel::backend::compiler::{Compiler, CompilerOptions};
use smickel::backend::interpreter::{Interpreter, InterpreterOptions, Stdout, Value};
use smickel::parse_source;

#[derive(Parser)]
#[command(name = "smickel")]
#[command(about = "Interpreter and Cortex-M0 compiler for smickelscript", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret a program
    Run {
        /// Source file; `-` reads stdin
        file: PathBuf,

        /// Function to start in
        #[arg(short, long, default_value = "main")]
        entrypoint: String,

        /// Seed for `rand()`
        #[arg(long)]
        seed: Option<u64>,

        /// Arguments passed to the entrypoint
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Compile a program to Thumb assembly
    Compile {
        /// Source file; `-` reads stdin
        file: PathBuf,

        /// Function exported as `smickelscript_entry`
        #[arg(short, long, default_value = "main")]
        entrypoint: String,

        /// Seed for generated labels
        #[arg(long)]
        seed: Option<u64>,

        /// Output file; defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run {
            file,
            entrypoint,
            seed,
            args,
        } => {
            let program = parse_source(&read_source(&file)?)
                .with_context(|| format!("Parsing {}", file.display()))?;
            let args = args.iter().map(|raw| Value::parse_argument(raw)).collect();
            let interpreter = Interpreter::new(InterpreterOptions { entrypoint, seed });
            let result = interpreter.execute(&program, args, &mut Stdout)?;
            if let Some(value) = result {
                println!("> Function returned: {value}");
            }
        }
        Command::Compile {
            file,
            entrypoint,
            seed,
            output,
        } => {
            let program = parse_source(&read_source(&file)?)
                .with_context(|| format!("Parsing {}", file.display()))?;
            let assembly =
                Compiler::new(CompilerOptions { entrypoint, seed }).compile(&program)?;
            match output {
                Some(path) => fs::write(&path, assembly)
                    .with_context(|| format!("Writing {}", path.display()))?,
                None => print!("{assembly}"),
            }
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
}
