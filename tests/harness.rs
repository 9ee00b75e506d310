use std::path::Path;

use anyhow::{Context, Result, ensure};

use smickel::backend::{Backend, backends};
use smickel::backend::compiler::{Compiler, CompilerOptions};
use smickel::backend::interpreter::{CapturedOutput, Interpreter, InterpreterOptions, Value};
use smickel::fixtures::{Case, CaseClass, load_cases, normalize_output};
use smickel::{ErrorCategory, lexer, parser};

const PROGRAMS_DIR: &str = "tests/programs";

fn expected_error(case: &Case) -> Result<&str> {
    case.spec
        .expected
        .error_contains
        .as_deref()
        .with_context(|| format!("Missing error_contains in {}", case.name))
}

fn check_category(
    case: &Case,
    expected: Option<ErrorCategory>,
    actual: ErrorCategory,
) -> Result<()> {
    if let Some(expected) = expected {
        ensure!(
            actual == expected,
            "Expected {expected} error in {}, got {actual}",
            case.name
        );
    }
    Ok(())
}

fn run_interpreter_case(case: &Case) -> Result<()> {
    let source = case.source()?;
    let tokenized = lexer::tokenize(&source);

    if case.spec.class == CaseClass::FrontendError {
        let expected = expected_error(case)?;
        let actual = match tokenized {
            Err(error) => error.to_string(),
            Ok(tokens) => parser::parse_tokens(tokens)
                .err()
                .with_context(|| {
                    format!("Expected frontend error in {}, but parsing succeeded", case.name)
                })?
                .to_string(),
        };
        ensure!(
            actual.contains(expected),
            "Expected frontend error containing '{expected}' in {}, got '{actual}'",
            case.name
        );
        return Ok(());
    }

    let tokens = tokenized.with_context(|| format!("Tokenizing {}", case.name))?;
    let program =
        parser::parse_tokens(tokens).with_context(|| format!("Parsing {}", case.name))?;
    let interpreter = Interpreter::new(InterpreterOptions {
        entrypoint: case.spec.entrypoint.clone(),
        seed: case.spec.seed.or(Some(0)),
    });
    let args = case
        .spec
        .args
        .iter()
        .map(|raw| Value::parse_argument(raw))
        .collect();
    let mut output = CapturedOutput::default();
    let result = interpreter.execute(&program, args, &mut output);

    match case.spec.class {
        CaseClass::RuntimeSuccess => {
            result.with_context(|| format!("Interpreter failed for {}", case.name))?;
            assert_eq!(
                normalize_output(output.as_str()),
                case.expected_stdout()?,
                "Interpreter output mismatch for {}",
                case.name
            );
        }
        CaseClass::RuntimeError => {
            let error = result.err().with_context(|| {
                format!("Expected interpreter error in {}, but it succeeded", case.name)
            })?;
            let expected = expected_error(case)?;
            let actual = error.to_string();
            ensure!(
                actual.contains(expected),
                "Expected interpreter error containing '{expected}' in {}, got '{actual}'",
                case.name
            );
            check_category(case, case.spec.expected.category, error.category())?;
        }
        CaseClass::FrontendError => {}
    }
    Ok(())
}

fn run_compiler_case(case: &Case) -> Result<()> {
    let Some(expectation) = &case.spec.compiler else {
        return Ok(());
    };
    let program = parser::parse(&case.source()?)
        .with_context(|| format!("Parsing {}", case.name))?;
    let compiler = Compiler::new(CompilerOptions {
        entrypoint: case.spec.entrypoint.clone(),
        seed: Some(0),
    });
    let result = compiler.compile(&program);

    if expectation.succeeds {
        let assembly = result.with_context(|| format!("Compiler failed for {}", case.name))?;
        for fragment in &expectation.contains {
            ensure!(
                assembly.contains(fragment.as_str()),
                "Assembly for {} is missing '{fragment}'",
                case.name
            );
        }
        return Ok(());
    }

    let error = result.err().with_context(|| {
        format!("Expected compile error in {}, but it succeeded", case.name)
    })?;
    if let Some(expected) = expectation.error_contains.as_deref() {
        let actual = error.to_string();
        ensure!(
            actual.contains(expected),
            "Expected compile error containing '{expected}' in {}, got '{actual}'",
            case.name
        );
    }
    check_category(case, expectation.category, error.category())
}

#[test]
fn runs_programs_interpreter_backend() -> Result<()> {
    for case in load_cases(Path::new(PROGRAMS_DIR))? {
        run_interpreter_case(&case)?;
    }
    Ok(())
}

#[test]
fn runs_programs_compiler_backend() -> Result<()> {
    for case in load_cases(Path::new(PROGRAMS_DIR))? {
        run_compiler_case(&case)?;
    }
    Ok(())
}

#[test]
fn compiled_output_is_stable_for_a_seed() -> Result<()> {
    for case in load_cases(Path::new(PROGRAMS_DIR))? {
        let Some(expectation) = &case.spec.compiler else {
            continue;
        };
        if !expectation.succeeds {
            continue;
        }
        let program = parser::parse(&case.source()?)?;
        let compiler = Compiler::new(CompilerOptions {
            entrypoint: case.spec.entrypoint.clone(),
            seed: Some(7),
        });
        assert_eq!(
            compiler.compile(&program)?,
            compiler.compile(&program)?,
            "Assembly for {} differs between runs",
            case.name
        );
    }
    Ok(())
}

#[test]
fn every_backend_handles_hello_world() -> Result<()> {
    let program = parser::parse("func main() { println(\"Hello World\"); }")?;
    let names = backends()
        .iter()
        .map(|backend| backend.name())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["interpreter", "compiler"]);

    for backend in backends() {
        let artifact = backend
            .run(&program)
            .with_context(|| format!("Backend {} failed", backend.name()))?;
        assert!(
            artifact.contains("Hello World"),
            "Backend {} produced '{artifact}'",
            backend.name()
        );
    }
    Ok(())
}
