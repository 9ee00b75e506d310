use std::io::Write;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::{Declaration, Function, Program};
use crate::backend::Backend;

mod error;
mod runtime;
mod value;

pub use error::{InterpreterError, RuntimeError};
pub use value::Value;

use runtime::InterpreterRuntime;

/// Destination for text written by `print`/`println`.
pub trait Output {
    fn write(&mut self, chunk: &str);
}

impl<F: FnMut(&str)> Output for F {
    fn write(&mut self, chunk: &str) {
        self(chunk);
    }
}

/// Writes program output straight to the process's standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Output for Stdout {
    fn write(&mut self, chunk: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout has nowhere to report to; output is best effort.
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }
}

/// Collects program output in memory.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    buffer: String,
}

impl CapturedOutput {
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl Output for CapturedOutput {
    fn write(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Function execution starts in.
    pub entrypoint: String,
    /// Fixes the sequence returned by `rand()`; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            entrypoint: "main".to_string(),
            seed: None,
        }
    }
}

/// AST-walking backend that executes programs directly.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    options: InterpreterOptions,
}

impl Interpreter {
    pub fn new(options: InterpreterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Runs the configured entrypoint with `args`, returning its result.
    ///
    /// Top-level statics are initialized in declaration order before the
    /// entrypoint is called.
    pub fn execute(
        &self,
        program: &Program,
        args: Vec<Value>,
        output: &mut dyn Output,
    ) -> std::result::Result<Option<Value>, InterpreterError> {
        let entrypoint = self.options.entrypoint.as_str();
        let entry = program.find_function(entrypoint).ok_or_else(|| {
            RuntimeError::EntrypointNotFound {
                name: entrypoint.to_string(),
            }
        })?;
        let functions = collect_functions(program)?;

        debug!(
            entrypoint,
            functions = functions.len(),
            args = args.len(),
            "starting interpreter run"
        );
        let rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut runtime = InterpreterRuntime::new(&functions, output, rng);

        for declaration in &program.declarations {
            if let Declaration::Static { variable, line } = declaration {
                runtime
                    .declare(variable)
                    .map_err(|error| error.or_line(*line))?;
            }
        }

        let result = runtime
            .call_function(entry, args)
            .map_err(|error| error.or_line(entry.line))?;
        debug!(?result, "interpreter run finished");
        Ok(result)
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn run(&self, program: &Program) -> Result<String> {
        let mut output = CapturedOutput::default();
        self.execute(program, Vec::new(), &mut output)?;
        Ok(output.into_string())
    }
}

/// Interprets `program` starting at `entrypoint`.
pub fn run(
    program: &Program,
    entrypoint: &str,
    args: Vec<Value>,
    output: &mut dyn Output,
) -> std::result::Result<Option<Value>, InterpreterError> {
    let options = InterpreterOptions {
        entrypoint: entrypoint.to_string(),
        ..InterpreterOptions::default()
    };
    Interpreter::new(options).execute(program, args, output)
}

fn collect_functions(
    program: &Program,
) -> std::result::Result<FxHashMap<&str, &Function>, InterpreterError> {
    let mut names = FxHashSet::default();
    let mut functions = FxHashMap::default();
    for declaration in &program.declarations {
        if !names.insert(declaration.name()) {
            return Err(InterpreterError::from(RuntimeError::DuplicateDeclaration {
                name: declaration.name().to_string(),
            })
            .or_line(declaration.line()));
        }
        if let Declaration::Function(function) = declaration {
            functions.insert(function.name.as_str(), function);
        }
    }
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::parser::parse;
    use indoc::indoc;

    fn run_with(
        source: &str,
        options: InterpreterOptions,
        args: Vec<Value>,
    ) -> std::result::Result<(String, Option<Value>), InterpreterError> {
        let program = parse(source).expect("parse failed");
        let mut output = CapturedOutput::default();
        let result = Interpreter::new(options).execute(&program, args, &mut output)?;
        Ok((output.into_string(), result))
    }

    fn run_source(source: &str) -> std::result::Result<String, InterpreterError> {
        let options = InterpreterOptions {
            seed: Some(7),
            ..InterpreterOptions::default()
        };
        run_with(source, options, Vec::new()).map(|(output, _)| output)
    }

    fn run_error(source: &str) -> InterpreterError {
        run_source(source).expect_err("expected runtime failure")
    }

    #[test]
    fn prints_hello_world() {
        let output = run_source(r#"func main() { println("Hello World"); }"#).expect("run failed");
        assert_eq!(output, "Hello World\n");
    }

    #[test]
    fn streams_output_through_closures() {
        let program = parse(r#"func main() { print("a"); print(1); println(); }"#)
            .expect("parse failed");
        let mut chunks = Vec::new();
        let mut sink = |chunk: &str| chunks.push(chunk.to_string());
        run(&program, "main", Vec::new(), &mut sink).expect("run failed");
        assert_eq!(chunks, vec!["a", "1", "\n"]);
    }

    #[test]
    fn runs_mutually_recursive_functions() {
        let output = run_source(indoc! {"
            func odd(n: number): bool {
                if (n == 0) {
                    return false;
                }
                return even(n - 1);
            }

            func even(n: number): bool {
                if (n == 0) {
                    return true;
                }
                return odd(n - 1);
            }

            func main() {
                println(odd(4));
                println(odd(5));
                println(even(4));
                println(even(5));
            }
        "})
        .expect("run failed");
        assert_eq!(output, "false\ntrue\ntrue\nfalse\n");
    }

    #[test]
    fn callee_mutates_caller_binding() {
        let output = run_source(indoc! {"
            func main() {
                var a = 0;
                incr();
                println(a);
            }

            func incr() {
                a = a + 10;
            }
        "})
        .expect("run failed");
        assert_eq!(output, "10\n");
    }

    #[test]
    fn local_declaration_shadows_caller_binding() {
        let output = run_source(indoc! {r#"
            func incr_a() {
                var a = 10;
                println("incr_a:");
                println(a);
            }

            func main() {
                var a = 0;
                incr_a();
                println("main:");
                println(a);
            }
        "#})
        .expect("run failed");
        assert_eq!(output, "incr_a:\n10\nmain:\n0\n");
    }

    #[test]
    fn block_scopes_pop_their_bindings() {
        let output = run_source(indoc! {r#"
            func main() {
                var a = "Root";
                {
                    var a = "First";
                    println(a);
                }
                if (true) {
                    var a = "Second";
                    println(a);
                }
                println(a);
            }
        "#})
        .expect("run failed");
        assert_eq!(output, "First\nSecond\nRoot\n");
    }

    #[test]
    fn executes_else_branches() {
        let output = run_source(indoc! {r#"
            func main() {
                var a = 3;
                if (a > 5) {
                    println("big");
                } else if (a > 2) {
                    println("medium");
                } else {
                    println("small");
                }
            }
        "#})
        .expect("run failed");
        assert_eq!(output, "medium\n");
    }

    #[test]
    fn trailing_expression_is_an_implicit_return() {
        let (_, result) = run_with(
            indoc! {r#"
                func main(): string {
                    "Hello";
                }
            "#},
            InterpreterOptions::default(),
            Vec::new(),
        )
        .expect("run failed");
        assert_eq!(result, Some(Value::String("Hello".to_string())));
    }

    #[test]
    fn rejects_non_trailing_implicit_return() {
        let error = run_error(indoc! {r#"
            func main() {
                "Hello";
                "World";
            }
        "#});
        assert_eq!(error.error, RuntimeError::InvalidImplicitReturn);
        assert_eq!(error.line, Some(2));
        assert_eq!(error.category(), ErrorCategory::Scope);
    }

    #[test]
    fn while_body_value_ends_the_loop() {
        let (_, result) = run_with(
            indoc! {"
                func main(): number {
                    var i = 0;
                    while (i < 10) {
                        i += 1;
                        if (i == 4) {
                            i
                        }
                    }
                    return 0;
                }
            "},
            InterpreterOptions::default(),
            Vec::new(),
        )
        .expect("run failed");
        assert_eq!(result, Some(Value::Number(4)));
    }

    #[test]
    fn passes_entrypoint_arguments() {
        let options = InterpreterOptions {
            entrypoint: "sommig".to_string(),
            seed: None,
        };
        let (_, result) = run_with(
            indoc! {"
                func sommig(n: number): number {
                    var result = 0;
                    while (n >= 1) {
                        result = result + n;
                        n = n - 1;
                    }
                    return result;
                }
            "},
            options,
            vec![Value::Number(10)],
        )
        .expect("run failed");
        assert_eq!(result, Some(Value::Number(55)));
    }

    #[test]
    fn array_writes_do_not_affect_copies() {
        let output = run_source(indoc! {"
            func main() {
                var a: array[3];
                var b = a;
                a[0] = 5;
                println(a);
                println(b);
            }
        "})
        .expect("run failed");
        assert_eq!(output, "[5, 0, 0]\n[0, 0, 0]\n");
    }

    #[test]
    fn callee_writes_caller_array() {
        let output = run_source(indoc! {r#"
            func fill() {
                a[-1] = "H";
            }

            func main() {
                var a: array[2];
                fill();
                println(a);
            }
        "#})
        .expect("run failed");
        assert_eq!(output, "[0, 72]\n");
    }

    #[test]
    fn statics_persist_across_calls() {
        let output = run_source(indoc! {"
            static var total = 100;

            func tick(): number {
                static var calls = 0;
                calls += 1;
                return calls;
            }

            func main() {
                var a = tick();
                a = tick();
                println(tick());
                total += a;
                println(total);
            }
        "})
        .expect("run failed");
        assert_eq!(output, "3\n102\n");
    }

    #[test]
    fn indexes_strings_from_either_end() {
        let error = run_error(indoc! {r#"
            func main() {
                var s = "Hello";
                println(s[-1]);
                println(s[5]);
            }
        "#});
        assert_eq!(
            error,
            InterpreterError {
                line: Some(4),
                error: RuntimeError::IndexOutOfBounds { index: 5, len: 5 },
            }
        );
        assert_eq!(error.category(), ErrorCategory::Bounds);
    }

    #[test]
    fn rand_stays_within_inclusive_bounds() {
        let output = run_source(indoc! {r#"
            func main() {
                var i = 0;
                while (i < 50) {
                    var r = rand(3, 5);
                    if (r < 3) {
                        println("low");
                    }
                    if (r > 5) {
                        println("high");
                    }
                    i += 1;
                }
                println(rand(0) == 0);
            }
        "#})
        .expect("run failed");
        assert_eq!(output, "true\n");
    }

    #[test]
    fn rejects_empty_rand_range() {
        let error = run_error("func main() { var r = rand(5, 3); }");
        assert_eq!(error.error, RuntimeError::EmptyRange { low: 5, high: 3 });
    }

    #[test]
    fn modulo_by_zero_is_a_bounds_error() {
        let error = run_error("func main() { println(5 % 0); }");
        assert_eq!(error.error, RuntimeError::DivisionByZero);
        assert_eq!(error.category(), ErrorCategory::Bounds);
    }

    #[test]
    fn reports_type_mismatches() {
        let error = run_error(r#"func main() { var a: number = "x"; }"#);
        assert_eq!(
            error.error,
            RuntimeError::InvalidType {
                expected: "number".to_string(),
                found: "string".to_string(),
            }
        );

        let error = run_error(indoc! {r#"
            func main() {
                var a: number = 1;
                a = true;
            }
        "#});
        assert_eq!(error.line, Some(3));
        assert_eq!(error.category(), ErrorCategory::Type);

        let error = run_error(indoc! {"
            func get(): number {
                println(1);
            }

            func main() {
                var a = get();
            }
        "});
        assert_eq!(
            error.error,
            RuntimeError::InvalidType {
                expected: "number".to_string(),
                found: "void".to_string(),
            }
        );
    }

    #[test]
    fn rejects_void_declarations() {
        let error = run_error("func main() { var a: void; }");
        assert_eq!(
            error.error,
            RuntimeError::VoidDeclaration {
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn checks_argument_count() {
        let error = run_error(indoc! {"
            func f(a: number) {
                println(a);
            }

            func main() {
                f();
            }
        "});
        assert_eq!(error.line, Some(6));
        assert!(error.to_string().contains("Invalid arguments for 'f'"));

        let error = run_error(r#"func main() { println("a", "b"); }"#);
        assert_eq!(error.category(), ErrorCategory::Structural);
    }

    #[test]
    fn fails_without_entrypoint() {
        let error = run_error("func start() { }");
        assert_eq!(
            error,
            InterpreterError::from(RuntimeError::EntrypointNotFound {
                name: "main".to_string()
            })
        );
    }

    #[test]
    fn missing_entrypoint_wins_over_duplicates() {
        let error = run_error(indoc! {"
            func helper() { }
            func helper() { }
        "});
        assert_eq!(
            error.error,
            RuntimeError::EntrypointNotFound {
                name: "main".to_string()
            }
        );
        assert_eq!(error.category(), ErrorCategory::Structural);
    }

    #[test]
    fn value_in_nested_block_ends_the_function() {
        let options = InterpreterOptions {
            entrypoint: "five".to_string(),
            seed: Some(7),
        };
        let (output, result) = run_with(
            indoc! {"
                func five(): number {
                    {
                        5
                    }
                    println(1);
                }
            "},
            options,
            Vec::new(),
        )
        .expect("run failed");
        assert_eq!(output, "");
        assert_eq!(result, Some(Value::Number(5)));

        let error = run_error(indoc! {"
            func main() {
                {
                    5;
                    6;
                }
            }
        "});
        assert_eq!(error.error, RuntimeError::InvalidImplicitReturn);
        assert_eq!(error.line, Some(3));
    }

    #[test]
    fn rejects_duplicate_declarations() {
        let error = run_error(indoc! {"
            func main() { }
            func main() { }
        "});
        assert_eq!(error.line, Some(2));
        assert!(matches!(
            error.error,
            RuntimeError::DuplicateDeclaration { .. }
        ));
    }

    #[test]
    fn reports_undefined_names() {
        let error = run_error("func main() { println(missing); }");
        assert_eq!(error.to_string(), "Error on line 1. Undefined variable 'missing'");

        let error = run_error("func main() { nothing(); }");
        assert_eq!(
            error.error,
            RuntimeError::UndefinedFunction {
                name: "nothing".to_string()
            }
        );
    }

    #[test]
    fn backend_returns_captured_output() {
        let program = parse(r#"func main() { print("x"); }"#).expect("parse failed");
        let output = Backend::run(&Interpreter::default(), &program).expect("run failed");
        assert_eq!(output, "x");
    }
}
