use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::error::ErrorCategory;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    RuntimeSuccess,
    FrontendError,
    RuntimeError,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BenchConfig {
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExpectedOutcome {
    pub stdout_file: Option<String>,
    pub error_contains: Option<String>,
    pub category: Option<ErrorCategory>,
}

/// What the code generator is expected to do with the same program.
#[derive(Debug, Deserialize, Clone)]
pub struct CompilerExpectation {
    pub succeeds: bool,
    pub error_contains: Option<String>,
    pub category: Option<ErrorCategory>,
    /// Fragments that must appear in the generated assembly.
    #[serde(default)]
    pub contains: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaseSpec {
    pub class: CaseClass,
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    /// Passed to the entrypoint after [`Value::parse_argument`](crate::backend::interpreter::Value::parse_argument).
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub expected: ExpectedOutcome,
    pub compiler: Option<CompilerExpectation>,
}

fn default_entrypoint() -> String {
    "main".to_string()
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }

    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading {}", self.program_path.display()))
    }

    /// Expected stdout, normalized with [`normalize_output`].
    pub fn expected_stdout(&self) -> Result<String> {
        let stdout_file = self
            .spec
            .expected
            .stdout_file
            .as_deref()
            .with_context(|| format!("Missing stdout_file in {}", self.name))?;
        Ok(normalize_output(&self.read_text(stdout_file)?))
    }
}

/// Loads every `<dir>/case.yaml` + `<dir>/program.smk` pair under
/// `programs_dir`, sorted by case name.
pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.smk");
        ensure!(
            program_path.exists(),
            "Missing program.smk for case {}",
            path.display()
        );

        let case_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let case_raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&case_raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;
        validate(&case_name, &spec)?;

        cases.push(Case {
            name: case_name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

fn validate(name: &str, spec: &CaseSpec) -> Result<()> {
    match spec.class {
        CaseClass::RuntimeSuccess => ensure!(
            spec.expected.stdout_file.is_some(),
            "Case {name} is runtime_success but has no stdout_file"
        ),
        CaseClass::FrontendError | CaseClass::RuntimeError => ensure!(
            spec.expected.error_contains.is_some(),
            "Case {name} expects an error but has no error_contains"
        ),
    }
    if spec.bench.enabled {
        ensure!(
            !spec.bench.tags.is_empty(),
            "Case {name} has bench enabled but no tags"
        );
    }
    if let Some(compiler) = &spec.compiler {
        ensure!(
            compiler.succeeds || compiler.error_contains.is_some() || compiler.category.is_some(),
            "Case {name} expects a compile error but describes none"
        );
    }
    Ok(())
}

pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}
