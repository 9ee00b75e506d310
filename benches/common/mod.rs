#![allow(dead_code)]
use std::path::Path;

use smickel::ast::Program;
use smickel::fixtures::load_cases;
use smickel::parser;

/// `(case name, source)` for every golden case opted into benchmarks with `tag`.
pub fn workloads(tag: &str) -> Vec<(String, String)> {
    load_cases(Path::new("tests/programs"))
        .expect("load golden cases")
        .into_iter()
        .filter(|case| case.spec.bench.enabled && case.spec.bench.tags.iter().any(|t| t == tag))
        .map(|case| {
            let source = case.source().unwrap_or_else(|err| panic!("{}: {err}", case.name));
            (case.name, source)
        })
        .collect()
}

pub fn load_program(label: &str, source: &str) -> Program {
    parser::parse(source).unwrap_or_else(|err| panic!("parse {label}: {err}"))
}
