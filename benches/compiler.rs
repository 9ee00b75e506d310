mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use smickel::backend::compiler::{Compiler, CompilerOptions};

fn bench_compiler(c: &mut Criterion) {
    let compiler = Compiler::new(CompilerOptions {
        seed: Some(0),
        ..CompilerOptions::default()
    });

    for (label, source) in common::workloads("compiler") {
        let program = common::load_program(&label, &source);

        c.bench_function(&format!("backend_compiler_total_{label}"), |b| {
            b.iter(|| {
                let assembly = compiler.compile(black_box(&program)).expect("compile");
                black_box(assembly);
            })
        });
    }
}

criterion_group!(benches, bench_compiler);
criterion_main!(benches);
