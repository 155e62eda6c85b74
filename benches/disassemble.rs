use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sentinel_acl::cfg::CfgBuilder;
use sentinel_acl::disassembler::Disassembler;
use sentinel_acl::taint::TaintEngine;

/// A mid-size runtime blob shaped like a handful of guarded/unguarded setters
/// back to back, repeated to approximate a contract with several state
/// variables worth of write sites.
fn sample_bytecode() -> Vec<u8> {
    let setter = [
        0x33, 0x60, 0x00, 0x14, 0x60, 0x0c, 0x57, 0x60, 0x00, 0x60, 0x00, 0xfd, 0x5b, 0x60, 0x04, 0x35, 0x60, 0x00,
        0x55,
    ];
    let mut code = Vec::new();
    for _ in 0..64 {
        code.extend_from_slice(&setter);
    }
    code.push(0x00); // STOP
    code
}

fn disassemble_benchmark(c: &mut Criterion) {
    let bytecode = sample_bytecode();
    c.bench_function("disassemble", |b| {
        b.iter(|| {
            let disasm = Disassembler::disassemble(black_box(&bytecode));
            black_box(disasm);
        })
    });
}

fn cfg_benchmark(c: &mut Criterion) {
    let bytecode = sample_bytecode();
    let disasm = Disassembler::disassemble(&bytecode);
    c.bench_function("cfg_build", |b| {
        b.iter(|| {
            let cfg = CfgBuilder::build(black_box(&disasm));
            black_box(cfg);
        })
    });
}

fn taint_benchmark(c: &mut Criterion) {
    let bytecode = sample_bytecode();
    let disasm = Disassembler::disassemble(&bytecode);
    let cfg = CfgBuilder::build(&disasm);
    let mut key_slots = std::collections::HashSet::new();
    key_slots.insert(0usize);
    c.bench_function("taint_analyze", |b| {
        b.iter(|| {
            let paths = TaintEngine::analyze(black_box(&cfg), black_box(&key_slots));
            black_box(paths);
        })
    });
}

criterion_group!(benches, disassemble_benchmark, cfg_benchmark, taint_benchmark);
criterion_main!(benches);
