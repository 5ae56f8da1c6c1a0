//! Pipeline Performance Benchmarks
//!
//! This module benchmarks each stage of the ssanf pipeline:
//! - SSA construction (phi placement and renaming)
//! - ANF lowering, nested and flat
//! - Provenance printing
//! - Parsing the provenance text
//! - SSA reconstruction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ssanf_anf::{lower, pretty_print_with_provenance, reconstruct, LowerOptions, PrintStyle};
use ssanf_benchmarks::{diamond_chain, loop_nest};
use ssanf_cfg::Cfg;
use ssanf_ssa::build_ssa;

fn inputs() -> Vec<(String, Cfg)> {
    vec![
        ("diamonds_16".to_string(), diamond_chain(16)),
        ("diamonds_128".to_string(), diamond_chain(128)),
        ("loops_4".to_string(), loop_nest(4)),
        ("loops_32".to_string(), loop_nest(32)),
    ]
}

// ============================================================================
// Forward Direction
// ============================================================================

fn bench_build_ssa(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_ssa");

    for (name, cfg) in inputs() {
        group.throughput(Throughput::Elements(cfg.blocks.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(&name), &cfg, |b, cfg| {
            b.iter(|| build_ssa(black_box(cfg)).unwrap())
        });
    }

    group.finish();
}

fn bench_lower(c: &mut Criterion) {
    let mut group = c.benchmark_group("lower");

    for (name, cfg) in inputs() {
        let program = build_ssa(&cfg).unwrap();
        for nest_blocks in [true, false] {
            let id = if nest_blocks { "nested" } else { "flat" };
            group.bench_with_input(BenchmarkId::new(id, &name), &program, |b, program| {
                b.iter(|| lower(black_box(program), LowerOptions { nest_blocks }).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_print(c: &mut Criterion) {
    let mut group = c.benchmark_group("print_with_provenance");

    for (name, cfg) in inputs() {
        let anf = lower(&build_ssa(&cfg).unwrap(), LowerOptions::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(&name), &anf, |b, anf| {
            b.iter(|| pretty_print_with_provenance(black_box(anf), PrintStyle::Symbolic))
        });
    }

    group.finish();
}

// ============================================================================
// Reverse Direction
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for (name, cfg) in inputs() {
        let anf = lower(&build_ssa(&cfg).unwrap(), LowerOptions::default()).unwrap();
        let text = pretty_print_with_provenance(&anf, PrintStyle::Symbolic);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(&name), &text, |b, text| {
            b.iter(|| ssanf_parser::parse(black_box(text)).unwrap())
        });
    }

    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");

    for (name, cfg) in inputs() {
        let anf = lower(&build_ssa(&cfg).unwrap(), LowerOptions::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(&name), &anf, |b, anf| {
            b.iter(|| reconstruct(black_box(anf)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(forward, bench_build_ssa, bench_lower, bench_print);
criterion_group!(reverse, bench_parse, bench_reconstruct);
criterion_main!(forward, reverse);
