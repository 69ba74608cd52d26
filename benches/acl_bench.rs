//! Benchmarks for filer-acl
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use filer_acl::acl::{format_acl, parse_acl, Role, RoleTranslator};

const SAMPLE_ACL: &str = "\
D:fd:bob@example.org:dD
A:fd:bob@example.org:rwaDdxtTnNcy
A:fdg:lab@example.org:rwaDdxtTnNcCoy
A:fd:carol@example.org:rxtncy
A:fd:dave@example.org:x
A:fd:OWNER@:rwaDxtTnNcCy
A:fdg:GROUP@:rxtncy
A:fd:EVERYONE@:rxtncy
";

fn benchmark_parse_acl(c: &mut Criterion) {
    c.bench_function("parse_acl", |b| {
        b.iter(|| {
            let aces = parse_acl(black_box(SAMPLE_ACL)).unwrap();
            black_box(aces);
        })
    });
}

fn benchmark_classify(c: &mut Criterion) {
    let translator = RoleTranslator::netapp();
    let aces = parse_acl(SAMPLE_ACL).unwrap();

    c.bench_function("classify_acl", |b| {
        b.iter(|| {
            for ace in &aces {
                black_box(translator.classify(ace));
            }
        })
    });
}

fn benchmark_to_aces(c: &mut Criterion) {
    let translator = RoleTranslator::netapp();

    c.bench_function("role_to_aces", |b| {
        b.iter(|| {
            let mut aces = Vec::new();
            for role in [Role::Manager, Role::Contributor, Role::Writer, Role::Viewer] {
                aces.extend(translator.to_aces(role, "bob@example.org", false, true));
            }
            black_box(format_acl(&aces));
        })
    });
}

criterion_group!(benches, benchmark_parse_acl, benchmark_classify, benchmark_to_aces);
criterion_main!(benches);
