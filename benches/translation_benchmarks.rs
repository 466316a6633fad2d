//! Benchmarks for the translation pipeline.
//!
//! Benchmarks cover:
//! - SQL parsing (text → AST)
//! - Function rewriting against an in-memory mapping set
//! - Full offline translation (parse → rewrite → compile)
//! - TypeIdentifier over derived unions of growing width
//!
//! Run with: `cargo bench`

use catalogsql::ast::parse_single;
use catalogsql::mapping::{MappingSet, PropertyMapping, TableMapping, TableType};
use catalogsql::translation::{translate_offline, Pipeline};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

const SIMPLE_FUNCTIONS: &str = "SELECT PRESENTATION(d._number), YEAR(d._date) \
    FROM _Document1 d \
    WHERE d._date >= DATETIME(2024, 1, 1)";

const TYPE_IDENTIFIERS: &str = "SELECT TYPEIDENTIFIER(d._fld1rref), TYPEIDENTIFIER(d._owner_rrref) \
    FROM _Document1 d \
    WHERE TYPEIDENTIFIER(d._owner_rrref) = TYPEIDENTIFIER(d._fld1rref)";

const NESTED_CALLS: &str = "SELECT BEGINOFPERIOD(DATETIME(2024, 5, 17, 10, 0, 0), 'month'), \
    QUARTER(DATETIME(2024, 5, 17)), \
    SUBSTRING(PRESENTATION(d._number), 1, 4) \
    FROM _Document1 d";

/// Document tables `_Document1` .. `_Document{n}`, each referencing
/// `_Reference{i}` through a single-layout `_fld{i}rref` column.
fn mappings(tables: usize) -> MappingSet {
    let mut all = Vec::with_capacity(tables * 2);
    for i in 1..=tables {
        let catalog = format!("Catalog.C{}", i);
        all.push(
            TableMapping::new(&catalog, format!("_Reference{}", i), TableType::Catalog)
                .with_index(i as i32),
        );
        all.push(
            TableMapping::new(
                format!("Document.D{}", i),
                format!("_Document{}", i),
                TableType::Document,
            )
            .with_property(PropertyMapping::single(
                "Ref",
                format!("_fld{}rref", i),
                Some(catalog.as_str()),
            ))
            .with_property(PropertyMapping::union("Owner", "_owner_rrref", "_owner_rtref")),
        );
    }
    MappingSet::new(all).unwrap()
}

fn union_query(branches: usize) -> String {
    let body = (1..=branches)
        .map(|i| format!("SELECT t{i}._fld{i}rref AS item FROM _Document{i} t{i}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    format!("SELECT TYPEIDENTIFIER(u.item) FROM ({}) AS u", body)
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let cases = [
        ("simple_functions", SIMPLE_FUNCTIONS),
        ("type_identifiers", TYPE_IDENTIFIERS),
        ("nested_calls", NESTED_CALLS),
    ];
    for (name, sql) in &cases {
        group.bench_with_input(BenchmarkId::new("parse", name), sql, |b, sql| {
            b.iter(|| parse_single(black_box(sql)).unwrap());
        });
    }
    group.finish();
}

fn bench_rewriting(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewriting");
    let set = mappings(1);
    let pipeline = Pipeline::with_defaults(&set);
    let cases = [
        ("simple_functions", SIMPLE_FUNCTIONS),
        ("type_identifiers", TYPE_IDENTIFIERS),
        ("nested_calls", NESTED_CALLS),
    ];
    for (name, sql) in &cases {
        let ast = parse_single(sql).unwrap();
        group.bench_with_input(BenchmarkId::new("rewrite", name), &ast, |b, ast| {
            b.iter(|| pipeline.run(black_box(ast.clone())).unwrap());
        });
    }
    group.finish();
}

fn bench_derived_unions(c: &mut Criterion) {
    let mut group = c.benchmark_group("derived_unions");
    for branches in [2, 8, 32] {
        let set = mappings(branches);
        let sql = union_query(branches);
        group.bench_with_input(
            BenchmarkId::new("translate", branches),
            &sql,
            |b, sql| {
                b.iter(|| translate_offline(black_box(sql), &set).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parsing, bench_rewriting, bench_derived_unions);
criterion_main!(benches);
