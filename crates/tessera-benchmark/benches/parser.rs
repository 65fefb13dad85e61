use std::hint::black_box;

use codspeed_criterion_compat::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tessera_benchmark::object_text;
use tessera_parse::Parser;
use tessera_syntax::InputEdit;

fn parser() -> Parser {
    Parser::new(tessera_objecttext::language().expect("Object Text grammar loads"))
}

fn benchmark_parser(c: &mut Criterion) {
    let parser = parser();
    let mut group = c.benchmark_group("Parser Benchmark");

    for parts in [1, 10, 100] {
        let text = object_text(parts);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse_code", parts), &text, |b, text| {
            b.iter(|| black_box(parser.parse_str(text, None).expect("no limits set")));
        });
    }

    group.finish();
}

fn benchmark_reparse(c: &mut Criterion) {
    let parser = parser();
    let text = object_text(100);
    let tree = parser.parse_str(&text, None).expect("no limits set");

    let start = text.find("cosmoteer.part50\n").expect("part 50 exists") + "cosmoteer.".len();
    let range = start..start + "part".len();
    let edit = InputEdit::replace(&text, range.clone(), "hull");
    let mut updated = text.clone();
    updated.replace_range(range, "hull");

    let mut group = c.benchmark_group("Incremental Benchmark");
    group.throughput(Throughput::Bytes(updated.len() as u64));
    group.bench_function("edit_identifier", |b| {
        b.iter(|| {
            let edited = tree.edit(&edit);
            black_box(parser.parse_str(&updated, Some(&edited)).expect("no limits set"))
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_parser, benchmark_reparse);
criterion_main!(benches);
