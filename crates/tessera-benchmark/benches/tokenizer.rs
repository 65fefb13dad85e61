use codspeed_criterion_compat::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tessera_benchmark::object_text;
use tessera_grammar::Language;
use tessera_tokenizer::Lexer;
use text_size::TextSize;

static COMMENTS: &str = "
// It was the year when they finally immanentized the Eschaton
/* It was the year when they finally immanentized the Eschaton */
";

/// Lexes `text` with every terminal of the grammar valid everywhere.
fn iterate(language: &Language, modes: &[u32], text: &str) {
    let mut lexer = Lexer::new(language, text.as_bytes());
    let mut position = TextSize::new(0);
    let mut after_trivia = false;

    loop {
        let token = lexer.next_token(position, modes, after_trivia);
        if token.is_end() {
            break;
        }
        position = token.end();
        after_trivia = position > token.kind_range.end();
        black_box(token);
    }
}

fn bench_iterate(c: &mut Criterion) {
    let language = tessera_objecttext::language().expect("Object Text grammar loads");
    let modes: Vec<u32> = (0..language.lex_mode_count() as u32).collect();
    let document = object_text(20);
    let comments = COMMENTS.repeat(20);
    let candidates = [("object_text", document.as_str()), ("comments", comments.as_str())];

    let mut group = c.benchmark_group("iterate");
    for (name, source) in candidates {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(name, &source, |b, &s| b.iter(|| iterate(&language, &modes, s)));
    }
    group.finish();
}

criterion_group!(benches, bench_iterate);
criterion_main!(benches);
