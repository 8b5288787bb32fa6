use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;
use xpathkit::{DynamicContextBuilder, Expression, Value, XmlDocument, evaluate_with, parse};

fn sample_queries() -> Vec<&'static str> {
    vec![
        "(1 + 2 * 3 - 4 div 5 * 6 - 7) * (3 - 5)",
        "(1 to 1000)[. mod 5 = 0]",
        "sum(for $n in 1 to 100 return $n * $n)",
        "some $x in 1 to 500 satisfies $x * $x = 62500",
        "let $a := 3, $b := $a * $a return if ($b > $a) then 'big' else 'small'",
    ]
}

fn sample_document() -> XmlDocument {
    let mut xml = String::from("<catalog>");
    for i in 0..200 {
        let kind = if i % 3 == 0 { "book" } else { "disc" };
        xml.push_str(&format!("<item id=\"i{i}\" kind=\"{kind}\"><price>{}</price></item>", 10 + i));
    }
    xml.push_str("</catalog>");
    XmlDocument::parse(&xml).expect("sample document")
}

fn benchmark_parser(c: &mut Criterion) {
    let queries = sample_queries();
    c.bench_function("parser/parse", |b| {
        b.iter(|| {
            for q in &queries {
                let ast = parse(black_box(q)).expect("parse failure");
                black_box(ast);
            }
        })
    });
}

fn benchmark_evaluator(c: &mut Criterion) {
    let ctx = DynamicContextBuilder::new().with_variable("n", 10).build();
    let parsed: Vec<(&str, Expression)> = sample_queries()
        .into_iter()
        .map(|q| (q, parse(q).expect("parse failure")))
        .collect();

    let mut group = c.benchmark_group("evaluator/evaluate");
    for (name, ast) in &parsed {
        group.bench_with_input(BenchmarkId::from_parameter(name), ast, |b, ast| {
            b.iter(|| {
                let result = evaluate_with(ast, black_box(&ctx)).expect("eval failure");
                black_box(result);
            });
        });
    }
    group.finish();
}

fn benchmark_documents(c: &mut Criterion) {
    let ctx = DynamicContextBuilder::new()
        .with_document(Arc::new(sample_document()))
        .with_variable("limit", 100)
        .build();
    let queries = [
        "count(//item[@kind = 'book'])",
        "sum(//item/price[. > $limit])",
        "//item[last()]/@id",
    ];

    let mut group = c.benchmark_group("documents/query");
    for q in queries {
        let ast = parse(q).expect("parse failure");
        group.bench_with_input(BenchmarkId::from_parameter(q), &ast, |b, ast| {
            b.iter(|| {
                let result: Value = evaluate_with(ast, black_box(&ctx)).expect("eval failure");
                black_box(result);
            });
        });
    }
    group.finish();

    let vars = HashMap::new();
    c.bench_function("documents/run_unbound", |b| {
        b.iter(|| black_box(xpathkit::run(black_box("count(1 to 100)"), &vars, None)))
    });
}

criterion_group!(benches, benchmark_parser, benchmark_evaluator, benchmark_documents);
criterion_main!(benches);
