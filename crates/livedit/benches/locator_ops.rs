//! Locator Operations Benchmarks
//!
//! Benchmarks for locator generation, strict resolution and tiered
//! re-resolution over documents of increasing size.
//!
//! Run with: `cargo bench --bench locator_ops`

#![allow(clippy::unwrap_used, missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livedit::locator::generate_selector_candidates;
use livedit::verify::resolve_tiered;
use livedit::{build_locator, LocatorConfig, MemoryDocument, VerifierConfig};

/// A list page with `rows` cards, every fifth one carrying a test id
fn page(rows: usize) -> String {
    let mut html = String::from("<html><head></head><body><main id=\"app\"><ul class=\"list\">");
    for i in 0..rows {
        if i % 5 == 0 {
            html.push_str(&format!(
                "<li class=\"card\" data-testid=\"row-{i}\"><span class=\"title\">Item {i}</span></li>"
            ));
        } else {
            html.push_str(&format!(
                "<li class=\"card\"><span class=\"title\">Item {i}</span></li>"
            ));
        }
    }
    html.push_str("</ul></main></body></html>");
    html
}

fn bench_candidate_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate_generation");

    for rows in [10, 100, 500] {
        let doc = MemoryDocument::parse(&page(rows)).unwrap();
        let target = doc.select_first("li:nth-of-type(3) > span").unwrap().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |bench, _| {
            bench.iter(|| {
                let candidates =
                    generate_selector_candidates(&doc, black_box(target), doc_root(&doc), 5);
                black_box(candidates);
            });
        });
    }

    group.finish();
}

fn bench_strict_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("strict_locate");

    for rows in [10, 100, 500] {
        let doc = MemoryDocument::parse(&page(rows)).unwrap();
        let target = doc.select_first("[data-testid=\"row-5\"]").unwrap().unwrap();
        let locator = build_locator(&doc, target, &LocatorConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |bench, _| {
            bench.iter(|| black_box(locator.locate(&doc)));
        });
    }

    group.finish();
}

fn bench_relaxed_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("relaxed_resolution");

    for rows in [10, 100, 500] {
        let before = MemoryDocument::parse(&page(rows)).unwrap();
        let target = before.select_first("li:nth-of-type(2)").unwrap().unwrap();
        let locator = build_locator(&before, target, &LocatorConfig::default()).unwrap();
        // same rows, one level deeper under a renamed list
        let after = MemoryDocument::parse(&page(rows).replace(
            "<ul class=\"list\">",
            "<div class=\"scroller\"><ul class=\"list-v2\">",
        ).replace("</ul>", "</ul></div>"))
        .unwrap();
        let config = VerifierConfig::default();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |bench, _| {
            bench.iter(|| black_box(resolve_tiered(&after, &locator, None, None, &config)));
        });
    }

    group.finish();
}

fn doc_root(doc: &MemoryDocument) -> livedit::NodeId {
    use livedit::DocumentHost;
    doc.document()
}

criterion_group!(
    benches,
    bench_candidate_generation,
    bench_strict_locate,
    bench_relaxed_resolution
);
criterion_main!(benches);
