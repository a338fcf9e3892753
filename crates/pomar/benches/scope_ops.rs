//! Scope Operations Benchmarks
//!
//! Benchmarks for page declaration, scope resolution with and without caching,
//! metadata lookups and list enumeration against the mock DOM.
//!
//! Run with: `cargo bench --bench scope_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pomar::prelude::*;

struct FormPage {
    plain: Control<CheckBox>,
    cached: Control<CheckBox>,
    rows: ControlList<CheckBox>,
}

impl PageObject for FormPage {
    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
        Ok(Self {
            plain: page.find("plain", [])?,
            cached: page.find("cached", [CacheAttribute::scope().into()])?,
            rows: page.find_all(
                "rows",
                [FindAttribute::class("row").into(), CacheAttribute::scope()
                    .with_target(CacheTarget::SelfAndChildren)
                    .into()],
            )?,
        })
    }
}

fn form_dom(rows: usize) -> MockDom {
    let dom = MockDom::new();
    let _ = dom.add(MockElement::checkbox("plain"));
    let _ = dom.add(MockElement::checkbox("cached"));
    for n in 0..rows {
        let _ = dom.add(MockElement::checkbox(format!("row-{n}")).with_attribute("class", "row"));
    }
    dom
}

fn session(dom: &MockDom) -> Session {
    Session::builder().driver(dom.driver()).build().unwrap()
}

fn bench_page_declaration(c: &mut Criterion) {
    let dom = form_dom(10);
    let mut s = session(&dom);

    c.bench_function("page_declaration", |bench| {
        bench.iter(|| {
            let page = s.on::<FormPage>().unwrap();
            black_box(page.id());
        });
    });
}

fn bench_scope_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_resolution");
    let dom = form_dom(10);
    let mut s = session(&dom);
    let page = s.on::<FormPage>().unwrap();

    group.bench_function("uncached", |bench| {
        bench.iter(|| black_box(page.plain.is_checked(&mut s).unwrap()));
    });
    group.bench_function("scope_cached", |bench| {
        bench.iter(|| black_box(page.cached.is_checked(&mut s).unwrap()));
    });

    group.finish();
}

fn bench_metadata_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_lookup");

    for pushed in [1usize, 10, 50] {
        let dom = form_dom(1);
        let mut s = session(&dom);
        let page = s.on::<FormPage>().unwrap();
        for n in 0..pushed {
            page.plain
                .push(&mut s, TriggerAttribute::log_info(format!("message {n}")))
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(pushed), &pushed, |bench, _| {
            bench.iter(|| {
                let metadata = s.metadata(page.plain.id()).unwrap();
                black_box(metadata.get_all::<TriggerAttribute>().len());
            });
        });
    }

    group.finish();
}

fn bench_list_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_enumeration");

    for rows in [10usize, 100] {
        let dom = form_dom(rows);
        let mut s = session(&dom);
        let page = s.on::<FormPage>().unwrap();
        group.bench_with_input(BenchmarkId::new("count", rows), &rows, |bench, _| {
            bench.iter(|| {
                page.rows.clear_cache(&mut s).unwrap();
                black_box(page.rows.count(&mut s).unwrap());
            });
        });
        group.bench_with_input(BenchmarkId::new("cached_item", rows), &rows, |bench, _| {
            bench.iter(|| {
                let item = page.rows.get(&mut s, rows / 2).unwrap();
                black_box(item.is_checked(&mut s).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_page_declaration,
    bench_scope_resolution,
    bench_metadata_lookup,
    bench_list_enumeration
);
criterion_main!(benches);
