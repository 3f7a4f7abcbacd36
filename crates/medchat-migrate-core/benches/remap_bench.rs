use criterion::{black_box, criterion_group, criterion_main, Criterion};
use medchat_migrate_core::{remap, remap_str, SourceId, TargetId};

fn fixture_ids(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("{index:024x}")).collect()
}

fn bench_remap(c: &mut Criterion) {
    let raw_ids = fixture_ids(10_000);
    let parsed = raw_ids
        .iter()
        .filter_map(|raw| SourceId::parse(raw).ok())
        .collect::<Vec<_>>();

    c.bench_function("remap_parsed_10k", |b| {
        b.iter(|| {
            for id in &parsed {
                black_box(remap(black_box(id)));
            }
        });
    });

    c.bench_function("remap_str_and_render_10k", |b| {
        b.iter(|| {
            for raw in &raw_ids {
                if let Ok(target) = remap_str(black_box(raw)) {
                    black_box(target.to_string());
                }
            }
        });
    });

    c.bench_function("target_id_parse_10k", |b| {
        let rendered = parsed.iter().map(|id| remap(id).to_string()).collect::<Vec<_>>();
        b.iter(|| {
            for text in &rendered {
                black_box(TargetId::parse(black_box(text)).ok());
            }
        });
    });
}

criterion_group!(benches, bench_remap);
criterion_main!(benches);
