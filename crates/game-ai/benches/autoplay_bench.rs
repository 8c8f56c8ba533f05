use criterion::{black_box, criterion_group, criterion_main, Criterion};
use game_ai::{autoplay, GreedyPolicy, RandomPolicy};

fn bench_autoplay(c: &mut Criterion) {
    let store = content::ContentStore::builtin().unwrap();
    let cfg = store.get("cash-flow-stress-test").unwrap().clone();

    c.bench_function("greedy cash-flow play-through", |b| {
        b.iter(|| black_box(autoplay(&cfg, &mut GreedyPolicy).unwrap()))
    });

    c.bench_function("1000 seeded random play-throughs", |b| {
        b.iter(|| {
            for seed in 0..1000u64 {
                let _ = black_box(autoplay(&cfg, &mut RandomPolicy::seeded(seed)));
            }
        })
    });
}

criterion_group!(benches, bench_autoplay);
criterion_main!(benches);
