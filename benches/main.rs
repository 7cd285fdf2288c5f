use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use tlgc::{Address, Collector, Options};

fn bench_alloc_free(c: &mut Criterion) {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    // Keep the automatic trigger out of the measurement.
    gc.pause();
    c.bench_function("alloc_free", |b| {
        b.iter(|| {
            let block = gc.alloc(64);
            gc.free(block);
        })
    });
}

fn bench_collect_rooted(c: &mut Criterion) {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    for _ in 0..1000 {
        gc.alloc_static(64, None);
    }
    c.bench_function("collect_1000_rooted", |b| {
        b.iter(|| gc.collect())
    });
}

criterion_group!(benches, bench_alloc_free, bench_collect_rooted);
criterion_main!(benches);
