use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use heapmap_log::Event;
use heapmap_replay::{ReplayConfig, ReplayEngine};

fn synthetic_events(count: u64) -> Vec<Event> {
    let mut events = Vec::with_capacity(count as usize);
    for i in 0..count {
        let pointer = (i % 512) * 0x1400;
        if i % 3 == 2 {
            events.push(Event::Free { pointer });
        } else {
            events.push(Event::Allocation {
                size: 64 + (i % 97) * 48,
                pointer,
            });
        }
    }
    events
}

fn bench_compute_state(c: &mut Criterion) {
    let events = synthetic_events(20_000);
    let mut group = c.benchmark_group("compute_state");

    for interval in [0usize, 256, 4096] {
        let engine = ReplayEngine::new(
            events.clone(),
            ReplayConfig {
                snapshot_interval: interval,
                ..Default::default()
            },
        );
        let step = engine.event_count() - 1;
        group.bench_with_input(BenchmarkId::new("interval", interval), &step, |b, &step| {
            b.iter(|| engine.compute_state(black_box(step)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_state);
criterion_main!(benches);
