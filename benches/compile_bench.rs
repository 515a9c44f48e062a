//! Benchmarks for session compilation.
//!
//! Run with: cargo bench --bench compile_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use notate::node::{AddAction, ControlValue, NodeId};
use notate::session::Session;
use notate::synthdef::OpaqueSynthDef;

fn build_session(voice_count: u32) -> Session {
    let mut session = Session::new(2, 0);
    let name = session.register_synthdef(OpaqueSynthDef::new(vec![0, 1, 2, 3], vec!["freq".to_string()]));
    let root = NodeId(0);
    for i in 0..voice_count {
        session
            .add_synth(
                (i as f64) * 0.1,
                AddAction::AddToTail(root),
                &name,
                Some(5.0),
                vec![("freq".to_string(), ControlValue::Scalar(220.0 + i as f32))],
            )
            .expect("valid session construction");
    }
    session
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_bundles");
    for voice_count in [8u32, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(voice_count), &voice_count, |b, &voice_count| {
            b.iter(|| {
                let mut session = build_session(voice_count);
                black_box(session.to_bundles(Some(10.0)).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
