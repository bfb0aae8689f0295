//! Tick throughput benchmarks
//!
//! Measures one full timer tick (filter step, neuron loop, paced output)
//! across ensemble sizes and output widths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nef_core::{
    encode_payload, Ensemble, EnsembleConfig, EnsembleParameters, FilterParameters, Fixed,
    InputChannelConfig, McPacket, PacketSink, PacingStrategy, RouteEntry,
};
use std::time::Duration;

/// Sink that drops packets, so the benchmark measures the core alone.
struct Discard(usize);

impl PacketSink for Discard {
    fn send(&mut self, packet: McPacket) {
        self.0 = self.0.wrapping_add(packet.payload as usize);
    }
}

fn ensemble(n_neurons: usize, dims: usize, pacing: PacingStrategy) -> Ensemble {
    let params = EnsembleParameters::new(n_neurons, dims, dims, 2, Fixed::from_num(0.05));
    let bias = (0..n_neurons)
        .map(|i| Fixed::from_num(0.5 + (i % 17) as f64 * 0.1))
        .collect();
    let encoders = (0..n_neurons * dims)
        .map(|i| Fixed::from_num(((i * 7) % 5) as f64 * 0.5 - 1.0))
        .collect();
    let decoders = (0..n_neurons * dims)
        .map(|i| Fixed::from_num(((i * 3) % 11) as f64 * 0.001))
        .collect();
    let keys = (0..dims as u32).map(|d| 0x8000 | d).collect();
    let cfg = EnsembleConfig::new(params, bias, encoders, decoders, keys)
        .with_input(
            InputChannelConfig::new(dims)
                .with_filter(FilterParameters::lowpass(0.005, 0.001))
                .with_route(RouteEntry::new(0x1000, 0xffff_ff00, 0, 0xff)),
        )
        .with_pacing(pacing, 0);
    Ensemble::new(&cfg).expect("benchmark configuration")
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("ensemble_tick");
    group.measurement_time(Duration::from_secs(5));

    for &(n_neurons, dims) in &[(100, 1), (100, 8), (500, 4), (2000, 16)] {
        let mut ens = ensemble(n_neurons, dims, PacingStrategy::Interleaved);
        let rx = ens.receiver();
        let mut sink = Discard(0);
        group.bench_with_input(
            BenchmarkId::new("interleaved", format!("{}x{}", n_neurons, dims)),
            &dims,
            |b, &dims| {
                b.iter(|| {
                    for d in 0..dims as u32 {
                        let _ = rx.receive(0x1000 | d, encode_payload(Fixed::from_num(0.25)));
                    }
                    black_box(ens.tick(&mut sink))
                })
            },
        );
    }
    group.finish();
}

fn bench_receive(c: &mut Criterion) {
    let ens = ensemble(100, 16, PacingStrategy::Burst);
    let rx = ens.receiver();
    let payload = encode_payload(Fixed::from_num(0.125));
    c.bench_function("receive_routed_packet", |b| {
        b.iter(|| black_box(rx.receive(black_box(0x100f), payload)))
    });
}

criterion_group!(benches, bench_tick, bench_receive);
criterion_main!(benches);
