//! Benchmarks for the per-tick pipeline stages

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use neurocursor_core::protocol::SampleUpdate;
use neurocursor_core::types::{Baseline, Channel, LabelSet, RawSample, SignalQuality};
use neurocursor_native::config::PipelineConfig;
use neurocursor_native::decision::{
    ClassifierDecider, IntentDecider, QualityGate, ThresholdDecider, ThresholdRule,
};
use neurocursor_native::ml::{FeatureConfig, FeatureDeriver, ModelDescriptor, SoftmaxModel};
use neurocursor_native::processing::{CausalSmoother, SmoothedChannels, SmoothingMode};
use neurocursor_native::session::{ControlSession, SessionHandles};

const MODEL: &str = r#"{
    "feature_names": ["attention", "meditation", "norm_att", "norm_med", "beta_alpha_ratio", "focus_index"],
    "classes": ["LEFT", "RIGHT", "UP", "DOWN", "IDLE"],
    "scaler": { "mean": [50.0, 50.0, 0.0, 0.0, 0.6, 0.3], "scale": [20.0, 20.0, 20.0, 20.0, 0.3, 0.2] },
    "weights": [
        [0.0, 0.0, 0.0, 0.0, -2.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 2.0, 0.5],
        [1.0, 0.0, 2.0, 0.0, 0.0, 0.5],
        [0.0, 1.0, 0.0, 2.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    ],
    "bias": [0.0, 0.0, 0.0, 0.0, 0.5]
}"#;

/// Synthetic headset stream (eSense metrics plus band powers)
fn generate_samples(n: usize) -> Vec<RawSample> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let wobble = |k: f64| (t * 0.123 + k).sin();
            RawSample::default()
                .with_quality(SignalQuality::PERFECT)
                .with_channel(Channel::Attention, 50.0 + 30.0 * wobble(0.0))
                .with_channel(Channel::Meditation, 50.0 + 30.0 * wobble(1.0))
                .with_channel(Channel::Raw, 300.0 * wobble(2.0))
                .with_channel(Channel::Delta, 20_000.0 + 2_000.0 * wobble(3.0))
                .with_channel(Channel::Theta, 8_000.0 + 800.0 * wobble(4.0))
                .with_channel(Channel::LowAlpha, 5_000.0 + 500.0 * wobble(5.0))
                .with_channel(Channel::HighAlpha, 5_000.0 + 500.0 * wobble(6.0))
                .with_channel(Channel::LowBeta, 3_000.0 + 300.0 * wobble(7.0))
                .with_channel(Channel::HighBeta, 3_000.0 + 300.0 * wobble(8.0))
                .with_channel(Channel::LowGamma, 1_500.0 + 150.0 * wobble(9.0))
                .with_channel(Channel::MidGamma, 800.0 + 80.0 * wobble(10.0))
        })
        .collect()
}

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("smoothing");
    let samples = generate_samples(1024);

    let modes = [
        ("window_3", SmoothingMode::Window { size: 3 }),
        ("window_10", SmoothingMode::Window { size: 10 }),
        ("ema", SmoothingMode::Ema { alpha: 0.2 }),
    ];
    for (name, mode) in modes {
        group.bench_with_input(BenchmarkId::from_parameter(name), &mode, |b, &mode| {
            let mut smoother = CausalSmoother::new(mode);
            b.iter(|| {
                for sample in &samples {
                    black_box(smoother.push_sample(black_box(sample)));
                }
                smoother.reset();
            });
        });
    }

    group.finish();
}

fn bench_feature_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_derivation");
    let smoothed = SmoothedChannels::from_sample(&generate_samples(1)[0]);
    let baseline = Baseline::default();

    for masking in [false, true] {
        let deriver =
            FeatureDeriver::new(FeatureConfig { dominant_masking: masking, ..FeatureConfig::default() });
        group.bench_with_input(BenchmarkId::new("masking", masking), &deriver, |b, deriver| {
            b.iter(|| black_box(deriver.derive(black_box(&smoothed), black_box(&baseline))));
        });
    }

    group.finish();
}

fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("decision");
    let smoothed = SmoothedChannels::from_sample(&generate_samples(1)[0]);
    let features = FeatureDeriver::default().derive(&smoothed, &Baseline::default());
    let quality = SignalQuality::PERFECT;

    let threshold = ThresholdDecider::new(ThresholdRule::relative_preset(), QualityGate::default());
    group.bench_function("threshold", |b| {
        b.iter(|| black_box(threshold.decide(black_box(&features), quality)));
    });

    if let Ok(model) = SoftmaxModel::from_json_str(MODEL) {
        if let Ok(descriptor) = ModelDescriptor::new(Arc::new(model), LabelSet::ALL) {
            let classifier = ClassifierDecider::new(descriptor, 0.35, QualityGate::default());
            group.bench_function("softmax", |b| {
                b.iter(|| black_box(classifier.decide(black_box(&features), quality)));
            });
        }
    }

    group.finish();
}

fn bench_session_tick(c: &mut Criterion) {
    let samples = generate_samples(256);
    let updates: Vec<SampleUpdate> = samples
        .iter()
        .map(|s| {
            Channel::ALL
                .iter()
                .fold(SampleUpdate::new().quality(0), |u, &ch| u.channel(ch, s.channel(ch)))
        })
        .collect();

    c.bench_function("session_tick", |b| {
        let handles = SessionHandles::default();
        let Ok(mut session) = ControlSession::from_config(&PipelineConfig::default(), handles.clone())
        else {
            return;
        };
        let start = Instant::now();
        b.iter(|| {
            for (i, update) in updates.iter().enumerate() {
                let now = start + Duration::from_millis(i as u64 * 150);
                handles.slot.ingest_at(update, now);
                black_box(session.tick_at(now));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_smoothing,
    bench_feature_derivation,
    bench_decision,
    bench_session_tick,
);

criterion_main!(benches);
