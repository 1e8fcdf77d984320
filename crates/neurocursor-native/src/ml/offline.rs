//! Training features from labelled recordings
//!
//! Training rows must be smoothed and derived by exactly the code that runs
//! online, or a model trained on them silently degrades. Recordings are
//! smoothed per label group in timestamp order (a trial of one direction
//! never leaks into another), and the resulting rows keep their input order.

use std::collections::BTreeMap;

use neurocursor_core::types::{Baseline, IntentLabel, RawSample, SignalQuality};
use serde::{Deserialize, Serialize};

use crate::ml::features::{FeatureDeriver, FeatureVector};
use crate::processing::smoother::{CausalSmoother, SmoothingMode};

/// One labelled sample from a guided recording session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelledRecord {
    /// Capture time (ms since the recording epoch)
    pub timestamp_ms: u64,
    /// Direction the user was asked to focus on
    pub label: IntentLabel,
    /// Captured sample
    pub sample: RawSample,
}

/// Derived features for one record
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingRow {
    /// Capture time of the source record
    pub timestamp_ms: u64,
    /// Record label
    pub label: IntentLabel,
    /// Features as the online pipeline would derive them
    pub features: FeatureVector,
}

/// Smooth and derive training rows.
///
/// Records above `max_quality` are dropped before smoothing. Within each
/// label, records are smoothed in `(timestamp, input position)` order.
#[must_use]
pub fn smooth_recording(
    records: &[LabelledRecord],
    mode: SmoothingMode,
    deriver: &FeatureDeriver,
    baseline: &Baseline,
    max_quality: SignalQuality,
) -> Vec<TrainingRow> {
    let kept: Vec<&LabelledRecord> =
        records.iter().filter(|r| r.sample.is_accepted(max_quality)).collect();

    let mut order: Vec<usize> = (0..kept.len()).collect();
    order.sort_by_key(|&i| (kept[i].label, kept[i].timestamp_ms));

    let mut smoothers: BTreeMap<IntentLabel, CausalSmoother> = BTreeMap::new();
    let mut rows: Vec<Option<TrainingRow>> = vec![None; kept.len()];
    for i in order {
        let record = kept[i];
        let smoother =
            smoothers.entry(record.label).or_insert_with(|| CausalSmoother::new(mode));
        let smoothed = smoother.push_sample(&record.sample);
        rows[i] = Some(TrainingRow {
            timestamp_ms: record.timestamp_ms,
            label: record.label,
            features: deriver.derive(&smoothed, baseline),
        });
    }

    tracing::debug!("Derived {} training rows from {} records", kept.len(), records.len());
    rows.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::Feature;
    use crate::processing::smoother::SmoothedChannels;
    use neurocursor_core::types::Channel;

    fn record(timestamp_ms: u64, label: IntentLabel, att: f64) -> LabelledRecord {
        LabelledRecord {
            timestamp_ms,
            label,
            sample: RawSample::default()
                .with_quality(SignalQuality::PERFECT)
                .with_channel(Channel::Attention, att),
        }
    }

    fn attention(row: &TrainingRow) -> f64 {
        row.features.get(Feature::Base(Channel::Attention))
    }

    #[test]
    fn test_groups_do_not_leak() {
        let records = vec![
            record(2, IntentLabel::Up, 90.0),
            record(1, IntentLabel::Left, 10.0),
            record(1, IntentLabel::Up, 60.0),
            record(3, IntentLabel::Left, 20.0),
        ];
        let rows = smooth_recording(
            &records,
            SmoothingMode::Window { size: 3 },
            &FeatureDeriver::default(),
            &Baseline::default(),
            SignalQuality::new(100),
        );

        // Input order is preserved; values are smoothed within each label by time
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].timestamp_ms, 2);
        assert!((attention(&rows[0]) - 75.0).abs() < 1e-9);
        assert!((attention(&rows[1]) - 10.0).abs() < 1e-9);
        assert!((attention(&rows[2]) - 60.0).abs() < 1e-9);
        assert!((attention(&rows[3]) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_poor_quality_records_dropped() {
        let mut noisy = record(2, IntentLabel::Up, 500.0);
        noisy.sample.quality = SignalQuality::NO_CONTACT;
        let records = vec![record(1, IntentLabel::Up, 40.0), noisy, record(3, IntentLabel::Up, 60.0)];

        let rows = smooth_recording(
            &records,
            SmoothingMode::default(),
            &FeatureDeriver::default(),
            &Baseline::default(),
            SignalQuality::new(100),
        );
        assert_eq!(rows.len(), 2);
        assert!((attention(&rows[1]) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_matches_online_path() {
        let values = [20.0, 22.0, 85.0, 88.0, 90.0];
        let records: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| record(i as u64, IntentLabel::Up, *v))
            .collect();
        let deriver = FeatureDeriver::default();
        let baseline = Baseline::default();
        let rows = smooth_recording(
            &records,
            SmoothingMode::default(),
            &deriver,
            &baseline,
            SignalQuality::new(100),
        );

        let mut online = CausalSmoother::default();
        for (row, record) in rows.iter().zip(&records) {
            let smoothed: SmoothedChannels = online.push_sample(&record.sample);
            assert_eq!(row.features, deriver.derive(&smoothed, &baseline));
        }
    }
}
