// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for note streams, adaptive windows and multi-scale
//! aggregation over realistic observation sessions.

use cadence_core::domain::aggregation::{aggregate, AggregationOptions, MultiScaleAggregator};
use cadence_core::domain::config::{AggregationConfig, CoherenceWeights, TimeScale};
use cadence_core::domain::temporal::{CoherenceStatus, Salience, TemporalNote, TemporalNoteStream};
use cadence_core::domain::window_selector::{AdaptiveWindowSelector, NotePattern};
use chrono::{DateTime, Duration, Utc};

fn session_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-04T09:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn stream(points: &[(i64, f64, Option<&str>)]) -> TemporalNoteStream {
    let start = session_start();
    let mut stream = TemporalNoteStream::new();
    for (ms, score, observation) in points {
        stream
            .observe(
                start + Duration::milliseconds(*ms),
                *score,
                observation.map(str::to_string),
                Salience::Normal,
            )
            .unwrap();
    }
    stream
}

#[test]
fn test_constant_stream_every_200ms_is_consistent() {
    let points: Vec<(i64, f64, Option<&str>)> = (0..50).map(|i| (i * 200, 8.0, None)).collect();
    let notes = stream(&points).into_notes();

    let rec = AdaptiveWindowSelector::default().calculate_optimal_window_size(&notes);
    assert_eq!(rec.pattern, NotePattern::Consistent);
    assert_eq!(rec.window_size_ms, 10_000);
}

#[test]
fn test_partition_completeness_across_default_scales() {
    let points: Vec<(i64, f64, Option<&str>)> = (0..40)
        .map(|i| (i * 137 + (i % 5) * 11, (i % 11) as f64, None))
        .collect();
    let notes = stream(&points).into_notes();

    let result = aggregate(&notes, &AggregationOptions::default()).unwrap();
    for name in ["immediate", "short", "medium", "long"] {
        let scale = result.get(name).unwrap();
        let mut seen: Vec<DateTime<Utc>> = scale
            .windows
            .iter()
            .flat_map(|w| w.notes.iter().map(|n| n.timestamp))
            .collect();
        seen.sort();
        let mut expected: Vec<DateTime<Utc>> = notes.iter().map(|n| n.timestamp).collect();
        expected.sort();
        assert_eq!(seen, expected, "scale {}", name);

        for pair in scale.windows.windows(2) {
            assert!(pair[0].end_time <= pair[1].start_time);
        }
    }
}

#[test]
fn test_erratic_session_is_not_scored_as_coherent() {
    let points: Vec<(i64, f64, Option<&str>)> = (0..12)
        .map(|i| (i * 1_000, if i % 2 == 0 { 1.0 } else { 9.0 }, None))
        .collect();
    let notes = stream(&points).into_notes();

    let short = aggregate(&notes, &AggregationOptions::default())
        .unwrap()
        .get("short")
        .cloned()
        .unwrap();
    assert_eq!(short.status, CoherenceStatus::Complete);
    assert!(short.breakdown.direction < 0.5);
    assert!(short.coherence < 0.5);

    let rec = AdaptiveWindowSelector::default().calculate_optimal_window_size(&notes);
    assert_eq!(rec.pattern, NotePattern::Erratic);
}

#[test]
fn test_steady_improvement_with_shared_vocabulary_is_coherent() {
    let notes = stream(&[
        (0, 4.0, Some("login form visible, submit button disabled")),
        (1_000, 5.0, Some("login form filled, submit button enabled")),
        (2_000, 6.0, Some("login form submitted, dashboard loading")),
        (3_000, 7.0, Some("dashboard loaded after login form")),
    ])
    .into_notes();

    let short = aggregate(&notes, &AggregationOptions::default())
        .unwrap()
        .get("short")
        .cloned()
        .unwrap();
    assert_eq!(short.windows.len(), 4);
    assert_eq!(short.breakdown.direction, 1.0);
    assert!(short.breakdown.observation.unwrap() > 0.0);
    assert!(short.coherence > 0.5 && short.coherence <= 1.0);

    let digest = short.digest();
    assert_eq!(digest.first_score, Some(4.0));
    assert_eq!(digest.last_score, Some(7.0));
    assert_eq!(digest.net_change, Some(3.0));
}

#[test]
fn test_custom_scales_and_weights() {
    let aggregator = MultiScaleAggregator::new(AggregationConfig {
        scales: vec![TimeScale::new("burst", 250), TimeScale::new("session", 5_000)],
        coherence_weights: CoherenceWeights {
            direction: 0.0,
            variance: 1.0,
            observation: 0.0,
        },
        ..Default::default()
    });
    let notes = stream(&[(0, 5.0, None), (300, 5.0, None), (600, 5.0, None)]).into_notes();

    let result = aggregator.aggregate(&notes, &AggregationOptions::default()).unwrap();
    assert_eq!(result.scales.len(), 2);
    assert_eq!(result.get("burst").unwrap().windows.len(), 3);
    assert_eq!(result.get("session").unwrap().status, CoherenceStatus::SingleWindow);
    assert_eq!(result.get("burst").unwrap().coherence, 1.0);
}

#[test]
fn test_notes_from_json_feed_aggregation() {
    let raw = serde_json::json!([
        { "timestamp": "2026-05-04T09:30:00Z", "elapsed_ms": 0, "score": 6.0, "observation": "cart opens" },
        { "timestamp": "2026-05-04T09:30:00.400Z", "elapsed_ms": 400, "score": 6.5, "salience": "high" },
        { "timestamp": "2026-05-04T09:30:01.200Z", "elapsed_ms": 1200, "score": 7.0 }
    ]);
    let notes: Vec<TemporalNote> = raw
        .as_array()
        .unwrap()
        .iter()
        .cloned()
        .map(TemporalNote::from_json)
        .collect::<Result<_, _>>()
        .unwrap();

    let result = aggregate(&notes, &AggregationOptions { require_data: true }).unwrap();
    assert_eq!(result.get("short").unwrap().windows.len(), 2);
    assert_eq!(result.get("long").unwrap().note_count(), 3);
}
