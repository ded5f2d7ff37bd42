//! Report assembly.
//!
//! Pure composition: aggregates the timeseries, segments, rep groups, and
//! fatigue result into the immutable `Report` handed to chart building and
//! debrief prompt construction. Cross-structure mismatches become warnings
//! attached to the report rather than errors — a degraded chart beats no
//! chart.

use serde::{Deserialize, Serialize};

use crate::bonk::{detect_bonk_per_segment, FatigueEvent};
use crate::config::AnalysisConfig;
use crate::intervals::{group_reps, RepGroup};
use crate::normalizer::{NormalizedActivity, RawLap, RawSample};
use crate::segments::{build_segments, Segment, SegmentBuild, SkippedLap};
use crate::timeseries::{build_timeseries, TimeseriesPoint};

/// ---------------------------------------------------------------------------
/// Report
/// ---------------------------------------------------------------------------

/// Aggregate scalars over the whole activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTotals {
  pub total_distance_meters: f64,
  pub total_duration_seconds: f64,
  pub avg_pace_seconds_per_km: Option<f64>,
  pub avg_heart_rate_bpm: Option<f64>,
  pub max_heart_rate_bpm: Option<i64>,
}

/// Complete analysis package for one activity. Assembled once, never
/// mutated; both the chart builder and the debrief prompt consume it by
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
  pub activity: NormalizedActivity,
  pub totals: ReportTotals,
  pub timeseries: Vec<TimeseriesPoint>,
  pub segments: Vec<Segment>,
  pub rep_groups: Vec<RepGroup>,
  pub bonk: Option<FatigueEvent>,
  pub skipped_laps: Vec<SkippedLap>,
  /// Non-fatal cross-structure inconsistencies found during assembly.
  pub warnings: Vec<String>,
}

/// ---------------------------------------------------------------------------
/// Assembly
/// ---------------------------------------------------------------------------

fn compute_totals(segments: &[Segment], points: &[TimeseriesPoint]) -> ReportTotals {
  let total_distance_meters: f64 = segments.iter().map(|s| s.distance_meters).sum();
  let total_duration_seconds: f64 = segments.iter().map(|s| s.duration_seconds).sum();

  let avg_pace_seconds_per_km = if total_distance_meters > 0.0 {
    Some(total_duration_seconds / total_distance_meters * 1000.0)
  } else {
    None
  };

  let hrs: Vec<i64> = points.iter().filter_map(|p| p.heart_rate).collect();
  let avg_heart_rate_bpm = if hrs.is_empty() {
    None
  } else {
    Some(hrs.iter().sum::<i64>() as f64 / hrs.len() as f64)
  };
  let max_heart_rate_bpm = hrs.iter().max().copied();

  ReportTotals {
    total_distance_meters,
    total_duration_seconds,
    avg_pace_seconds_per_km,
    avg_heart_rate_bpm,
    max_heart_rate_bpm,
  }
}

/// Slack when comparing segment ranges against the timeseries bounds. The
/// device records samples every few seconds, so a lap legitimately ends a
/// little past the last sample.
const RANGE_SLACK_S: i64 = 30;

/// Flag segments whose time range falls outside the timeseries bounds.
fn consistency_warnings(segments: &[Segment], points: &[TimeseriesPoint]) -> Vec<String> {
  let (Some(first), Some(last)) = (points.first(), points.last()) else {
    return Vec::new();
  };

  segments
    .iter()
    .filter(|s| {
      s.start_elapsed_s < first.elapsed_seconds - RANGE_SLACK_S
        || s.end_elapsed_s > last.elapsed_seconds + RANGE_SLACK_S
    })
    .map(|s| {
      format!(
        "segment '{}' [{}, {}) extends outside the timeseries range [{}, {}]",
        s.label, s.start_elapsed_s, s.end_elapsed_s, first.elapsed_seconds, last.elapsed_seconds
      )
    })
    .collect()
}

/// Assemble a report from already-computed pieces.
pub fn build_report(
  activity: NormalizedActivity,
  timeseries: Vec<TimeseriesPoint>,
  build: SegmentBuild,
  rep_groups: Vec<RepGroup>,
  bonk: Option<FatigueEvent>,
) -> Report {
  let totals = compute_totals(&build.segments, &timeseries);
  let warnings = consistency_warnings(&build.segments, &timeseries);

  Report {
    activity,
    totals,
    timeseries,
    segments: build.segments,
    rep_groups,
    bonk,
    skipped_laps: build.skipped,
    warnings,
  }
}

/// Run the full analysis pipeline for one activity.
///
/// Pure function of (laps, samples, config) — no I/O, no retries; every
/// failure mode is a data-shape failure and surfaces as a skipped lap, a
/// warning, or an absent result.
pub fn analyze_activity(
  activity: NormalizedActivity,
  laps: &[RawLap],
  samples: &[RawSample],
  config: &AnalysisConfig,
) -> Report {
  let points = build_timeseries(samples, config.max_samples);
  let build = build_segments(laps, &points, config);
  let rep_groups = group_reps(&build.segments, config);
  let bonk = detect_bonk_per_segment(&points, &build.segments, &config.bonk);

  build_report(activity, points, build, rep_groups, bonk)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{make_lap, make_points, mock_activity, raw_samples_from_points};

  #[test]
  fn test_totals_from_segments_and_series() {
    let laps = vec![
      make_lap(0, 0, 300.0, 800.0),
      make_lap(1, 300, 300.0, 1200.0),
    ];
    let points = make_points(0, 600, 5, 375.0, 150);
    let samples = raw_samples_from_points(&points);

    let report = analyze_activity(
      mock_activity(),
      &laps,
      &samples,
      &AnalysisConfig::default(),
    );

    assert!((report.totals.total_distance_meters - 2000.0).abs() < 1e-9);
    assert!((report.totals.total_duration_seconds - 600.0).abs() < 1e-9);
    // 600 s over 2000 m → 300 s/km
    assert!((report.totals.avg_pace_seconds_per_km.unwrap() - 300.0).abs() < 1e-9);
    assert!((report.totals.avg_heart_rate_bpm.unwrap() - 150.0).abs() < 1e-9);
    assert_eq!(report.totals.max_heart_rate_bpm, Some(150));
    assert!(report.warnings.is_empty());
  }

  #[test]
  fn test_empty_inputs_yield_zero_valued_aggregates() {
    let report = analyze_activity(mock_activity(), &[], &[], &AnalysisConfig::default());

    assert!(report.segments.is_empty());
    assert!(report.rep_groups.is_empty());
    assert!(report.bonk.is_none());
    assert_eq!(report.totals, ReportTotals::default());
    assert!(report.warnings.is_empty());
  }

  #[test]
  fn test_segment_outside_timeseries_range_warns() {
    // Lap claims 600-900 s but the series ends at 300 s.
    let laps = vec![
      make_lap(0, 0, 300.0, 800.0),
      make_lap(1, 600, 300.0, 800.0),
    ];
    let points = make_points(0, 300, 5, 375.0, 150);
    let samples = raw_samples_from_points(&points);

    let report = analyze_activity(
      mock_activity(),
      &laps,
      &samples,
      &AnalysisConfig::default(),
    );

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("outside the timeseries range"));
    // Degraded, not failed: both segments are still present.
    assert_eq!(report.segments.len(), 2);
  }

  #[test]
  fn test_skipped_laps_surface_on_report() {
    let laps = vec![
      make_lap(0, 0, 300.0, 800.0),
      make_lap(1, 300, 0.0, 100.0), // invalid
    ];

    let report = analyze_activity(mock_activity(), &laps, &[], &AnalysisConfig::default());

    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.skipped_laps.len(), 1);
    assert_eq!(report.skipped_laps[0].lap_index, 1);
  }

  #[test]
  fn test_interval_workout_end_to_end() {
    // Warmup, 3 × ~800 m with walk breaks, cooldown. The reps group; the
    // walk breaks don't fake a bonk.
    let laps = vec![
      make_lap(0, 0, 300.0, 800.0),
      make_lap(1, 300, 240.0, 800.0),
      make_lap(2, 540, 180.0, 250.0),
      make_lap(3, 720, 242.0, 805.0),
      make_lap(4, 962, 180.0, 250.0),
      make_lap(5, 1142, 245.0, 795.0),
      make_lap(6, 1387, 300.0, 700.0),
    ];

    let report = analyze_activity(mock_activity(), &laps, &[], &AnalysisConfig::default());

    assert_eq!(report.segments.len(), 7);
    assert_eq!(report.rep_groups.len(), 1);
    assert!(report.rep_groups[0].segment_indices.len() >= 3);
    assert!(report.bonk.is_none());
  }
}
