//! Lap-based segment builder.
//!
//! Converts the platform's lap records plus the built timeseries into labeled
//! training segments (Warmup / Run 1 / Walk 1 / … / Cooldown) with
//! per-segment statistics: average pace, average HR, and HR zone
//! distribution.
//!
//! Classification is an ordered rule chain, first match wins:
//!   1. the lap's explicit intensity tag, when the device recorded one
//!   2. a pace heuristic against the activity's overall average pace
//!   3. the drill override: laps below the minimum display distance are
//!      drills no matter what the tag or heuristic said

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::normalizer::{LapIntensity, RawLap};
use crate::timeseries::TimeseriesPoint;

/// Laps slower than this multiple of the overall average pace are walks.
const WALK_PACE_RATIO: f64 = 1.45;

/// First/last laps this much slower than the body of the run are
/// warmup/cooldown.
const EDGE_PACE_RATIO: f64 = 1.15;

/// ---------------------------------------------------------------------------
/// HR Zones
/// ---------------------------------------------------------------------------

/// 5-zone heart rate model. `boundaries` holds the lower bound of zones 2-5
/// as fractions of max HR.
///
/// Zone 1: < 60%  — very easy, recovery
/// Zone 2: 60-70% — aerobic base
/// Zone 3: 70-80% — moderate aerobic (tempo)
/// Zone 4: 80-90% — threshold
/// Zone 5: > 90%  — max effort / VO2max
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrZones {
  pub max_hr: i64,
  pub boundaries: [f64; 4],
}

impl Default for HrZones {
  fn default() -> Self {
    Self {
      max_hr: 185,
      boundaries: [0.60, 0.70, 0.80, 0.90],
    }
  }
}

impl HrZones {
  /// Classify a heart rate reading into zones 1-5 using % of max HR.
  pub fn zone_for(&self, heart_rate: i64) -> usize {
    let pct = heart_rate as f64 / self.max_hr as f64;
    for (i, boundary) in self.boundaries.iter().enumerate() {
      if pct < *boundary {
        return i + 1;
      }
    }
    5
  }
}

/// ---------------------------------------------------------------------------
/// Segment
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
  Run,
  Walk,
  Warmup,
  Cooldown,
  Drill,
}

impl SegmentKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      SegmentKind::Run => "run",
      SegmentKind::Walk => "walk",
      SegmentKind::Warmup => "warmup",
      SegmentKind::Cooldown => "cooldown",
      SegmentKind::Drill => "drill",
    }
  }
}

/// One contiguous lap of the activity with computed statistics.
/// Built once from a raw lap plus the timeseries slice inside its time
/// range; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
  pub label: String,
  pub kind: SegmentKind,
  pub start_elapsed_s: i64,
  pub end_elapsed_s: i64,
  pub duration_seconds: f64,
  pub distance_meters: f64,
  pub avg_pace_seconds_per_km: f64,
  pub avg_heart_rate_bpm: f64,
  /// Fraction of HR samples in each of zones 1-5. All zeros when the slice
  /// carried no HR data.
  pub hr_zone_distribution: [f64; 5],
}

impl Segment {
  /// Active segments count toward pace baselines and fatigue detection;
  /// walk breaks and drills do not.
  pub fn is_active(&self) -> bool {
    matches!(
      self.kind,
      SegmentKind::Run | SegmentKind::Warmup | SegmentKind::Cooldown
    )
  }

  pub fn contains(&self, elapsed_seconds: i64) -> bool {
    elapsed_seconds >= self.start_elapsed_s && elapsed_seconds < self.end_elapsed_s
  }
}

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum InvalidLapError {
  #[error("lap {index}: duration must be positive (got {duration_seconds})")]
  NonPositiveDuration { index: usize, duration_seconds: f64 },

  #[error("lap {index}: distance must be non-negative (got {distance_meters})")]
  NegativeDistance { index: usize, distance_meters: f64 },
}

/// A lap that failed validation and was excluded from the build.
/// Recorded rather than raised — one bad lap never sinks the whole activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLap {
  pub lap_index: usize,
  pub error: InvalidLapError,
}

/// Result of a segment build: the ordered segments plus any laps that were
/// skipped for structural problems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentBuild {
  pub segments: Vec<Segment>,
  pub skipped: Vec<SkippedLap>,
}

/// ---------------------------------------------------------------------------
/// Classification rules
/// ---------------------------------------------------------------------------

/// Best-effort pace for classification: the lap's stored average, or one
/// derived from duration and distance.
fn lap_pace(lap: &RawLap) -> Option<f64> {
  lap
    .avg_pace_seconds_per_km
    .filter(|p| *p > 0.0)
    .or_else(|| {
      if lap.distance_meters > 0.0 && lap.duration_seconds > 0.0 {
        Some(lap.duration_seconds / lap.distance_meters * 1000.0)
      } else {
        None
      }
    })
}

/// Rule 1: map the explicit intensity tag directly.
fn classify_by_tag(lap: &RawLap) -> Option<SegmentKind> {
  match lap.intensity? {
    LapIntensity::Active => Some(SegmentKind::Run),
    LapIntensity::Recovery => Some(SegmentKind::Walk),
    LapIntensity::Warmup => Some(SegmentKind::Warmup),
    LapIntensity::Cooldown => Some(SegmentKind::Cooldown),
  }
}

/// Rule 2: pace heuristic against the activity's overall average pace.
/// First/last laps markedly slower than the body become warmup/cooldown;
/// other markedly slow laps are walks; everything else runs.
fn classify_by_pace(
  lap: &RawLap,
  is_first: bool,
  is_last: bool,
  overall_pace: Option<f64>,
) -> SegmentKind {
  let (Some(pace), Some(overall)) = (lap_pace(lap), overall_pace) else {
    return SegmentKind::Run;
  };
  if overall <= 0.0 {
    return SegmentKind::Run;
  }

  let ratio = pace / overall;
  if is_first && ratio > EDGE_PACE_RATIO {
    return SegmentKind::Warmup;
  }
  if is_last && ratio > EDGE_PACE_RATIO {
    return SegmentKind::Cooldown;
  }
  if ratio > WALK_PACE_RATIO {
    return SegmentKind::Walk;
  }
  SegmentKind::Run
}

/// ---------------------------------------------------------------------------
/// Statistics
/// ---------------------------------------------------------------------------

fn slice_points<'a>(
  points: &'a [TimeseriesPoint],
  start_elapsed_s: i64,
  end_elapsed_s: i64,
) -> Vec<&'a TimeseriesPoint> {
  points
    .iter()
    .filter(|p| p.elapsed_seconds >= start_elapsed_s && p.elapsed_seconds < end_elapsed_s)
    .collect()
}

/// Average pace over the slice, falling back to the lap's own average and
/// finally to one derived from duration/distance.
fn avg_pace(slice: &[&TimeseriesPoint], lap: &RawLap) -> f64 {
  let paces: Vec<f64> = slice
    .iter()
    .filter_map(|p| p.pace_seconds_per_km)
    .filter(|p| *p > 0.0)
    .collect();

  if !paces.is_empty() {
    return paces.iter().sum::<f64>() / paces.len() as f64;
  }
  lap_pace(lap).unwrap_or(0.0)
}

/// Average HR over the slice, falling back to the lap's stored average.
fn avg_hr(slice: &[&TimeseriesPoint], lap: &RawLap) -> f64 {
  let hrs: Vec<f64> = slice
    .iter()
    .filter_map(|p| p.heart_rate)
    .map(|hr| hr as f64)
    .collect();

  if !hrs.is_empty() {
    return hrs.iter().sum::<f64>() / hrs.len() as f64;
  }
  lap.avg_hr.unwrap_or(0.0)
}

/// Fraction of HR samples in each zone. All zeros (not a division error)
/// when the slice has no HR data.
fn hr_zone_distribution(slice: &[&TimeseriesPoint], zones: &HrZones) -> [f64; 5] {
  let mut counts = [0usize; 5];
  for p in slice {
    if let Some(hr) = p.heart_rate {
      counts[zones.zone_for(hr) - 1] += 1;
    }
  }

  let total: usize = counts.iter().sum();
  if total == 0 {
    return [0.0; 5];
  }

  let mut dist = [0.0; 5];
  for (i, c) in counts.iter().enumerate() {
    dist[i] = *c as f64 / total as f64;
  }
  dist
}

/// ---------------------------------------------------------------------------
/// Builder
/// ---------------------------------------------------------------------------

/// Build labeled segments from the activity's lap records and timeseries.
///
/// Structurally invalid laps (non-positive duration, negative distance) are
/// skipped and recorded. The remaining laps are classified, labeled with
/// per-kind counters in chronological order, and get their statistics from
/// the timeseries slice inside their time range.
pub fn build_segments(
  laps: &[RawLap],
  points: &[TimeseriesPoint],
  config: &AnalysisConfig,
) -> SegmentBuild {
  let mut skipped = Vec::new();
  let mut valid: Vec<&RawLap> = Vec::new();

  for lap in laps {
    if lap.duration_seconds <= 0.0 {
      skipped.push(SkippedLap {
        lap_index: lap.lap_index,
        error: InvalidLapError::NonPositiveDuration {
          index: lap.lap_index,
          duration_seconds: lap.duration_seconds,
        },
      });
      continue;
    }
    if lap.distance_meters < 0.0 {
      skipped.push(SkippedLap {
        lap_index: lap.lap_index,
        error: InvalidLapError::NegativeDistance {
          index: lap.lap_index,
          distance_meters: lap.distance_meters,
        },
      });
      continue;
    }
    valid.push(lap);
  }

  valid.sort_by_key(|lap| lap.start_elapsed_s);

  // Overall average pace across display-sized laps; sub-threshold laps are
  // drills and must not skew the baseline.
  let (mut body_time, mut body_dist) = (0.0, 0.0);
  for lap in &valid {
    if lap.distance_meters >= config.min_lap_display_m {
      body_time += lap.duration_seconds;
      body_dist += lap.distance_meters;
    }
  }
  let overall_pace = if body_dist > 0.0 {
    Some(body_time / body_dist * 1000.0)
  } else {
    None
  };

  let mut segments = Vec::with_capacity(valid.len());
  let mut run_count = 0;
  let mut walk_count = 0;
  let mut drill_count = 0;

  for (pos, lap) in valid.iter().enumerate() {
    let is_first = pos == 0;
    let is_last = pos + 1 == valid.len();

    let mut kind = classify_by_tag(lap)
      .unwrap_or_else(|| classify_by_pace(lap, is_first, is_last, overall_pace));

    // Drill override trumps both the tag and the heuristic.
    if lap.distance_meters < config.min_lap_display_m {
      kind = SegmentKind::Drill;
    }

    let label = match kind {
      SegmentKind::Run => {
        run_count += 1;
        format!("Run {}", run_count)
      }
      SegmentKind::Walk => {
        walk_count += 1;
        format!("Walk {}", walk_count)
      }
      SegmentKind::Drill => {
        drill_count += 1;
        format!("Drill {}", drill_count)
      }
      SegmentKind::Warmup => "Warmup".to_string(),
      SegmentKind::Cooldown => "Cooldown".to_string(),
    };

    let start = lap.start_elapsed_s;
    let end = start + lap.duration_seconds.round() as i64;
    let slice = slice_points(points, start, end);

    segments.push(Segment {
      label,
      kind,
      start_elapsed_s: start,
      end_elapsed_s: end,
      duration_seconds: lap.duration_seconds,
      distance_meters: lap.distance_meters,
      avg_pace_seconds_per_km: avg_pace(&slice, lap),
      avg_heart_rate_bpm: avg_hr(&slice, lap),
      hr_zone_distribution: hr_zone_distribution(&slice, &config.hr_zones),
    });
  }

  SegmentBuild { segments, skipped }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{make_lap, make_points, tagged_lap};

  #[test]
  fn test_hr_zone_classification() {
    let zones = HrZones::default(); // max 185
    assert_eq!(zones.zone_for(100), 1); // 54%
    assert_eq!(zones.zone_for(120), 2); // 65%
    assert_eq!(zones.zone_for(140), 3); // 76%
    assert_eq!(zones.zone_for(160), 4); // 86%
    assert_eq!(zones.zone_for(175), 5); // 95%
  }

  #[test]
  fn test_tagged_interval_workout_labels() {
    let laps = vec![
      tagged_lap(0, LapIntensity::Warmup, 0, 300.0, 800.0, 375.0),
      tagged_lap(1, LapIntensity::Active, 300, 227.0, 800.0, 284.0),
      tagged_lap(2, LapIntensity::Recovery, 527, 180.0, 250.0, 720.0),
      tagged_lap(3, LapIntensity::Active, 707, 231.0, 800.0, 289.0),
      tagged_lap(4, LapIntensity::Cooldown, 938, 249.0, 400.0, 620.0),
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    let labels: Vec<&str> = build.segments.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Warmup", "Run 1", "Walk 1", "Run 2", "Cooldown"]);
    assert!(build.skipped.is_empty());
  }

  #[test]
  fn test_heuristic_labels_walk_between_runs() {
    // No intensity tags: the slow middle lap is a walk break.
    let laps = vec![
      make_lap(0, 0, 600.0, 1600.0),   // pace 375
      make_lap(1, 600, 300.0, 300.0),  // pace 1000 — way off the body
      make_lap(2, 900, 600.0, 1600.0), // pace 375
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    let labels: Vec<&str> = build.segments.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Run 1", "Walk 1", "Run 2"]);
  }

  #[test]
  fn test_heuristic_reclassifies_slow_edges_as_warmup_cooldown() {
    let laps = vec![
      make_lap(0, 0, 480.0, 800.0),     // pace 600, first and slow
      make_lap(1, 480, 1500.0, 5000.0), // pace 300, the body
      make_lap(2, 1980, 600.0, 1000.0), // pace 600, last and slow
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    assert_eq!(build.segments[0].kind, SegmentKind::Warmup);
    assert_eq!(build.segments[0].label, "Warmup");
    assert_eq!(build.segments[1].kind, SegmentKind::Run);
    assert_eq!(build.segments[2].kind, SegmentKind::Cooldown);
    assert_eq!(build.segments[2].label, "Cooldown");
  }

  #[test]
  fn test_drill_override_beats_active_tag() {
    // 20 m lap tagged "active" — still a drill.
    let laps = vec![
      tagged_lap(0, LapIntensity::Active, 0, 600.0, 1600.0, 375.0),
      tagged_lap(1, LapIntensity::Active, 600, 30.0, 20.0, 300.0),
      tagged_lap(2, LapIntensity::Active, 630, 600.0, 1600.0, 375.0),
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    assert_eq!(build.segments[1].kind, SegmentKind::Drill);
    assert_eq!(build.segments[1].label, "Drill 1");
    // Distance and ordering are still intact.
    assert!((build.segments[1].distance_meters - 20.0).abs() < 1e-9);
  }

  #[test]
  fn test_invalid_laps_skipped_not_fatal() {
    let laps = vec![
      make_lap(0, 0, 600.0, 1600.0),
      make_lap(1, 600, 0.0, 100.0),    // zero duration
      make_lap(2, 600, 300.0, -50.0),  // negative distance
      make_lap(3, 900, 600.0, 1600.0),
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    assert_eq!(build.segments.len(), 2);
    assert_eq!(build.skipped.len(), 2);
    assert!(matches!(
      build.skipped[0].error,
      InvalidLapError::NonPositiveDuration { index: 1, .. }
    ));
    assert!(matches!(
      build.skipped[1].error,
      InvalidLapError::NegativeDistance { index: 2, .. }
    ));
  }

  #[test]
  fn test_zone_distribution_sums_to_one() {
    let laps = vec![make_lap(0, 0, 300.0, 800.0)];
    let points = make_points(0, 300, 5, 375.0, 120);

    let build = build_segments(&laps, &points, &AnalysisConfig::default());

    let dist = build.segments[0].hr_zone_distribution;
    let sum: f64 = dist.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    // 120 bpm at max 185 = 65% — all samples in zone 2
    assert!((dist[1] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn test_zone_distribution_all_zero_without_hr() {
    let laps = vec![make_lap(0, 0, 300.0, 800.0)];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    assert!(build.segments[0]
      .hr_zone_distribution
      .iter()
      .all(|v| *v == 0.0));
  }

  #[test]
  fn test_stats_computed_from_timeseries_slice() {
    let laps = vec![make_lap(0, 0, 300.0, 800.0)];
    let points = make_points(0, 300, 5, 372.0, 128);

    let build = build_segments(&laps, &points, &AnalysisConfig::default());

    let seg = &build.segments[0];
    assert!((seg.avg_pace_seconds_per_km - 372.0).abs() < 1e-9);
    assert!((seg.avg_heart_rate_bpm - 128.0).abs() < 1e-9);
  }

  #[test]
  fn test_stats_fall_back_to_lap_averages_without_timeseries() {
    let laps = vec![tagged_lap(0, LapIntensity::Active, 0, 300.0, 800.0, 410.0)];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    let seg = &build.segments[0];
    assert!((seg.avg_pace_seconds_per_km - 410.0).abs() < 1e-9);
    assert!((seg.avg_heart_rate_bpm - 140.0).abs() < 1e-9);
  }

  #[test]
  fn test_segments_ordered_and_non_overlapping() {
    // Laps delivered out of order still come back sorted by start.
    let laps = vec![
      make_lap(1, 600, 300.0, 800.0),
      make_lap(0, 0, 600.0, 1600.0),
      make_lap(2, 900, 600.0, 1600.0),
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    for pair in build.segments.windows(2) {
      assert!(pair[0].start_elapsed_s < pair[1].start_elapsed_s);
      assert!(pair[0].end_elapsed_s <= pair[1].start_elapsed_s);
      assert!(pair[0].start_elapsed_s < pair[0].end_elapsed_s);
    }
  }

  #[test]
  fn test_empty_lap_list_builds_empty() {
    let build = build_segments(&[], &[], &AnalysisConfig::default());
    assert!(build.segments.is_empty());
    assert!(build.skipped.is_empty());
  }

  #[test]
  fn test_is_active() {
    let laps = vec![
      tagged_lap(0, LapIntensity::Warmup, 0, 300.0, 800.0, 375.0),
      tagged_lap(1, LapIntensity::Active, 300, 227.0, 800.0, 284.0),
      tagged_lap(2, LapIntensity::Recovery, 527, 180.0, 250.0, 720.0),
      tagged_lap(3, LapIntensity::Active, 707, 30.0, 20.0, 300.0), // drill
    ];

    let build = build_segments(&laps, &[], &AnalysisConfig::default());

    let active: Vec<bool> = build.segments.iter().map(|s| s.is_active()).collect();
    assert_eq!(active, vec![true, true, false, false]);
  }
}
