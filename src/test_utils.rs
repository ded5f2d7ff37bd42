//! Test utilities and helpers for unit and integration testing
//!
//! Common test infrastructure:
//! - in-memory database setup/teardown
//! - factories for laps, timeseries points, and segments
//! - helper assertions

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;

use crate::normalizer::{LapIntensity, NormalizedActivity, RawLap, RawSample};
use crate::segments::{Segment, SegmentKind};
use crate::timeseries::TimeseriesPoint;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing.
/// Runs all migrations and returns a ready-to-use pool.
///
/// Uses max_connections(1) to prevent multiple pool connections from
/// creating isolated in-memory databases, which would cause intermittent
/// test failures.
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool.
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// A normalized activity with plausible run numbers.
pub fn mock_activity() -> NormalizedActivity {
  NormalizedActivity {
    connect_activity_id: "19123456789".to_string(),
    name: "Morning Run".to_string(),
    activity_type: "running".to_string(),
    start_time_utc: Utc.with_ymd_and_hms(2026, 2, 18, 19, 0, 0).unwrap(),
    duration_seconds: 2520.0,
    distance_meters: 8046.72,
    avg_hr: Some(148.0),
    max_hr: Some(171.0),
    avg_pace_seconds_per_km: Some(313.2),
    total_ascent_meters: Some(62.0),
    avg_cadence_spm: Some(168.0),
  }
}

/// An untagged lap; pace derives from duration and distance.
pub fn make_lap(index: usize, start_elapsed_s: i64, duration_seconds: f64, distance_meters: f64) -> RawLap {
  RawLap {
    lap_index: index,
    intensity: None,
    start_elapsed_s,
    duration_seconds,
    distance_meters,
    avg_hr: Some(140.0),
    avg_pace_seconds_per_km: None,
  }
}

/// A lap carrying an explicit intensity tag and stored averages.
pub fn tagged_lap(
  index: usize,
  intensity: LapIntensity,
  start_elapsed_s: i64,
  duration_seconds: f64,
  distance_meters: f64,
  avg_pace_s_per_km: f64,
) -> RawLap {
  RawLap {
    lap_index: index,
    intensity: Some(intensity),
    start_elapsed_s,
    duration_seconds,
    distance_meters,
    avg_hr: Some(140.0),
    avg_pace_seconds_per_km: Some(avg_pace_s_per_km),
  }
}

/// Constant-pace, constant-HR points every `step` seconds over [start, end).
pub fn make_points(
  start_s: i64,
  end_s: i64,
  step: i64,
  pace_s_per_km: f64,
  heart_rate: i64,
) -> Vec<TimeseriesPoint> {
  let mut points = Vec::new();
  let mut t = start_s;
  while t < end_s {
    points.push(TimeseriesPoint {
      elapsed_seconds: t,
      pace_seconds_per_km: Some(pace_s_per_km),
      heart_rate: Some(heart_rate),
      elevation_meters: Some(50.0),
      cadence_spm: Some(168),
      distance_meters: None,
    });
    t += step;
  }
  points
}

/// Convert built points back into raw samples, for pipeline-level tests.
pub fn raw_samples_from_points(points: &[TimeseriesPoint]) -> Vec<RawSample> {
  points
    .iter()
    .map(|p| RawSample {
      elapsed_seconds: p.elapsed_seconds,
      pace_seconds_per_km: p.pace_seconds_per_km,
      heart_rate: p.heart_rate,
      elevation_meters: p.elevation_meters,
      cadence_spm: p.cadence_spm,
      distance_meters: p.distance_meters,
    })
    .collect()
}

fn segment(label: &str, kind: SegmentKind, start_elapsed_s: i64, end_elapsed_s: i64, distance_meters: f64) -> Segment {
  Segment {
    label: label.to_string(),
    kind,
    start_elapsed_s,
    end_elapsed_s,
    duration_seconds: (end_elapsed_s - start_elapsed_s) as f64,
    distance_meters,
    avg_pace_seconds_per_km: 360.0,
    avg_heart_rate_bpm: 150.0,
    hr_zone_distribution: [0.0, 0.0, 1.0, 0.0, 0.0],
  }
}

/// A Run segment with a fixed 300 s span; distance is what grouping cares
/// about.
pub fn run_segment(label: &str, start_elapsed_s: i64, distance_meters: f64) -> Segment {
  segment(label, SegmentKind::Run, start_elapsed_s, start_elapsed_s + 300, distance_meters)
}

/// A Run segment with an explicit time span.
pub fn run_span(label: &str, start_elapsed_s: i64, end_elapsed_s: i64) -> Segment {
  segment(label, SegmentKind::Run, start_elapsed_s, end_elapsed_s, 3000.0)
}

/// A Walk segment with an explicit time span.
pub fn walk_segment(label: &str, start_elapsed_s: i64, end_elapsed_s: i64) -> Segment {
  let mut seg = segment(label, SegmentKind::Walk, start_elapsed_s, end_elapsed_s, 250.0);
  seg.avg_pace_seconds_per_km = 900.0;
  seg.avg_heart_rate_bpm = 125.0;
  seg
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance.
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('activities', 'activity_laps', 'sync_state', 'debriefs')",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 4, "Expected 4 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_make_points_spacing() {
    let points = make_points(0, 600, 5, 375.0, 150);
    assert_eq!(points.len(), 120);
    assert_eq!(points[1].elapsed_seconds - points[0].elapsed_seconds, 5);
  }

  #[test]
  fn test_factories_produce_valid_data() {
    let activity = mock_activity();
    assert_eq!(activity.activity_type, "running");

    let lap = make_lap(0, 0, 600.0, 1600.0);
    assert!(lap.intensity.is_none());

    let seg = run_segment("Run 1", 0, 800.0);
    assert!(seg.is_active());
    assert!(seg.contains(0));
    assert!(!seg.contains(300));
  }

  #[test]
  fn test_assert_approx_eq_macro() {
    assert_approx_eq!(1.0_f64, 1.0005_f64, 0.01);
  }
}
