//! Timeseries construction from raw per-sample records.
//!
//! `TimeseriesPoint` is the universal in-memory representation consumed by
//! every analysis module. Building the series is where device quirks die:
//! duplicate timestamps, out-of-order samples, and all-empty records are
//! resolved here so downstream code can assume a clean, strictly increasing
//! sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::normalizer::RawSample;

/// ---------------------------------------------------------------------------
/// Timeseries Point
/// ---------------------------------------------------------------------------

/// One measurement sample from an activity, typically one per second.
/// All fields except `elapsed_seconds` are optional — the device may not
/// record every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
  pub elapsed_seconds: i64,
  pub pace_seconds_per_km: Option<f64>,
  pub heart_rate: Option<i64>,
  pub elevation_meters: Option<f64>,
  pub cadence_spm: Option<i64>,
  pub distance_meters: Option<f64>,
}

impl TimeseriesPoint {
  /// True when the sample carries no metric at all.
  fn has_no_metrics(&self) -> bool {
    self.pace_seconds_per_km.is_none()
      && self.heart_rate.is_none()
      && self.elevation_meters.is_none()
      && self.cadence_spm.is_none()
      && self.distance_meters.is_none()
  }
}

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

/// Raised only for callers that require a non-empty series. Callers that
/// merely overlay optional data accept an empty timeseries without error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no usable samples in timeseries")]
pub struct EmptyTimeseriesError;

/// ---------------------------------------------------------------------------
/// Builder
/// ---------------------------------------------------------------------------

/// Build a clean timeseries from raw normalized samples.
///
/// - samples with no metric fields are dropped
/// - samples with a negative elapsed offset are dropped
/// - duplicate `elapsed_seconds` deduplicate, last value wins
/// - output is sorted ascending by `elapsed_seconds`
/// - the series is capped at `max_samples` points (earliest kept)
pub fn build_timeseries(samples: &[RawSample], max_samples: usize) -> Vec<TimeseriesPoint> {
  let mut by_offset: BTreeMap<i64, TimeseriesPoint> = BTreeMap::new();

  for s in samples {
    if s.elapsed_seconds < 0 {
      continue;
    }
    let point = TimeseriesPoint {
      elapsed_seconds: s.elapsed_seconds,
      pace_seconds_per_km: s.pace_seconds_per_km,
      heart_rate: s.heart_rate,
      elevation_meters: s.elevation_meters,
      cadence_spm: s.cadence_spm,
      distance_meters: s.distance_meters,
    };
    if point.has_no_metrics() {
      continue;
    }
    by_offset.insert(s.elapsed_seconds, point);
  }

  let mut points: Vec<TimeseriesPoint> = by_offset.into_values().collect();
  points.truncate(max_samples);
  points
}

/// Gate for callers that cannot proceed without samples.
pub fn require_non_empty(
  points: Vec<TimeseriesPoint>,
) -> Result<Vec<TimeseriesPoint>, EmptyTimeseriesError> {
  if points.is_empty() {
    Err(EmptyTimeseriesError)
  } else {
    Ok(points)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
