//! Chart-ready series for the two-panel pace/HR figure.
//!
//! The analysis core emits structured numeric series; turning them into
//! pixels is the front-end's concern. Layout expected by the renderer:
//! two tall stacked panels — smoothed pace over time on top, HR over time
//! below — with background bands per segment, rep-group shading, and an
//! optional fatigue marker.

use serde::{Deserialize, Serialize};

use crate::report::Report;
use crate::segments::{Segment, SegmentKind};

/// Rolling-median smoothing window, in samples. Odd so the window centers.
const PACE_SMOOTH_WINDOW: usize = 11;

/// Percentiles clamping the pace axis, so one GPS spike doesn't flatten the
/// whole panel.
const PACE_BOUND_LOW_PCT: f64 = 0.05;
const PACE_BOUND_HIGH_PCT: f64 = 0.95;

/// Fractional padding applied outside the percentile bounds.
const PACE_BOUND_PAD: f64 = 0.05;

/// ---------------------------------------------------------------------------
/// Chart data structures
/// ---------------------------------------------------------------------------

/// Background band for one segment of the activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBand {
  pub label: String,
  pub kind: SegmentKind,
  pub start_elapsed_s: i64,
  pub end_elapsed_s: i64,
  /// Palette slot when the segment belongs to a rep group.
  pub color_key: Option<usize>,
}

/// Everything the renderer needs for the two-panel figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
  /// (elapsed_seconds, smoothed pace s/km)
  pub pace_series: Vec<(i64, f64)>,
  /// (elapsed_seconds, heart rate bpm)
  pub hr_series: Vec<(i64, i64)>,
  /// Pace axis bounds (low, high) in s/km; None when there is no pace data.
  pub pace_bounds: Option<(f64, f64)>,
  pub segment_bands: Vec<SegmentBand>,
  /// Elapsed time of the fatigue onset, when one was detected.
  pub bonk_marker_elapsed_s: Option<i64>,
}

/// ---------------------------------------------------------------------------
/// Smoothing and bounds
/// ---------------------------------------------------------------------------

/// Rolling median; edges use partial windows so the output keeps the input
/// length.
fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
  let half = window / 2;
  let mut out = Vec::with_capacity(values.len());

  for i in 0..values.len() {
    let lo = i.saturating_sub(half);
    let hi = (i + half + 1).min(values.len());
    let mut win: Vec<f64> = values[lo..hi].to_vec();
    win.sort_by(|a, b| a.total_cmp(b));
    out.push(win[win.len() / 2]);
  }

  out
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
  let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
  sorted[idx.min(sorted.len() - 1)]
}

/// Pace axis bounds from the percentile band of in-segment pace samples.
/// Walk breaks and drills are excluded so their extreme paces don't blow
/// the axis; without any active segments every pace sample participates.
fn pace_bounds(report: &Report) -> Option<(f64, f64)> {
  let active: Vec<&Segment> = report.segments.iter().filter(|s| s.is_active()).collect();

  let mut paces: Vec<f64> = report
    .timeseries
    .iter()
    .filter(|p| {
      active.is_empty() || active.iter().any(|s| s.contains(p.elapsed_seconds))
    })
    .filter_map(|p| p.pace_seconds_per_km)
    .filter(|pace| *pace > 0.0)
    .collect();

  if paces.is_empty() {
    return None;
  }
  paces.sort_by(|a, b| a.total_cmp(b));

  let low = percentile(&paces, PACE_BOUND_LOW_PCT);
  let high = percentile(&paces, PACE_BOUND_HIGH_PCT);
  let pad = ((high - low) * PACE_BOUND_PAD).max(1.0);
  Some((low - pad, high + pad))
}

/// ---------------------------------------------------------------------------
/// Builder
/// ---------------------------------------------------------------------------

/// Build the chart data for one report.
pub fn build_chart_data(report: &Report) -> ChartData {
  let pace_points: Vec<(i64, f64)> = report
    .timeseries
    .iter()
    .filter_map(|p| p.pace_seconds_per_km.map(|pace| (p.elapsed_seconds, pace)))
    .filter(|(_, pace)| *pace > 0.0)
    .collect();

  let smoothed = rolling_median(
    &pace_points.iter().map(|(_, pace)| *pace).collect::<Vec<f64>>(),
    PACE_SMOOTH_WINDOW,
  );
  let pace_series: Vec<(i64, f64)> = pace_points
    .iter()
    .zip(smoothed)
    .map(|((t, _), pace)| (*t, pace))
    .collect();

  let hr_series: Vec<(i64, i64)> = report
    .timeseries
    .iter()
    .filter_map(|p| p.heart_rate.map(|hr| (p.elapsed_seconds, hr)))
    .collect();

  let segment_bands = report
    .segments
    .iter()
    .enumerate()
    .map(|(i, s)| SegmentBand {
      label: s.label.clone(),
      kind: s.kind,
      start_elapsed_s: s.start_elapsed_s,
      end_elapsed_s: s.end_elapsed_s,
      color_key: report
        .rep_groups
        .iter()
        .find(|g| g.segment_indices.contains(&i))
        .map(|g| g.color_key),
    })
    .collect();

  ChartData {
    pace_bounds: pace_bounds(report),
    pace_series,
    hr_series,
    segment_bands,
    bonk_marker_elapsed_s: report.bonk.as_ref().map(|b| b.onset_elapsed_s),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
