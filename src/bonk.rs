//! Fatigue ("bonk") detection.
//!
//! A sliding-window drift detector. The series is partitioned into fixed-size
//! time windows; each window's average pace and HR are compared against a
//! rolling baseline built from the preceding windows; the onset is the first
//! window where pace has degraded AND heart rate has drifted upward. The
//! conjunction is the detector's defining policy: pace decay with flat HR is
//! a deliberate cool-down, HR rise with steady pace is a hill — neither may
//! fire on its own.
//!
//! "No event" is the expected common case and is returned as `None`, never
//! as an error. That includes activities too short to form a baseline.

use serde::{Deserialize, Serialize};

use crate::segments::Segment;
use crate::timeseries::TimeseriesPoint;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

/// Tuning knobs for the fatigue scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonkConfig {
  /// Window length in seconds.
  pub window_seconds: i64,
  /// Windows with fewer pace or HR samples than this are ignored.
  pub min_samples_per_window: usize,
  /// Number of preceding windows forming the rolling baseline.
  pub baseline_windows: usize,
  /// Fractional pace degradation vs baseline required at onset.
  pub pace_degradation_threshold: f64,
  /// Fractional upward HR drift vs baseline required at onset.
  pub hr_drift_threshold: f64,
}

impl Default for BonkConfig {
  fn default() -> Self {
    Self {
      window_seconds: 120,
      min_samples_per_window: 3,
      baseline_windows: 3,
      pace_degradation_threshold: 0.10,
      hr_drift_threshold: 0.05,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Event
/// ---------------------------------------------------------------------------

/// A detected fatigue onset. At most one per report — only the earliest
/// qualifying window matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueEvent {
  /// Start of the first qualifying window.
  pub onset_elapsed_s: i64,
  /// Label of the segment containing the onset, when detection ran
  /// segment-aware.
  pub segment_label: Option<String>,
  /// Relative pace degradation at onset (0.15 = 15% slower than baseline).
  pub severity_metric: f64,
}

/// ---------------------------------------------------------------------------
/// Window statistics
/// ---------------------------------------------------------------------------

struct WindowStats {
  start_elapsed_s: i64,
  avg_pace: f64,
  avg_hr: f64,
}

/// Partition the series into fixed windows and average pace/HR per window.
/// Windows with too few samples of either metric are dropped — they carry
/// too little signal to compare against a baseline.
fn window_stats(points: &[TimeseriesPoint], cfg: &BonkConfig) -> Vec<WindowStats> {
  let (Some(first), Some(last)) = (points.first(), points.last()) else {
    return Vec::new();
  };

  let mut windows = Vec::new();
  let mut start = first.elapsed_seconds;

  while start <= last.elapsed_seconds {
    let end = start + cfg.window_seconds;

    let mut paces = Vec::new();
    let mut hrs = Vec::new();
    for p in points
      .iter()
      .filter(|p| p.elapsed_seconds >= start && p.elapsed_seconds < end)
    {
      if let Some(pace) = p.pace_seconds_per_km {
        if pace > 0.0 {
          paces.push(pace);
        }
      }
      if let Some(hr) = p.heart_rate {
        hrs.push(hr as f64);
      }
    }

    if paces.len() >= cfg.min_samples_per_window && hrs.len() >= cfg.min_samples_per_window {
      windows.push(WindowStats {
        start_elapsed_s: start,
        avg_pace: paces.iter().sum::<f64>() / paces.len() as f64,
        avg_hr: hrs.iter().sum::<f64>() / hrs.len() as f64,
      });
    }

    start = end;
  }

  windows
}

fn scan_windows(windows: &[WindowStats], cfg: &BonkConfig) -> Option<FatigueEvent> {
  if windows.len() <= cfg.baseline_windows {
    // Too few windows to form a baseline — short activities simply have
    // nothing to report.
    return None;
  }

  for i in cfg.baseline_windows..windows.len() {
    let baseline = &windows[i - cfg.baseline_windows..i];
    let base_pace = baseline.iter().map(|w| w.avg_pace).sum::<f64>() / baseline.len() as f64;
    let base_hr = baseline.iter().map(|w| w.avg_hr).sum::<f64>() / baseline.len() as f64;
    if base_pace <= 0.0 || base_hr <= 0.0 {
      continue;
    }

    let w = &windows[i];
    let pace_degradation = (w.avg_pace - base_pace) / base_pace;
    let hr_drift = (w.avg_hr - base_hr) / base_hr;

    // Both signals must agree: pace slower than baseline AND HR climbing.
    if pace_degradation >= cfg.pace_degradation_threshold
      && hr_drift >= cfg.hr_drift_threshold
    {
      return Some(FatigueEvent {
        onset_elapsed_s: w.start_elapsed_s,
        segment_label: None,
        severity_metric: pace_degradation,
      });
    }
  }

  None
}

/// ---------------------------------------------------------------------------
/// Entry points
/// ---------------------------------------------------------------------------

/// Scan the whole timeseries for a fatigue onset.
pub fn detect_bonk(points: &[TimeseriesPoint], cfg: &BonkConfig) -> Option<FatigueEvent> {
  scan_windows(&window_stats(points, cfg), cfg)
}

/// Segment-aware scan: only points inside active segments (run, warmup,
/// cooldown) are considered, so a recovery walk between reps — a dramatic
/// pace collapse with lingering HR — cannot fake an onset. The containing
/// segment's label is attached to the event.
pub fn detect_bonk_per_segment(
  points: &[TimeseriesPoint],
  segments: &[Segment],
  cfg: &BonkConfig,
) -> Option<FatigueEvent> {
  let active: Vec<TimeseriesPoint> = points
    .iter()
    .filter(|p| {
      segments
        .iter()
        .any(|s| s.is_active() && s.contains(p.elapsed_seconds))
    })
    .cloned()
    .collect();

  let mut event = detect_bonk(&active, cfg)?;

  // Containing segment, or the next active one when the window boundary
  // landed in a gap between active segments.
  event.segment_label = segments
    .iter()
    .find(|s| s.is_active() && s.end_elapsed_s > event.onset_elapsed_s)
    .map(|s| s.label.clone());

  Some(event)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{make_points, run_span, walk_segment};

  fn cfg() -> BonkConfig {
    BonkConfig::default()
  }

  #[test]
  fn test_pace_decay_alone_does_not_trigger() {
    // Pace degrades 20% over the back half, HR stays flat — a deliberate
    // slow-down, not a bonk.
    let mut points = make_points(0, 1200, 5, 360.0, 150);
    points.extend(make_points(1200, 2400, 5, 432.0, 150));

    assert_eq!(detect_bonk(&points, &cfg()), None);
  }

  #[test]
  fn test_hr_rise_alone_does_not_trigger() {
    // HR climbs 10% with steady pace — a hill, not a bonk.
    let mut points = make_points(0, 1200, 5, 360.0, 150);
    points.extend(make_points(1200, 2400, 5, 360.0, 165));

    assert_eq!(detect_bonk(&points, &cfg()), None);
  }

  #[test]
  fn test_conjunction_triggers_at_first_qualifying_window() {
    // Pace +15% and HR +10% sustained from t=1200 on.
    let mut points = make_points(0, 1200, 5, 360.0, 150);
    points.extend(make_points(1200, 2400, 5, 414.0, 165));

    let event = detect_bonk(&points, &cfg()).expect("should detect a bonk");

    assert_eq!(event.onset_elapsed_s, 1200);
    assert!((event.severity_metric - 0.15).abs() < 0.02);
  }

  #[test]
  fn test_too_few_windows_returns_none() {
    // 300 s of data = at most 3 windows, not enough to form a baseline,
    // even with a blatant anomaly at the end.
    let mut points = make_points(0, 180, 5, 360.0, 150);
    points.extend(make_points(180, 300, 5, 700.0, 180));

    assert_eq!(detect_bonk(&points, &cfg()), None);
  }

  #[test]
  fn test_empty_series_returns_none() {
    assert_eq!(detect_bonk(&[], &cfg()), None);
  }

  #[test]
  fn test_anomaly_inside_walk_segment_is_invisible() {
    // Steady run, then a walk break where pace collapses and HR lingers —
    // exactly the false-positive shape segment-awareness exists to kill.
    let mut points = make_points(0, 1800, 5, 420.0, 155);
    points.extend(make_points(1800, 2100, 5, 900.0, 158));

    let segments = vec![
      run_span("Run 1", 0, 1800),
      walk_segment("Walk 1", 1800, 2100),
    ];

    assert_eq!(detect_bonk_per_segment(&points, &segments, &cfg()), None);
  }

  #[test]
  fn test_real_bonk_inside_run_segment_is_detected() {
    // Same anomaly shape, but inside the run segment itself.
    let mut points = make_points(0, 720, 5, 360.0, 150);
    points.extend(make_points(720, 1080, 5, 414.0, 162));

    let segments = vec![run_span("Run 1", 0, 1080)];

    let event =
      detect_bonk_per_segment(&points, &segments, &cfg()).expect("should detect a bonk");

    assert_eq!(event.onset_elapsed_s, 720);
    assert_eq!(event.segment_label.as_deref(), Some("Run 1"));
  }

  #[test]
  fn test_all_walk_activity_returns_none() {
    let points = make_points(0, 3600, 5, 900.0, 120);
    let segments = vec![
      walk_segment("Walk 1", 0, 1800),
      walk_segment("Walk 2", 1800, 3600),
    ];

    assert_eq!(detect_bonk_per_segment(&points, &segments, &cfg()), None);
  }

  #[test]
  fn test_empty_segments_returns_none() {
    let points = make_points(0, 3600, 5, 420.0, 150);
    assert_eq!(detect_bonk_per_segment(&points, &[], &cfg()), None);
  }
}
