//! Configuration: environment-backed settings and analysis thresholds.
//!
//! Credentials come from the environment (loaded from `.env` via dotenvy at
//! startup); the numeric analysis surface is a plain struct with defaults so
//! callers and tests can override individual knobs.

use std::env;

use crate::bonk::BonkConfig;
use crate::segments::HrZones;

/// Numeric thresholds for the analysis pipeline. Defaults fit a recreational
/// runner profile; everything is overridable by the caller.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
  /// Laps shorter than this are drills: excluded from pace decisions, rep
  /// grouping, and chart pace bounds.
  pub min_lap_display_m: f64,
  /// Relative distance tolerance for joining a rep group.
  pub rep_distance_tolerance: f64,
  /// Candidate rep groups below this member count are discarded.
  pub min_reps_per_group: usize,
  /// Number of palette slots rep colors cycle through.
  pub palette_size: usize,
  /// Safety cap on timeseries length.
  pub max_samples: usize,
  pub hr_zones: HrZones,
  pub bonk: BonkConfig,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      min_lap_display_m: 100.0,
      rep_distance_tolerance: 0.05,
      min_reps_per_group: 2,
      palette_size: 6,
      max_samples: 50_000,
      hr_zones: HrZones::default(),
      bonk: BonkConfig::default(),
    }
  }
}

impl AnalysisConfig {
  /// Default thresholds with the athlete's max HR applied to the zone model.
  pub fn for_max_hr(max_hr: i64) -> Self {
    let mut config = Self::default();
    config.hr_zones.max_hr = max_hr;
    config
  }
}

/// Database location, overridable for deployments; `mode=rwc` creates the
/// file on first run.
pub fn database_url() -> String {
  env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://run-coach.db?mode=rwc".to_string())
}

/// Athlete max HR from the environment, falling back to the zone-model
/// default.
pub fn max_hr_from_env() -> i64 {
  env::var("ATHLETE_MAX_HR")
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or_else(|| HrZones::default().max_hr)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = AnalysisConfig::default();
    assert!((config.min_lap_display_m - 100.0).abs() < 1e-9);
    assert!((config.rep_distance_tolerance - 0.05).abs() < 1e-9);
    assert_eq!(config.min_reps_per_group, 2);
    assert_eq!(config.hr_zones.max_hr, 185);
  }

  #[test]
  fn test_for_max_hr_overrides_zone_model_only() {
    let config = AnalysisConfig::for_max_hr(192);
    assert_eq!(config.hr_zones.max_hr, 192);
    assert_eq!(config.hr_zones.boundaries, HrZones::default().boundaries);
  }

  #[test]
  fn test_max_hr_from_env() {
    temp_env::with_var("ATHLETE_MAX_HR", Some("178"), || {
      assert_eq!(max_hr_from_env(), 178);
    });
    temp_env::with_var("ATHLETE_MAX_HR", None::<&str>, || {
      assert_eq!(max_hr_from_env(), 185);
    });
  }

  #[test]
  fn test_database_url_default() {
    temp_env::with_var("DATABASE_URL", None::<&str>, || {
      assert!(database_url().starts_with("sqlite://"));
    });
  }
}
