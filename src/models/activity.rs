use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored activity, upsert-keyed by the platform's activity id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
  pub id: i64,
  pub connect_activity_id: String,
  pub name: String,
  pub activity_type: String,
  pub start_time_utc: DateTime<Utc>,
  pub duration_seconds: f64,
  pub distance_meters: f64,
  pub avg_hr: Option<f64>,
  pub max_hr: Option<f64>,
  pub avg_pace_seconds_per_km: Option<f64>,
  pub total_ascent_meters: Option<f64>,
  pub avg_cadence_spm: Option<f64>,
  pub raw_json: Option<String>,
  pub samples_json: Option<String>,
  pub samples_fetched_at: Option<DateTime<Utc>>,
  pub created_at: Option<DateTime<Utc>>,
}

/// One stored lap record belonging to an activity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLap {
  pub id: i64,
  pub activity_id: i64,
  pub lap_index: i64,
  pub intensity: Option<String>,
  pub start_elapsed_s: i64,
  pub duration_seconds: f64,
  pub distance_meters: f64,
  pub avg_hr: Option<f64>,
  pub avg_pace_seconds_per_km: Option<f64>,
}
