//! Platform response normalizer.
//!
//! The platform uses two different response schemas depending on endpoint:
//!
//!   list items (activity feed):
//!     - flat structure: `activityType`, `startTimeGMT`, `distance`,
//!       `averageHR` all at top level
//!     - time format: "YYYY-MM-DD HH:MM:SS" (space-separated, no zone)
//!
//!   detail objects:
//!     - nested structure: performance fields live under `summaryDTO`,
//!       type info under `activityTypeDTO`
//!     - time format: "YYYY-MM-DDTHH:MM:SS.f" (ISO 8601 with T separator)
//!
//! Both shapes are normalized here into one `NormalizedActivity`. Nothing
//! downstream ever branches on the source schema.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
  #[error("neither startTimeGMT nor startTimeLocal present in activity payload")]
  MissingStartTime,

  #[error("unrecognized timestamp format: {0}")]
  BadTimestamp(String),
}

/// ---------------------------------------------------------------------------
/// Wire shapes
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeKey {
  pub type_key: String,
}

/// Flat list-item shape from the activity feed endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedActivity {
  pub activity_id: i64,
  #[serde(default)]
  pub activity_name: Option<String>,
  #[serde(default)]
  pub activity_type: Option<TypeKey>,
  #[serde(default, rename = "startTimeGMT")]
  pub start_time_gmt: Option<String>,
  #[serde(default)]
  pub start_time_local: Option<String>,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default, rename = "averageHR")]
  pub average_hr: Option<f64>,
  #[serde(default, rename = "maxHR")]
  pub max_hr: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub elevation_gain: Option<f64>,
  #[serde(default)]
  pub average_run_cadence: Option<f64>,
}

/// Performance block nested inside the detail shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailSummary {
  #[serde(default, rename = "startTimeGMT")]
  pub start_time_gmt: Option<String>,
  #[serde(default)]
  pub start_time_local: Option<String>,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default, rename = "averageHR")]
  pub average_hr: Option<f64>,
  #[serde(default, rename = "maxHR")]
  pub max_hr: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub elevation_gain: Option<f64>,
  #[serde(default)]
  pub average_run_cadence: Option<f64>,
}

/// Nested detail shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailActivity {
  pub activity_id: i64,
  #[serde(default)]
  pub activity_name: Option<String>,
  #[serde(default, rename = "activityTypeDTO")]
  pub activity_type_dto: Option<TypeKey>,
  #[serde(rename = "summaryDTO")]
  pub summary: DetailSummary,
}

/// Raw activity payload from either endpoint. The presence of `summaryDTO`
/// is the shape discriminator: serde tries the detail branch first (the only
/// one requiring that key) and falls back to the flat list shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActivityPayload {
  Detail(DetailActivity),
  Listed(ListedActivity),
}

impl ActivityPayload {
  pub fn activity_id(&self) -> i64 {
    match self {
      ActivityPayload::Detail(d) => d.activity_id,
      ActivityPayload::Listed(l) => l.activity_id,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Normalized activity
/// ---------------------------------------------------------------------------

/// The one activity shape every downstream component consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedActivity {
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
}

/// Parse a platform datetime in either endpoint format.
pub fn parse_connect_datetime(s: &str) -> Result<DateTime<Utc>, NormalizeError> {
  let s = s.trim();

  let naive = if s.contains('T') {
    // ISO 8601 with T separator (detail endpoint); fractional seconds vary
    // between .0 and .000, so drop them before parsing.
    let base = s.split('.').next().unwrap_or(s);
    NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S")
  } else {
    // Space-separated (list endpoint)
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
  }
  .map_err(|_| NormalizeError::BadTimestamp(s.to_string()))?;

  Ok(naive.and_utc())
}

/// Convert m/s to s/km. None for zero or negative speeds.
pub fn pace_from_speed(speed_ms: Option<f64>) -> Option<f64> {
  match speed_ms {
    Some(v) if v > 0.0 => Some(1000.0 / v),
    _ => None,
  }
}

/// Normalize an activity payload from either endpoint schema.
pub fn normalize_activity(payload: &ActivityPayload) -> Result<NormalizedActivity, NormalizeError> {
  match payload {
    ActivityPayload::Listed(l) => {
      let time_str = l
        .start_time_gmt
        .as_deref()
        .or(l.start_time_local.as_deref())
        .ok_or(NormalizeError::MissingStartTime)?;

      Ok(NormalizedActivity {
        connect_activity_id: l.activity_id.to_string(),
        name: l.activity_name.clone().unwrap_or_default(),
        activity_type: l
          .activity_type
          .as_ref()
          .map(|t| t.type_key.clone())
          .unwrap_or_else(|| "running".to_string()),
        start_time_utc: parse_connect_datetime(time_str)?,
        duration_seconds: l.duration.unwrap_or(0.0),
        distance_meters: l.distance.unwrap_or(0.0),
        avg_hr: l.average_hr,
        max_hr: l.max_hr,
        avg_pace_seconds_per_km: pace_from_speed(l.average_speed),
        total_ascent_meters: l.elevation_gain,
        avg_cadence_spm: l.average_run_cadence,
      })
    }
    ActivityPayload::Detail(d) => {
      let s = &d.summary;
      let time_str = s
        .start_time_gmt
        .as_deref()
        .or(s.start_time_local.as_deref())
        .ok_or(NormalizeError::MissingStartTime)?;

      Ok(NormalizedActivity {
        connect_activity_id: d.activity_id.to_string(),
        name: d.activity_name.clone().unwrap_or_default(),
        activity_type: d
          .activity_type_dto
          .as_ref()
          .map(|t| t.type_key.clone())
          .unwrap_or_else(|| "running".to_string()),
        start_time_utc: parse_connect_datetime(time_str)?,
        duration_seconds: s.duration.unwrap_or(0.0),
        distance_meters: s.distance.unwrap_or(0.0),
        avg_hr: s.average_hr,
        max_hr: s.max_hr,
        avg_pace_seconds_per_km: pace_from_speed(s.average_speed),
        total_ascent_meters: s.elevation_gain,
        avg_cadence_spm: s.average_run_cadence,
      })
    }
  }
}

/// ---------------------------------------------------------------------------
/// Laps
/// ---------------------------------------------------------------------------

/// One lap record from the splits endpoint (`lapDTOs`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapDto {
  #[serde(default)]
  pub intensity_type: Option<String>,
  #[serde(default, rename = "startTimeGMT")]
  pub start_time_gmt: Option<String>,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default, rename = "averageHR")]
  pub average_hr: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
}

/// Explicit intensity tag carried by a lap, when the device recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapIntensity {
  Active,
  Recovery,
  Warmup,
  Cooldown,
}

impl LapIntensity {
  pub fn as_str(&self) -> &'static str {
    match self {
      LapIntensity::Active => "active",
      LapIntensity::Recovery => "recovery",
      LapIntensity::Warmup => "warmup",
      LapIntensity::Cooldown => "cooldown",
    }
  }

  /// Inverse of `as_str`, for rows read back from storage.
  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "active" => Some(LapIntensity::Active),
      "recovery" => Some(LapIntensity::Recovery),
      "warmup" => Some(LapIntensity::Warmup),
      "cooldown" => Some(LapIntensity::Cooldown),
      _ => None,
    }
  }
}

/// A lap normalized for the segment builder: elapsed start already resolved
/// against the activity's start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLap {
  pub lap_index: usize,
  pub intensity: Option<LapIntensity>,
  pub start_elapsed_s: i64,
  pub duration_seconds: f64,
  pub distance_meters: f64,
  pub avg_hr: Option<f64>,
  pub avg_pace_seconds_per_km: Option<f64>,
}

fn parse_intensity(raw: Option<&str>) -> Option<LapIntensity> {
  match raw?.to_ascii_uppercase().as_str() {
    "ACTIVE" => Some(LapIntensity::Active),
    "RECOVERY" | "REST" => Some(LapIntensity::Recovery),
    "WARMUP" => Some(LapIntensity::Warmup),
    "COOLDOWN" => Some(LapIntensity::Cooldown),
    _ => None,
  }
}

/// Normalize the ordered lap list, resolving each lap's elapsed start.
///
/// Laps carrying a `startTimeGMT` resolve against the activity start; laps
/// without one fall back to a running cursor (previous start + duration), so
/// a missing timestamp mid-list degrades to sequential placement instead of
/// collapsing everything to zero.
pub fn normalize_laps(
  dtos: &[LapDto],
  activity_start_utc: DateTime<Utc>,
) -> Vec<RawLap> {
  let mut laps = Vec::with_capacity(dtos.len());
  let mut cursor: i64 = 0;

  for (i, dto) in dtos.iter().enumerate() {
    let start_elapsed_s = dto
      .start_time_gmt
      .as_deref()
      .and_then(|ts| parse_connect_datetime(ts).ok())
      .map(|t| (t - activity_start_utc).num_seconds().max(0))
      .unwrap_or(cursor);

    let duration_seconds = dto.duration.unwrap_or(0.0);
    cursor = start_elapsed_s + duration_seconds.round() as i64;

    laps.push(RawLap {
      lap_index: i,
      intensity: parse_intensity(dto.intensity_type.as_deref()),
      start_elapsed_s,
      duration_seconds,
      distance_meters: dto.distance.unwrap_or(0.0),
      avg_hr: dto.average_hr,
      avg_pace_seconds_per_km: pace_from_speed(dto.average_speed),
    });
  }

  laps
}

/// ---------------------------------------------------------------------------
/// Samples
/// ---------------------------------------------------------------------------

/// One raw per-sample record from the decoded track. The platform may
/// deliver an elapsed offset or an absolute timestamp, and any subset of the
/// metric fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleDto {
  pub elapsed_seconds: Option<i64>,
  pub timestamp_gmt: Option<String>,
  pub heart_rate: Option<i64>,
  pub speed_ms: Option<f64>,
  pub pace_seconds_per_km: Option<f64>,
  pub elevation_meters: Option<f64>,
  pub cadence_spm: Option<i64>,
  pub distance_meters: Option<f64>,
}

/// A sample normalized for the timeseries builder: elapsed offset resolved,
/// pace present whenever derivable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
  pub elapsed_seconds: i64,
  pub pace_seconds_per_km: Option<f64>,
  pub heart_rate: Option<i64>,
  pub elevation_meters: Option<f64>,
  pub cadence_spm: Option<i64>,
  pub distance_meters: Option<f64>,
}

/// Normalize raw samples. Samples with neither an elapsed offset nor a
/// parseable timestamp are dropped — there is nowhere to place them.
pub fn normalize_samples(
  dtos: &[SampleDto],
  activity_start_utc: DateTime<Utc>,
) -> Vec<RawSample> {
  dtos
    .iter()
    .filter_map(|d| {
      let elapsed_seconds = match (d.elapsed_seconds, d.timestamp_gmt.as_deref()) {
        (Some(e), _) => e,
        (None, Some(ts)) => {
          (parse_connect_datetime(ts).ok()? - activity_start_utc).num_seconds()
        }
        (None, None) => return None,
      };

      Some(RawSample {
        elapsed_seconds,
        pace_seconds_per_km: d
          .pace_seconds_per_km
          .filter(|p| *p > 0.0)
          .or_else(|| pace_from_speed(d.speed_ms)),
        heart_rate: d.heart_rate,
        elevation_meters: d.elevation_meters,
        cadence_spm: d.cadence_spm,
        distance_meters: d.distance_meters,
      })
    })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
