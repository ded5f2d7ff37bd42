//! Sync service: fetch → normalize → store.
//!
//! Pulls new activities from the platform, normalizes both upstream schemas,
//! and upserts into SQLite keyed by the platform activity id. Splits or
//! samples failing for one activity degrade that activity (logged, summary
//! row still stored) — they never abort the whole sync.
//!
//! Also exposes the read side: rebuilding a full analysis `Report` from a
//! stored activity.

use chrono::Utc;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::connect::{ConnectClient, ConnectError, ConnectTokens};
use crate::db::DbPool;
use crate::models::activity::{Activity, ActivityLap};
use crate::models::sync::{DebriefRecord, SyncState};
use crate::normalizer::{
  normalize_activity, normalize_laps, normalize_samples, ActivityPayload, LapIntensity,
  NormalizedActivity, RawLap, RawSample,
};
use crate::report::{analyze_activity, Report};

const SYNC_SOURCE: &str = "connect";
const SYNC_PAGE_SIZE: u32 = 50;

/// ---------------------------------------------------------------------------
/// Token storage
/// ---------------------------------------------------------------------------

pub async fn save_tokens(db: &DbPool, tokens: &ConnectTokens) -> Result<(), ConnectError> {
  sqlx::query(
    r#"
    INSERT INTO sync_state (source, access_token, refresh_token, token_expires_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(source) DO UPDATE SET
        access_token = excluded.access_token,
        refresh_token = excluded.refresh_token,
        token_expires_at = excluded.token_expires_at
    "#,
  )
  .bind(SYNC_SOURCE)
  .bind(&tokens.access_token)
  .bind(&tokens.refresh_token)
  .bind(tokens.expires_at)
  .execute(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  Ok(())
}

pub async fn load_tokens(db: &DbPool) -> Result<Option<ConnectTokens>, ConnectError> {
  let row: Option<(
    Option<String>,
    Option<String>,
    Option<chrono::DateTime<Utc>>,
  )> = sqlx::query_as(
    "SELECT access_token, refresh_token, token_expires_at
         FROM sync_state WHERE source = ?1",
  )
  .bind(SYNC_SOURCE)
  .fetch_optional(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  match row {
    Some((Some(access), Some(refresh), Some(expires))) => Ok(Some(ConnectTokens {
      access_token: access,
      refresh_token: refresh,
      expires_at: expires,
    })),
    _ => Ok(None),
  }
}

/// Get a valid access token, refreshing through the platform if the stored
/// one is about to expire.
pub async fn get_valid_access_token(
  db: &DbPool,
  client: &ConnectClient,
) -> Result<String, ConnectError> {
  let mut tokens = load_tokens(db).await?.ok_or(ConnectError::NotAuthenticated)?;

  if tokens.needs_refresh() {
    tokens = client.refresh_tokens(&tokens.refresh_token).await?;
    save_tokens(db, &tokens).await?;
    println!("Platform tokens auto-refreshed");
  }

  Ok(tokens.access_token)
}

/// ---------------------------------------------------------------------------
/// Activity storage
/// ---------------------------------------------------------------------------

/// Insert a normalized activity. Returns the new row id, or None when the
/// activity was already stored (sync is re-runnable).
pub async fn insert_activity(
  db: &DbPool,
  activity: &NormalizedActivity,
  raw_json: &serde_json::Value,
) -> Result<Option<i64>, ConnectError> {
  let result = sqlx::query(
    r#"
    INSERT INTO activities (
      connect_activity_id, name, activity_type, start_time_utc,
      duration_seconds, distance_meters, avg_hr, max_hr,
      avg_pace_seconds_per_km, total_ascent_meters, avg_cadence_spm, raw_json
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    ON CONFLICT(connect_activity_id) DO NOTHING
    "#,
  )
  .bind(&activity.connect_activity_id)
  .bind(&activity.name)
  .bind(&activity.activity_type)
  .bind(activity.start_time_utc)
  .bind(activity.duration_seconds)
  .bind(activity.distance_meters)
  .bind(activity.avg_hr)
  .bind(activity.max_hr)
  .bind(activity.avg_pace_seconds_per_km)
  .bind(activity.total_ascent_meters)
  .bind(activity.avg_cadence_spm)
  .bind(raw_json.to_string())
  .execute(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  if result.rows_affected() > 0 {
    Ok(Some(result.last_insert_rowid()))
  } else {
    Ok(None)
  }
}

/// Replace the stored laps for an activity.
pub async fn save_laps(
  db: &DbPool,
  activity_row_id: i64,
  laps: &[RawLap],
) -> Result<(), ConnectError> {
  for lap in laps {
    sqlx::query(
      r#"
      INSERT INTO activity_laps (
        activity_id, lap_index, intensity, start_elapsed_s,
        duration_seconds, distance_meters, avg_hr, avg_pace_seconds_per_km
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      ON CONFLICT(activity_id, lap_index) DO UPDATE SET
          intensity = excluded.intensity,
          start_elapsed_s = excluded.start_elapsed_s,
          duration_seconds = excluded.duration_seconds,
          distance_meters = excluded.distance_meters,
          avg_hr = excluded.avg_hr,
          avg_pace_seconds_per_km = excluded.avg_pace_seconds_per_km
      "#,
    )
    .bind(activity_row_id)
    .bind(lap.lap_index as i64)
    .bind(lap.intensity.map(|i| i.as_str()))
    .bind(lap.start_elapsed_s)
    .bind(lap.duration_seconds)
    .bind(lap.distance_meters)
    .bind(lap.avg_hr)
    .bind(lap.avg_pace_seconds_per_km)
    .execute(db)
    .await
    .map_err(|e| ConnectError::Database(e.to_string()))?;
  }

  Ok(())
}

/// Store the normalized sample track as JSON on the activity row.
pub async fn save_samples(
  db: &DbPool,
  activity_row_id: i64,
  samples: &[RawSample],
) -> Result<(), ConnectError> {
  let samples_json =
    serde_json::to_string(samples).map_err(|e| ConnectError::Database(e.to_string()))?;

  sqlx::query(
    "UPDATE activities SET samples_json = ?1, samples_fetched_at = ?2 WHERE id = ?3",
  )
  .bind(&samples_json)
  .bind(Utc::now())
  .bind(activity_row_id)
  .execute(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  Ok(())
}

async fn update_sync_time(db: &DbPool) -> Result<(), ConnectError> {
  sqlx::query("UPDATE sync_state SET last_sync_at = CURRENT_TIMESTAMP WHERE source = ?1")
    .bind(SYNC_SOURCE)
    .execute(db)
    .await
    .map_err(|e| ConnectError::Database(e.to_string()))?;

  Ok(())
}

/// Current sync bookkeeping row for the platform source.
pub async fn get_sync_state(db: &DbPool) -> Result<Option<SyncState>, ConnectError> {
  sqlx::query_as("SELECT * FROM sync_state WHERE source = ?1")
    .bind(SYNC_SOURCE)
    .fetch_optional(db)
    .await
    .map_err(|e| ConnectError::Database(e.to_string()))
}

/// Unix timestamp of the most recent stored activity, for incremental sync.
async fn last_activity_timestamp(db: &DbPool) -> Result<Option<i64>, ConnectError> {
  let ts: Option<i64> = sqlx::query_scalar(
    "SELECT CAST(strftime('%s', MAX(start_time_utc)) AS INTEGER) FROM activities",
  )
  .fetch_one(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  Ok(ts)
}

/// ---------------------------------------------------------------------------
/// Sync
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SyncOutcome {
  pub new_activities: usize,
  pub total_fetched: usize,
}

/// Sync recent activities from the platform into the database.
pub async fn sync_activities(
  db: &DbPool,
  client: &ConnectClient,
) -> Result<SyncOutcome, ConnectError> {
  let access_token = get_valid_access_token(db, client).await?;
  let after = last_activity_timestamp(db).await?;

  let raw_activities = client
    .fetch_activities(&access_token, after, SYNC_PAGE_SIZE)
    .await?;
  let total_fetched = raw_activities.len();

  let mut new_count = 0;
  for raw in &raw_activities {
    let payload: ActivityPayload = match serde_json::from_value(raw.clone()) {
      Ok(p) => p,
      Err(e) => {
        eprintln!("Skipping unparseable activity payload: {}", e);
        continue;
      }
    };
    let activity_id = payload.activity_id();

    let normalized = match normalize_activity(&payload) {
      Ok(n) => n,
      Err(e) => {
        eprintln!("Skipping activity {}: {}", activity_id, e);
        continue;
      }
    };

    let Some(row_id) = insert_activity(db, &normalized, raw).await? else {
      continue; // already stored
    };
    new_count += 1;

    // Laps and samples are nice-to-have: a failure degrades this activity
    // to summary-only instead of failing the sync.
    match client.fetch_activity_splits(&access_token, activity_id).await {
      Ok(dtos) => {
        let laps = normalize_laps(&dtos, normalized.start_time_utc);
        save_laps(db, row_id, &laps).await?;
      }
      Err(e) => {
        eprintln!("Warning: failed to fetch splits for {}: {}", activity_id, e);
      }
    }

    match client.fetch_activity_samples(&access_token, activity_id).await {
      Ok(dtos) if !dtos.is_empty() => {
        let samples = normalize_samples(&dtos, normalized.start_time_utc);
        save_samples(db, row_id, &samples).await?;
      }
      Ok(_) => {}
      Err(e) => {
        eprintln!("Warning: failed to fetch samples for {}: {}", activity_id, e);
      }
    }
  }

  update_sync_time(db).await?;

  println!(
    "Sync complete: {} new activities (fetched {})",
    new_count, total_fetched
  );

  Ok(SyncOutcome {
    new_activities: new_count,
    total_fetched,
  })
}

/// ---------------------------------------------------------------------------
/// Read side: stored activity → Report
/// ---------------------------------------------------------------------------

fn activity_from_row(row: &Activity) -> NormalizedActivity {
  NormalizedActivity {
    connect_activity_id: row.connect_activity_id.clone(),
    name: row.name.clone(),
    activity_type: row.activity_type.clone(),
    start_time_utc: row.start_time_utc,
    duration_seconds: row.duration_seconds,
    distance_meters: row.distance_meters,
    avg_hr: row.avg_hr,
    max_hr: row.max_hr,
    avg_pace_seconds_per_km: row.avg_pace_seconds_per_km,
    total_ascent_meters: row.total_ascent_meters,
    avg_cadence_spm: row.avg_cadence_spm,
  }
}

fn lap_from_row(row: &ActivityLap) -> RawLap {
  RawLap {
    lap_index: row.lap_index as usize,
    intensity: row.intensity.as_deref().and_then(LapIntensity::from_str),
    start_elapsed_s: row.start_elapsed_s,
    duration_seconds: row.duration_seconds,
    distance_meters: row.distance_meters,
    avg_hr: row.avg_hr,
    avg_pace_seconds_per_km: row.avg_pace_seconds_per_km,
  }
}

/// Rebuild the full analysis report for a stored activity.
pub async fn report_for_activity(
  db: &DbPool,
  connect_activity_id: &str,
  config: &AnalysisConfig,
) -> Result<Report, ConnectError> {
  let row: Option<Activity> =
    sqlx::query_as("SELECT * FROM activities WHERE connect_activity_id = ?1")
      .bind(connect_activity_id)
      .fetch_optional(db)
      .await
      .map_err(|e| ConnectError::Database(e.to_string()))?;

  let row = row.ok_or_else(|| {
    ConnectError::Database(format!("no activity with id {}", connect_activity_id))
  })?;

  let lap_rows: Vec<ActivityLap> = sqlx::query_as(
    "SELECT * FROM activity_laps WHERE activity_id = ?1 ORDER BY lap_index",
  )
  .bind(row.id)
  .fetch_all(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  let samples: Vec<RawSample> = match &row.samples_json {
    Some(json) => serde_json::from_str(json).unwrap_or_default(),
    None => Vec::new(),
  };

  let laps: Vec<RawLap> = lap_rows.iter().map(lap_from_row).collect();
  let activity = activity_from_row(&row);

  Ok(analyze_activity(activity, &laps, &samples, config))
}

/// Store a generated debrief for an activity.
pub async fn save_debrief(
  db: &DbPool,
  activity_row_id: i64,
  debrief: &crate::llm::RunDebrief,
  model_version: &str,
) -> Result<(), ConnectError> {
  let cautions_json =
    serde_json::to_string(&debrief.cautions).map_err(|e| ConnectError::Database(e.to_string()))?;

  sqlx::query(
    r#"
    INSERT INTO debriefs (activity_id, headline, debrief, cautions_json, model_version)
    VALUES (?1, ?2, ?3, ?4, ?5)
    "#,
  )
  .bind(activity_row_id)
  .bind(&debrief.headline)
  .bind(&debrief.debrief)
  .bind(&cautions_json)
  .bind(model_version)
  .execute(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))?;

  Ok(())
}

/// Most recent stored debrief for an activity, if any.
pub async fn latest_debrief(
  db: &DbPool,
  activity_row_id: i64,
) -> Result<Option<DebriefRecord>, ConnectError> {
  sqlx::query_as(
    "SELECT * FROM debriefs WHERE activity_id = ?1 ORDER BY id DESC LIMIT 1",
  )
  .bind(activity_row_id)
  .fetch_optional(db)
  .await
  .map_err(|e| ConnectError::Database(e.to_string()))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
