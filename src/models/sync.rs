use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-source sync bookkeeping: OAuth tokens plus last-sync markers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncState {
  pub id: i64,
  pub source: String,
  pub last_sync_at: Option<DateTime<Utc>>,
  pub last_activity_at: Option<DateTime<Utc>>,
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
  pub token_expires_at: Option<DateTime<Utc>>,
}

/// A stored debrief for one activity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DebriefRecord {
  pub id: i64,
  pub activity_id: i64,
  pub headline: Option<String>,
  pub debrief: Option<String>,
  pub cautions_json: Option<String>,
  pub model_version: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}
