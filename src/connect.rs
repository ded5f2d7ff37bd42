//! Fitness platform HTTP client.
//!
//! OAuth2 token handling plus the four read endpoints the sync pipeline
//! needs: the activity feed (flat list schema), activity detail (nested
//! `summaryDTO` schema), lap splits, and per-sample records. Payloads are
//! returned raw or lightly typed — schema reconciliation belongs to the
//! normalizer, not here.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

use crate::normalizer::{LapDto, SampleDto};

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const CONNECT_AUTH_URL: &str = "https://connect.example.com/oauth/authorize";
const CONNECT_TOKEN_URL: &str = "https://connect.example.com/oauth/token";
const CONNECT_API_BASE: &str = "https://connect.example.com/api/v1";
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// ---------------------------------------------------------------------------
/// OAuth Data Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectConfig {
  pub client_id: String,
  pub client_secret: String,
  pub redirect_uri: String,
}

impl ConnectConfig {
  pub fn from_env() -> Result<Self, ConnectError> {
    Ok(Self {
      client_id: env::var("CONNECT_CLIENT_ID")
        .map_err(|_| ConnectError::MissingConfig("CONNECT_CLIENT_ID".into()))?,
      client_secret: env::var("CONNECT_CLIENT_SECRET")
        .map_err(|_| ConnectError::MissingConfig("CONNECT_CLIENT_SECRET".into()))?,
      redirect_uri: env::var("CONNECT_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8765/callback".to_string()),
    })
  }
}

/// Response from the platform token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: i64,
}

/// Stored token state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectTokens {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl ConnectTokens {
  pub fn from_response(resp: TokenResponse) -> Self {
    Self {
      access_token: resp.access_token,
      refresh_token: resp.refresh_token,
      expires_at: DateTime::from_timestamp(resp.expires_at, 0).unwrap_or_else(Utc::now),
    }
  }

  /// Refresh ahead of actual expiry so in-flight requests never race the
  /// deadline.
  pub fn needs_refresh(&self) -> bool {
    let buffer = Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
    Utc::now() + buffer >= self.expires_at
  }
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("OAuth error: {0}")]
  OAuth(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Database error: {0}")]
  Database(String),

  #[error("Not authenticated with the platform")]
  NotAuthenticated,
}

/// ---------------------------------------------------------------------------
/// Client
/// ---------------------------------------------------------------------------

pub struct ConnectClient {
  http: Client,
  config: ConnectConfig,
  token_url: String,
  api_base: String,
}

#[derive(Debug, Deserialize)]
struct SplitsResponse {
  #[serde(default, rename = "lapDTOs")]
  lap_dtos: Vec<LapDto>,
}

impl ConnectClient {
  pub fn new(config: ConnectConfig) -> Self {
    Self {
      http: Client::new(),
      config,
      token_url: CONNECT_TOKEN_URL.to_string(),
      api_base: CONNECT_API_BASE.to_string(),
    }
  }

  /// Client with both endpoints pointed at `base_url`; used by tests.
  pub fn with_base_url(config: ConnectConfig, base_url: &str) -> Self {
    Self {
      http: Client::new(),
      config,
      token_url: format!("{}/oauth/token", base_url),
      api_base: base_url.trim_end_matches('/').to_string(),
    }
  }

  /// The URL the user opens in a browser to authorize the app.
  pub fn build_auth_url(&self) -> Result<String, ConnectError> {
    let mut url = Url::parse(CONNECT_AUTH_URL).map_err(|e| ConnectError::OAuth(e.to_string()))?;

    url
      .query_pairs_mut()
      .append_pair("client_id", &self.config.client_id)
      .append_pair("redirect_uri", &self.config.redirect_uri)
      .append_pair("response_type", "code")
      .append_pair("scope", "activity:read");

    Ok(url.to_string())
  }

  /// Exchange an authorization code for tokens.
  pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<ConnectTokens, ConnectError> {
    let response = self
      .http
      .post(&self.token_url)
      .form(&[
        ("client_id", self.config.client_id.as_str()),
        ("client_secret", self.config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
      ])
      .send()
      .await?;

    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::OAuth(format!(
        "Token exchange failed: {}",
        error_text
      )));
    }

    let token_response: TokenResponse = response.json().await?;
    Ok(ConnectTokens::from_response(token_response))
  }

  /// Trade a refresh token for a fresh access token.
  pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<ConnectTokens, ConnectError> {
    let response = self
      .http
      .post(&self.token_url)
      .form(&[
        ("client_id", self.config.client_id.as_str()),
        ("client_secret", self.config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
      ])
      .send()
      .await?;

    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::OAuth(format!(
        "Token refresh failed: {}",
        error_text
      )));
    }

    let token_response: TokenResponse = response.json().await?;
    Ok(ConnectTokens::from_response(token_response))
  }

  /// Fetch recent activities from the feed endpoint (flat list schema).
  /// Returned raw so the caller can persist the original JSON alongside the
  /// normalized record.
  pub async fn fetch_activities(
    &self,
    access_token: &str,
    after: Option<i64>,
    limit: u32,
  ) -> Result<Vec<serde_json::Value>, ConnectError> {
    let mut url = format!("{}/activities?limit={}", self.api_base, limit);
    if let Some(after_timestamp) = after {
      url.push_str(&format!("&after={}", after_timestamp));
    }

    let response = self
      .http
      .get(&url)
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(ConnectError::NotAuthenticated);
    }
    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::Api(format!(
        "Failed to fetch activities: {}",
        error_text
      )));
    }

    let activities: Vec<serde_json::Value> = response.json().await?;
    Ok(activities)
  }

  /// Fetch the detail object for one activity (nested `summaryDTO` schema).
  pub async fn fetch_activity_detail(
    &self,
    access_token: &str,
    activity_id: i64,
  ) -> Result<serde_json::Value, ConnectError> {
    let url = format!("{}/activity/{}", self.api_base, activity_id);

    let response = self
      .http
      .get(&url)
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(ConnectError::NotAuthenticated);
    }
    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::Api(format!(
        "Failed to fetch activity {}: {}",
        activity_id, error_text
      )));
    }

    Ok(response.json().await?)
  }

  /// Fetch the lap records for one activity.
  pub async fn fetch_activity_splits(
    &self,
    access_token: &str,
    activity_id: i64,
  ) -> Result<Vec<LapDto>, ConnectError> {
    let url = format!("{}/activity/{}/splits", self.api_base, activity_id);

    let response = self
      .http
      .get(&url)
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(ConnectError::NotAuthenticated);
    }
    // Manual entries have no splits.
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(vec![]);
    }
    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::Api(format!(
        "Failed to fetch splits for {}: {}",
        activity_id, error_text
      )));
    }

    let splits: SplitsResponse = response.json().await?;
    Ok(splits.lap_dtos)
  }

  /// Fetch the per-sample track for one activity. 404 means the platform
  /// has no recorded track (manual entry) — an empty series, not an error.
  pub async fn fetch_activity_samples(
    &self,
    access_token: &str,
    activity_id: i64,
  ) -> Result<Vec<SampleDto>, ConnectError> {
    let url = format!("{}/activity/{}/samples", self.api_base, activity_id);

    let response = self
      .http
      .get(&url)
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(ConnectError::NotAuthenticated);
    }
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(vec![]);
    }
    if !response.status().is_success() {
      let error_text = response.text().await.unwrap_or_default();
      return Err(ConnectError::Api(format!(
        "Failed to fetch samples for {}: {}",
        activity_id, error_text
      )));
    }

    let samples: Vec<SampleDto> = response.json().await?;
    Ok(samples)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
