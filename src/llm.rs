//! LLM integration for run debriefs.
//!
//! Handles communication with the Claude API. The model narrates numbers the
//! analysis pipeline already computed — it never does the math itself, so
//! the prompt carries every figure the debrief may reference.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::Report;
use crate::segments::SegmentKind;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const DEBRIEF_MAX_TOKENS: u32 = 1024;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum LlmError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest {
  model: String,
  max_tokens: u32,
  system: String,
  messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
  role: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Debrief response (from Claude)
/// ---------------------------------------------------------------------------

/// The narrated debrief sent back to the chat layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDebrief {
  /// One-line takeaway shown above the chart.
  pub headline: String,
  /// The debrief body, a few short paragraphs.
  pub debrief: String,
  /// Anything worth keeping an eye on (fatigue, pacing, zone drift).
  pub cautions: Vec<String>,
}

/// ---------------------------------------------------------------------------
/// Claude Client
/// ---------------------------------------------------------------------------

pub struct ClaudeClient {
  client: Client,
  api_key: String,
  api_url: String,
}

impl ClaudeClient {
  /// Create a client, loading the API key from the environment.
  pub fn from_env() -> Result<Self, LlmError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;

    Ok(Self {
      client: Client::new(),
      api_key,
      api_url: CLAUDE_API_URL.to_string(),
    })
  }

  /// Client pointed at a different endpoint; used by tests.
  pub fn with_api_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      api_url: api_url.into(),
    }
  }

  /// Call Claude with a system prompt and user message.
  pub async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    let request = ClaudeRequest {
      model: CLAUDE_MODEL.to_string(),
      max_tokens,
      system: system_prompt.to_string(),
      messages: vec![ClaudeMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
      }],
    };

    let response = self
      .client
      .post(&self.api_url)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(LlmError::Api(error_resp.error.message));
      }
      return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

    let text = claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| LlmError::Parse("No text content in response".to_string()))?;

    Ok((text, claude_response.usage))
  }

  /// Narrate a finished report as a chat-ready debrief.
  pub async fn generate_debrief(&self, report: &Report) -> Result<(RunDebrief, Usage), LlmError> {
    let system_prompt = include_str!("prompts/debrief_system.txt");

    let user_message = format!(
      "Write the debrief for this run.\n\nRUN DATA:\n{}\n\nRespond with valid JSON matching the OUTPUT FORMAT in your instructions.",
      build_debrief_prompt(report)
    );

    let (response_text, usage) = self
      .complete(system_prompt, &user_message, DEBRIEF_MAX_TOKENS)
      .await?;

    let json_str = extract_json(&response_text)?;
    let debrief: RunDebrief = serde_json::from_str(&json_str)
      .map_err(|e| LlmError::Parse(format!("{}: {}", e, json_str)))?;

    Ok((debrief, usage))
  }
}

/// ---------------------------------------------------------------------------
/// Prompt construction
/// ---------------------------------------------------------------------------

/// Format a pace (s/km) as "M:SS/km".
pub fn format_pace(pace_s_per_km: f64) -> String {
  let s = pace_s_per_km.round() as i64;
  format!("{}:{:02}/km", s / 60, s % 60)
}

/// Format a duration in seconds as "M:SS" or "H:MM:SS".
pub fn format_duration(seconds: f64) -> String {
  let s = seconds.round() as i64;
  if s >= 3600 {
    format!("{}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
  } else {
    format!("{}:{:02}", s / 60, s % 60)
  }
}

fn zone_line(distribution: &[f64; 5]) -> String {
  distribution
    .iter()
    .enumerate()
    .filter(|(_, frac)| **frac > 0.005)
    .map(|(i, frac)| format!("Z{} {:.0}%", i + 1, frac * 100.0))
    .collect::<Vec<String>>()
    .join(" ")
}

/// Flatten a report into the plain-text block the debrief prompt carries:
/// summary scalars, per-segment lines, rep comparisons, and the fatigue
/// finding.
pub fn build_debrief_prompt(report: &Report) -> String {
  let mut lines = Vec::new();

  let a = &report.activity;
  lines.push(format!(
    "Activity: {} — {} ({})",
    if a.name.is_empty() { "Run" } else { &a.name },
    a.start_time_utc.format("%Y-%m-%d %H:%M UTC"),
    a.activity_type
  ));

  let t = &report.totals;
  let mut totals_line = format!(
    "Totals: {:.2} km in {}",
    t.total_distance_meters / 1000.0,
    format_duration(t.total_duration_seconds)
  );
  if let Some(pace) = t.avg_pace_seconds_per_km {
    totals_line.push_str(&format!(", avg pace {}", format_pace(pace)));
  }
  if let Some(hr) = t.avg_heart_rate_bpm {
    totals_line.push_str(&format!(", avg HR {:.0}", hr));
  }
  if let Some(max) = t.max_heart_rate_bpm {
    totals_line.push_str(&format!(", max HR {}", max));
  }
  lines.push(totals_line);

  if !report.segments.is_empty() {
    lines.push("Segments:".to_string());
    for seg in &report.segments {
      let mut line = format!(
        "  {}: {:.2} km @ {}, HR {:.0}",
        seg.label,
        seg.distance_meters / 1000.0,
        format_pace(seg.avg_pace_seconds_per_km),
        seg.avg_heart_rate_bpm
      );
      let zones = zone_line(&seg.hr_zone_distribution);
      if !zones.is_empty() {
        line.push_str(&format!(" (zones: {})", zones));
      }
      if seg.kind == SegmentKind::Drill {
        line.push_str(" [drill]");
      }
      lines.push(line);
    }
  }

  for group in &report.rep_groups {
    let paces: Vec<String> = group
      .segment_indices
      .iter()
      .filter_map(|i| report.segments.get(*i))
      .map(|s| format_pace(s.avg_pace_seconds_per_km))
      .collect();
    lines.push(format!(
      "Rep group: {} × ~{:.0} m at {}",
      group.segment_indices.len(),
      group.reference_distance_meters,
      paces.join(", ")
    ));
  }

  match &report.bonk {
    Some(event) => {
      let mut line = format!(
        "Fatigue: pace faded {:.0}% with HR drifting up from {}",
        event.severity_metric * 100.0,
        format_duration(event.onset_elapsed_s as f64)
      );
      if let Some(label) = &event.segment_label {
        line.push_str(&format!(" (in {})", label));
      }
      lines.push(line);
    }
    None => lines.push("Fatigue: none detected".to_string()),
  }

  for warning in &report.warnings {
    lines.push(format!("Data note: {}", warning));
  }

  lines.join("\n")
}

/// Extract JSON from Claude's response, tolerating markdown fences and
/// surrounding prose.
fn extract_json(text: &str) -> Result<String, LlmError> {
  let trimmed = text.trim();
  if trimmed.starts_with('{') {
    return Ok(trimmed.to_string());
  }

  // Fenced code block, with or without a language tag
  if let Some(fence_start) = text.find("```") {
    let after_fence = &text[fence_start + 3..];
    let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_fence[content_start..];
    if let Some(fence_end) = content.find("```") {
      let inner = content[..fence_end].trim();
      if inner.starts_with('{') {
        return Ok(inner.to_string());
      }
    }
  }

  // Last resort: outermost brace pair
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    if start < end {
      return Ok(text[start..=end].to_string());
    }
  }

  Err(LlmError::Parse(
    "Could not extract JSON from response".to_string(),
  ))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
