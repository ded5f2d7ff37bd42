//! run-coach: automated run analysis and post-run debriefs.
//!
//! Pulls running activities from the fitness platform, stores them in
//! SQLite, runs the deterministic analysis pipeline (timeseries → segments →
//! rep groups → fatigue detection → report), and asks Claude to narrate the
//! result. The analysis core is pure — a function of (laps, samples,
//! config) — and all I/O lives at the edges.
//!
//! Call `dotenvy::dotenv().ok()` once at process start so the env-backed
//! config (`connect::ConnectConfig`, `llm::ClaudeClient`, `config::*`)
//! can see the `.env` file.

pub mod bonk;
pub mod charts;
pub mod config;
pub mod connect;
pub mod db;
pub mod intervals;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod report;
pub mod segments;
pub mod sync;
pub mod timeseries;

#[cfg(test)]
pub mod test_utils;

pub use config::AnalysisConfig;
pub use report::{analyze_activity, Report};
