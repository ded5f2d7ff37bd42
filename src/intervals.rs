//! Repeated-interval grouping.
//!
//! Clusters same-distance Run segments into rep groups so the chart and the
//! debrief can compare rep 1 against rep N. The clustering is greedy
//! first-fit-bind: scanning chronologically, a segment joins the first open
//! group whose reference distance (its first member's) is within tolerance,
//! otherwise it opens a new candidate group. Ties at the tolerance boundary
//! therefore resolve to the earliest group — order-sensitive on purpose, and
//! pinned by tests. Nearest-reference matching would group differently near
//! the boundary and is deliberately not implemented.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::segments::{Segment, SegmentKind};

/// A set of ≥2 Run segments with mutually similar distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepGroup {
  /// Indices into the segment list, chronological.
  pub segment_indices: Vec<usize>,
  /// Distance of the group's first member — the band all later members
  /// matched against.
  pub reference_distance_meters: f64,
  /// Palette slot: surviving-group creation order modulo the palette size,
  /// so colors cycle on workouts with many distinct rep distances.
  pub color_key: usize,
}

/// Group repeated same-distance reps among the Run segments.
///
/// Drills and walk breaks never participate; neither do runs below the
/// minimum display distance. Candidate groups smaller than
/// `min_reps_per_group` are dropped and their segments stay ungrouped.
pub fn group_reps(segments: &[Segment], config: &AnalysisConfig) -> Vec<RepGroup> {
  struct Candidate {
    indices: Vec<usize>,
    reference: f64,
  }

  let mut candidates: Vec<Candidate> = Vec::new();

  for (i, seg) in segments.iter().enumerate() {
    if seg.kind != SegmentKind::Run || seg.distance_meters < config.min_lap_display_m {
      continue;
    }

    let tolerance = config.rep_distance_tolerance;
    match candidates
      .iter_mut()
      .find(|c| (seg.distance_meters - c.reference).abs() <= c.reference * tolerance)
    {
      Some(group) => group.indices.push(i),
      None => candidates.push(Candidate {
        indices: vec![i],
        reference: seg.distance_meters,
      }),
    }
  }

  candidates
    .into_iter()
    .filter(|c| c.indices.len() >= config.min_reps_per_group)
    .enumerate()
    .map(|(order, c)| RepGroup {
      segment_indices: c.indices,
      reference_distance_meters: c.reference,
      color_key: order % config.palette_size,
    })
    .collect()
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
