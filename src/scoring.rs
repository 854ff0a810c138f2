//! Scoring rules: the hint penalty and the end-of-session verdict.

use crate::domain::Challenge;

/// Hints available per challenge.
pub const MAX_HINTS: u32 = 3;

/// Each hint costs this percentage of the challenge's value...
pub const HINT_PENALTY_PERCENT: u64 = 20;
/// ...up to this percentage in total.
pub const MAX_PENALTY_PERCENT: u64 = 80;

/// Points credited for a correct submission.
///
/// `max(0, floor(awarded - min(hints * 0.2 * points, 0.8 * points)))`.
/// The cap applies before rounding. Computed in hundredths of a point so
/// that e.g. 3 hints on 155 points cost exactly 93.
pub fn final_points(points_awarded: u32, hints_used: u32, challenge_points: u32) -> u32 {
  let value = u64::from(challenge_points);
  let penalty = (u64::from(hints_used) * HINT_PENALTY_PERCENT * value).min(MAX_PENALTY_PERCENT * value);
  let awarded = u64::from(points_awarded) * 100;
  // Integer division floors the non-negative remainder.
  (awarded.saturating_sub(penalty) / 100) as u32
}

/// Sum of every challenge's value.
pub fn max_score(syllabus: &[Challenge]) -> u64 {
  syllabus.iter().map(|c| u64::from(c.points)).sum()
}

/// Rounded percentage of the maximum; 0 when nothing was at stake.
pub fn percentage(score: u64, max_score: u64) -> u32 {
  if max_score == 0 {
    return 0;
  }
  (score as f64 / max_score as f64 * 100.0).round() as u32
}

pub fn verdict(percentage: u32) -> &'static str {
  match percentage {
    90.. => "Python Master!",
    70..=89 => "Great Job!",
    _ => "Good effort!",
  }
}
