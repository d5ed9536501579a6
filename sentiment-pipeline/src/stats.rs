use crate::types::SentimentCounts;
use serde::Serialize;

/// Share of each sentiment among the counted tweets, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SentimentShares {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl SentimentShares {
    /// Normalize weighted counts. With `exclude_neutral`, neutral tweets are
    /// left out of the total and their share is zero. No tweets at all gives
    /// all-zero shares.
    pub fn from_counts(counts: SentimentCounts, exclude_neutral: bool) -> Self {
        let neutral = if exclude_neutral { 0.0 } else { counts.neutral };
        let total = counts.positive + counts.negative + neutral;
        if total == 0.0 {
            return Self::default();
        }
        Self {
            positive: counts.positive / total,
            negative: counts.negative / total,
            neutral: neutral / total,
        }
    }
}
