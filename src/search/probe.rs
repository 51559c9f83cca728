use tracing::debug;

use super::view::SearchView;
use crate::error::{Result, ScrapeError};

/// How many items the search claims for the current view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCount {
    Exact(u64),
    Zero,
    /// "300+ stays": more than the feed will ever list for this view
    Saturated,
}

impl ResultCount {
    /// Normalize a result heading such as `"300+ stays"`, `"Over 1,000 homes"`,
    /// `"1,204 stays"`, `"37 homes"` or `"No results"`. A lower bound, written
    /// with a trailing `+` or an "over"/"more than" prefix, is `Saturated`.
    pub fn parse(heading: &str) -> Option<Self> {
        let text = heading.trim();
        let lower = text.to_lowercase();
        if lower.starts_with("no ") || lower == "no results" {
            return Some(Self::Zero);
        }

        let mut digits = String::new();
        let mut rest = text;
        for (idx, c) in text.char_indices() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == ',' && !digits.is_empty() {
                continue;
            } else if !digits.is_empty() {
                rest = &text[idx..];
                break;
            }
            rest = &text[idx + c.len_utf8()..];
        }

        let n: u64 = digits.parse().ok()?;
        let bounded_below = ["over ", "more than "].iter().any(|p| lower.starts_with(p));
        if bounded_below || rest.trim_start().starts_with('+') {
            return Some(Self::Saturated);
        }
        Some(if n == 0 { Self::Zero } else { Self::Exact(n) })
    }

    /// Whether a region with this count can be read without subdividing
    pub fn is_leaf(&self, threshold: u64) -> bool {
        match self {
            Self::Zero => true,
            Self::Exact(n) => *n <= threshold,
            Self::Saturated => false,
        }
    }
}

/// Read and normalize the result count of the current view.
pub async fn probe_result_count(view: &mut dyn SearchView) -> Result<ResultCount> {
    let heading = view
        .result_heading()
        .await?
        .ok_or_else(|| ScrapeError::MissingElement("result count heading".to_string()))?;

    let count = ResultCount::parse(&heading).ok_or_else(|| {
        ScrapeError::MissingElement(format!("result count in heading {heading:?}"))
    })?;
    debug!(heading = %heading, ?count, "Probed result count");
    Ok(count)
}
