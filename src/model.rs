use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A user-supplied stock symbol, trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ticker(String);

#[derive(Debug, Error, PartialEq)]
pub enum TickerError {
    #[error("Please enter a stock ticker.")]
    Empty,
}

impl Ticker {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this ticker stands for the market index rather than a single stock.
    pub fn is_index(&self, index_ticker: &str) -> bool {
        self.0.eq_ignore_ascii_case(index_ticker)
    }
}

impl FromStr for Ticker {
    type Err = TickerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TickerError::Empty);
        }
        Ok(Ticker(trimmed.to_uppercase()))
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the person looking at the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Outcome of one collector for one request.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub headlines: Vec<String>,
    pub error: Option<String>,
    pub skipped: bool,
    pub elapsed_ms: u64,
}

impl SourceReport {
    pub fn skipped(source: &str) -> Self {
        SourceReport {
            source: source.to_string(),
            headlines: Vec::new(),
            error: None,
            skipped: true,
            elapsed_ms: 0,
        }
    }
}

/// Everything one analysis request produced.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub request_id: Uuid,
    pub ticker: Ticker,
    pub summary: Option<String>,
    pub headlines: Vec<String>,
    pub sources: Vec<SourceReport>,
    pub notices: Vec<Notice>,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
}

/// Drop repeated headlines by exact text, keeping the first occurrence.
pub fn dedup_headlines(headlines: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    headlines
        .iter()
        .filter(|h| seen.insert(h.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_parsing_normalizes() {
        let t: Ticker = "  ups ".parse().unwrap();
        assert_eq!(t.as_str(), "UPS");
        assert_eq!(t.to_string(), "UPS");
    }

    #[test]
    fn test_ticker_empty_rejected() {
        assert_eq!("".parse::<Ticker>(), Err(TickerError::Empty));
        assert_eq!("   ".parse::<Ticker>(), Err(TickerError::Empty));
        assert_eq!(
            TickerError::Empty.to_string(),
            "Please enter a stock ticker."
        );
    }

    #[test]
    fn test_ticker_is_index() {
        let spy: Ticker = "spy".parse().unwrap();
        let ups: Ticker = "UPS".parse().unwrap();
        assert!(spy.is_index("SPY"));
        assert!(!ups.is_index("SPY"));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let input = vec!["A".to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(dedup_headlines(&input), vec!["A", "B"]);
    }

    #[test]
    fn test_dedup_is_exact_match() {
        let input = vec!["Apple".to_string(), "apple".to_string(), "Apple ".to_string()];
        assert_eq!(dedup_headlines(&input).len(), 3);
    }

    #[test]
    fn test_notice_serialization() {
        let json = serde_json::to_value(Notice::warning("careful")).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["message"], "careful");
    }

    #[test]
    fn test_ticker_serializes_as_string() {
        let t: Ticker = "msft".parse().unwrap();
        assert_eq!(serde_json::to_value(&t).unwrap(), "MSFT");
    }
}
