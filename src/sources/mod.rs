//! Headline collectors.
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | TradingView | [`tradingview`] | headless Chrome render, then HTML parse |
//! | Finviz | [`finviz`] | plain GET, `news-table` parse |
//! | Polygon.io | [`polygon`] | JSON news API |

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;

use crate::model::Ticker;

pub mod finviz;
pub mod polygon;
pub mod tradingview;

pub use finviz::FinvizSource;
pub use polygon::PolygonSource;
pub use tradingview::TradingViewSource;

/// Browser user agents; Finviz rejects the default reqwest one.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
];

/// How much of a failed response body is kept in an error.
pub const ERROR_BODY_CHARS: usize = 200;

#[async_trait]
pub trait HeadlineSource: Send + Sync {
    /// Display name used in notices, logs and reports.
    fn name(&self) -> &'static str;

    /// Whether this source should not be asked about the market index ticker.
    fn skip_for_index(&self) -> bool {
        false
    }

    async fn fetch(&self, ticker: &Ticker) -> Result<Vec<String>>;
}

/// Collapse runs of whitespace inside a headline and trim the ends.
pub fn clean_text<'a, I>(pieces: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    pieces
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mask the value of a sensitive query parameter before logging a URL.
///
/// Only an exact parameter name matches, so masking `key` leaves `apiKey` alone.
pub fn redact_query_param(url: &str, param: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.split('?').next().unwrap_or_default().to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == param) {
        return parsed.into();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == param {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.into()
}

/// First `max_chars` characters of an error body, marked when cut.
pub fn body_snippet(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(
            clean_text(["  UPS  wins\n", "new   contract "]),
            "UPS wins new contract"
        );
        assert_eq!(clean_text(["   "]), "");
    }

    #[test]
    fn test_redact_query_param() {
        assert_eq!(
            redact_query_param("https://x/news?ticker=UPS&apiKey=secret&limit=20", "apiKey"),
            "https://x/news?ticker=UPS&apiKey=***&limit=20"
        );
        assert_eq!(
            redact_query_param("https://x/gen?key=secret", "key"),
            "https://x/gen?key=***"
        );
        assert_eq!(redact_query_param("https://x/", "key"), "https://x/");
    }

    #[test]
    fn test_redact_matches_whole_param_name() {
        let url = "https://x/news?apiKey=secret&monkey=banana";
        assert_eq!(redact_query_param(url, "key"), url);
        assert_eq!(
            redact_query_param(url, "apiKey"),
            "https://x/news?apiKey=***&monkey=banana"
        );
    }

    #[test]
    fn test_redact_unparseable_url_drops_query() {
        assert_eq!(redact_query_param("not a url?key=secret", "key"), "not a url");
    }

    #[test]
    fn test_body_snippet_truncates_long_bodies() {
        assert_eq!(body_snippet("  short  ", 200), "short");
        let page = format!("<html>{}</html>", "x".repeat(500));
        let cut = body_snippet(&page, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.starts_with("<html>xxx"));
        assert!(cut.ends_with("..."));
        assert_eq!(body_snippet("héllo wörld", 5), "héllo...");
    }
}
