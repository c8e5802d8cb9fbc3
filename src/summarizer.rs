use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{dedup_headlines, Ticker};
use crate::sources::redact_query_param;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("no headlines to summarize")]
    NoHeadlines,
    #[error("request to the model failed: {0}")]
    Transport(reqwest::Error),
    #[error("model API returned {status}{}\nResponse: {body}", details_line(.detail))]
    Status {
        status: u16,
        body: String,
        detail: Option<String>,
    },
    #[error("unexpected model response: {reason}\nResponse: {body}")]
    Malformed { reason: String, body: String },
}

// reqwest puts the request URL, `key` included, into its error text.
impl From<reqwest::Error> for SummaryError {
    fn from(err: reqwest::Error) -> Self {
        SummaryError::Transport(err.without_url())
    }
}

fn details_line(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!("\nDetails: {}", d))
        .unwrap_or_default()
}

#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn summarize(&self, headlines: &[String], ticker: &Ticker)
        -> Result<String, SummaryError>;
}

// ─── Gemini API types ───

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ─── Prompt ───

/// Build the analysis prompt for a ticker from already deduplicated headlines.
pub fn build_prompt(headlines: &[String], ticker: &Ticker, index_ticker: &str) -> String {
    let subject = if ticker.is_index(index_ticker) {
        "the overall stock market (based on S&P 500 news)".to_string()
    } else {
        format!("the stock ticker {}", ticker)
    };

    format!(
        "Analyze the following news headlines for {subject}.\n\
         **Step 1:** From the headlines provided, list the top 5 most impactful headlines under a title \"**Key Headlines Analyzed:**\".\n\
         **Step 2:** Based ONLY on those headlines, generate a concise summary under a title \"**What Changed Today:**\".\n\
         Here are all the headlines:\n\
         {headlines}\n",
        subject = subject,
        headlines = headlines.join("\n"),
    )
}

// ─── The Gemini client ───

pub struct GeminiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    index_ticker: String,
}

impl GeminiClient {
    pub fn new(
        api_url: &str,
        api_key: &str,
        model: &str,
        index_ticker: &str,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(GeminiClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            index_ticker: index_ticker.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        )
    }

    async fn generate(&self, prompt: String) -> Result<String, SummaryError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(prompt) }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await?;

        debug!(
            url = %redact_query_param(response.url().as_str(), "key"),
            status = response.status().as_u16(),
            "Gemini responded"
        );

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message);
            return Err(SummaryError::Status {
                status: status.as_u16(),
                body,
                detail,
            });
        }

        extract_text(&body)
    }
}

#[async_trait]
impl SummaryModel for GeminiClient {
    async fn summarize(
        &self,
        headlines: &[String],
        ticker: &Ticker,
    ) -> Result<String, SummaryError> {
        let unique = dedup_headlines(headlines);
        if unique.is_empty() {
            return Err(SummaryError::NoHeadlines);
        }

        let prompt = build_prompt(&unique, ticker, &self.index_ticker);
        info!(
            ticker = %ticker,
            headlines = unique.len(),
            model = %self.model,
            "Requesting summary"
        );

        match self.generate(prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Summary request failed");
                Err(e)
            }
        }
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a generateContent body.
fn extract_text(body: &str) -> Result<String, SummaryError> {
    let malformed = |reason: &str| SummaryError::Malformed {
        reason: reason.to_string(),
        body: body.to_string(),
    };

    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| malformed(&format!("invalid JSON: {}", e)))?;

    parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no candidates"))?
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| malformed("candidate has no text part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GEN_PATH: &str = "/v1beta/models/test-model:generateContent";

    fn ticker(s: &str) -> Ticker {
        s.parse().unwrap()
    }

    fn client(uri: &str) -> GeminiClient {
        GeminiClient::new(uri, "gem-key", "test-model", "SPY", 5).unwrap()
    }

    fn mock_gemini_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_prompt_for_single_stock() {
        let headlines = vec!["A".to_string(), "B".to_string()];
        let prompt = build_prompt(&headlines, &ticker("UPS"), "SPY");
        assert!(prompt.contains("for the stock ticker UPS."));
        assert!(prompt.contains("**Key Headlines Analyzed:**"));
        assert!(prompt.contains("**What Changed Today:**"));
        assert!(prompt.ends_with("A\nB\n"));
    }

    #[test]
    fn test_prompt_for_index() {
        let prompt = build_prompt(&["X".to_string()], &ticker("spy"), "SPY");
        assert!(prompt.contains("the overall stock market (based on S&P 500 news)"));
        assert!(!prompt.contains("the stock ticker"));
    }

    #[test]
    fn test_extract_text_valid() {
        let body = mock_gemini_response("Summary here").to_string();
        assert_eq!(extract_text(&body).unwrap(), "Summary here");
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        let err = extract_text(r#"{"candidates": []}"#).unwrap_err();
        match err {
            SummaryError::Malformed { reason, body } => {
                assert_eq!(reason, "no candidates");
                assert!(body.contains("candidates"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extract_text_not_json_keeps_body() {
        let err = extract_text("<html>gateway</html>").unwrap_err();
        assert!(err.to_string().contains("<html>gateway</html>"));
    }

    #[tokio::test]
    async fn test_summarize_posts_deduplicated_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .and(query_param("key", "gem-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"parts": [{"text": build_prompt(
                    &["A".to_string(), "B".to_string()],
                    &ticker("UPS"),
                    "SPY",
                )}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_gemini_response("Digest")))
            .expect(1)
            .mount(&server)
            .await;

        let headlines = vec!["A".to_string(), "A".to_string(), "B".to_string()];
        let summary = client(&server.uri())
            .summarize(&headlines, &ticker("UPS"))
            .await
            .unwrap();
        assert_eq!(summary, "Digest");
    }

    #[tokio::test]
    async fn test_summarize_error_status_includes_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .summarize(&["A".to_string()], &ticker("UPS"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("Details: API key not valid"));
        assert!(msg.contains("INVALID_ARGUMENT"));
    }

    #[tokio::test]
    async fn test_summarize_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .summarize(&["A".to_string()], &ticker("UPS"))
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Malformed { .. }));
        assert!(err.to_string().contains("{not json"));
    }

    #[tokio::test]
    async fn test_summarize_without_headlines_makes_no_call() {
        let err = client("http://should-not-be-called")
            .summarize(&[], &ticker("UPS"))
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::NoHeadlines));
    }

    #[tokio::test]
    async fn test_connection_error_hides_api_key() {
        let client = GeminiClient::new("http://127.0.0.1:9", "SECRET-GEM-KEY", "test-model", "SPY", 5)
            .unwrap();
        let err = client
            .summarize(&["A".to_string()], &ticker("UPS"))
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Transport(_)));
        assert!(!err.to_string().contains("SECRET-GEM-KEY"));
    }
}
