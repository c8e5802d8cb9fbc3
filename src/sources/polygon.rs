use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{body_snippet, redact_query_param, HeadlineSource, ERROR_BODY_CHARS};
use crate::model::Ticker;

/// Response from GET /v2/reference/news
#[derive(Debug, Deserialize)]
pub struct NewsResponse {
    #[serde(default)]
    pub results: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub title: Option<String>,
}

pub struct PolygonSource {
    client: Client,
    base_url: String,
    api_key: String,
    limit: u32,
}

impl PolygonSource {
    pub fn new(base_url: &str, api_key: &str, limit: u32, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()
            .context("Failed to build Polygon HTTP client")?;

        Ok(PolygonSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            limit,
        })
    }
}

#[async_trait]
impl HeadlineSource for PolygonSource {
    fn name(&self) -> &'static str {
        "Polygon.io"
    }

    fn skip_for_index(&self) -> bool {
        true
    }

    async fn fetch(&self, ticker: &Ticker) -> Result<Vec<String>> {
        let url = format!("{}/v2/reference/news", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ticker", ticker.as_str()),
                ("limit", &self.limit.to_string()),
                ("apiKey", &self.api_key),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to fetch Polygon news")?;

        debug!(
            url = %redact_query_param(response.url().as_str(), "apiKey"),
            "Polygon responded"
        );

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Polygon API returned {}: {}",
                status.as_u16(),
                body_snippet(&body, ERROR_BODY_CHARS)
            );
        }

        let news: NewsResponse = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse Polygon news response")?;

        let headlines: Vec<String> = news
            .results
            .into_iter()
            .filter_map(|article| article.title)
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .collect();

        info!(ticker = %ticker, count = headlines.len(), "Fetched Polygon headlines");
        Ok(headlines)
    }
}
