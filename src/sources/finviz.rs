use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};

use super::{body_snippet, clean_text, HeadlineSource, ERROR_BODY_CHARS, USER_AGENTS};
use crate::model::Ticker;

/// Date format of the Finviz news table, e.g. `Oct-19-26`.
pub const FINVIZ_DATE_FORMAT: &str = "%b-%d-%y";

pub struct FinvizSource {
    client: Client,
    base_url: String,
    today_only: bool,
}

impl FinvizSource {
    pub fn new(base_url: &str, timeout_secs: u64, today_only: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Finviz HTTP client")?;

        Ok(FinvizSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            today_only,
        })
    }

    async fn fetch_page(&self, ticker: &Ticker) -> Result<String> {
        let url = format!("{}/quote.ashx", self.base_url);
        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = self
            .client
            .get(&url)
            .query(&[("t", ticker.as_str())])
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .context("Failed to fetch Finviz quote page")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Finviz returned {}: {}",
                status.as_u16(),
                body_snippet(&body, ERROR_BODY_CHARS)
            );
        }

        response
            .text()
            .await
            .context("Failed to read Finviz response body")
    }
}

#[async_trait]
impl HeadlineSource for FinvizSource {
    fn name(&self) -> &'static str {
        "Finviz"
    }

    async fn fetch(&self, ticker: &Ticker) -> Result<Vec<String>> {
        let html = self.fetch_page(ticker).await?;
        let today = self.today_only.then(|| Local::now().date_naive());
        let headlines = parse_news_table(&html, today)?;
        info!(
            ticker = %ticker,
            count = headlines.len(),
            today_only = self.today_only,
            "Parsed Finviz news table"
        );
        Ok(headlines)
    }
}

/// Extract headlines from the `news-table` of a Finviz quote page.
///
/// With `today` set, only rows dated that day are kept. The table prints the
/// date on the first row of each day and only a time on the rows after it, so
/// time-only rows inherit the last date seen above them.
pub fn parse_news_table(html: &str, today: Option<NaiveDate>) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let table_sel = selector("table#news-table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;
    let date_re = Regex::new(r"^[A-Z][a-z]{2}-\d{2}-\d{2}$").context("Invalid date pattern")?;

    let Some(table) = document.select(&table_sel).next() else {
        debug!("No news-table on Finviz page");
        return Ok(Vec::new());
    };

    let today_str = today.map(|d| d.format(FINVIZ_DATE_FORMAT).to_string());
    let mut row_date: Option<String> = None;
    let mut headlines = Vec::new();

    for row in table.select(&row_sel) {
        if let Some(today_str) = &today_str {
            let cell = row
                .select(&cell_sel)
                .next()
                .map(|td| clean_text(td.text()))
                .unwrap_or_default();
            let token = cell.split(' ').next().unwrap_or_default();
            if date_re.is_match(token) {
                row_date = Some(token.to_string());
            } else if token.eq_ignore_ascii_case("today") {
                row_date = Some(today_str.clone());
            }
            if row_date.as_deref() != Some(today_str.as_str()) {
                continue;
            }
        }

        if let Some(link) = row.select(&link_sel).next() {
            let text = clean_text(link.text());
            if !text.is_empty() {
                headlines.push(text);
            }
        }
    }

    Ok(headlines)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", css, e))
}
