// TradingView renders its news list client-side, so the page is loaded in
// headless Chrome and the rendered source is parsed after a fixed delay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use scraper::{Html, Selector};
use std::ffi::OsStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{clean_text, HeadlineSource};
use crate::model::Ticker;

pub struct TradingViewSource {
    base_url: String,
    index_ticker: String,
    render_wait: Duration,
    timeout: Duration,
}

impl TradingViewSource {
    /// `timeout_secs` bounds the whole render, browser launch included.
    pub fn new(base_url: &str, index_ticker: &str, render_wait_secs: u64, timeout_secs: u64) -> Self {
        TradingViewSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            index_ticker: index_ticker.to_string(),
            render_wait: Duration::from_secs(render_wait_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// News page for a symbol. The index ETF is listed on AMEX, single stocks on NYSE.
    pub fn news_url(&self, ticker: &Ticker) -> String {
        let exchange = if ticker.is_index(&self.index_ticker) {
            "AMEX"
        } else {
            "NYSE"
        };
        format!("{}/symbols/{}-{}/news/", self.base_url, exchange, ticker)
    }
}

#[async_trait]
impl HeadlineSource for TradingViewSource {
    fn name(&self) -> &'static str {
        "TradingView"
    }

    async fn fetch(&self, ticker: &Ticker) -> Result<Vec<String>> {
        let url = self.news_url(ticker);
        let wait = self.render_wait;
        let timeout = self.timeout;
        debug!(%url, "Rendering TradingView news page");

        let html = tokio::task::spawn_blocking(move || render_page(&url, wait, timeout))
            .await
            .context("Browser task panicked")??;

        let headlines = parse_headlines(&html)?;
        info!(ticker = %ticker, count = headlines.len(), "Parsed TradingView headlines");
        Ok(headlines)
    }
}

/// Load `url` in a fresh headless Chrome and return the rendered HTML.
///
/// The browser process is owned by this call and is shut down when `browser`
/// drops, whichever way the function returns. Each browser step is bounded by
/// `timeout`.
fn render_page(url: &str, wait: Duration, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let options = LaunchOptions {
        headless: true,
        sandbox: false,
        idle_browser_timeout: timeout,
        args: vec![
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
        ],
        ..Default::default()
    };

    let browser = Browser::new(options)
        .context("Failed to launch headless Chrome. Is Chrome/Chromium installed?")?;

    let tab = browser
        .new_tab()
        .context("Failed to create new browser tab")?;
    tab.set_default_timeout(timeout);

    tab.navigate_to(url)
        .context("Failed to navigate to TradingView")?
        .wait_until_navigated()
        .context("TradingView page did not finish loading")?;

    // Client-side rendering has no reliable completion signal.
    let settle = settle_time(wait, deadline, Instant::now())
        .with_context(|| format!("TradingView render exceeded {}s", timeout.as_secs()))?;
    std::thread::sleep(settle);

    tab.get_content().context("Failed to read rendered page source")
}

/// How long to let the page render, capped by what is left before `deadline`.
/// `None` once the deadline has passed.
fn settle_time(wait: Duration, deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.checked_duration_since(now)?;
    if remaining.is_zero() {
        return None;
    }
    Some(wait.min(remaining))
}

/// Extract the text of every news link on a rendered TradingView page.
pub fn parse_headlines(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse(r#"a[href^="/news/"]"#)
        .map_err(|e| anyhow::anyhow!("Invalid news link selector: {}", e))?;

    Ok(document
        .select(&link_sel)
        .map(|a| clean_text(a.text()))
        .filter(|text| !text.is_empty())
        .collect())
}
