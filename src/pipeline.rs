use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::events::{emit, EventSender, ProgressEvent};
use crate::model::{dedup_headlines, Analysis, Notice, SourceReport, Ticker};
use crate::sources::{FinvizSource, HeadlineSource, PolygonSource, TradingViewSource};
use crate::summarizer::{GeminiClient, SummaryModel};

/// Runs the collectors for a ticker and hands their headlines to the model.
pub struct Analyzer {
    sources: Vec<Arc<dyn HeadlineSource>>,
    model: Arc<dyn SummaryModel>,
    index_ticker: String,
    source_timeout: Duration,
    events: Option<EventSender>,
}

impl Analyzer {
    pub fn new(
        sources: Vec<Arc<dyn HeadlineSource>>,
        model: Arc<dyn SummaryModel>,
        index_ticker: &str,
        source_timeout: Duration,
    ) -> Self {
        Analyzer {
            sources,
            model,
            index_ticker: index_ticker.to_uppercase(),
            source_timeout,
            events: None,
        }
    }

    /// The production wiring: TradingView, Finviz and Polygon, in that order, into Gemini.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources: Vec<Arc<dyn HeadlineSource>> = vec![
            Arc::new(TradingViewSource::new(
                &config.tradingview_url,
                &config.index_ticker,
                config.browser_wait_secs,
                config.source_timeout_secs,
            )),
            Arc::new(FinvizSource::new(
                &config.finviz_url,
                config.http_timeout_secs,
                config.finviz_today_only,
            )?),
            Arc::new(PolygonSource::new(
                &config.polygon_api_url,
                &config.polygon_api_key,
                config.polygon_news_limit,
                config.http_timeout_secs,
            )?),
        ];
        let model = Arc::new(GeminiClient::new(
            &config.gemini_api_url,
            &config.gemini_api_key,
            &config.gemini_model,
            &config.index_ticker,
            config.summary_timeout_secs,
        )?);

        Ok(Analyzer::new(
            sources,
            model,
            &config.index_ticker,
            Duration::from_secs(config.source_timeout_secs),
        ))
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn index_ticker(&self) -> &str {
        &self.index_ticker
    }

    /// Run every applicable source concurrently. Reports come back in source order.
    pub async fn collect(
        &self,
        request_id: Uuid,
        ticker: &Ticker,
        notices: &mut Vec<Notice>,
    ) -> Vec<SourceReport> {
        let is_index = ticker.is_index(&self.index_ticker);
        let runs = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                if is_index && source.skip_for_index() {
                    return SourceReport::skipped(source.name());
                }
                self.run_source(request_id, source.as_ref(), ticker).await
            }
        });
        let reports = join_all(runs).await;

        for report in &reports {
            if report.skipped {
                notices.push(Notice::info(format!(
                    "Skipping {} for the market index {}.",
                    report.source, ticker
                )));
                continue;
            }
            notices.push(Notice::info(format!(
                "Scraping {} for {}...",
                report.source, ticker
            )));
            if let Some(err) = &report.error {
                notices.push(Notice::error(format!(
                    "Error fetching {}: {}",
                    report.source, err
                )));
            }
        }
        reports
    }

    async fn run_source(
        &self,
        request_id: Uuid,
        source: &dyn HeadlineSource,
        ticker: &Ticker,
    ) -> SourceReport {
        let name = source.name();
        emit(
            self.events.as_ref(),
            ProgressEvent::SourceStarted {
                request_id,
                source: name.to_string(),
                ticker: ticker.to_string(),
            },
        );

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.source_timeout, source.fetch(ticker)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (headlines, error) = match outcome {
            Ok(Ok(headlines)) => (headlines, None),
            Ok(Err(e)) => {
                warn!("{} failed for {}: {:#}", name, ticker, e);
                (Vec::new(), Some(format!("{:#}", e)))
            }
            Err(_) => {
                warn!(
                    "{} timed out for {} after {}s",
                    name,
                    ticker,
                    self.source_timeout.as_secs()
                );
                (
                    Vec::new(),
                    Some(format!(
                        "timed out after {}s",
                        self.source_timeout.as_secs_f64()
                    )),
                )
            }
        };

        emit(
            self.events.as_ref(),
            ProgressEvent::SourceFinished {
                request_id,
                source: name.to_string(),
                headlines: headlines.len(),
                error: error.clone(),
            },
        );

        SourceReport {
            source: name.to_string(),
            headlines,
            error,
            skipped: false,
            elapsed_ms,
        }
    }

    /// Collect, then summarize if anything was collected.
    pub async fn analyze(&self, ticker: &Ticker) -> Analysis {
        self.analyze_with_id(Uuid::new_v4(), ticker).await
    }

    /// As [`Analyzer::analyze`], tagging progress events and the result with a
    /// caller-chosen id so a client can pick out its own events.
    pub async fn analyze_with_id(&self, request_id: Uuid, ticker: &Ticker) -> Analysis {
        let mut notices = Vec::new();
        info!("Analyzing {} (request {})", ticker, request_id);

        let sources = self.collect(request_id, ticker, &mut notices).await;
        let all_headlines: Vec<String> = sources
            .iter()
            .flat_map(|r| r.headlines.iter().cloned())
            .collect();
        let headlines = dedup_headlines(&all_headlines);
        info!(
            "Collected {} headlines ({} unique) for {}",
            all_headlines.len(),
            headlines.len(),
            ticker
        );

        let summary = if all_headlines.is_empty() {
            notices.push(Notice::warning(format!(
                "No headlines found for {}.",
                ticker
            )));
            None
        } else {
            notices.push(Notice::info("Asking the model for an AI summary..."));
            emit(
                self.events.as_ref(),
                ProgressEvent::SummaryStarted {
                    request_id,
                    ticker: ticker.to_string(),
                    headlines: headlines.len(),
                },
            );
            match self.model.summarize(&all_headlines, ticker).await {
                Ok(text) => Some(text),
                Err(e) => {
                    notices.push(Notice::error(format!("Error with AI model: {}", e)));
                    None
                }
            }
        };

        emit(
            self.events.as_ref(),
            ProgressEvent::AnalysisComplete {
                request_id,
                ticker: ticker.to_string(),
                has_summary: summary.is_some(),
            },
        );

        Analysis {
            request_id,
            ticker: ticker.clone(),
            summary,
            headlines,
            sources,
            notices,
            generated_at: Utc::now(),
            cached: false,
        }
    }
}
