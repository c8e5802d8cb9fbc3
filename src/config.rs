use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    // Secrets
    pub polygon_api_key: String,
    pub gemini_api_key: String,
    // Source URLs
    pub tradingview_url: String,
    pub finviz_url: String,
    pub polygon_api_url: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    // Tickers
    pub index_ticker: String,
    pub default_ticker: String,
    // Collectors
    pub polygon_news_limit: u32,
    pub finviz_today_only: bool,
    pub browser_wait_secs: u64,
    pub http_timeout_secs: u64,
    pub summary_timeout_secs: u64,
    pub source_timeout_secs: u64,
    // Cache
    pub cache_ttl_secs: u64,
    // Dashboard
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Don't fail if .env missing
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            polygon_api_key: required(&lookup, "POLYGON_API_KEY")?,
            gemini_api_key: required(&lookup, "GEMINI_API_KEY")?,
            tradingview_url: var_or("TRADINGVIEW_URL", "https://in.tradingview.com"),
            finviz_url: var_or("FINVIZ_URL", "https://finviz.com"),
            polygon_api_url: var_or("POLYGON_API_URL", "https://api.polygon.io"),
            gemini_api_url: var_or(
                "GEMINI_API_URL",
                "https://generativelanguage.googleapis.com",
            ),
            gemini_model: var_or("GEMINI_MODEL", "gemini-2.0-flash-thinking-exp"),
            index_ticker: var_or("INDEX_TICKER", "SPY").to_uppercase(),
            default_ticker: var_or("DEFAULT_TICKER", "UPS").to_uppercase(),
            polygon_news_limit: parse_var(&lookup, "POLYGON_NEWS_LIMIT", "20")?,
            finviz_today_only: parse_var(&lookup, "FINVIZ_TODAY_ONLY", "true")?,
            browser_wait_secs: parse_var(&lookup, "BROWSER_WAIT_SECS", "5")?,
            http_timeout_secs: parse_var(&lookup, "HTTP_TIMEOUT_SECS", "30")?,
            summary_timeout_secs: parse_var(&lookup, "SUMMARY_TIMEOUT_SECS", "60")?,
            source_timeout_secs: parse_var(&lookup, "SOURCE_TIMEOUT_SECS", "45")?,
            cache_ttl_secs: parse_var(&lookup, "CACHE_TTL_SECS", "600")?,
            dashboard_host: var_or("DASHBOARD_HOST", "0.0.0.0"),
            dashboard_port: parse_var(&lookup, "DASHBOARD_PORT", "8501")?,
            dashboard_password: lookup("DASHBOARD_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn dashboard_addr(&self) -> String {
        format!("{}:{}", self.dashboard_host, self.dashboard_port)
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} must be set (environment or .env)", key))
}

fn parse_var<F, T>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn secrets() -> HashMap<String, String> {
        vars(&[("POLYGON_API_KEY", "poly-key"), ("GEMINI_API_KEY", "gem-key")])
    }

    #[test]
    fn test_defaults_applied() {
        let env = secrets();
        let config = Config::from_vars(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.polygon_api_key, "poly-key");
        assert_eq!(config.gemini_api_key, "gem-key");
        assert_eq!(config.tradingview_url, "https://in.tradingview.com");
        assert_eq!(config.finviz_url, "https://finviz.com");
        assert_eq!(config.polygon_api_url, "https://api.polygon.io");
        assert_eq!(config.gemini_model, "gemini-2.0-flash-thinking-exp");
        assert_eq!(config.index_ticker, "SPY");
        assert_eq!(config.default_ticker, "UPS");
        assert_eq!(config.polygon_news_limit, 20);
        assert!(config.finviz_today_only);
        assert_eq!(config.browser_wait_secs, 5);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.summary_timeout_secs, 60);
        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.dashboard_port, 8501);
        assert!(config.dashboard_password.is_empty());
    }

    #[test]
    fn test_missing_polygon_key_fails() {
        let env = vars(&[("GEMINI_API_KEY", "gem-key")]);
        let err = Config::from_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("POLYGON_API_KEY"));
    }

    #[test]
    fn test_blank_gemini_key_fails() {
        let env = vars(&[("POLYGON_API_KEY", "poly-key"), ("GEMINI_API_KEY", "  ")]);
        let err = Config::from_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_overrides_parsed() {
        let mut env = secrets();
        env.insert("FINVIZ_TODAY_ONLY".into(), "false".into());
        env.insert("CACHE_TTL_SECS".into(), "0".into());
        env.insert("INDEX_TICKER".into(), "qqq".into());
        env.insert("DASHBOARD_PORT".into(), "9000".into());
        let config = Config::from_vars(|k| env.get(k).cloned()).unwrap();
        assert!(!config.finviz_today_only);
        assert_eq!(config.cache_ttl_secs, 0);
        assert_eq!(config.index_ticker, "QQQ");
        assert_eq!(config.dashboard_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_bad_number_reports_key() {
        let mut env = secrets();
        env.insert("POLYGON_NEWS_LIMIT".into(), "lots".into());
        let err = Config::from_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("POLYGON_NEWS_LIMIT"));
    }
}
