//! Plain HTTP fetch collaborator
//!
//! Rotates realistic browser user agents, sends browser-like headers, keeps
//! cookies between requests and applies one global request ceiling with
//! `governor`. Status codes are returned as-is; classifying 403/429 is the
//! paginator's job.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER, USER_AGENT};
use reqwest::Client;
use tracing::{debug, trace};

use super::config::{defaults, HttpConfig};
use crate::domain::{FetchFailure, FetchRequest, PageFetcher, PageSnapshot};

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// `reqwest`-backed [`PageFetcher`]
pub struct HttpPageFetcher {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    user_agents: Vec<String>,
    accept_language: HeaderValue,
}

impl HttpPageFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert("dnt", HeaderValue::from_static("1"));
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second)
                .context("requests_per_second must be greater than 0")?,
        );

        let user_agents = if config.user_agents.is_empty() {
            defaults::USER_AGENTS.iter().map(|s| (*s).to_string()).collect()
        } else {
            config.user_agents.clone()
        };
        for agent in &user_agents {
            HeaderValue::from_str(agent).with_context(|| format!("invalid user agent '{agent}'"))?;
        }

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            user_agents,
            accept_language: HeaderValue::from_str(&config.accept_language)
                .context("invalid accept_language")?,
        })
    }

    fn pick_user_agent(&self) -> &str {
        &self.user_agents[fastrand::usize(..self.user_agents.len())]
    }
}

fn classify(error: &reqwest::Error, timeout: Duration) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout(timeout)
    } else {
        FetchFailure::Transport(error.to_string())
    }
}

/// Parse a `Retry-After` value given as delay-seconds or an HTTP date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, FetchFailure> {
        self.rate_limiter.until_ready().await;

        let user_agent = self.pick_user_agent();
        trace!("GET {} as {}", request.url, user_agent);

        let response = self
            .client
            .get(&request.url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT_LANGUAGE, self.accept_language.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        let body = response
            .text()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        debug!("fetched {} ({}, {} bytes)", url, status, body.len());
        Ok(PageSnapshot {
            url,
            status,
            body,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn creates_with_default_config() {
        assert!(HttpPageFetcher::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn rejects_zero_rate() {
        let config = HttpConfig {
            requests_per_second: 0,
            ..HttpConfig::default()
        };
        assert!(HttpPageFetcher::new(&config).is_err());
    }

    #[test]
    fn empty_agent_list_falls_back_to_defaults() {
        let config = HttpConfig {
            user_agents: vec![],
            ..HttpConfig::default()
        };
        let fetcher = HttpPageFetcher::new(&config).unwrap();
        assert!(defaults::USER_AGENTS.contains(&fetcher.pick_user_agent()));
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after(" 120 ", Utc::now()), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
