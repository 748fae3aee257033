use crate::config::ApiConfig;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// Fetch a URL once and decode the body as JSON.
    ///
    /// No retry loop here: a failed fetch fails the whole run, and rerunning
    /// is the outer scheduler's call.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let safe_url = redact(&url);
        debug!("GET {}", safe_url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", safe_url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} from {}", status, safe_url);
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to decode JSON body from {}", safe_url))
    }
}

/// Render a URL for logs with the API credential masked.
fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case("apikey")) {
        return url.to_string();
    }

    let mut safe = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k.eq_ignore_ascii_case("apikey") {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();

    safe.query_pairs_mut().clear().extend_pairs(pairs);
    safe.to_string()
}
