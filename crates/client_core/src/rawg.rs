use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::CoverProvider;

pub const RAWG_DEFAULT_BASE_URL: &str = "https://api.rawg.io/api";
/// Key shipped in sample configs; treated the same as no key.
pub const RAWG_PLACEHOLDER_KEY: &str = "YOUR_RAWG_API_KEY_HERE";
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    background_image: Option<String>,
}

/// Looks up cover art through the RAWG game search endpoint.
pub struct RawgCoverProvider {
    http: Client,
    search_url: Url,
    api_key: Option<String>,
}

impl RawgCoverProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let search_url = Url::parse(&format!("{}/games", base_url.trim_end_matches('/')))
            .with_context(|| format!("invalid RAWG base url '{base_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build RAWG http client")?;
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != RAWG_PLACEHOLDER_KEY);

        Ok(Self {
            http,
            search_url,
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CoverProvider for RawgCoverProvider {
    async fn find_cover(&self, game_name: &str) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("covers: RAWG API key not set, skipping lookup");
            return Ok(None);
        };

        let response = self
            .http
            .get(self.search_url.clone())
            .query(&[("search", game_name), ("key", api_key)])
            .send()
            .await
            .with_context(|| format!("RAWG search for '{game_name}' failed"))?;

        if !response.status().is_success() {
            debug!(
                status = response.status().as_u16(),
                game_name, "covers: RAWG search returned non-success status"
            );
            return Ok(None);
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("RAWG search response was not valid JSON")?;
        let cover = body
            .results
            .into_iter()
            .next()
            .and_then(|first| first.background_image)
            .filter(|url| !url.is_empty());
        debug!(game_name, found = cover.is_some(), "covers: RAWG search finished");
        Ok(cover)
    }
}

#[cfg(test)]
#[path = "tests/rawg_tests.rs"]
mod tests;
