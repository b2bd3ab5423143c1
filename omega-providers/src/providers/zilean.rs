//! Zilean instant cache (Tier 1).
//!
//! Zilean indexes DMM hash lists, so everything it returns is already
//! cached on a debrid service and playable without preparation.

use async_trait::async_trait;
use omega_core::media::{CandidateResult, InfoHash, SearchQuery, SourceTier};
use omega_core::providers::InstantCacheProvider;
use omega_core::release::{ReleaseInfo, ScoreFilter, score_file};
use omega_core::ProviderError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::transport;

const PROVIDER: &str = "zilean";

/// One torrent entry of `/dmm/filtered`.
#[derive(Debug, Clone, Deserialize)]
pub struct ZileanTorrent {
    pub info_hash: String,
    #[serde(default)]
    pub raw_title: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    /// Reported as a string by some deployments and a number by others
    #[serde(default)]
    pub size: Option<Value>,
}

impl ZileanTorrent {
    fn size_bytes(&self) -> Option<u64> {
        match self.size.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn display_name(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or(self.raw_title.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Client for a Zilean deployment.
#[derive(Debug, Clone)]
pub struct ZileanClient {
    client: reqwest::Client,
    base_url: String,
}

impl ZileanClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Converts raw entries to cached candidates ranked by release score.
    ///
    /// Entries with malformed hashes are dropped; order is preserved.
    pub fn parse_candidates(torrents: Vec<ZileanTorrent>) -> Vec<CandidateResult> {
        torrents
            .into_iter()
            .filter_map(|torrent| {
                let info_hash = match torrent.info_hash.parse::<InfoHash>() {
                    Ok(hash) => hash,
                    Err(e) => {
                        debug!("Skipping Zilean entry: {e}");
                        return None;
                    }
                };
                let size = torrent.size_bytes();
                let name = torrent.display_name().unwrap_or_default().to_string();
                let rank = score_file(&name, size.unwrap_or(0), &ScoreFilter::default());

                let mut candidate = CandidateResult::new(info_hash, SourceTier::Instant, rank)
                    .cached(true)
                    .with_metadata("provider", PROVIDER);
                if let Some(size) = size {
                    candidate = candidate.with_size(size);
                }
                if !name.is_empty() {
                    let release = ReleaseInfo::parse(&name);
                    candidate = candidate
                        .with_metadata("quality", release.quality.to_string())
                        .with_metadata("filename", name);
                    if let Some(group) = release.group {
                        candidate = candidate.with_metadata("release_group", group);
                    }
                }
                Some(candidate)
            })
            .collect()
    }
}

/// Query parameters, capitalized as the Zilean API expects.
fn filtered_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("Query", query.normalized_title())];
    if let Some(imdb_id) = &query.imdb_id {
        params.push(("ImdbId", imdb_id.clone()));
    }
    if let Some(season) = query.season {
        params.push(("Season", season.to_string()));
    }
    if let Some(episode) = query.episode {
        params.push(("Episode", episode.to_string()));
    }
    if let Some(year) = query.year {
        params.push(("Year", year.to_string()));
    }
    params
}

#[async_trait]
impl InstantCacheProvider for ZileanClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn lookup(&self, query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError> {
        let params = filtered_params(query);
        debug!("Zilean lookup: {:?}", params);

        let request = self
            .client
            .get(format!("{}/dmm/filtered", self.base_url))
            .query(&params);
        let torrents: Vec<ZileanTorrent> = transport::send_json(PROVIDER, request).await?;

        info!("Zilean returned {} results for '{}'", torrents.len(), query.title);
        Ok(Self::parse_candidates(torrents))
    }
}
