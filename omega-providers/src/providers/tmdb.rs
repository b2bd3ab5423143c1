//! TMDB identifier lookup.
//!
//! The top search result becomes the grounded reference. Lookups are cached
//! per (title, kind, year) in a bounded LRU, misses included.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use omega_core::credentials::ApiKeys;
use omega_core::media::{GroundedReference, MediaKind};
use omega_core::providers::IdentifierProvider;
use omega_core::ProviderError;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::transport;

const PROVIDER: &str = "tmdb";
const CREDENTIAL: &str = "a TMDB API key";

/// Default number of cached lookups.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

type LookupKey = (String, MediaKind, Option<u16>);

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Movie results carry `title`/`release_date`, shows `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
}

impl SearchResult {
    fn into_reference(self, kind: MediaKind) -> Option<GroundedReference> {
        let year = self
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok());
        Some(GroundedReference {
            display_title: self.title.filter(|title| !title.is_empty())?,
            canonical_id: self.id,
            media_kind: kind,
            year,
        })
    }
}

/// TMDB search client with a lookup cache.
#[derive(Debug)]
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<LruCache<LookupKey, Option<GroundedReference>>>,
}

impl TmdbClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self::with_capacity(client, base_url, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(
        client: reqwest::Client,
        base_url: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            base_url: base_url.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn search_path(kind: MediaKind) -> (&'static str, &'static str) {
        match kind {
            MediaKind::Movie => ("search/movie", "year"),
            MediaKind::Show => ("search/tv", "first_air_date_year"),
        }
    }
}

#[async_trait]
impl IdentifierProvider for TmdbClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(
        &self,
        title: &str,
        kind: MediaKind,
        year: Option<u16>,
        keys: &ApiKeys,
    ) -> Result<Option<GroundedReference>, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.tmdb.as_ref())?;
        let normalized = title.split_whitespace().collect::<Vec<_>>().join(" ");
        let cache_key = (normalized.to_lowercase(), kind, year);

        let cached = self.cache.lock().get(&cache_key).cloned();
        if let Some(reference) = cached {
            debug!("TMDB cache hit for '{normalized}' ({kind})");
            return Ok(reference);
        }

        let (path, year_param) = Self::search_path(kind);
        let mut params = vec![("api_key", key.to_string()), ("query", normalized.clone())];
        if let Some(year) = year {
            params.push((year_param, year.to_string()));
        }

        let request = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .query(&params);
        let page: SearchPage = transport::send_json(PROVIDER, request).await?;

        let reference = page
            .results
            .into_iter()
            .next()
            .and_then(|top| top.into_reference(kind));
        debug!("TMDB lookup '{normalized}' ({kind}) -> {reference:?}");

        self.cache.lock().put(cache_key, reference.clone());
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_result_maps_name_and_air_date() {
        let page: SearchPage = serde_json::from_value(serde_json::json!({
            "page": 1,
            "results": [{"id": 63639, "name": "The Expanse", "first_air_date": "2015-12-14"}]
        }))
        .unwrap();

        let reference = page
            .results
            .into_iter()
            .next()
            .and_then(|top| top.into_reference(MediaKind::Show))
            .unwrap();

        assert_eq!(
            reference,
            GroundedReference {
                display_title: "The Expanse".to_string(),
                canonical_id: 63639,
                media_kind: MediaKind::Show,
                year: Some(2015),
            }
        );
    }

    #[test]
    fn test_movie_without_date_has_no_year() {
        let result: SearchResult = serde_json::from_value(serde_json::json!({
            "id": 438631, "title": "Dune", "release_date": ""
        }))
        .unwrap();
        let reference = result.into_reference(MediaKind::Movie).unwrap();
        assert_eq!(reference.year, None);
        assert_eq!(reference.canonical_id, 438631);
    }

    #[test]
    fn test_zero_capacity_still_caches_one_entry() {
        let client = TmdbClient::with_capacity(reqwest::Client::new(), "http://localhost", 0);
        assert_eq!(client.cache.lock().cap().get(), 1);
    }
}
