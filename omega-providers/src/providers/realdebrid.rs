//! Real-Debrid service (Tier 2).
//!
//! Resolution adds the magnet, picks one file by release score and episode,
//! and unrestricts the generated link once the torrent reports `downloaded`.
//! Any other state is returned as pending instead of polled.

use async_trait::async_trait;
use omega_core::credentials::ApiKeys;
use omega_core::media::{EpisodeHint, InfoHash};
use omega_core::providers::{DebridProvider, DebridResolution};
use omega_core::release::ScoreFilter;
use omega_core::ProviderError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::torrent_files::{FileRanking, TorrentFile, select_file};
use crate::transport;

const PROVIDER: &str = "realdebrid";
const CREDENTIAL: &str = "a Real-Debrid API key";

/// Torrent states that will never produce a link.
const FAILED_STATES: [&str; 4] = ["magnet_error", "error", "virus", "dead"];

#[derive(Debug, Deserialize)]
struct AddedMagnet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    status: String,
    #[serde(default)]
    files: Vec<InfoFile>,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InfoFile {
    id: u64,
    #[serde(default)]
    path: String,
    #[serde(default)]
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct UnrestrictedLink {
    download: String,
}

/// Client for the Real-Debrid REST API.
#[derive(Debug, Clone)]
pub struct RealDebridClient {
    client: reqwest::Client,
    base_url: String,
    filter: ScoreFilter,
}

impl RealDebridClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            filter: ScoreFilter::default(),
        }
    }

    /// Applies hard exclusions when picking files.
    pub fn with_filter(mut self, filter: ScoreFilter) -> Self {
        self.filter = filter;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn add_magnet(&self, info_hash: &InfoHash, key: &str) -> Result<String, ProviderError> {
        let magnet = info_hash.magnet_uri(None);
        let request = self
            .client
            .post(self.url("torrents/addMagnet"))
            .bearer_auth(key)
            .form(&[("magnet", magnet.as_str())]);
        let added: AddedMagnet = transport::send_json(PROVIDER, request).await?;
        Ok(added.id)
    }

    async fn torrent_info(&self, torrent_id: &str, key: &str) -> Result<TorrentInfo, ProviderError> {
        let request = self
            .client
            .get(self.url(&format!("torrents/info/{torrent_id}")))
            .bearer_auth(key);
        transport::send_json(PROVIDER, request).await
    }

    async fn select_files(&self, torrent_id: &str, file_id: u64, key: &str) -> Result<(), ProviderError> {
        let request = self
            .client
            .post(self.url(&format!("torrents/selectFiles/{torrent_id}")))
            .bearer_auth(key)
            .form(&[("files", file_id.to_string())]);
        transport::send(PROVIDER, request).await?;
        Ok(())
    }

    async fn unrestrict(&self, link: &str, key: &str) -> Result<String, ProviderError> {
        let request = self
            .client
            .post(self.url("unrestrict/link"))
            .bearer_auth(key)
            .form(&[("link", link)]);
        let unrestricted: UnrestrictedLink = transport::send_json(PROVIDER, request).await?;
        Ok(unrestricted.download)
    }
}

/// Whether an `instantAvailability` payload has any cached variant.
fn availability_has_variants(payload: &Value, info_hash: &InfoHash) -> bool {
    payload
        .get(info_hash.to_string())
        .and_then(|entry| entry.get("rd"))
        .and_then(Value::as_array)
        .is_some_and(|variants| variants.iter().any(|v| v.as_object().is_some_and(|o| !o.is_empty())))
}

fn info_files(info: &TorrentInfo) -> Vec<TorrentFile> {
    info.files
        .iter()
        .map(|file| TorrentFile {
            id: file.id,
            path: file.path.clone(),
            size: file.bytes,
        })
        .collect()
}

#[async_trait]
impl DebridProvider for RealDebridClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn check_cache(&self, info_hash: &InfoHash, keys: &ApiKeys) -> Result<bool, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.realdebrid.as_ref())?;
        let request = self
            .client
            .get(self.url(&format!("torrents/instantAvailability/{info_hash}")))
            .bearer_auth(key);
        let payload: Value = transport::send_json(PROVIDER, request).await?;

        let cached = availability_has_variants(&payload, info_hash);
        debug!("Real-Debrid cache for {info_hash}: {cached}");
        Ok(cached)
    }

    async fn resolve(
        &self,
        info_hash: &InfoHash,
        hint: EpisodeHint,
        keys: &ApiKeys,
    ) -> Result<DebridResolution, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.realdebrid.as_ref())?;

        let torrent_id = self.add_magnet(info_hash, key).await?;
        let mut info = self.torrent_info(&torrent_id, key).await?;

        if info.status == "waiting_files_selection" {
            let files = info_files(&info);
            let file = select_file(&files, hint, FileRanking::Score(self.filter))
                .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "torrent has no files"))?;
            info!("Real-Debrid selecting file {} ({})", file.id, file.path);
            self.select_files(&torrent_id, file.id, key).await?;
            info = self.torrent_info(&torrent_id, key).await?;
        }

        if FAILED_STATES.contains(&info.status.as_str()) {
            return Err(ProviderError::rejected(
                PROVIDER,
                format!("torrent {torrent_id} is {}", info.status),
            ));
        }

        match info.links.first() {
            Some(link) if info.status == "downloaded" => {
                let url = self.unrestrict(link, key).await?;
                Ok(DebridResolution::Ready { url, expiry: None })
            }
            _ => Ok(DebridResolution::Pending {
                detail: format!("Real-Debrid torrent {torrent_id} is {}", info.status),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_availability_detects_cached_variants() {
        let hash: InfoHash = HASH.parse().unwrap();
        let cached = serde_json::json!({
            HASH: {"rd": [{"1": {"filename": "Dune.mkv", "filesize": 10}}]}
        });
        let empty = serde_json::json!({ HASH: [] });
        let no_variants = serde_json::json!({ HASH: {"rd": [{}]} });

        assert!(availability_has_variants(&cached, &hash));
        assert!(!availability_has_variants(&empty, &hash));
        assert!(!availability_has_variants(&no_variants, &hash));
        assert!(!availability_has_variants(&serde_json::json!({}), &hash));
    }

    #[test]
    fn test_torrent_info_parses_links_and_files() {
        let info: TorrentInfo = serde_json::from_value(serde_json::json!({
            "id": "ABC", "status": "downloaded",
            "files": [{"id": 1, "path": "/Dune.2021.2160p.mkv", "bytes": 42, "selected": 1}],
            "links": ["https://real-debrid.com/d/XYZ"]
        }))
        .unwrap();
        assert_eq!(info.links.len(), 1);
        assert_eq!(info_files(&info)[0].size, 42);
    }
}
