//! TorBox debrid service (Tier 2).

use async_trait::async_trait;
use omega_core::credentials::ApiKeys;
use omega_core::media::{EpisodeHint, InfoHash};
use omega_core::providers::{DebridProvider, DebridResolution};
use omega_core::ProviderError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::torrent_files::{FileRanking, TorrentFile, select_file};
use crate::transport;

const PROVIDER: &str = "torbox";
const CREDENTIAL: &str = "a TorBox API key";

/// Common `{success, detail, data}` wrapper of every TorBox answer.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    detail: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Payload of a successful answer.
    fn into_data(self) -> Result<Option<T>, ProviderError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ProviderError::rejected(
                PROVIDER,
                self.detail.unwrap_or_else(|| "request unsuccessful".to_string()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTorrent {
    torrent_id: Option<u64>,
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListedTorrent {
    #[serde(default)]
    download_state: Option<String>,
    #[serde(default)]
    download_finished: bool,
    #[serde(default)]
    download_present: bool,
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Debug, Deserialize)]
struct ListedFile {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
}

/// Client for the TorBox API.
#[derive(Debug, Clone)]
pub struct TorBoxClient {
    client: reqwest::Client,
    base_url: String,
}

impl TorBoxClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/torrents/{path}", self.base_url)
    }

    async fn create_torrent(&self, info_hash: &InfoHash, key: &str) -> Result<u64, ProviderError> {
        let magnet = info_hash.magnet_uri(None);
        let request = self
            .client
            .post(self.url("createtorrent"))
            .bearer_auth(key)
            .form(&[("magnet", magnet.as_str()), ("seed", "1"), ("allow_zip", "false")]);
        let envelope: Envelope<CreatedTorrent> = transport::send_json(PROVIDER, request).await?;

        envelope
            .into_data()?
            .and_then(|created| created.torrent_id.or(created.id))
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "no torrent id returned"))
    }

    async fn torrent_info(&self, torrent_id: u64, key: &str) -> Result<ListedTorrent, ProviderError> {
        let request = self
            .client
            .get(self.url("mylist"))
            .bearer_auth(key)
            .query(&[("id", torrent_id.to_string()), ("bypass_cache", "true".to_string())]);
        let envelope: Envelope<ListedTorrent> = transport::send_json(PROVIDER, request).await?;

        envelope
            .into_data()?
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "torrent missing from list"))
    }

    async fn request_download(
        &self,
        torrent_id: u64,
        file_id: u64,
        key: &str,
    ) -> Result<String, ProviderError> {
        let request = self.client.get(self.url("requestdl")).bearer_auth(key).query(&[
            ("token", key.to_string()),
            ("torrent_id", torrent_id.to_string()),
            ("file_id", file_id.to_string()),
            ("zip_link", "false".to_string()),
        ]);
        let envelope: Envelope<String> = transport::send_json(PROVIDER, request).await?;

        envelope
            .into_data()?
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "no download link returned"))
    }
}

/// Whether a `checkcached` payload lists the hash, in list or object format.
fn cache_payload_has_entries(data: Option<&Value>) -> bool {
    match data {
        Some(Value::Array(entries)) => !entries.is_empty(),
        Some(Value::Object(entries)) => !entries.is_empty(),
        _ => false,
    }
}

fn torrent_files(torrent: &ListedTorrent) -> Vec<TorrentFile> {
    torrent
        .files
        .iter()
        .map(|file| TorrentFile {
            id: file.id,
            path: file.name.clone(),
            size: file.size,
        })
        .collect()
}

#[async_trait]
impl DebridProvider for TorBoxClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn check_cache(&self, info_hash: &InfoHash, keys: &ApiKeys) -> Result<bool, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.torbox.as_ref())?;
        let request = self
            .client
            .get(self.url("checkcached"))
            .bearer_auth(key)
            .query(&[("hash", info_hash.to_string()), ("format", "list".to_string())]);
        let envelope: Envelope<Value> = transport::send_json(PROVIDER, request).await?;

        let cached = cache_payload_has_entries(envelope.into_data()?.as_ref());
        debug!("TorBox cache for {info_hash}: {cached}");
        Ok(cached)
    }

    async fn resolve(
        &self,
        info_hash: &InfoHash,
        hint: EpisodeHint,
        keys: &ApiKeys,
    ) -> Result<DebridResolution, ProviderError> {
        let key = transport::require_key(PROVIDER, CREDENTIAL, keys.torbox.as_ref())?;

        let torrent_id = self.create_torrent(info_hash, key).await?;
        let torrent = self.torrent_info(torrent_id, key).await?;

        if !(torrent.download_finished || torrent.download_present) || torrent.files.is_empty() {
            let state = torrent
                .download_state
                .unwrap_or_else(|| "queued".to_string());
            return Ok(DebridResolution::Pending {
                detail: format!("TorBox torrent {torrent_id} is {state}"),
            });
        }

        let files = torrent_files(&torrent);
        let file = select_file(&files, hint, FileRanking::Size)
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "torrent has no files"))?;
        info!("TorBox streaming file {} ({})", file.id, file.path);

        let url = self.request_download(torrent_id, file.id, key).await?;
        Ok(DebridResolution::Ready { url, expiry: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_payload_formats() {
        assert!(cache_payload_has_entries(Some(&serde_json::json!([{"hash": "x"}]))));
        assert!(cache_payload_has_entries(Some(&serde_json::json!({"abc": {"name": "x"}}))));
        assert!(!cache_payload_has_entries(Some(&serde_json::json!([]))));
        assert!(!cache_payload_has_entries(Some(&Value::Null)));
        assert!(!cache_payload_has_entries(None));
    }

    #[test]
    fn test_unsuccessful_envelope_is_rejection() {
        let envelope: Envelope<Value> = serde_json::from_value(serde_json::json!({
            "success": false, "detail": "BAD_TOKEN", "data": null
        }))
        .unwrap();
        assert_eq!(
            envelope.into_data().unwrap_err(),
            ProviderError::rejected(PROVIDER, "BAD_TOKEN")
        );
    }

    #[test]
    fn test_listed_torrent_parses_files() {
        let torrent: ListedTorrent = serde_json::from_value(serde_json::json!({
            "id": 7, "download_state": "cached", "download_finished": true,
            "files": [{"id": 0, "name": "Dune/Dune.mkv", "size": 123, "short_name": "Dune.mkv"}]
        }))
        .unwrap();
        let files = torrent_files(&torrent);
        assert_eq!(files[0].path, "Dune/Dune.mkv");
        assert!(torrent.download_finished);
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let client = TorBoxClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let error = client
            .check_cache(&InfoHash::new([1; 20]), &ApiKeys::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ProviderError::MissingCredential { .. }));
    }
}
