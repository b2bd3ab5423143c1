//! Media identifiers, search queries and resolution artifacts.
//!
//! These types flow between the resolver, the provider adapters and the
//! assistant. All of them are built per request and never persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of title a query or identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Movie,
    Show,
}

impl MediaKind {
    /// Lowercase name used in deep links and tool arguments.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" | "film" => Ok(MediaKind::Movie),
            "show" | "shows" | "tv" | "series" => Ok(MediaKind::Show),
            other => Err(format!("Invalid media kind: {other}")),
        }
    }
}

impl Serialize for MediaKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MediaKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-1 info hash identifying a torrent.
///
/// Parsed from the 40 character hex form providers exchange and always
/// displayed as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Magnet URI for this hash, optionally carrying a display name.
    pub fn magnet_uri(&self, display_name: Option<&str>) -> String {
        let mut link = format!("magnet:?xt=urn:btih:{self}");
        if let Some(name) = display_name.filter(|name| !name.is_empty()) {
            let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
            link.push_str("&dn=");
            link.push_str(&encoded);
        }
        link
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 40 {
            return Err(format!(
                "Info hash must be 40 hex characters, got {}",
                trimmed.len()
            ));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut bytes)
            .map_err(|e| format!("Invalid info hash '{trimmed}': {e}"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Title query for one resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub title: String,
    pub kind: MediaKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u16>,
    pub imdb_id: Option<String>,
}

impl SearchQuery {
    pub fn movie(title: impl Into<String>) -> Self {
        Self::new(title, MediaKind::Movie)
    }

    pub fn show(title: impl Into<String>) -> Self {
        Self::new(title, MediaKind::Show)
    }

    pub fn new(title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            kind,
            season: None,
            episode: None,
            year: None,
            imdb_id: None,
        }
    }

    pub fn with_episode(mut self, season: u32, episode: u32) -> Self {
        self.season = Some(season);
        self.episode = Some(episode);
        self
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_imdb_id(mut self, imdb_id: impl Into<String>) -> Self {
        self.imdb_id = Some(imdb_id.into());
        self
    }

    /// Title with surrounding whitespace trimmed and inner runs collapsed.
    pub fn normalized_title(&self) -> String {
        self.title.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// `SxxEyy` tag when both season and episode are known.
    pub fn episode_tag(&self) -> Option<String> {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => Some(format!("S{season:02}E{episode:02}")),
            _ => None,
        }
    }

    /// File selection hint handed to debrid providers.
    pub fn episode_hint(&self) -> EpisodeHint {
        EpisodeHint {
            season: self.season,
            episode: self.episode,
        }
    }
}

/// Season/episode a debrid provider should prefer when picking a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeHint {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl EpisodeHint {
    pub fn none() -> Self {
        Self::default()
    }

    /// Both parts, when the hint is specific enough to match files.
    pub fn pair(&self) -> Option<(u32, u32)> {
        self.season.zip(self.episode)
    }
}

/// Resolution tier a candidate or stream came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Instant,
    Debrid,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Instant => f.write_str("instant"),
            SourceTier::Debrid => f.write_str("debrid"),
        }
    }
}

/// One source a provider knows about for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub info_hash: InfoHash,
    pub tier: SourceTier,
    /// Provider-reported rank; higher ranks first.
    pub rank: i64,
    pub size_bytes: Option<u64>,
    pub cached: bool,
    /// Ready-to-play URL when the provider hands one out directly.
    pub stream_url: Option<String>,
    /// Provider-specific details (filename, quality, indexer...).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CandidateResult {
    pub fn new(info_hash: InfoHash, tier: SourceTier, rank: i64) -> Self {
        Self {
            info_hash,
            tier,
            rank,
            size_bytes: None,
            cached: false,
            stream_url: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Filename reported by the provider, if any.
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get("filename").and_then(|v| v.as_str())
    }

    /// Size used for tie-breaking; unknown sizes sort as zero.
    pub fn size_or_zero(&self) -> u64 {
        self.size_bytes.unwrap_or(0)
    }
}

/// Playable stream produced by a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub url: String,
    pub source_tier: SourceTier,
    pub info_hash: InfoHash,
    pub expiry: Option<DateTime<Utc>>,
}

/// Debrid work that was accepted but is not playable yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResolution {
    pub info_hash: InfoHash,
    pub provider: String,
    pub detail: String,
}

/// Outcome of a resolution that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Resolution {
    Ready(ResolvedStream),
    Pending(PendingResolution),
}

impl Resolution {
    pub fn stream(&self) -> Option<&ResolvedStream> {
        match self {
            Resolution::Ready(stream) => Some(stream),
            Resolution::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending(_))
    }
}

/// Verified title identity returned by the identifier lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundedReference {
    pub display_title: String,
    pub canonical_id: u64,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

/// Item from a user's watch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedItem {
    pub title: String,
    pub kind: MediaKind,
    pub year: Option<u16>,
    pub tmdb_id: Option<u64>,
    pub episode: Option<String>,
    pub watched_at: Option<DateTime<Utc>>,
}

/// Narrowing applied to a history lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub limit: usize,
    pub kind: Option<MediaKind>,
    pub title: Option<String>,
}

impl HistoryFilter {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// Episode of a followed show airing soon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingEpisode {
    pub show: String,
    pub tmdb_id: Option<u64>,
    /// `SxxEyy` tag
    pub episode: String,
    pub episode_title: Option<String>,
    pub first_aired: Option<DateTime<Utc>>,
}

/// Lifetime watch totals of one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStats {
    pub movies_watched: u64,
    pub movie_minutes: u64,
    pub shows_watched: u64,
    pub episodes_watched: u64,
    pub episode_minutes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_info_hash_roundtrips_case_insensitively() {
        let hash: InfoHash = HASH.to_uppercase().parse().unwrap();
        assert_eq!(hash.to_string(), HASH);
    }

    #[test]
    fn test_info_hash_rejects_bad_input() {
        assert!("abc".parse::<InfoHash>().is_err());
        assert!("zz23456789abcdef0123456789abcdef01234567".parse::<InfoHash>().is_err());
    }

    #[test]
    fn test_magnet_uri_encodes_display_name() {
        let hash: InfoHash = HASH.parse().unwrap();
        assert_eq!(hash.magnet_uri(None), format!("magnet:?xt=urn:btih:{HASH}"));
        assert_eq!(
            hash.magnet_uri(Some("The Expanse S01")),
            format!("magnet:?xt=urn:btih:{HASH}&dn=The+Expanse+S01")
        );
    }

    #[test]
    fn test_media_kind_accepts_aliases() {
        assert_eq!("tv".parse::<MediaKind>().unwrap(), MediaKind::Show);
        assert_eq!(" Movie ".parse::<MediaKind>().unwrap(), MediaKind::Movie);
        assert!("album".parse::<MediaKind>().is_err());

        let kind: MediaKind = serde_json::from_str("\"series\"").unwrap();
        assert_eq!(kind, MediaKind::Show);
        assert_eq!(serde_json::to_string(&MediaKind::Movie).unwrap(), "\"movie\"");
    }

    #[test]
    fn test_query_normalization_and_episode_tag() {
        let query = SearchQuery::show("  The   Expanse ").with_episode(1, 2);
        assert_eq!(query.normalized_title(), "The Expanse");
        assert_eq!(query.episode_tag().as_deref(), Some("S01E02"));
        assert_eq!(SearchQuery::movie("Dune").episode_tag(), None);
        assert_eq!(query.episode_hint().pair(), Some((1, 2)));
    }
}
