//! Trakt watch history, progress, calendar and stats.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omega_core::media::{HistoryFilter, MediaKind, UpcomingEpisode, WatchStats, WatchedItem};
use omega_core::providers::HistoryProvider;
use omega_core::ProviderError;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::transport;

const PROVIDER: &str = "trakt";

/// Entries scanned when searching the history for a title.
const TITLE_SEARCH_WINDOW: usize = 1000;

/// A history entry, or the single item returned by `/users/me/watching`.
#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(default, alias = "started_at")]
    watched_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    movie: Option<TraktMedia>,
    #[serde(default)]
    show: Option<TraktMedia>,
    #[serde(default)]
    episode: Option<TraktEpisode>,
}

#[derive(Debug, Deserialize)]
struct TraktMedia {
    title: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    ids: TraktIds,
}

#[derive(Debug, Default, Deserialize)]
struct TraktIds {
    #[serde(default)]
    tmdb: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TraktEpisode {
    season: u32,
    number: u32,
    #[serde(default)]
    title: Option<String>,
}

fn episode_tag(season: u32, number: u32) -> String {
    format!("S{season:02}E{number:02}")
}

/// Entry of `/users/me/watched/shows`.
#[derive(Debug, Deserialize)]
struct WatchedShow {
    #[serde(default)]
    last_watched_at: Option<DateTime<Utc>>,
    show: TraktMedia,
    #[serde(default)]
    seasons: Vec<WatchedSeason>,
}

#[derive(Debug, Deserialize)]
struct WatchedSeason {
    number: u32,
    #[serde(default)]
    episodes: Vec<WatchedEpisodeNumber>,
}

#[derive(Debug, Deserialize)]
struct WatchedEpisodeNumber {
    number: u32,
}

impl WatchedShow {
    /// The furthest episode watched marks where the user left off.
    fn into_item(self) -> WatchedItem {
        let furthest = self
            .seasons
            .iter()
            .flat_map(|season| season.episodes.iter().map(|e| (season.number, e.number)))
            .max();
        WatchedItem {
            title: self.show.title,
            kind: MediaKind::Show,
            year: self.show.year,
            tmdb_id: self.show.ids.tmdb,
            episode: furthest.map(|(season, number)| episode_tag(season, number)),
            watched_at: self.last_watched_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarEntry {
    #[serde(default)]
    first_aired: Option<DateTime<Utc>>,
    episode: TraktEpisode,
    show: TraktMedia,
}

impl From<CalendarEntry> for UpcomingEpisode {
    fn from(entry: CalendarEntry) -> Self {
        UpcomingEpisode {
            show: entry.show.title,
            tmdb_id: entry.show.ids.tmdb,
            episode: episode_tag(entry.episode.season, entry.episode.number),
            episode_title: entry.episode.title,
            first_aired: entry.first_aired,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsBlock {
    watched: u64,
    minutes: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TraktStats {
    movies: StatsBlock,
    shows: StatsBlock,
    episodes: StatsBlock,
}

impl From<TraktStats> for WatchStats {
    fn from(stats: TraktStats) -> Self {
        WatchStats {
            movies_watched: stats.movies.watched,
            movie_minutes: stats.movies.minutes,
            shows_watched: stats.shows.watched,
            episodes_watched: stats.episodes.watched,
            episode_minutes: stats.episodes.minutes,
        }
    }
}

impl HistoryEntry {
    fn into_item(self) -> Option<WatchedItem> {
        let (media, kind) = match self.entry_type.as_str() {
            "movie" => (self.movie?, MediaKind::Movie),
            "episode" | "show" => (self.show?, MediaKind::Show),
            _ => return None,
        };
        Some(WatchedItem {
            title: media.title,
            kind,
            year: media.year,
            tmdb_id: media.ids.tmdb,
            episode: self.episode.map(|e| episode_tag(e.season, e.number)),
            watched_at: self.watched_at,
        })
    }
}

/// Trakt client acting on behalf of the user whose token is passed per call.
#[derive(Debug, Clone)]
pub struct TraktClient {
    client: reqwest::Client,
    base_url: String,
    client_id: Option<String>,
}

impl TraktClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            client_id,
        }
    }

    /// GET request signed with the app id and the user's token.
    fn get(&self, path: &str, user_token: &str) -> Result<RequestBuilder, ProviderError> {
        let client_id = transport::require_key(PROVIDER, "TRAKT_CLIENT_ID", self.client_id.as_ref())?;
        Ok(self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(user_token)
            .header("trakt-api-version", "2")
            .header("trakt-api-key", client_id))
    }

    fn history_path(kind: Option<MediaKind>) -> &'static str {
        match kind {
            Some(MediaKind::Movie) => "/users/me/history/movies",
            Some(MediaKind::Show) => "/users/me/history/shows",
            None => "/users/me/history",
        }
    }
}

/// Keeps items whose title contains `title`, case-insensitively.
fn filter_by_title(items: Vec<WatchedItem>, title: &str) -> Vec<WatchedItem> {
    let needle = title.trim().to_lowercase();
    items
        .into_iter()
        .filter(|item| item.title.to_lowercase().contains(&needle))
        .collect()
}

#[async_trait]
impl HistoryProvider for TraktClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn history(
        &self,
        user_token: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<WatchedItem>, ProviderError> {
        let fetch_limit = if filter.title.is_some() {
            TITLE_SEARCH_WINDOW
        } else {
            filter.limit
        };

        let request = self
            .get(Self::history_path(filter.kind), user_token)?
            .query(&[("limit", fetch_limit)]);
        let entries: Vec<HistoryEntry> = transport::send_json(PROVIDER, request).await?;
        debug!("Trakt returned {} history entries", entries.len());

        let mut items: Vec<WatchedItem> = entries.into_iter().filter_map(HistoryEntry::into_item).collect();
        if let Some(title) = &filter.title {
            items = filter_by_title(items, title);
        }
        items.truncate(filter.limit);
        Ok(items)
    }

    async fn continue_watching(
        &self,
        user_token: &str,
        limit: usize,
    ) -> Result<Vec<WatchedItem>, ProviderError> {
        let response = transport::send(PROVIDER, self.get("/users/me/watching", user_token)?).await?;
        if response.status() != StatusCode::NO_CONTENT {
            let playing: HistoryEntry = response
                .json()
                .await
                .map_err(|e| ProviderError::invalid_response(PROVIDER, e))?;
            return Ok(playing.into_item().into_iter().collect());
        }

        debug!("Nothing playing on Trakt, falling back to show progress");
        let shows: Vec<WatchedShow> =
            transport::send_json(PROVIDER, self.get("/users/me/watched/shows", user_token)?).await?;
        let mut items: Vec<WatchedItem> = shows.into_iter().map(WatchedShow::into_item).collect();
        items.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn calendar(
        &self,
        user_token: &str,
        days: u32,
    ) -> Result<Vec<UpcomingEpisode>, ProviderError> {
        let start = Utc::now().format("%Y-%m-%d");
        let path = format!("/calendars/my/shows/{start}/{days}");
        let entries: Vec<CalendarEntry> =
            transport::send_json(PROVIDER, self.get(&path, user_token)?).await?;
        debug!("Trakt calendar has {} episodes in {days} days", entries.len());
        Ok(entries.into_iter().map(UpcomingEpisode::from).collect())
    }

    async fn stats(&self, user_token: &str) -> Result<WatchStats, ProviderError> {
        let stats: TraktStats =
            transport::send_json(PROVIDER, self.get("/users/me/stats", user_token)?).await?;
        Ok(stats.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<HistoryEntry> {
        serde_json::from_value(serde_json::json!([
            {"id": 1, "watched_at": "2024-05-01T20:00:00.000Z", "action": "watch", "type": "episode",
             "episode": {"season": 2, "number": 5, "title": "Cascade"},
             "show": {"title": "The Expanse", "year": 2015, "ids": {"trakt": 1, "tmdb": 63639}}},
            {"id": 2, "watched_at": "2024-04-30T20:00:00.000Z", "action": "watch", "type": "movie",
             "movie": {"title": "Inception", "year": 2010, "ids": {"tmdb": 27205}}},
            {"id": 3, "type": "season"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_history_entries_map_to_items() {
        let items: Vec<WatchedItem> = entries().into_iter().filter_map(HistoryEntry::into_item).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "The Expanse");
        assert_eq!(items[0].kind, MediaKind::Show);
        assert_eq!(items[0].episode.as_deref(), Some("S02E05"));
        assert_eq!(items[0].tmdb_id, Some(63639));
        assert_eq!(items[1].kind, MediaKind::Movie);
        assert!(items[1].watched_at.is_some());
    }

    #[test]
    fn test_watched_show_resumes_at_furthest_episode() {
        let show: WatchedShow = serde_json::from_value(serde_json::json!({
            "plays": 12, "last_watched_at": "2024-05-01T20:00:00.000Z",
            "show": {"title": "The Expanse", "year": 2015, "ids": {"tmdb": 63639}},
            "seasons": [
                {"number": 2, "episodes": [{"number": 13, "plays": 1}]},
                {"number": 3, "episodes": [{"number": 1}, {"number": 4}]},
                {"number": 1, "episodes": [{"number": 10}]}
            ]
        }))
        .unwrap();

        let item = show.into_item();
        assert_eq!(item.episode.as_deref(), Some("S03E04"));
        assert_eq!(item.kind, MediaKind::Show);
        assert_eq!(item.tmdb_id, Some(63639));
    }

    #[test]
    fn test_stats_tolerate_missing_sections() {
        let stats: TraktStats = serde_json::from_value(serde_json::json!({
            "movies": {"plays": 40, "watched": 35, "minutes": 6300, "collected": 2},
            "episodes": {"watched": 410, "minutes": 17800}
        }))
        .unwrap();

        let stats = WatchStats::from(stats);
        assert_eq!(stats.movies_watched, 35);
        assert_eq!(stats.shows_watched, 0);
        assert_eq!(stats.episode_minutes, 17800);
    }

    #[test]
    fn test_title_filter_is_case_insensitive_substring() {
        let items: Vec<WatchedItem> = entries().into_iter().filter_map(HistoryEntry::into_item).collect();
        let found = filter_by_title(items, "  inCEPtion ");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tmdb_id, Some(27205));
    }
}
