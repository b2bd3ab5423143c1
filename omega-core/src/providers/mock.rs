//! Scripted providers for deterministic tests.
//!
//! Each mock answers with a fixed script and records every call so tests can
//! assert on what the resolver or the orchestrator actually sent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ChatModel, DebridProvider, DebridResolution, HistoryProvider, IdentifierProvider,
    InstantCacheProvider,
};
use crate::conversation::{ConversationTurn, ModelReply, ToolSpec};
use crate::credentials::ApiKeys;
use crate::errors::ProviderError;
use crate::media::{
    CandidateResult, EpisodeHint, GroundedReference, HistoryFilter, InfoHash, MediaKind,
    SearchQuery, UpcomingEpisode, WatchStats, WatchedItem,
};

/// Instant cache returning the same answer for every lookup.
#[derive(Debug)]
pub struct ScriptedInstantCache {
    response: Result<Vec<CandidateResult>, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedInstantCache {
    pub fn hit(candidates: Vec<CandidateResult>) -> Self {
        Self {
            response: Ok(candidates),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn miss() -> Self {
        Self::hit(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            response: Err(ProviderError::unavailable("mock-instant", "connection refused")),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delays every answer, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> Result<Vec<CandidateResult>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

#[async_trait]
impl InstantCacheProvider for ScriptedInstantCache {
    fn name(&self) -> &str {
        "mock-instant"
    }

    async fn lookup(&self, _query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError> {
        self.answer().await
    }

    async fn lookup_hash(
        &self,
        _info_hash: &InfoHash,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        self.answer().await
    }
}

/// Debrid service with a fixed cache state.
#[derive(Debug)]
pub struct ScriptedDebrid {
    cached: Result<bool, ProviderError>,
    resolution: Result<DebridResolution, ProviderError>,
    check_calls: Mutex<Vec<InfoHash>>,
    resolve_calls: Mutex<Vec<(InfoHash, EpisodeHint)>>,
}

impl ScriptedDebrid {
    /// Holds every torrent and links it to `url`.
    pub fn cached(url: &str) -> Self {
        Self::scripted(
            Ok(true),
            Ok(DebridResolution::Ready {
                url: url.to_string(),
                expiry: None,
            }),
        )
    }

    /// Holds nothing; add requests are accepted and queued.
    pub fn uncached() -> Self {
        Self::scripted(
            Ok(false),
            Ok(DebridResolution::Pending {
                detail: "queued for download".to_string(),
            }),
        )
    }

    pub fn failing() -> Self {
        Self::scripted(
            Err(ProviderError::unavailable("mock-debrid", "HTTP 503")),
            Err(ProviderError::unavailable("mock-debrid", "HTTP 503")),
        )
    }

    pub fn scripted(
        cached: Result<bool, ProviderError>,
        resolution: Result<DebridResolution, ProviderError>,
    ) -> Self {
        Self {
            cached,
            resolution,
            check_calls: Mutex::new(Vec::new()),
            resolve_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn check_calls(&self) -> Vec<InfoHash> {
        self.check_calls.lock().clone()
    }

    pub fn resolve_calls(&self) -> Vec<(InfoHash, EpisodeHint)> {
        self.resolve_calls.lock().clone()
    }

    /// Total outbound calls of either kind.
    pub fn total_calls(&self) -> usize {
        self.check_calls.lock().len() + self.resolve_calls.lock().len()
    }
}

#[async_trait]
impl DebridProvider for ScriptedDebrid {
    fn name(&self) -> &str {
        "mock-debrid"
    }

    async fn check_cache(
        &self,
        info_hash: &InfoHash,
        _keys: &ApiKeys,
    ) -> Result<bool, ProviderError> {
        self.check_calls.lock().push(*info_hash);
        self.cached.clone()
    }

    async fn resolve(
        &self,
        info_hash: &InfoHash,
        hint: EpisodeHint,
        _keys: &ApiKeys,
    ) -> Result<DebridResolution, ProviderError> {
        self.resolve_calls.lock().push((*info_hash, hint));
        self.resolution.clone()
    }
}

/// Identifier lookup over a fixed catalog.
#[derive(Debug, Default)]
pub struct StaticIdentifierProvider {
    catalog: Vec<GroundedReference>,
    failing: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, MediaKind)>>,
}

impl StaticIdentifierProvider {
    pub fn new(catalog: Vec<GroundedReference>) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, MediaKind)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IdentifierProvider for StaticIdentifierProvider {
    fn name(&self) -> &str {
        "mock-identifier"
    }

    async fn search(
        &self,
        title: &str,
        kind: MediaKind,
        _year: Option<u16>,
        _keys: &ApiKeys,
    ) -> Result<Option<GroundedReference>, ProviderError> {
        self.calls.lock().push((title.to_string(), kind));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(ProviderError::unavailable("mock-identifier", "HTTP 502"));
        }
        Ok(self
            .catalog
            .iter()
            .find(|reference| {
                reference.media_kind == kind
                    && reference.display_title.eq_ignore_ascii_case(title.trim())
            })
            .cloned())
    }
}

/// Watch history shared by every token.
#[derive(Debug, Default)]
pub struct StaticHistoryProvider {
    items: Vec<WatchedItem>,
    upcoming: Vec<UpcomingEpisode>,
    stats: WatchStats,
    tokens: Mutex<Vec<String>>,
}

impl StaticHistoryProvider {
    pub fn new(items: Vec<WatchedItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_upcoming(mut self, upcoming: Vec<UpcomingEpisode>) -> Self {
        self.upcoming = upcoming;
        self
    }

    pub fn with_stats(mut self, stats: WatchStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl HistoryProvider for StaticHistoryProvider {
    fn name(&self) -> &str {
        "mock-history"
    }

    async fn history(
        &self,
        user_token: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<WatchedItem>, ProviderError> {
        self.tokens.lock().push(user_token.to_string());
        Ok(self
            .items
            .iter()
            .filter(|item| filter.kind.is_none_or(|kind| item.kind == kind))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    /// Shows with a last watched episode.
    async fn continue_watching(
        &self,
        user_token: &str,
        limit: usize,
    ) -> Result<Vec<WatchedItem>, ProviderError> {
        self.tokens.lock().push(user_token.to_string());
        Ok(self
            .items
            .iter()
            .filter(|item| item.kind == MediaKind::Show && item.episode.is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn calendar(
        &self,
        user_token: &str,
        _days: u32,
    ) -> Result<Vec<UpcomingEpisode>, ProviderError> {
        self.tokens.lock().push(user_token.to_string());
        Ok(self.upcoming.clone())
    }

    async fn stats(&self, user_token: &str) -> Result<WatchStats, ProviderError> {
        self.tokens.lock().push(user_token.to_string());
        Ok(self.stats)
    }
}

/// What the scripted model was asked in one round.
#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub system: String,
    pub turns: Vec<ConversationTurn>,
    pub tool_names: Vec<String>,
}

/// Chat model replaying a queue of replies.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    requests: Mutex<Vec<RecordedCompletion>>,
}

impl ScriptedChatModel {
    pub fn new(replies: Vec<Result<ModelReply, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: Vec<ModelReply>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<RecordedCompletion> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn name(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSpec],
        _keys: &ApiKeys,
    ) -> Result<ModelReply, ProviderError> {
        self.requests.lock().push(RecordedCompletion {
            system: system.to_string(),
            turns: turns.to_vec(),
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        });
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Err(ProviderError::invalid_response(
                "mock-model",
                "reply script exhausted",
            ))
        })
    }
}
