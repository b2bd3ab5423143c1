//! Capability traits for the external data sources the gateway talks to.
//!
//! Each role has one narrow trait. Concrete adapters live in
//! `omega-providers` and are picked when the service is assembled, so the
//! resolver and the assistant never branch on provider identity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{ConversationTurn, ModelReply, ToolSpec};
use crate::credentials::ApiKeys;
use crate::errors::ProviderError;
use crate::media::{
    CandidateResult, EpisodeHint, GroundedReference, HistoryFilter, InfoHash, MediaKind,
    SearchQuery, UpcomingEpisode, WatchStats, WatchedItem,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

/// Tier 1: pre-indexed sources that are playable without preparation.
#[async_trait]
pub trait InstantCacheProvider: Send + Sync + std::fmt::Debug {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Looks up candidates for a title query, in provider rank order.
    ///
    /// # Errors
    /// - `ProviderError::Unavailable` - Network failure or server error
    /// - `ProviderError::InvalidResponse` - Response could not be parsed
    async fn lookup(&self, query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError>;

    /// Looks up candidates for a known hash.
    ///
    /// Indexes that cannot search by hash report a miss.
    ///
    /// # Errors
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn lookup_hash(
        &self,
        _info_hash: &InfoHash,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Result of asking a debrid service for a playable link.
#[derive(Debug, Clone, PartialEq)]
pub enum DebridResolution {
    Ready {
        url: String,
        expiry: Option<DateTime<Utc>>,
    },
    /// Accepted, still being prepared by the service.
    Pending { detail: String },
}

/// Tier 2: services that may have to fetch content before streaming it.
#[async_trait]
pub trait DebridProvider: Send + Sync + std::fmt::Debug {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Reports whether the service already holds the torrent.
    ///
    /// # Errors
    /// - `ProviderError::MissingCredential` - No key for this service in `keys`
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn check_cache(&self, info_hash: &InfoHash, keys: &ApiKeys)
    -> Result<bool, ProviderError>;

    /// Adds the torrent if needed and requests a direct link.
    ///
    /// Implementations issue a bounded number of requests and return
    /// `Pending` instead of waiting for a download to finish.
    ///
    /// # Errors
    /// - `ProviderError::MissingCredential` - No key for this service in `keys`
    /// - `ProviderError::Unavailable` - Network failure or server error
    /// - `ProviderError::Rejected` - The service refused the torrent
    async fn resolve(
        &self,
        info_hash: &InfoHash,
        hint: EpisodeHint,
        keys: &ApiKeys,
    ) -> Result<DebridResolution, ProviderError>;
}

/// Authoritative title identifier lookup.
#[async_trait]
pub trait IdentifierProvider: Send + Sync + std::fmt::Debug {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Finds the best matching title, or `None` when nothing matches.
    ///
    /// # Errors
    /// - `ProviderError::MissingCredential` - No lookup key available
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn search(
        &self,
        title: &str,
        kind: MediaKind,
        year: Option<u16>,
        keys: &ApiKeys,
    ) -> Result<Option<GroundedReference>, ProviderError>;
}

/// Per-user watch history.
#[async_trait]
pub trait HistoryProvider: Send + Sync + std::fmt::Debug {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Returns watched items, most recent first.
    ///
    /// # Errors
    /// - `ProviderError::Rejected` - Token refused by the service
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn history(
        &self,
        user_token: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<WatchedItem>, ProviderError>;

    /// Returns what the user is playing now, or else the shows they have
    /// progress in, most recently watched first.
    ///
    /// # Errors
    /// - `ProviderError::Rejected` - Token refused by the service
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn continue_watching(
        &self,
        user_token: &str,
        limit: usize,
    ) -> Result<Vec<WatchedItem>, ProviderError>;

    /// Returns episodes of followed shows airing within `days` days.
    ///
    /// # Errors
    /// - `ProviderError::Rejected` - Token refused by the service
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn calendar(
        &self,
        user_token: &str,
        days: u32,
    ) -> Result<Vec<UpcomingEpisode>, ProviderError>;

    /// # Errors
    /// - `ProviderError::Rejected` - Token refused by the service
    /// - `ProviderError::Unavailable` - Network failure or server error
    async fn stats(&self, user_token: &str) -> Result<WatchStats, ProviderError>;
}

/// Generative model able to request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync + std::fmt::Debug {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Produces the next reply for the running conversation.
    ///
    /// An empty `tools` slice means the model must answer in text.
    ///
    /// # Errors
    /// - `ProviderError::MissingCredential` - No model key available
    /// - `ProviderError::Unavailable` - Network failure or server error
    /// - `ProviderError::InvalidResponse` - Reply could not be parsed
    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
        tools: &[ToolSpec],
        keys: &ApiKeys,
    ) -> Result<ModelReply, ProviderError>;
}
