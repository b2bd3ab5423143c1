//! Tiered stream resolution.
//!
//! Tier 1 (instant cache) is always consulted first and wins whenever it
//! has a cached candidate. Tier 2 (debrid) runs only after a Tier-1 miss or
//! failure, and is asked about exactly one hash. The tiers are never raced.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::credentials::ApiKeys;
use crate::errors::{ProviderError, with_timeout};
use crate::media::{
    CandidateResult, InfoHash, PendingResolution, Resolution, ResolvedStream, SearchQuery,
    SourceTier,
};
use crate::providers::{DebridProvider, DebridResolution, InstantCacheProvider};

/// What to resolve: a title query, a known hash, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    query: Option<SearchQuery>,
    info_hash: Option<InfoHash>,
}

impl ResolveRequest {
    pub fn for_query(query: SearchQuery) -> Self {
        Self {
            query: Some(query),
            info_hash: None,
        }
    }

    pub fn for_hash(info_hash: InfoHash) -> Self {
        Self {
            query: None,
            info_hash: Some(info_hash),
        }
    }

    /// Attaches a known hash to a query request.
    pub fn with_hash(mut self, info_hash: InfoHash) -> Self {
        self.info_hash = Some(info_hash);
        self
    }

    pub fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }

    pub fn info_hash(&self) -> Option<&InfoHash> {
        self.info_hash.as_ref()
    }
}

/// Why a resolution produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    NoSourceFound,
    AllProvidersUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoSourceFound => f.write_str("no source found"),
            FailureReason::AllProvidersUnavailable => f.write_str("all providers unavailable"),
        }
    }
}

/// What one tier did during a failed resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TierOutcome {
    /// Answered, but had nothing playable.
    Miss { candidates: usize },
    /// Failed or timed out; classified as `ProviderUnavailable`.
    Unavailable { reason: String },
    /// Could not be attempted.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAttempt {
    pub tier: SourceTier,
    pub provider: String,
    #[serde(flatten)]
    pub outcome: TierOutcome,
}

/// Every fallback was exhausted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Resolution failed: {reason}")]
pub struct ResolutionFailure {
    pub reason: FailureReason,
    pub attempts: Vec<TierAttempt>,
}

impl ResolutionFailure {
    /// `AllProvidersUnavailable` unless some tier answered with a definite miss.
    fn from_attempts(attempts: Vec<TierAttempt>) -> Self {
        let any_answered = attempts
            .iter()
            .any(|attempt| matches!(attempt.outcome, TierOutcome::Miss { .. }));
        let reason = if any_answered {
            FailureReason::NoSourceFound
        } else {
            FailureReason::AllProvidersUnavailable
        };
        Self { reason, attempts }
    }
}

/// Picks the highest ranked candidate.
///
/// Equal ranks prefer the larger reported size, then the first one seen.
pub fn select_best<'a, I>(candidates: I) -> Option<&'a CandidateResult>
where
    I: IntoIterator<Item = &'a CandidateResult>,
{
    candidates.into_iter().reduce(|best, candidate| {
        if (candidate.rank, candidate.size_or_zero()) > (best.rank, best.size_or_zero()) {
            candidate
        } else {
            best
        }
    })
}

/// Instant cache first, debrid second.
#[derive(Debug, Clone)]
pub struct TierResolver {
    instant: Arc<dyn InstantCacheProvider>,
    debrid: Arc<dyn DebridProvider>,
    config: ResolverConfig,
}

impl TierResolver {
    pub fn new(
        instant: Arc<dyn InstantCacheProvider>,
        debrid: Arc<dyn DebridProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            instant,
            debrid,
            config,
        }
    }

    /// Lists Tier-1 candidates for a query in provider order.
    ///
    /// # Errors
    /// - `ProviderError` - The instant cache failed or timed out
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<CandidateResult>, ProviderError> {
        with_timeout(
            self.instant.name(),
            self.config.provider_timeout,
            self.instant.lookup(query),
        )
        .await
    }

    /// Resolves a query or hash into a stream, or a pending debrid job.
    ///
    /// # Errors
    /// - `ResolutionFailure` with `AllProvidersUnavailable` - Every consulted
    ///   tier failed
    /// - `ResolutionFailure` with `NoSourceFound` - The tiers answered but
    ///   nothing was playable
    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        keys: &ApiKeys,
    ) -> Result<Resolution, ResolutionFailure> {
        let mut attempts = Vec::with_capacity(2);
        let mut fallback_hash = request.info_hash;

        match self.lookup_instant(request).await {
            Ok(candidates) => {
                if let Some(best) = select_best(candidates.iter().filter(|c| c.cached)) {
                    info!(
                        "Tier 1 hit from {}: {} (rank {})",
                        self.instant.name(),
                        best.info_hash,
                        best.rank
                    );
                    return Ok(Resolution::Ready(instant_stream(best)));
                }

                if fallback_hash.is_none() {
                    fallback_hash = select_best(&candidates).map(|c| c.info_hash);
                }
                info!(
                    "Tier 1 miss from {} ({} uncached candidates)",
                    self.instant.name(),
                    candidates.len()
                );
                attempts.push(TierAttempt {
                    tier: SourceTier::Instant,
                    provider: self.instant.name().to_string(),
                    outcome: TierOutcome::Miss {
                        candidates: candidates.len(),
                    },
                });
            }
            Err(e) => {
                warn!("Tier 1 unavailable, falling through to debrid: {e}");
                attempts.push(TierAttempt {
                    tier: SourceTier::Instant,
                    provider: self.instant.name().to_string(),
                    outcome: TierOutcome::Unavailable {
                        reason: e.to_string(),
                    },
                });
            }
        }

        let Some(info_hash) = fallback_hash else {
            debug!("No info hash known, debrid tier skipped");
            attempts.push(self.debrid_attempt(TierOutcome::Skipped {
                reason: "no info hash to check".to_string(),
            }));
            return Err(ResolutionFailure::from_attempts(attempts));
        };

        match self.resolve_debrid(request, &info_hash, keys).await {
            Ok(resolution) => Ok(resolution),
            Err(e) => {
                warn!("Tier 2 unavailable for {info_hash}: {e}");
                attempts.push(self.debrid_attempt(TierOutcome::Unavailable {
                    reason: e.to_string(),
                }));
                Err(ResolutionFailure::from_attempts(attempts))
            }
        }
    }

    async fn lookup_instant(
        &self,
        request: &ResolveRequest,
    ) -> Result<Vec<CandidateResult>, ProviderError> {
        let limit = self.config.provider_timeout;
        let name = self.instant.name();
        match (&request.info_hash, &request.query) {
            (Some(hash), _) => with_timeout(name, limit, self.instant.lookup_hash(hash)).await,
            (None, Some(query)) => with_timeout(name, limit, self.instant.lookup(query)).await,
            (None, None) => Ok(Vec::new()),
        }
    }

    /// One cache check, then one resolve request in the same round.
    async fn resolve_debrid(
        &self,
        request: &ResolveRequest,
        info_hash: &InfoHash,
        keys: &ApiKeys,
    ) -> Result<Resolution, ProviderError> {
        let limit = self.config.provider_timeout;
        let name = self.debrid.name();
        let hint = request
            .query
            .as_ref()
            .map(SearchQuery::episode_hint)
            .unwrap_or_default();

        let cached = with_timeout(name, limit, self.debrid.check_cache(info_hash, keys)).await?;
        if cached {
            info!("Tier 2 cache hit on {name} for {info_hash}");
        } else {
            info!("Tier 2 cache miss on {name} for {info_hash}, requesting download");
        }

        let resolution =
            with_timeout(name, limit, self.debrid.resolve(info_hash, hint, keys)).await?;
        Ok(match resolution {
            DebridResolution::Ready { url, expiry } => Resolution::Ready(ResolvedStream {
                url,
                source_tier: SourceTier::Debrid,
                info_hash: *info_hash,
                expiry,
            }),
            DebridResolution::Pending { detail } => {
                info!("Tier 2 resolution pending on {name} for {info_hash}: {detail}");
                Resolution::Pending(PendingResolution {
                    info_hash: *info_hash,
                    provider: name.to_string(),
                    detail,
                })
            }
        })
    }

    fn debrid_attempt(&self, outcome: TierOutcome) -> TierAttempt {
        TierAttempt {
            tier: SourceTier::Debrid,
            provider: self.debrid.name().to_string(),
            outcome,
        }
    }
}

/// Instant candidates without a direct URL are handed out as magnet links.
fn instant_stream(candidate: &CandidateResult) -> ResolvedStream {
    let url = candidate
        .stream_url
        .clone()
        .unwrap_or_else(|| candidate.info_hash.magnet_uri(candidate.filename()));
    ResolvedStream {
        url,
        source_tier: SourceTier::Instant,
        info_hash: candidate.info_hash,
        expiry: None,
    }
}
