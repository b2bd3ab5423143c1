//! Tier fallback scenarios across the resolver and the tool server state.

use std::sync::Arc;
use std::time::Duration;

use omega_core::config::ResolverConfig;
use omega_core::credentials::ApiKeys;
use omega_core::media::{CandidateResult, InfoHash, SearchQuery, SourceTier};
use omega_core::providers::mock::{ScriptedDebrid, ScriptedInstantCache};
use omega_core::resolver::{ResolveRequest, TierOutcome};
use omega_core::{FailureReason, TierResolver};

const EXPANSE_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

fn expanse_request() -> ResolveRequest {
    let hash: InfoHash = EXPANSE_HASH.parse().unwrap();
    ResolveRequest::for_query(SearchQuery::show("The Expanse").with_episode(1, 1)).with_hash(hash)
}

fn torbox_keys() -> ApiKeys {
    ApiKeys {
        torbox: Some("torbox-key".to_string()),
        ..ApiKeys::default()
    }
}

fn resolver(
    instant: &Arc<ScriptedInstantCache>,
    debrid: &Arc<ScriptedDebrid>,
    timeout: Duration,
) -> TierResolver {
    TierResolver::new(
        instant.clone(),
        debrid.clone(),
        ResolverConfig {
            provider_timeout: timeout,
        },
    )
}

#[tokio::test]
async fn test_expanse_falls_through_to_debrid_cache_hit() {
    let instant = Arc::new(ScriptedInstantCache::miss());
    let debrid = Arc::new(ScriptedDebrid::cached("https://cdn.torbox.test/expanse-s01e01.mkv"));

    let resolution = resolver(&instant, &debrid, Duration::from_millis(200))
        .resolve(&expanse_request(), &torbox_keys())
        .await
        .unwrap();

    let stream = resolution.stream().unwrap();
    assert_eq!(stream.source_tier, SourceTier::Debrid);
    assert_eq!(stream.url, "https://cdn.torbox.test/expanse-s01e01.mkv");
    assert_eq!(debrid.check_calls().len(), 1);
    let resolve_calls = debrid.resolve_calls();
    assert_eq!(resolve_calls.len(), 1);
    assert_eq!(resolve_calls[0].1.pair(), Some((1, 1)));
}

#[tokio::test]
async fn test_slow_instant_cache_counts_as_unavailable() {
    let instant = Arc::new(
        ScriptedInstantCache::hit(vec![
            CandidateResult::new(EXPANSE_HASH.parse().unwrap(), SourceTier::Instant, 10)
                .cached(true),
        ])
        .with_delay(Duration::from_millis(500)),
    );
    let debrid = Arc::new(ScriptedDebrid::cached("https://cdn.torbox.test/late.mkv"));

    let resolution = resolver(&instant, &debrid, Duration::from_millis(50))
        .resolve(&expanse_request(), &torbox_keys())
        .await
        .unwrap();

    assert_eq!(resolution.stream().unwrap().source_tier, SourceTier::Debrid);
}

#[tokio::test]
async fn test_both_tiers_unavailable() {
    let instant = Arc::new(ScriptedInstantCache::failing());
    let debrid = Arc::new(ScriptedDebrid::failing());

    let failure = resolver(&instant, &debrid, Duration::from_millis(200))
        .resolve(&expanse_request(), &torbox_keys())
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::AllProvidersUnavailable);
    assert_eq!(failure.attempts.len(), 2);
    assert!(
        failure
            .attempts
            .iter()
            .all(|attempt| matches!(attempt.outcome, TierOutcome::Unavailable { .. }))
    );
}

#[test]
fn test_uncached_debrid_is_pending_not_failure() {
    let instant = Arc::new(ScriptedInstantCache::miss());
    let debrid = Arc::new(ScriptedDebrid::uncached());
    let resolver = resolver(&instant, &debrid, Duration::from_millis(200));

    let resolution =
        tokio_test::block_on(resolver.resolve(&expanse_request(), &torbox_keys())).unwrap();

    assert!(resolution.is_pending());
    assert_eq!(debrid.total_calls(), 2);
}
