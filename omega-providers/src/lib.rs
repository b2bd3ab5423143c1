//! Omega Providers - HTTP adapters behind the `omega-core` provider traits
//!
//! Each adapter implements one capability trait. [`ProviderSet`] wires the
//! configured adapters together once at startup.

pub mod providers;
pub mod transport;

use std::sync::Arc;

use omega_core::config::{DebridChoice, OmegaConfig};
use omega_core::providers::{
    ChatModel, DebridProvider, HistoryProvider, IdentifierProvider, InstantCacheProvider,
};
use omega_core::{ProviderError, TierResolver};
use tracing::info;

pub use providers::{
    GeminiClient, RealDebridClient, TmdbClient, TorBoxClient, TraktClient, ZileanClient,
};

/// The adapters one running service talks to.
#[derive(Debug, Clone)]
pub struct ProviderSet {
    pub instant: Arc<dyn InstantCacheProvider>,
    pub debrid: Arc<dyn DebridProvider>,
    pub identifier: Arc<dyn IdentifierProvider>,
    pub history: Arc<dyn HistoryProvider>,
    pub model: Arc<dyn ChatModel>,
}

impl ProviderSet {
    /// Builds the production adapters from configuration.
    ///
    /// # Errors
    /// - `ProviderError::Unavailable` - HTTP client could not be created
    pub fn from_config(config: &OmegaConfig) -> Result<Self, ProviderError> {
        let settings = &config.providers;
        let client = transport::build_client(settings.user_agent)?;

        let debrid: Arc<dyn DebridProvider> = match settings.debrid {
            DebridChoice::TorBox => Arc::new(TorBoxClient::new(client.clone(), &settings.torbox_url)),
            DebridChoice::RealDebrid => {
                Arc::new(RealDebridClient::new(client.clone(), &settings.realdebrid_url))
            }
        };
        info!("Tier 2 debrid provider: {}", debrid.name());

        Ok(Self {
            instant: Arc::new(ZileanClient::new(client.clone(), &settings.zilean_url)),
            debrid,
            identifier: Arc::new(TmdbClient::new(client.clone(), &settings.tmdb_url)),
            history: Arc::new(TraktClient::new(
                client.clone(),
                &settings.trakt_url,
                settings.trakt_client_id.clone(),
            )),
            model: Arc::new(GeminiClient::new(
                client,
                &settings.gemini_url,
                &settings.gemini_model,
            )),
        })
    }

    /// Resolver over this set's instant cache and debrid service.
    pub fn resolver(&self, config: &OmegaConfig) -> TierResolver {
        TierResolver::new(
            self.instant.clone(),
            self.debrid.clone(),
            config.resolver.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debrid_choice_selects_adapter() {
        let mut config = OmegaConfig::default();
        assert_eq!(ProviderSet::from_config(&config).unwrap().debrid.name(), "torbox");

        config.providers.debrid = DebridChoice::RealDebrid;
        let set = ProviderSet::from_config(&config).unwrap();
        assert_eq!(set.debrid.name(), "realdebrid");
        assert_eq!(set.instant.name(), "zilean");
        assert_eq!(set.model.name(), "gemini");
    }
}
