//! Centralized configuration for VOID Omega.
//!
//! Everything is read once at startup and shared read-only afterwards.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::ApiKeys;

/// Central configuration for all VOID Omega components.
///
/// Groups related settings into sections. Supports environment variable
/// overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct OmegaConfig {
    pub server: ServerConfig,
    pub providers: ProviderConfig,
    pub resolver: ResolverConfig,
    pub assistant: AssistantConfig,
    /// Keys used when a request does not bring its own.
    pub default_keys: ApiKeys,
}

/// Listening address of the tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
        }
    }
}

/// Debrid service backing Tier 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebridChoice {
    #[default]
    TorBox,
    RealDebrid,
}

impl DebridChoice {
    pub fn display_name(self) -> &'static str {
        match self {
            DebridChoice::TorBox => "TorBox",
            DebridChoice::RealDebrid => "Real-Debrid",
        }
    }

    /// The service's key from `keys`, if supplied.
    pub fn api_key(self, keys: &ApiKeys) -> Option<&String> {
        match self {
            DebridChoice::TorBox => keys.torbox.as_ref(),
            DebridChoice::RealDebrid => keys.realdebrid.as_ref(),
        }
    }
}

impl FromStr for DebridChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "torbox" => Ok(DebridChoice::TorBox),
            "realdebrid" | "real-debrid" | "rd" => Ok(DebridChoice::RealDebrid),
            other => Err(format!("Invalid debrid service: {other}")),
        }
    }
}

/// Upstream endpoints and the debrid choice.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub zilean_url: String,
    pub torbox_url: String,
    pub realdebrid_url: String,
    pub tmdb_url: String,
    pub trakt_url: String,
    /// Trakt application id sent with every history request
    pub trakt_client_id: Option<String>,
    pub gemini_url: String,
    pub gemini_model: String,
    pub debrid: DebridChoice,
    /// User agent for outbound HTTP requests
    pub user_agent: &'static str,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            zilean_url: "https://zileanfortheweebs.midnightignite.me".to_string(),
            torbox_url: "https://api.torbox.app/v1".to_string(),
            realdebrid_url: "https://api.real-debrid.com/rest/1.0".to_string(),
            tmdb_url: "https://api.themoviedb.org/3".to_string(),
            trakt_url: "https://api.trakt.tv".to_string(),
            trakt_client_id: None,
            gemini_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            debrid: DebridChoice::default(),
            user_agent: "void-omega/0.1.0",
        }
    }
}

/// Tiered resolution settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Upper bound for every individual provider call
    pub provider_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(15),
        }
    }
}

/// Conversation loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    /// Tool calls allowed per assistant turn
    pub tool_budget: usize,
    /// Scheme of deep links the assistant may emit
    pub deep_link_scheme: String,
    /// Upper bound for one model completion
    pub model_timeout: Duration,
    /// Upper bound for one tool execution
    pub tool_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            tool_budget: 4,
            deep_link_scheme: "void".to_string(),
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(15),
        }
    }
}

impl OmegaConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(host) = env_parse::<IpAddr>("OMEGA_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("OMEGA_PORT") {
            config.server.port = port;
        }

        let providers = &mut config.providers;
        override_string(&mut providers.zilean_url, "ZILEAN_API_URL");
        override_string(&mut providers.torbox_url, "TORBOX_API_URL");
        override_string(&mut providers.realdebrid_url, "REALDEBRID_API_URL");
        override_string(&mut providers.tmdb_url, "TMDB_API_URL");
        override_string(&mut providers.trakt_url, "TRAKT_API_URL");
        override_string(&mut providers.gemini_url, "GEMINI_API_URL");
        override_string(&mut providers.gemini_model, "GEMINI_MODEL");
        if let Some(client_id) = env_string("TRAKT_CLIENT_ID") {
            providers.trakt_client_id = Some(client_id);
        }
        if let Some(debrid) = env_parse::<DebridChoice>("OMEGA_DEBRID") {
            providers.debrid = debrid;
        }

        if let Some(seconds) = env_parse::<u64>("OMEGA_PROVIDER_TIMEOUT_SECS") {
            config.resolver.provider_timeout = Duration::from_secs(seconds);
            config.assistant.tool_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_parse::<u64>("OMEGA_MODEL_TIMEOUT_SECS") {
            config.assistant.model_timeout = Duration::from_secs(seconds);
        }
        if let Some(budget) = env_parse::<usize>("OMEGA_TOOL_BUDGET") {
            config.assistant.tool_budget = budget;
        }
        override_string(
            &mut config.assistant.deep_link_scheme,
            "OMEGA_DEEP_LINK_SCHEME",
        );

        config.default_keys = ApiKeys::from_env();
        config
    }

    /// Loads a `.env` file if present, then reads the environment.
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {e}"),
        }
        Self::from_env()
    }

    /// Configuration with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            resolver: ResolverConfig {
                provider_timeout: Duration::from_millis(200),
            },
            assistant: AssistantConfig {
                model_timeout: Duration::from_millis(500),
                tool_timeout: Duration::from_millis(200),
                ..AssistantConfig::default()
            },
            ..Self::default()
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name)?.parse().ok()
}

fn override_string(target: &mut String, name: &str) {
    if let Some(value) = env_string(name) {
        *target = value.trim_end_matches('/').to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = OmegaConfig::default();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.assistant.tool_budget, 4);
        assert_eq!(config.assistant.deep_link_scheme, "void");
        assert_eq!(config.resolver.provider_timeout, Duration::from_secs(15));
        assert_eq!(config.providers.debrid, DebridChoice::TorBox);
        assert_eq!(config.default_keys, ApiKeys::default());
    }

    #[test]
    fn test_debrid_choice_parsing() {
        assert_eq!("RealDebrid".parse::<DebridChoice>(), Ok(DebridChoice::RealDebrid));
        assert_eq!("torbox".parse::<DebridChoice>(), Ok(DebridChoice::TorBox));
        assert!("premiumize".parse::<DebridChoice>().is_err());
    }

    #[test]
    fn test_debrid_choice_picks_its_key() {
        let keys = ApiKeys {
            realdebrid: Some("rd-key".to_string()),
            ..ApiKeys::default()
        };
        assert_eq!(DebridChoice::TorBox.api_key(&keys), None);
        assert_eq!(
            DebridChoice::RealDebrid.api_key(&keys).map(String::as_str),
            Some("rd-key")
        );
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("OMEGA_PORT", "9100");
            std::env::set_var("OMEGA_TOOL_BUDGET", "6");
            std::env::set_var("OMEGA_DEEP_LINK_SCHEME", "omega");
            std::env::set_var("OMEGA_DEBRID", "realdebrid");
            std::env::set_var("TMDB_API_URL", "http://localhost:9000/3/");
            std::env::set_var("OMEGA_PROVIDER_TIMEOUT_SECS", "not-a-number");
        }

        let config = OmegaConfig::from_env();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.assistant.tool_budget, 6);
        assert_eq!(config.assistant.deep_link_scheme, "omega");
        assert_eq!(config.providers.debrid, DebridChoice::RealDebrid);
        assert_eq!(config.providers.tmdb_url, "http://localhost:9000/3");
        assert_eq!(config.resolver.provider_timeout, Duration::from_secs(15));

        unsafe {
            std::env::remove_var("OMEGA_PORT");
            std::env::remove_var("OMEGA_TOOL_BUDGET");
            std::env::remove_var("OMEGA_DEEP_LINK_SCHEME");
            std::env::remove_var("OMEGA_DEBRID");
            std::env::remove_var("TMDB_API_URL");
            std::env::remove_var("OMEGA_PROVIDER_TIMEOUT_SECS");
        }
    }
}
