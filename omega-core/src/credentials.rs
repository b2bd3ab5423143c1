//! Per-call provider credentials.
//!
//! Callers pass their own keys with every request. Keys configured on the
//! server only fill the gaps and are never mutated after startup.

use serde::{Deserialize, Serialize};

/// Credentials threaded into every provider call.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "real_debrid")]
    pub realdebrid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    /// Trakt OAuth access token of the user the request is made for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<String>,
}

impl ApiKeys {
    /// Reads server-side defaults from the environment.
    pub fn from_env() -> Self {
        Self {
            torbox: env_key("TORBOX_API_KEY"),
            realdebrid: env_key("REALDEBRID_API_KEY"),
            tmdb: env_key("TMDB_API_KEY"),
            gemini: env_key("GEMINI_API_KEY"),
            trakt: None,
        }
    }

    /// Returns these keys with empty slots filled from `defaults`.
    ///
    /// The user token is never inherited: history always belongs to the caller.
    pub fn merged_with(&self, defaults: &ApiKeys) -> ApiKeys {
        fn pick(own: &Option<String>, fallback: &Option<String>) -> Option<String> {
            own.clone()
                .filter(|key| !key.trim().is_empty())
                .or_else(|| fallback.clone())
        }

        ApiKeys {
            torbox: pick(&self.torbox, &defaults.torbox),
            realdebrid: pick(&self.realdebrid, &defaults.realdebrid),
            tmdb: pick(&self.tmdb, &defaults.tmdb),
            gemini: pick(&self.gemini, &defaults.gemini),
            trakt: self.trakt.clone().filter(|token| !token.trim().is_empty()),
        }
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(key: &Option<String>) -> &'static str {
            if key.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("ApiKeys")
            .field("torbox", &mask(&self.torbox))
            .field("realdebrid", &mask(&self.realdebrid))
            .field("tmdb", &mask(&self.tmdb))
            .field("gemini", &mask(&self.gemini))
            .field("trakt", &mask(&self.trakt))
            .finish()
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
