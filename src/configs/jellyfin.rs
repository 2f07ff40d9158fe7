use serde::{Deserialize, Serialize};

/// Upper bound Jellyfin search results are clamped to.
pub const MAX_SEARCH_LIMIT: usize = 25;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JellyfinConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl JellyfinConfig {
    /// Search limit clamped to `1..=25`.
    pub fn effective_search_limit(&self) -> usize {
        self.search_limit.clamp(1, MAX_SEARCH_LIMIT)
    }
}

impl Default for JellyfinConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            search_limit: default_search_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:8096".to_string()
}

fn default_search_limit() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    15
}
