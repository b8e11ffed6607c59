// Endpoint configuration. The defaults point at github.com; the two
// environment variables exist for GitHub Enterprise style deployments.

/// Where the API and raw-content hosts live, plus the user agent the
/// provider insists on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub api_base: String,
    pub raw_base: String,
    pub user_agent: String,
}

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            api_base: DEFAULT_API_BASE.into(),
            raw_base: DEFAULT_RAW_BASE.into(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl ApiConfig {
    /// Build a config from `GITHUB_API_URL` and `GITHUB_RAW_URL`, falling
    /// back to the public github.com hosts.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ApiConfig::default();
        let pick = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(fallback)
        };
        ApiConfig {
            api_base: pick("GITHUB_API_URL", defaults.api_base),
            raw_base: pick("GITHUB_RAW_URL", defaults.raw_base),
            user_agent: defaults.user_agent,
        }
    }
}
