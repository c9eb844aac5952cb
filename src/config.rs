use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the API server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Minutes between full feed sweeps
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_minutes: u64,
    /// Seconds between content extraction passes
    #[serde(default = "default_extract_interval")]
    pub extract_interval_seconds: u64,
    /// How many content-less articles one extraction pass may process
    #[serde(default = "default_extract_batch")]
    pub extract_batch_size: i64,
    /// Timeout for outbound feed/article requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    pub feeds: Vec<FeedConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_fetch_interval() -> u64 {
    60
}

fn default_extract_interval() -> u64 {
    60
}

fn default_extract_batch() -> i64 {
    20
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    pub category: NewsCategory,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// The closed set of categories feeds are filed under. Stored in the
/// database as the display string, so renaming a variant is a data change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum NewsCategory {
    #[serde(rename = "Tech")]
    Tech,
    #[serde(rename = "Global News")]
    GlobalNews,
    #[serde(rename = "Vietnamese News")]
    VietnameseNews,
    #[serde(rename = "US News")]
    UsNews,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 4] = [
        NewsCategory::Tech,
        NewsCategory::GlobalNews,
        NewsCategory::VietnameseNews,
        NewsCategory::UsNews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::Tech => "Tech",
            NewsCategory::GlobalNews => "Global News",
            NewsCategory::VietnameseNews => "Vietnamese News",
            NewsCategory::UsNews => "US News",
        }
    }

    /// Look up a category by its display name.
    pub fn parse(s: &str) -> Option<NewsCategory> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    #[cfg(test)]
    fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
