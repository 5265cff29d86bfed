//! Process configuration. Read from the environment once at startup,
//! validated there, then injected read-only into everything that needs it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/backspace-workspace";
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_BRANCH_PREFIX: &str = "backspace";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub github_token: String,
    pub model_api_key: String,
    pub model: String,
    pub port: u16,
    pub workspace_root: PathBuf,
    pub job_timeout: Duration,
    pub github_api_url: String,
    pub model_api_url: String,
    pub branch_prefix: String,
}

impl AppConfig {
    /// Read configuration from the process environment. Refuses to start
    /// without the credentials, naming every missing variable at once.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, parameterized over the variable source so tests
    /// do not have to mutate process-wide state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // The original treats empty strings as unset; keep that behavior.
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        if get("GITHUB_TOKEN").is_none() {
            missing.push("GITHUB_TOKEN");
        }
        if get("OPENAI_API_KEY").is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        }

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got '{}'", raw))?,
            None => DEFAULT_PORT,
        };

        let timeout_ms = match get("JOB_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("JOB_TIMEOUT_MS must be milliseconds, got '{}'", raw))?,
            None => DEFAULT_JOB_TIMEOUT_MS,
        };

        Ok(Self {
            github_token: get("GITHUB_TOKEN").unwrap_or_default(),
            model_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            port,
            workspace_root: PathBuf::from(
                get("WORKSPACE_ROOT").unwrap_or_else(|| DEFAULT_WORKSPACE_ROOT.to_string()),
            ),
            job_timeout: Duration::from_millis(timeout_ms),
            github_api_url: get("GITHUB_API_URL")
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            model_api_url: get("OPENAI_API_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        })
    }
}
