pub mod chat;

use std::time::Duration;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Full chat-completions endpoint, not a base URL.
    pub endpoint: String,
    pub model: String,
    /// Whole-request limit for non-streaming calls.
    pub request_timeout: Duration,
    /// Longest gap tolerated between two chunks of a streaming call.
    pub idle_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UPSTREAM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(60),
        }
    }
}
