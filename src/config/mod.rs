use std::env;
use std::time::Duration;

use crate::cli::ServeArgs;
use crate::error::RelayError;
use crate::llm::LlmConfig;

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Where the upstream credential comes from. Resolved on every request, so a
/// missing key fails that request instead of the whole process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    Env(String),
    Fixed(Option<String>),
}

impl ApiKeySource {
    pub fn resolve(&self) -> Result<String, RelayError> {
        let key = match self {
            ApiKeySource::Env(name) => env::var(name).ok(),
            ApiKeySource::Fixed(key) => key.clone(),
        };
        key.map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RelayError::Configuration(match self {
                ApiKeySource::Env(name) => format!("{} is not set", name),
                ApiKeySource::Fixed(_) => "no upstream API key configured".to_string(),
            }))
    }
}

impl Default for ApiKeySource {
    fn default() -> Self {
        ApiKeySource::Env(DEFAULT_API_KEY_ENV.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub llm: LlmConfig,
    pub api_key: ApiKeySource,
}

impl RelayConfig {
    pub fn from_args(args: &ServeArgs) -> Self {
        Self {
            llm: LlmConfig {
                endpoint: args.upstream_url.clone(),
                model: args.upstream_model.clone(),
                request_timeout: Duration::from_secs(args.upstream_timeout_secs),
                idle_timeout: Duration::from_secs(args.upstream_idle_timeout_secs),
            },
            api_key: ApiKeySource::Env(args.api_key_env.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_key_is_trimmed() {
        let source = ApiKeySource::Fixed(Some("  sk-test \n".to_string()));
        assert_eq!(source.resolve().unwrap(), "sk-test");
    }

    #[test]
    fn empty_or_missing_key_is_a_configuration_error() {
        for source in [ApiKeySource::Fixed(None), ApiKeySource::Fixed(Some("   ".to_string()))] {
            assert!(matches!(source.resolve(), Err(RelayError::Configuration(_))));
        }
    }

    #[test]
    fn unset_env_var_names_the_variable() {
        let source = ApiKeySource::Env("ASTRA_RELAY_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        match source.resolve() {
            Err(RelayError::Configuration(msg)) => {
                assert_eq!(msg, "ASTRA_RELAY_TEST_KEY_THAT_IS_NEVER_SET is not set");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
