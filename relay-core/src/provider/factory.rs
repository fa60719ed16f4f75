//! Provider factory for dynamic provider creation.
//!
//! Creates the appropriate LLM provider based on configuration settings,
//! handling API key resolution from environment variables and config files.

use crate::config::Config;
use crate::provider::{LlmProvider, OpenAiCompatProvider, ProviderError};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Create an LLM provider based on configuration.
///
/// Both supported providers speak the OpenAI-compatible streaming API.
/// `base_url` in the config overrides the provider's default API root.
///
/// # Environment Variables
///
/// - `OPENAI_API_KEY` for "openai" provider
/// - `DEEPSEEK_API_KEY` for "deepseek" provider
///
/// # Errors
///
/// - [`ProviderError::MissingApiKey`] if no API key is found
/// - [`ProviderError::UnknownProvider`] if provider name is not recognized
///
/// # Examples
///
/// ```no_run
/// use relay_core::config::Config;
/// use relay_core::provider::create_provider;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load()?;
/// let provider = create_provider(&config)?;
/// # Ok(())
/// # }
/// ```
pub fn create_provider(config: &Config) -> Result<Box<dyn LlmProvider>, ProviderError> {
    let provider = build_provider(config, |name| std::env::var(name).ok())?;
    Ok(Box::new(provider))
}

fn build_provider(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<OpenAiCompatProvider, ProviderError> {
    let (env_var, default_base) = match config.provider.as_str() {
        "openai" => ("OPENAI_API_KEY", OPENAI_BASE_URL),
        "deepseek" => ("DEEPSEEK_API_KEY", DEEPSEEK_BASE_URL),
        unknown => return Err(ProviderError::UnknownProvider(unknown.to_string())),
    };

    let api_key = resolve_api_key(config, env_var, env)?;
    let base_url = config.base_url.as_deref().unwrap_or(default_base);
    let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        endpoint,
        "provider created"
    );

    Ok(OpenAiCompatProvider::new(
        &config.provider,
        endpoint,
        api_key,
        &config.model,
        config.max_tokens,
    ))
}

/// Retrieve API key from environment variable or config file.
///
/// Priority: environment variable > config.api_key
fn resolve_api_key(
    config: &Config,
    env_var: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, ProviderError> {
    if let Some(key) = env(env_var).filter(|key| !key.is_empty()) {
        return Ok(key);
    }

    config
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ProviderError::MissingApiKey(format!(
                "Set {} environment variable or add api_key to config.toml",
                env_var
            ))
        })
}
