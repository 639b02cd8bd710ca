//! Process configuration.
//!
//! Upstream credentials come from the environment, one key per provider.
//! Base URLs are overridable (primarily for tests pointing at mock
//! servers) and default to each provider's public endpoint.

use std::env;

use crate::providers::Provider;

#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into(),
        }
    }

    fn from_env(provider: Provider) -> Self {
        let base_override = format!(
            "KEYGATE_{}_BASE_URL",
            provider.name().to_ascii_uppercase()
        );
        let base_url = env::var(&base_override)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| provider.default_base_url().to_string());
        Self::new(env::var(provider.api_key_env()).ok(), base_url)
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Token guarding the license-issuance endpoint; the endpoint is not
    /// mounted at all when this is unset.
    pub admin_token: Option<String>,
    pub openai: ProviderSettings,
    pub groq: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub google: ProviderSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            admin_token: env::var("KEYGATE_ADMIN_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            openai: ProviderSettings::from_env(Provider::OpenAi),
            groq: ProviderSettings::from_env(Provider::Groq),
            anthropic: ProviderSettings::from_env(Provider::Anthropic),
            google: ProviderSettings::from_env(Provider::Google),
        }
    }

    /// Configuration with no credentials and default endpoints; tests fill
    /// in what they need.
    pub fn empty() -> Self {
        Self {
            admin_token: None,
            openai: ProviderSettings::new(None, Provider::OpenAi.default_base_url()),
            groq: ProviderSettings::new(None, Provider::Groq.default_base_url()),
            anthropic: ProviderSettings::new(None, Provider::Anthropic.default_base_url()),
            google: ProviderSettings::new(None, Provider::Google.default_base_url()),
        }
    }

    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Groq => &self.groq,
            Provider::Anthropic => &self.anthropic,
            Provider::Google => &self.google,
        }
    }
}
