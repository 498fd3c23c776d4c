use std::env;
use std::fmt;

const DEFAULT_MODEL_PROVIDER: &str = "openai";
const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct Config {
    pub model_provider: String,
    pub requested_model: Option<String>,
    pub api_key: Option<String>,
    pub model_base_url: String,
    pub model_timeout_secs: u64,
    pub system_prompt: Option<String>,
    pub bind_address: String,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model_provider", &self.model_provider)
            .field("requested_model", &self.requested_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_base_url", &self.model_base_url)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("system_prompt", &self.system_prompt)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub(crate) fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            model_provider: get_var("MODEL_PROVIDER")
                .unwrap_or_else(|| DEFAULT_MODEL_PROVIDER.to_string()),
            requested_model: parse_non_empty(get_var("BEYOND_MODEL").as_deref()),
            api_key: parse_non_empty(get_var("OPENAI_API_KEY").as_deref()),
            model_base_url: parse_non_empty(get_var("OPENAI_BASE_URL").as_deref())
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            model_timeout_secs: parse_model_timeout_secs(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
            ),
            system_prompt: parse_verbatim(get_var("SYSTEM_PROMPT")),
            bind_address: parse_non_empty(get_var("BIND_ADDRESS").as_deref())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: parse_port(get_var("PORT").as_deref()),
        }
    }
}

fn parse_non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// Prompt text keeps its surrounding whitespace; only blank values count as unset.
fn parse_verbatim(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_MODEL_TIMEOUT_SECS)
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_PORT)
}
