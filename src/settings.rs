use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_TOP_P: f32 = 1.0;
const DEFAULT_FREQUENCY_PENALTY: f32 = 0.0;
const DEFAULT_PRESENCE_PENALTY: f32 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Settings {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
        }
    }
}

pub fn resolve_model(requested: Option<&str>, available: &[String]) -> String {
    let requested = requested.unwrap_or(DEFAULT_MODEL);
    if available.iter().any(|id| id == requested) {
        debug!(model = %requested, "requested model is available");
        return requested.to_string();
    }

    warn!(
        requested = %requested,
        fallback = DEFAULT_MODEL,
        "model not offered by provider, using default model"
    );
    DEFAULT_MODEL.to_string()
}
