use anyhow::{Result, anyhow};
use futures::Stream;
use reqwest::Client;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::Config;
use crate::providers;
use crate::settings::Settings;

const SUPPORTED_PROVIDERS: &str = "openai";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: Option<String>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn delta(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

fn unsupported_provider(provider: &str) -> anyhow::Error {
    warn!(provider = %provider, "unsupported model provider configured");
    anyhow!(
        "Unsupported MODEL_PROVIDER='{}'. Supported providers: {}.",
        provider,
        SUPPORTED_PROVIDERS
    )
}

pub fn check_provider(cfg: &Config) -> Result<()> {
    match cfg.model_provider.to_ascii_lowercase().as_str() {
        "openai" => {
            if cfg.api_key.is_none() {
                return Err(anyhow!(
                    "OPENAI_API_KEY is not set. Export it or add it to a .env file."
                ));
            }
            Ok(())
        }
        other => Err(unsupported_provider(other)),
    }
}

pub async fn list_models(client: &Client, cfg: &Config) -> Result<Vec<String>> {
    match cfg.model_provider.to_ascii_lowercase().as_str() {
        "openai" => {
            debug!(provider = "openai", "dispatching model list request");
            providers::openai::list_models(client, cfg).await
        }
        other => Err(unsupported_provider(other)),
    }
}

pub async fn stream_chat(
    client: &Client,
    cfg: &Config,
    request: &ChatRequest,
) -> Result<FragmentStream> {
    match cfg.model_provider.to_ascii_lowercase().as_str() {
        "openai" => {
            debug!(
                provider = "openai",
                model = %request.settings.model,
                message_count = request.messages.len(),
                "dispatching streaming chat request"
            );
            providers::openai::stream_chat(client, cfg, request).await
        }
        other => Err(unsupported_provider(other)),
    }
}
