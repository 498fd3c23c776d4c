use anyhow::Result;

use crate::config::Config;
use crate::dispatch::dispatch_action;
use crate::model_gateway::ModelGateway;
use crate::prompt::PromptTemplates;
use crate::relay::relay_message;
use crate::session::{SessionContext, start_session};
use crate::ui::{ChatUi, SealedMessage};
use crate::vibes::VibeMenu;

pub struct ChatApp<G> {
    gateway: G,
    templates: PromptTemplates,
    menu: VibeMenu,
    requested_model: Option<String>,
}

impl<G: ModelGateway> ChatApp<G> {
    pub fn new(gateway: G, requested_model: Option<String>) -> Self {
        Self {
            gateway,
            templates: PromptTemplates::default(),
            menu: VibeMenu::builtin(),
            requested_model,
        }
    }

    pub fn from_config(gateway: G, cfg: &Config) -> Self {
        let templates = match &cfg.system_prompt {
            Some(system) => PromptTemplates::with_system(system.clone()),
            None => PromptTemplates::default(),
        };
        Self {
            templates,
            ..Self::new(gateway, cfg.requested_model.clone())
        }
    }

    pub async fn on_chat_start<U: ChatUi>(&self, ui: &U) -> Result<SessionContext> {
        start_session(
            &self.gateway,
            self.requested_model.as_deref(),
            &self.menu,
            ui,
        )
        .await
    }

    pub async fn on_message<U: ChatUi>(
        &self,
        session: &SessionContext,
        text: &str,
        ui: &U,
    ) -> Result<SealedMessage> {
        relay_message(&self.gateway, session, &self.templates, text, ui).await
    }

    pub async fn on_action<U: ChatUi>(
        &self,
        session: &SessionContext,
        key: &str,
        ui: &U,
    ) -> Result<SealedMessage> {
        dispatch_action(&self.gateway, session, &self.templates, &self.menu, key, ui).await
    }
}
