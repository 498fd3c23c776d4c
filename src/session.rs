use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::model_gateway::ModelGateway;
use crate::settings::{Settings, resolve_model};
use crate::ui::{Author, ChatUi};
use crate::vibes::VibeMenu;

pub const MENU_GREETING: &str = "Care for some vibe checks?";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    id: Uuid,
    settings: Settings,
}

impl SessionContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

fn model_notice(model: &str, available: &[String]) -> String {
    format!(
        "Running on {model}.\nTo change set `BEYOND_MODEL` env variable to one of\n{}",
        available.join(", ")
    )
}

/// Resolves the session's model, then greets the user with the model notice and the vibe-check menu.
///
/// A failing model listing aborts the session before anything is shown.
pub async fn start_session<G, U>(
    gateway: &G,
    requested_model: Option<&str>,
    menu: &VibeMenu,
    ui: &U,
) -> Result<SessionContext>
where
    G: ModelGateway + ?Sized,
    U: ChatUi,
{
    let available = gateway
        .list_models()
        .await
        .context("Failed to list models for new session")?;
    debug!(models = ?available, "fetched available models");

    let model = resolve_model(requested_model, &available);
    let session = SessionContext::new(Settings::for_model(model));
    info!(
        session_id = %session.id(),
        model = %session.settings().model,
        "session started"
    );

    ui.send_message(
        Author::Assistant,
        model_notice(&session.settings().model, &available),
        Vec::new(),
    )?;
    ui.send_message(Author::Assistant, MENU_GREETING, menu.actions())?;
    Ok(session)
}
