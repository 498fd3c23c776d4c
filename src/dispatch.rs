use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::model_gateway::ModelGateway;
use crate::prompt::PromptTemplates;
use crate::relay::relay_message;
use crate::session::SessionContext;
use crate::ui::{Author, ChatUi, SealedMessage};
use crate::vibes::VibeMenu;

pub async fn dispatch_action<G, U>(
    gateway: &G,
    session: &SessionContext,
    templates: &PromptTemplates,
    menu: &VibeMenu,
    key: &str,
    ui: &U,
) -> Result<SealedMessage>
where
    G: ModelGateway + ?Sized,
    U: ChatUi,
{
    let Some(entry) = menu.get(key) else {
        warn!(session_id = %session.id(), action = %key, "unknown vibe check requested");
        return Err(anyhow!("Unknown vibe check '{}'", key));
    };
    info!(session_id = %session.id(), action = %entry.key, "vibe check triggered");

    ui.send_message(Author::User, entry.prompt, Vec::new())?;
    relay_message(gateway, session, templates, entry.prompt, ui).await
}
