use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::model::ChatRequest;
use crate::model_gateway::ModelGateway;
use crate::prompt::PromptTemplates;
use crate::session::SessionContext;
use crate::ui::{Author, ChatUi, OutgoingMessage, SealedMessage};

/// Streams one completion for `input` into a fresh assistant message.
///
/// Text fragments are pushed to the UI in arrival order; fragments without
/// text are skipped. When the stream fails part-way, the message is sealed
/// with what arrived so far and the error is returned.
pub async fn relay_message<G, U>(
    gateway: &G,
    session: &SessionContext,
    templates: &PromptTemplates,
    input: &str,
    ui: &U,
) -> Result<SealedMessage>
where
    G: ModelGateway + ?Sized,
    U: ChatUi,
{
    let prompt = templates.format(input);
    debug!(
        session_id = %session.id(),
        input_len = input.len(),
        user_message_len = prompt.user.content.len(),
        "formatted prompt"
    );

    let request = ChatRequest {
        messages: prompt.messages(),
        settings: session.settings().clone(),
    };
    let mut fragments = gateway
        .stream_chat(request.clone())
        .await
        .context("Failed to start chat completion")?;

    let mut message = OutgoingMessage::begin(ui, Author::Assistant)?;
    let mut skipped = 0usize;
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => match fragment.delta() {
                Some(text) => message.stream_token(ui, text)?,
                None => skipped += 1,
            },
            Err(err) => {
                let received = message.content().len();
                warn!(
                    session_id = %session.id(),
                    message_id = %message.id(),
                    received_len = received,
                    error = %err,
                    "completion stream failed, sealing partial message"
                );
                message.seal(ui)?;
                return Err(err.context(format!(
                    "Chat completion stream failed after {received} bytes"
                )));
            }
        }
    }

    let sealed = message.seal(ui)?;
    info!(
        session_id = %session.id(),
        message_id = %sealed.id,
        model = %session.settings().model,
        response_len = sealed.content.len(),
        skipped_fragments = skipped,
        "completion relayed"
    );
    Ok(sealed.with_request(request))
}
