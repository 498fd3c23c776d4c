use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::model::ChatRequest;
use crate::vibes::UiAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Assistant,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Message {
        id: Uuid,
        author: Author,
        content: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        actions: Vec<UiAction>,
        created_at: String,
    },
    Begin {
        id: Uuid,
        author: Author,
    },
    Token {
        id: Uuid,
        token: String,
    },
    Seal {
        id: Uuid,
        content: String,
    },
    Error {
        text: String,
    },
}

pub trait ChatUi: Send + Sync {
    fn emit(&self, event: UiEvent) -> Result<()>;

    fn send_message(
        &self,
        author: Author,
        content: impl Into<String>,
        actions: Vec<UiAction>,
    ) -> Result<Uuid>
    where
        Self: Sized,
    {
        let id = Uuid::new_v4();
        self.emit(UiEvent::Message {
            id,
            author,
            content: content.into(),
            actions,
            created_at: timestamp(),
        })?;
        Ok(id)
    }
}

impl ChatUi for UnboundedSender<UiEvent> {
    fn emit(&self, event: UiEvent) -> Result<()> {
        self.send(event)
            .map_err(|_| anyhow!("chat client disconnected"))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug)]
pub struct OutgoingMessage {
    id: Uuid,
    author: Author,
    content: String,
}

impl OutgoingMessage {
    pub fn begin(ui: &impl ChatUi, author: Author) -> Result<Self> {
        let id = Uuid::new_v4();
        ui.emit(UiEvent::Begin { id, author })?;
        Ok(Self {
            id,
            author,
            content: String::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn stream_token(&mut self, ui: &impl ChatUi, token: &str) -> Result<()> {
        self.content.push_str(token);
        ui.emit(UiEvent::Token {
            id: self.id,
            token: token.to_string(),
        })
    }

    pub fn seal(self, ui: &impl ChatUi) -> Result<SealedMessage> {
        ui.emit(UiEvent::Seal {
            id: self.id,
            content: self.content.clone(),
        })?;
        Ok(SealedMessage {
            id: self.id,
            author: self.author,
            content: self.content,
            request: None,
        })
    }
}

// `request` is the formatted prompt and settings that produced a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedMessage {
    pub id: Uuid,
    pub author: Author,
    pub content: String,
    pub request: Option<ChatRequest>,
}

impl SealedMessage {
    pub fn with_request(self, request: ChatRequest) -> Self {
        Self {
            request: Some(request),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::{Author, ChatUi, OutgoingMessage, UiEvent};
    use crate::model::ChatRequest;
use crate::vibes::UiAction;

    #[test]
    fn events_serialize_with_type_tag() {
        let id = Uuid::nil();
        let token = serde_json::to_value(UiEvent::Token {
            id,
            token: "Hel".to_string(),
        })
        .expect("token event should serialize");
        assert_eq!(
            token,
            json!({"type": "token", "id": id.to_string(), "token": "Hel"})
        );

        let begin = serde_json::to_value(UiEvent::Begin {
            id,
            author: Author::Assistant,
        })
        .expect("begin event should serialize");
        assert_eq!(begin["type"], "begin");
        assert_eq!(begin["author"], "assistant");
    }

    #[test]
    fn message_event_omits_empty_actions() {
        let plain = serde_json::to_value(UiEvent::Message {
            id: Uuid::nil(),
            author: Author::User,
            content: "hi".to_string(),
            actions: Vec::new(),
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
        })
        .expect("message should serialize");
        assert_eq!(plain.get("actions"), None);
        assert_eq!(plain["author"], "user");

        let menu = serde_json::to_value(UiEvent::Message {
            id: Uuid::nil(),
            author: Author::Assistant,
            content: "pick one".to_string(),
            actions: vec![UiAction {
                name: "intro".to_string(),
                label: "intro".to_string(),
                value: "Please introduce yourself".to_string(),
            }],
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
        })
        .expect("message should serialize");
        assert_eq!(menu["actions"][0]["name"], "intro");
        assert_eq!(menu["actions"][0]["value"], Value::from("Please introduce yourself"));
    }

    #[test]
    fn outgoing_message_accumulates_and_seals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut message = OutgoingMessage::begin(&tx, Author::Assistant).expect("begin should emit");
        message.stream_token(&tx, "Hel").expect("token should emit");
        message.stream_token(&tx, "lo").expect("token should emit");
        let id = message.id();
        let sealed = message.seal(&tx).expect("seal should emit");

        assert_eq!(sealed.id, id);
        assert_eq!(sealed.content, "Hello");
        assert_eq!(sealed.request, None);
        assert_eq!(
            rx.try_recv().expect("begin event"),
            UiEvent::Begin {
                id,
                author: Author::Assistant
            }
        );
        assert!(matches!(rx.try_recv(), Ok(UiEvent::Token { token, .. }) if token == "Hel"));
        assert!(matches!(rx.try_recv(), Ok(UiEvent::Token { token, .. }) if token == "lo"));
        assert!(matches!(rx.try_recv(), Ok(UiEvent::Seal { content, .. }) if content == "Hello"));
    }

    #[test]
    fn channel_ui_reports_disconnected_client() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let err = tx
            .send_message(Author::Assistant, "hello", Vec::new())
            .expect_err("closed channel should fail");
        assert!(format!("{err:#}").contains("disconnected"));
    }
}
