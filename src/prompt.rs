use crate::model::Message;

pub const DEFAULT_SYSTEM_TEMPLATE: &str =
    "You are a helpful assistant who always speaks in a pleasant tone!\n\n";

pub const USER_TEMPLATE: &str = "Your task is to: {input}

Think through your response step by step.
If asked to be concise, ignore step by step directive and use only 1 or 2 sentences.
I'm going to tip $100 for extra careful responses.
";

const INPUT_SLOT: &str = "{input}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    system: String,
    user: &'static str,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            user: USER_TEMPLATE,
        }
    }
}

impl PromptTemplates {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            ..Self::default()
        }
    }

    pub fn format(&self, input: &str) -> Prompt {
        Prompt {
            system: Message::system(self.system.clone()),
            user: Message::user(substitute_input(self.user, input)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Message,
    pub user: Message,
}

impl Prompt {
    pub fn messages(&self) -> Vec<Message> {
        vec![self.system.clone(), self.user.clone()]
    }
}

// Fills the first slot only; the input itself is never scanned for slots.
fn substitute_input(template: &str, input: &str) -> String {
    match template.split_once(INPUT_SLOT) {
        Some((head, tail)) => {
            let mut rendered = String::with_capacity(head.len() + input.len() + tail.len());
            rendered.push_str(head);
            rendered.push_str(input);
            rendered.push_str(tail);
            rendered
        }
        None => template.to_string(),
    }
}
