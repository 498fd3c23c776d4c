use anyhow::{Result, anyhow};
use futures::stream;
use std::sync::Mutex;

use crate::model::{ChatRequest, Fragment, FragmentStream};
use crate::model_gateway::{GatewayFuture, ModelGateway};
use crate::ui::{ChatUi, UiEvent};

#[derive(Debug, Clone, Copy)]
pub(crate) enum StubFragment {
    Text(&'static str),
    Empty,
    Fail(&'static str),
}

#[derive(Debug)]
pub(crate) struct StubGateway {
    models: std::result::Result<Vec<String>, String>,
    stream: std::result::Result<Vec<StubFragment>, String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubGateway {
    pub(crate) fn with_models(models: &[&str]) -> Self {
        Self {
            models: Ok(models.iter().map(|id| id.to_string()).collect()),
            stream: Ok(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn streaming(fragments: Vec<StubFragment>) -> Self {
        Self::with_models(&["gpt-3.5-turbo", "gpt-4o"]).with_stream(fragments)
    }

    pub(crate) fn failing_listing(message: &str) -> Self {
        Self {
            models: Err(message.to_string()),
            ..Self::with_models(&[])
        }
    }

    pub(crate) fn failing_stream(message: &str) -> Self {
        Self {
            stream: Err(message.to_string()),
            ..Self::with_models(&["gpt-3.5-turbo"])
        }
    }

    pub(crate) fn with_stream(mut self, fragments: Vec<StubFragment>) -> Self {
        self.stream = Ok(fragments);
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ModelGateway for StubGateway {
    fn list_models(&self) -> GatewayFuture<'_, Vec<String>> {
        let result = self.models.clone().map_err(|message| anyhow!(message));
        Box::pin(async move { result })
    }

    fn stream_chat(&self, request: ChatRequest) -> GatewayFuture<'_, FragmentStream> {
        self.requests.lock().expect("requests lock").push(request);
        let result = match &self.stream {
            Ok(fragments) => {
                let items: Vec<Result<Fragment>> = fragments
                    .iter()
                    .map(|fragment| match fragment {
                        StubFragment::Text(text) => Ok(Fragment::text(*text)),
                        StubFragment::Empty => Ok(Fragment::empty()),
                        StubFragment::Fail(message) => Err(anyhow!(*message)),
                    })
                    .collect();
                Ok(Box::pin(stream::iter(items)) as FragmentStream)
            }
            Err(message) => Err(anyhow!(message.clone())),
        };
        Box::pin(async move { result })
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub(crate) fn events(&self) -> Vec<UiEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub(crate) fn tokens(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Token { token, .. } => Some(token),
                _ => None,
            })
            .collect()
    }
}

impl ChatUi for RecordingUi {
    fn emit(&self, event: UiEvent) -> Result<()> {
        self.events.lock().expect("events lock").push(event);
        Ok(())
    }
}
