use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;

use crate::config::Config;
use crate::model::{self, ChatRequest, FragmentStream};

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait ModelGateway: Send + Sync {
    fn list_models(&self) -> GatewayFuture<'_, Vec<String>>;

    fn stream_chat(&self, request: ChatRequest) -> GatewayFuture<'_, FragmentStream>;
}

pub struct HostModelGateway {
    client: Client,
    cfg: Config,
}

impl HostModelGateway {
    pub fn new(client: Client, cfg: Config) -> Self {
        Self { client, cfg }
    }
}

impl ModelGateway for HostModelGateway {
    fn list_models(&self) -> GatewayFuture<'_, Vec<String>> {
        Box::pin(async move { model::list_models(&self.client, &self.cfg).await })
    }

    fn stream_chat(&self, request: ChatRequest) -> GatewayFuture<'_, FragmentStream> {
        Box::pin(async move { model::stream_chat(&self.client, &self.cfg, &request).await })
    }
}
