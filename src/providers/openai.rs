use anyhow::{Context, Result, anyhow};
use futures::{Stream, StreamExt, stream};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{ChatRequest, Fragment, FragmentStream, Message};
use crate::providers::http_errors::{model_api_request_error, model_api_status_error};
use crate::providers::sse::{SseDecoder, SseEvent};
use crate::settings::Settings;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    #[serde(flatten)]
    settings: &'a Settings,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

fn to_openai_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        })
        .collect()
}

fn authorized(builder: RequestBuilder, cfg: &Config) -> RequestBuilder {
    match &cfg.api_key {
        Some(key) => builder.bearer_auth(key),
        None => builder,
    }
}

async fn send(builder: RequestBuilder, cfg: &Config, api_url: &str) -> Result<Response> {
    let response = builder.send().await.map_err(|err| {
        warn!(api_url = %api_url, error = %err, "model API request failed");
        model_api_request_error(err, api_url, cfg.model_timeout_secs)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        api_url = %api_url,
        status = %status,
        response_body_len = body.len(),
        "model API returned non-success status"
    );
    Err(model_api_status_error(status, api_url, &body))
}

pub async fn list_models(client: &Client, cfg: &Config) -> Result<Vec<String>> {
    let api_url = endpoint(&cfg.model_base_url, "models");
    debug!(api_url = %api_url, "listing models");

    let response = send(authorized(client.get(&api_url), cfg), cfg, &api_url).await?;
    let parsed: ModelList = response
        .json()
        .await
        .context("Failed to parse model list response")?;

    let ids: Vec<String> = parsed.data.into_iter().map(|entry| entry.id).collect();
    debug!(model_count = ids.len(), models = ?ids, "received model list");
    Ok(ids)
}

pub async fn stream_chat(
    client: &Client,
    cfg: &Config,
    request: &ChatRequest,
) -> Result<FragmentStream> {
    let api_url = endpoint(&cfg.model_base_url, "chat/completions");
    let body = ChatCompletionRequest {
        messages: to_openai_messages(&request.messages),
        settings: &request.settings,
        stream: true,
    };
    debug!(
        api_url = %api_url,
        model = %request.settings.model,
        message_count = request.messages.len(),
        "opening streaming chat completion"
    );

    let builder = authorized(client.post(&api_url), cfg).json(&body);
    let response = send(builder, cfg, &api_url).await?;
    Ok(Box::pin(fragment_stream(Box::pin(response.bytes_stream()))))
}

fn parse_chunk(payload: &str) -> Result<Fragment> {
    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            warn!(error = %err, payload_len = payload.len(), "skipping undecodable stream chunk");
            return Ok(Fragment::empty());
        }
    };

    if let Some(error) = chunk.error {
        return Err(anyhow!("Model stream reported an error: {}", error.message));
    }

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);
    Ok(Fragment { text })
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    exhausted: bool,
    finished: bool,
}

/// Decodes a raw event-stream body into fragments. Ends at `[DONE]`, at the
/// end of the body, or after the first error.
fn fragment_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<Fragment>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                match event {
                    SseEvent::Done => {
                        state.finished = true;
                        return None;
                    }
                    SseEvent::Data(payload) => {
                        let item = parse_chunk(&payload);
                        state.finished = item.is_err();
                        return Some((item, state));
                    }
                }
            }

            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(anyhow!("Model stream interrupted: {}", err)), state));
                }
                None => {
                    state.exhausted = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::{endpoint, fragment_stream, list_models, parse_chunk, stream_chat};
    use crate::config::Config;
    use crate::model::{ChatRequest, Fragment, Message};
    use crate::settings::Settings;

    fn test_config(base_url: &str) -> Config {
        let mut cfg = Config::from_env_with(|_| None);
        cfg.model_base_url = base_url.to_string();
        cfg.api_key = Some("sk-test".to_string());
        cfg
    }

    fn chunk(content: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":{content:?}}}}}]}}\n\n")
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut scratch = [0u8; 4096];
        loop {
            let n = socket.read(&mut scratch).await.expect("read should succeed");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&scratch[..n]);
            if let Some(end) = header_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept should succeed");
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write should succeed");
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}/v1/"), handle)
    }

    fn request_body(raw_request: &str) -> Value {
        let (_, body) = raw_request
            .split_once("\r\n\r\n")
            .expect("request should have a body");
        serde_json::from_str(body).expect("request body should be JSON")
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "models"),
            "https://api.openai.com/v1/models"
        );
    }

    #[test]
    fn parse_chunk_reads_delta_content() {
        let fragment = parse_chunk(r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#)
            .expect("chunk should parse");
        assert_eq!(fragment, Fragment::text("Hel"));
    }

    #[test]
    fn parse_chunk_treats_control_chunks_as_textless() {
        for payload in [
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"total_tokens":3}}"#,
            r#"{"choices":[{"delta":{"content":null}}]}"#,
            "not json at all",
        ] {
            let fragment = parse_chunk(payload).expect("control chunk should not fail");
            assert_eq!(fragment.delta(), None, "payload {payload} produced text");
        }
    }

    #[test]
    fn parse_chunk_surfaces_stream_errors() {
        let err = parse_chunk(r#"{"error":{"message":"overloaded"}}"#)
            .expect_err("error chunk should fail");
        assert!(format!("{err:#}").contains("overloaded"));
    }

    #[tokio::test]
    async fn fragment_stream_handles_split_chunks_and_done_marker() {
        let body = format!("{}{}data: [DONE]\n\n{}", chunk("Hel"), chunk("lo"), chunk("late"));
        let bytes = body.into_bytes();
        let (first, rest) = bytes.split_at(17);
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(first.to_vec()), Ok(rest.to_vec())];

        let fragments: Vec<Fragment> = fragment_stream(stream::iter(chunks))
            .map(|item| item.expect("fragment should decode"))
            .collect()
            .await;
        assert_eq!(fragments, vec![Fragment::text("Hel"), Fragment::text("lo")]);
    }

    #[tokio::test]
    async fn fragment_stream_stops_after_transport_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(chunk("partial").into_bytes()),
            Err(std::io::Error::other("connection reset")),
            Ok(chunk("never").into_bytes()),
        ];

        let items: Vec<_> = fragment_stream(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().expect("first fragment should decode"),
            &Fragment::text("partial")
        );
        let err = items[1].as_ref().expect_err("second item should be the error");
        assert!(format!("{err:#}").contains("connection reset"));
    }

    #[tokio::test]
    async fn list_models_reads_ids_with_bearer_auth() {
        let (base_url, server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"object":"list","data":[{"id":"gpt-4o","object":"model"},{"id":"gpt-3.5-turbo","object":"model"}]}"#
                .to_string(),
        )
        .await;
        let cfg = test_config(&base_url);

        let ids = list_models(&reqwest::Client::new(), &cfg)
            .await
            .expect("listing should succeed");
        assert_eq!(ids, vec!["gpt-4o".to_string(), "gpt-3.5-turbo".to_string()]);

        let request = server.await.expect("server task should finish");
        assert!(request.starts_with("GET /v1/models "), "unexpected request: {request}");
        assert!(
            request.to_ascii_lowercase().contains("authorization: bearer sk-test"),
            "missing bearer token: {request}"
        );
    }

    #[tokio::test]
    async fn list_models_reports_auth_failures() {
        let (base_url, server) = serve_once(
            "401 Unauthorized",
            "application/json",
            r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string(),
        )
        .await;
        let cfg = test_config(&base_url);

        let err = list_models(&reqwest::Client::new(), &cfg)
            .await
            .expect_err("listing should fail");
        let msg = format!("{err:#}");
        assert!(msg.contains("401"), "unexpected message: {msg}");
        assert!(msg.contains("OPENAI_API_KEY"), "unexpected message: {msg}");
        assert!(msg.contains("Incorrect API key"), "unexpected message: {msg}");
        server.await.expect("server task should finish");
    }

    #[tokio::test]
    async fn stream_chat_sends_settings_and_yields_fragments() {
        let body = format!(
            "data: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n\n{}{}: ping\n\n{}data: [DONE]\n\n",
            chunk("Hel"),
            chunk("lo"),
            chunk(" world")
        );
        let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;
        let cfg = test_config(&base_url);
        let request = ChatRequest {
            messages: vec![Message::system("sys"), Message::user("Your task is to: hi")],
            settings: Settings::for_model("gpt-4o"),
        };

        let fragments = stream_chat(&reqwest::Client::new(), &cfg, &request)
            .await
            .expect("stream should open");
        let texts: Vec<String> = fragments
            .filter_map(|item| async move {
                item.expect("fragment should decode").delta().map(str::to_string)
            })
            .collect()
            .await;
        assert_eq!(texts, vec!["Hel", "lo", " world"]);

        let raw = server.await.expect("server task should finish");
        assert!(
            raw.starts_with("POST /v1/chat/completions "),
            "unexpected request: {raw}"
        );
        let sent = request_body(&raw);
        assert_eq!(sent["model"], "gpt-4o");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["temperature"], 0.0);
        assert_eq!(sent["max_tokens"], 500);
        assert_eq!(sent["top_p"], 1.0);
        assert_eq!(sent["frequency_penalty"], 0.0);
        assert_eq!(sent["presence_penalty"], 0.0);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], "sys");
        assert_eq!(sent["messages"][1]["role"], "user");
        assert_eq!(sent["messages"][1]["content"], "Your task is to: hi");
    }
}
