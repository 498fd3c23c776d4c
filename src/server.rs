use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::app::ChatApp;
use crate::model_gateway::ModelGateway;
use crate::session::SessionContext;
use crate::ui::{ChatUi, UiEvent};

const INDEX_HTML: &str = include_str!("../assets/index.html");
const MAX_REQUEST_HEAD_BYTES: usize = 16 * 1024;
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Page,
    WebSocket,
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    Message { text: String },
    Action { name: String },
}

fn route_request(head: &str) -> Route {
    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("");
    let target = request_line.next().unwrap_or("");
    let path = target.split(['?', '#']).next().unwrap_or("");

    let wants_upgrade = head.lines().skip(1).any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value.trim().eq_ignore_ascii_case("websocket")
        })
    });

    match (method, path) {
        ("GET", "/ws") if wants_upgrade => Route::WebSocket,
        ("GET", "/" | "/index.html") => Route::Page,
        (_, "/" | "/index.html" | "/ws") => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

pub struct ChatServer {
    listener: TcpListener,
}

impl ChatServer {
    pub async fn bind(address: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .with_context(|| format!("Failed to bind chat UI on {address}:{port}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read chat UI address")
    }

    pub async fn run<G>(
        self,
        app: Arc<ChatApp<G>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()>
    where
        G: ModelGateway + 'static,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("chat UI shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let app = Arc::clone(&app);
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, peer, app).await {
                                warn!(peer = %peer, error = %format!("{err:#}"), "connection ended with error");
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                },
            }
        }
    }
}

async fn handle_connection<G>(
    mut stream: TcpStream,
    peer: SocketAddr,
    app: Arc<ChatApp<G>>,
) -> Result<()>
where
    G: ModelGateway + 'static,
{
    let head = read_request_head(&mut stream, REQUEST_HEAD_TIMEOUT).await?;
    if head.is_empty() {
        return Ok(());
    }

    let route = route_request(&String::from_utf8_lossy(&head));
    debug!(peer = %peer, route = ?route, "routing request");
    match route {
        Route::WebSocket => handle_websocket(ReplayStream::new(head, stream), peer, app).await,
        Route::Page => {
            respond(&mut stream, "200 OK", "text/html; charset=utf-8", INDEX_HTML).await
        }
        Route::MethodNotAllowed => {
            respond(
                &mut stream,
                "405 Method Not Allowed",
                "text/plain; charset=utf-8",
                "method not allowed",
            )
            .await
        }
        Route::NotFound => {
            respond(&mut stream, "404 Not Found", "text/plain; charset=utf-8", "not found").await
        }
    }
}

fn head_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|window| window == b"\r\n\r\n")
}

// Reads until the blank line ending the request head, EOF, or the size cap.
async fn read_request_head<S>(stream: &mut S, deadline: Duration) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let read_head = async {
        let mut head: Vec<u8> = Vec::with_capacity(1024);
        let mut scratch = [0u8; 1024];
        while !head_complete(&head) && head.len() < MAX_REQUEST_HEAD_BYTES {
            let n = stream.read(&mut scratch).await?;
            if n == 0 {
                break;
            }
            head.extend_from_slice(&scratch[..n]);
        }
        Ok::<_, std::io::Error>(head)
    };

    tokio::time::timeout(deadline, read_head)
        .await
        .with_context(|| format!("No request head within {}s", deadline.as_secs_f32()))?
        .context("Failed to read request")
}

// Hands already-consumed request bytes back to the WebSocket handshake.
struct ReplayStream<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> ReplayStream<S> {
    fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let remaining = &this.prefix[this.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .context("Failed to write response")?;
    let _ = stream.shutdown().await;
    Ok(())
}

async fn handle_websocket<G>(
    stream: ReplayStream<TcpStream>,
    peer: SocketAddr,
    app: Arc<ChatApp<G>>,
) -> Result<()>
where
    G: ModelGateway + 'static,
{
    let socket = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut sink, mut source) = socket.split();

    let (ui, mut outbound) = mpsc::unbounded_channel::<UiEvent>();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to encode UI event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    info!(peer = %peer, "chat client connected");
    let session = match app.on_chat_start(&ui).await {
        Ok(session) => session,
        Err(err) => {
            let _ = ui.emit(UiEvent::Error {
                text: format!("{err:#}"),
            });
            drop(ui);
            let _ = writer.await;
            return Err(err);
        }
    };

    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(peer = %peer, error = %err, "WebSocket read failed");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                if !handle_client_event(&app, &session, text.as_str(), &ui).await {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    info!(peer = %peer, session_id = %session.id(), "chat client disconnected");
    drop(ui);
    let _ = writer.await;
    Ok(())
}

/// Handles one client event. Returns `false` once the client can no longer be reached.
async fn handle_client_event<G, U>(
    app: &ChatApp<G>,
    session: &SessionContext,
    raw: &str,
    ui: &U,
) -> bool
where
    G: ModelGateway,
    U: ChatUi,
{
    let outcome = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(ClientEvent::Message { text }) => {
            if text.trim().is_empty() {
                return true;
            }
            app.on_message(session, &text, ui).await
        }
        Ok(ClientEvent::Action { name }) => app.on_action(session, &name, ui).await,
        Err(err) => {
            warn!(session_id = %session.id(), error = %err, "ignoring malformed client event");
            return true;
        }
    };

    match outcome {
        Ok(_) => true,
        Err(err) => {
            warn!(session_id = %session.id(), error = %format!("{err:#}"), "chat action failed");
            ui.emit(UiEvent::Error {
                text: format!("{err:#}"),
            })
            .is_ok()
        }
    }
}
