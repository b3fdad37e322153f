//! WebSocket [`LiveTransport`] on tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use mfgsuite_client::{ApiError, RequestContext, live_url};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::live::{LiveConnection, LiveTransport};
use crate::message::Frame;

pub struct WsTransport {
    base_url: String,
}

impl WsTransport {
    /// `base_url` is the server root (`https://…` or `wss://…`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl LiveTransport for WsTransport {
    async fn connect(
        &self,
        ctx: &RequestContext,
        board_id: &str,
    ) -> Result<Box<dyn LiveConnection>, ApiError> {
        let url = live_url(&self.base_url, ctx, board_id)?;
        debug!("live connect: {}{}", url.origin().ascii_serialization(), url.path());
        let (stream, _resp) = connect_async(url.as_str())
            .await
            .map_err(|e| ApiError::Transport(format!("connect: {e}")))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl LiveConnection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, ApiError>> {
        let msg = self.stream.next().await?;
        Some(match msg {
            Ok(Message::Text(text)) => Ok(Frame::Text(text)),
            Ok(Message::Binary(bytes)) => Ok(Frame::Binary(bytes)),
            Ok(Message::Ping(_) | Message::Frame(_)) => Ok(Frame::Ping),
            Ok(Message::Pong(_)) => Ok(Frame::Pong),
            Ok(Message::Close(_)) => Ok(Frame::Close),
            Err(e) => Err(ApiError::Transport(e.to_string())),
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("live close: {e}");
        }
    }
}
