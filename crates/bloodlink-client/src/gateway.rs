use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bloodlink_types::events::{GatewayCommand, GatewayEvent};

use crate::error::ClientError;

/// An identified gateway connection.
pub struct Gateway {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    user_id: Uuid,
    name: String,
}

impl Gateway {
    /// Connect, send Identify and wait for Ready.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let url = gateway_url(base_url);
        let (mut stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Gateway(format!("connect {}: {}", url, e)))?;

        let identify = serde_json::to_string(&GatewayCommand::Identify {
            token: token.to_string(),
        })
        .map_err(|e| ClientError::Gateway(e.to_string()))?;
        stream
            .send(Message::text(identify))
            .await
            .map_err(|e| ClientError::Gateway(e.to_string()))?;

        let mut gateway = Self {
            stream,
            user_id: Uuid::nil(),
            name: String::new(),
        };
        match gateway.next_event().await? {
            Some(GatewayEvent::Ready { user_id, name }) => {
                info!("Gateway ready for {} ({})", name, user_id);
                gateway.user_id = user_id;
                gateway.name = name;
                Ok(gateway)
            }
            Some(other) => Err(ClientError::Gateway(format!("expected Ready, got {:?}", other))),
            None => Err(ClientError::Gateway("closed during identify".to_string())),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event from the server, or `None` once the socket closes.
    /// Pings are answered by the socket itself.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame.map_err(|e| ClientError::Gateway(e.to_string()))? {
                Message::Text(text) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Unreadable gateway event: {}", e),
                },
                Message::Close(frame) => {
                    debug!("Gateway closed: {:?}", frame);
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Gateway(e.to_string()))
    }
}

fn gateway_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/gateway", ws)
}
