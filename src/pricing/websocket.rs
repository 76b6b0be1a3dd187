//! Trade stream WebSocket client (streaming source).

use super::traits::{PriceStreamSource, PriceUpdateStream};
use super::types::{PriceUpdate, StreamMessage, SubscribeRequest};
use crate::config::PricingConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{stream, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

/// WebSocket client for the trade stream.
pub struct StreamClient {
    url: String,
    token: String,
}

impl StreamClient {
    /// Create a new stream client from configuration.
    pub fn new(config: &PricingConfig) -> Self {
        Self::with_url(&config.stream_url, &config.api_token)
    }

    pub fn with_url(url: &str, token: &str) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        if self.token.is_empty() {
            self.url.clone()
        } else {
            format!("{}?token={}", self.url, urlencoding::encode(&self.token))
        }
    }
}

#[async_trait]
impl PriceStreamSource for StreamClient {
    async fn subscribe(&self, tickers: &[String]) -> Result<PriceUpdateStream> {
        info!("Connecting to price stream: {}", self.url);

        let (ws_stream, _) = connect_async(self.endpoint())
            .await
            .context("Failed to connect to price stream")?;

        let (mut write, read) = ws_stream.split();

        for ticker in tickers {
            let request = serde_json::to_string(&SubscribeRequest {
                kind: "subscribe",
                symbol: ticker,
            })?;
            write
                .send(Message::text(request))
                .await
                .with_context(|| format!("Failed to subscribe to {}", ticker))?;
        }
        info!(tickers = tickers.len(), "Subscribed to price stream");

        let updates = read
            .map(|frame| match frame {
                Ok(Message::Text(text)) => parse_frame(&text.to_string()),
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Received ping");
                    Vec::new()
                }
                Ok(Message::Close(frame)) => {
                    vec![Err(anyhow!("price stream closed by server: {:?}", frame))]
                }
                Ok(_) => Vec::new(),
                Err(e) => vec![Err(anyhow::Error::new(e).context("Price stream read failed"))],
            })
            .flat_map(stream::iter)
            .boxed();

        Ok(updates)
    }
}

/// Turn one text frame into zero or more updates.
fn parse_frame(text: &str) -> Vec<Result<PriceUpdate>> {
    match serde_json::from_str::<StreamMessage>(text) {
        Ok(StreamMessage::Trade { data }) => data
            .into_iter()
            .map(|tick| Ok(PriceUpdate::new(tick.symbol, tick.price)))
            .collect(),
        Ok(StreamMessage::Ping) | Ok(StreamMessage::Other) => Vec::new(),
        Ok(StreamMessage::Error { msg }) => vec![Err(anyhow!("price stream error: {}", msg))],
        Err(e) => vec![Err(anyhow::Error::new(e).context("Failed to parse price stream message"))],
    }
}
