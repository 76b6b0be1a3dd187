//! Message broker client over the management HTTP API.

use super::traits::{BrokerChannel, BrokerConnector};
use crate::config::BrokerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Publish request accepted by the management API.
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    properties: PublishProperties,
    routing_key: &'a str,
    payload: &'a str,
    payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct PublishProperties {
    content_type: &'static str,
    /// 2 = persistent
    delivery_mode: u8,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

/// Shared HTTP settings for the connector and the channels it opens.
#[derive(Debug, Clone)]
struct Endpoint {
    http: Client,
    base_url: String,
    vhost: String,
    username: String,
    password: String,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn encoded_vhost(&self) -> String {
        urlencoding::encode(&self.vhost).into_owned()
    }
}

/// Connects to the broker's management endpoint.
#[derive(Debug, Clone)]
pub struct HttpBrokerConnector {
    endpoint: Endpoint,
}

impl HttpBrokerConnector {
    /// Create a new broker connector from configuration.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: Endpoint {
                http,
                base_url: config.url.trim_end_matches('/').to_string(),
                vhost: config.vhost.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
        })
    }
}

#[async_trait]
impl BrokerConnector for HttpBrokerConnector {
    /// Check the virtual host is reachable with our credentials.
    #[instrument(skip(self), fields(vhost = %self.endpoint.vhost))]
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        let endpoint = &self.endpoint;
        let url = endpoint.url(&format!("vhosts/{}", endpoint.encoded_vhost()));

        let response = endpoint
            .http
            .get(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .send()
            .await
            .context("Failed to reach broker")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Broker connection refused {}: {}", status, body);
        }

        debug!("Broker connection established");
        Ok(Box::new(HttpBrokerChannel {
            endpoint: endpoint.clone(),
        }))
    }
}

/// Publishes through the management API of one virtual host.
#[derive(Debug)]
pub struct HttpBrokerChannel {
    endpoint: Endpoint,
}

#[async_trait]
impl BrokerChannel for HttpBrokerChannel {
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8], mandatory: bool) -> Result<()> {
        let endpoint = &self.endpoint;
        let url = endpoint.url(&format!(
            "exchanges/{}/{}/publish",
            endpoint.encoded_vhost(),
            urlencoding::encode(exchange)
        ));

        let payload = std::str::from_utf8(body).context("Message body is not UTF-8")?;
        let request = PublishRequest {
            properties: PublishProperties {
                content_type: "application/json",
                delivery_mode: 2,
            },
            routing_key,
            payload,
            payload_encoding: "string",
        };

        let response = endpoint
            .http
            .post(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .json(&request)
            .send()
            .await
            .context("Failed to send publish request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Broker publish error {}: {}", status, body);
        }

        let result: PublishResponse = response
            .json()
            .await
            .context("Failed to parse publish response")?;

        if mandatory && !result.routed {
            anyhow::bail!("Message to exchange '{}' was not routed to any queue", exchange);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> BrokerConfig {
        BrokerConfig {
            url: url.to_string(),
            vhost: "trading".to_string(),
            exchange: "trade-actions".to_string(),
            username: "bot".to_string(),
            password: "secret".to_string(),
            ..BrokerConfig::default()
        }
    }

    async fn mount_vhost(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/vhosts/trading"))
            .and(basic_auth("bot", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "trading" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_publish_routed_message() {
        let server = MockServer::start().await;
        mount_vhost(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/exchanges/trading/trade-actions/publish"))
            .and(basic_auth("bot", "secret"))
            .and(body_partial_json(serde_json::json!({
                "routing_key": "",
                "payload": r#"{"ticker":"IBM"}"#,
                "payload_encoding": "string",
                "properties": { "delivery_mode": 2 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "routed": true })))
            .expect(1)
            .mount(&server)
            .await;

        let connector = HttpBrokerConnector::new(&config(&server.uri())).unwrap();
        let channel = connector.connect().await.unwrap();
        channel
            .publish("trade-actions", "", br#"{"ticker":"IBM"}"#, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unrouted_mandatory_publish_fails() {
        let server = MockServer::start().await;
        mount_vhost(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/exchanges/trading/trade-actions/publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "routed": false })))
            .mount(&server)
            .await;

        let connector = HttpBrokerConnector::new(&config(&server.uri())).unwrap();
        let channel = connector.connect().await.unwrap();

        assert!(channel.publish("trade-actions", "", b"{}", true).await.is_err());
        assert!(channel.publish("trade-actions", "", b"{}", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_credentials_fail_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/vhosts/trading"))
            .respond_with(ResponseTemplate::new(401).set_body_string("not authorised"))
            .mount(&server)
            .await;

        let connector = HttpBrokerConnector::new(&config(&server.uri())).unwrap();
        let err = connector.connect().await.err().unwrap();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_connect() {
        let connector = HttpBrokerConnector::new(&config("http://127.0.0.1:1")).unwrap();
        assert!(connector.connect().await.is_err());
    }
}
