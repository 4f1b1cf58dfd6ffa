use crate::settings::P2pSettings;
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Client for the external P2P daemon: publish over its HTTP surface,
/// subscribe over its websocket stream. The transport itself is a black
/// box.
pub struct P2pClient {
    http: reqwest::Client,
    daemon_url: Url,
    ws_url: Url,
}

impl P2pClient {
    pub fn new(settings: &P2pSettings) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            daemon_url: settings.daemon_url.clone(),
            ws_url: settings.ws_url.clone(),
        })
    }

    pub async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        let url = self
            .daemon_url
            .join("api/v0/p2p/publish")
            .context("publish endpoint")?;
        self.http
            .post(url)
            .json(&serde_json::json!({ "topic": topic, "data": payload }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Opens the subscription stream. Binary and control frames are
    /// skipped; each text frame is expected to be one JSON envelope.
    pub async fn subscribe(&self, topic: &str) -> Result<impl Stream<Item = Result<Value>>> {
        let mut url = self
            .ws_url
            .join("api/v0/p2p/subscribe")
            .context("subscribe endpoint")?;
        url.query_pairs_mut().append_pair("topic", topic);

        let (ws, _) = connect_async(url.as_str())
            .await
            .context("p2p daemon websocket")?;

        Ok(ws.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => {
                    Some(serde_json::from_str(text.as_str()).context("envelope json"))
                }
                Ok(_) => None,
                Err(err) => Some(Err(anyhow::Error::from(err).context("websocket"))),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn settings(server: &MockServer) -> P2pSettings {
        serde_json::from_value(serde_json::json!({
            "daemon_url": server.uri(),
            "ws_url": "ws://localhost:4025",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn publish_posts_topic_and_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/p2p/publish"))
            .and(body_partial_json(serde_json::json!({"topic": "ALEPH-TEST"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = P2pClient::new(&settings(&server)).unwrap();
        client
            .publish("ALEPH-TEST", &serde_json::json!({"type": "POST"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_surfaces_daemon_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/p2p/publish"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(10)))
            .mount(&server)
            .await;

        let client = P2pClient::new(&settings(&server)).unwrap();
        assert!(client
            .publish("ALEPH-TEST", &serde_json::json!({}))
            .await
            .is_err());
    }
}
