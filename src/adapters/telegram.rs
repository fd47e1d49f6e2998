//! Telegram gateway client.
//!
//! Talks to an HTTP JSON gateway that holds an authenticated user session.
//! Every call is `POST {endpoint}/{method}` with a JSON body, answered with
//! the same `{ ok, result, description }` envelope the Bot API uses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Account, ChatMessage, Dialog, Peer, Platform, PlatformError, PlatformResult};

/// Gateway client
pub struct GatewayClient {
    /// Gateway base URL, without trailing slash
    endpoint: String,
    /// Bearer token
    token: String,
    /// Session name passed to the gateway
    session: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response envelope from the gateway
#[derive(Debug, Deserialize)]
struct GatewayResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage/createChannel
#[derive(Debug, Deserialize)]
struct IdResult {
    id: i64,
}

/// Configuration for the gateway client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub token: String,
    #[serde(default = "default_session")]
    pub session: String,
}

pub fn default_session() -> String {
    "vpn_scanner".to_string()
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(endpoint: String, token: String, session: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            session,
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: GatewayConfig) -> Self {
        Self::new(config.endpoint, config.token, config.session)
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method)
    }

    /// Call a gateway method and unwrap the envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        mut body: serde_json::Value,
    ) -> PlatformResult<Option<T>> {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("session".to_string(), self.session.clone().into());
        }

        let response = self
            .client
            .post(self.api_url(method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let result: GatewayResponse<T> = response.json().await?;

        if !result.ok {
            return Err(PlatformError::Api(format!(
                "{}: {}",
                method,
                result.description.unwrap_or_default()
            )));
        }

        Ok(result.result)
    }

    /// Call a method whose result must be present
    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> PlatformResult<T> {
        self.call(method, body)
            .await?
            .ok_or_else(|| PlatformError::Api(format!("{}: empty result", method)))
    }
}

#[async_trait]
impl Platform for GatewayClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn me(&self) -> PlatformResult<Account> {
        self.call_required("getMe", serde_json::json!({})).await
    }

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>> {
        self.call_required("getDialogs", serde_json::json!({})).await
    }

    async fn messages(&self, peer: Peer, limit: usize) -> PlatformResult<Vec<ChatMessage>> {
        self.call_required(
            "getHistory",
            serde_json::json!({ "chat_id": peer.to_json(), "limit": limit }),
        )
        .await
    }

    async fn saved_messages_after(&self, after_id: i64) -> PlatformResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .call_required(
                "getHistory",
                serde_json::json!({ "chat_id": Peer::SavedMessages.to_json(), "min_id": after_id }),
            )
            .await?;
        messages.retain(|m| m.id > after_id);
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn send_message(&self, peer: Peer, text: &str) -> PlatformResult<i64> {
        let result: IdResult = self
            .call_required(
                "sendMessage",
                serde_json::json!({ "chat_id": peer.to_json(), "text": text }),
            )
            .await?;
        Ok(result.id)
    }

    async fn edit_message(&self, peer: Peer, message_id: i64, text: &str) -> PlatformResult<()> {
        self.call::<serde_json::Value>(
            "editMessageText",
            serde_json::json!({
                "chat_id": peer.to_json(),
                "message_id": message_id,
                "text": text,
            }),
        )
        .await?;
        Ok(())
    }

    async fn forward_message(&self, to: Peer, from: Peer, message_id: i64) -> PlatformResult<()> {
        self.call::<serde_json::Value>(
            "forwardMessage",
            serde_json::json!({
                "chat_id": to.to_json(),
                "from_chat_id": from.to_json(),
                "message_id": message_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, peer: Peer, message_id: i64) -> PlatformResult<()> {
        self.call::<serde_json::Value>(
            "deleteMessage",
            serde_json::json!({ "chat_id": peer.to_json(), "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn create_channel(&self, title: &str, about: &str) -> PlatformResult<i64> {
        let result: IdResult = self
            .call_required(
                "createChannel",
                serde_json::json!({ "title": title, "about": about, "broadcast": true }),
            )
            .await?;
        Ok(result.id)
    }

    async fn is_connected(&self) -> bool {
        self.call::<serde_json::Value>("ping", serde_json::json!({}))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = GatewayClient::new(
            "http://localhost:8081/".to_string(),
            "TOKEN".to_string(),
            default_session(),
        );
        assert_eq!(client.api_url("sendMessage"), "http://localhost:8081/sendMessage");
    }

    #[test]
    fn test_envelope_parsing() {
        let json = r#"{"ok":false,"description":"FLOOD_WAIT_30"}"#;
        let response: GatewayResponse<IdResult> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("FLOOD_WAIT_30"));

        let json = r#"{"ok":true,"result":{"id":42}}"#;
        let response: GatewayResponse<IdResult> = serde_json::from_str(json).unwrap();
        assert_eq!(response.result.unwrap().id, 42);
    }

    #[test]
    fn test_message_deserialization() {
        let json = r#"{
            "id": 7,
            "chat_id": -100123,
            "text": "hello",
            "file": {"file_name": "a.ovpn", "size": 512},
            "date": "2024-05-01T10:00:00Z"
        }"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.text(), Some("hello"));
        assert_eq!(message.file.unwrap().file_name.as_deref(), Some("a.ovpn"));
        assert!(!message.outgoing);
    }

    #[test]
    fn test_peer_json() {
        assert_eq!(Peer::SavedMessages.to_json(), serde_json::json!("me"));
        assert_eq!(Peer::Chat(-5).to_json(), serde_json::json!(-5));
    }
}
