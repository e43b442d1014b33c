//! BlueBubbles REST transport.
//!
//! Every endpoint lives under `/api/v1`, authenticates with a `password`
//! query parameter, and answers `{"status": .., "message": .., "data": ..}`.
//! Each call is bounded by the client timeout; failures surface as
//! [`TransportError`] and are never retried here.

use async_trait::async_trait;
use chrono::Utc;
use convoy_config::AppConfig;
use convoy_core::{
    ALLOWED_REACTIONS, AttachmentData, ChatInfo, OutboundAttachment, PlatformMessage, SendTextRequest,
    Transport, TransportError,
};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::webhook::{GROUP_CHAT_PREFIX, parse_timestamp};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMessage {
    guid: String,
    text: Option<String>,
    #[serde(default)]
    is_from_me: bool,
    handle: Option<ApiHandle>,
    date_created: Option<i64>,
    #[serde(default)]
    attachments: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiHandle {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChat {
    guid: String,
    display_name: Option<String>,
    #[serde(default)]
    participants: Vec<ApiHandle>,
}

#[derive(Debug, Deserialize)]
struct UploadedAttachment {
    path: String,
}

impl From<ApiMessage> for PlatformMessage {
    fn from(m: ApiMessage) -> Self {
        Self {
            id: m.guid,
            text: m.text,
            from_me: m.is_from_me,
            sender: m.handle.and_then(|h| h.address),
            timestamp: m.date_created.and_then(parse_timestamp).unwrap_or_else(Utc::now),
            attachment_count: m.attachments.len(),
        }
    }
}

impl From<ApiChat> for ChatInfo {
    fn from(chat: ApiChat) -> Self {
        let participants: Vec<String> = chat.participants.into_iter().filter_map(|p| p.address).collect();
        Self {
            is_group: participants.len() > 1 || chat.guid.starts_with(GROUP_CHAT_PREFIX),
            chat_id: chat.guid,
            display_name: chat.display_name.filter(|n| !n.is_empty()),
            participants,
        }
    }
}

pub struct BlueBubblesTransport {
    base_url: Url,
    password: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl BlueBubblesTransport {
    pub fn new(base_url: &str, password: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::NotConfigured(format!("invalid base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::NotConfigured(format!("{base_url} cannot be a base url")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            password: password.into(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        let password = config
            .transport
            .password
            .clone()
            .ok_or_else(|| TransportError::NotConfigured("transport.password is not set".into()))?;
        Self::new(&config.transport.base_url, password, config.timeouts.transport())
    }

    /// `<base>/api/v1/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client
            .request(method, self.url(segments))
            .query(&[("password", self.password.as_str())])
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let response = self.send_unchecked(operation, request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::RequestFailed {
            operation: operation.to_string(),
            reason: format!("status {status}: {body}"),
        })
    }

    /// Sends without looking at the status code.
    async fn send_unchecked(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    operation: operation.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                TransportError::RequestFailed {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }

    async fn data<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T, TransportError> {
        let response = self.send(operation, request).await?;
        Self::decode(operation, response).await
    }

    async fn decode<T: DeserializeOwned>(operation: &str, response: reqwest::Response) -> Result<T, TransportError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("{operation}: {e}")))?;
        envelope
            .data
            .ok_or_else(|| TransportError::InvalidResponse(format!("{operation}: response has no data")))
    }

    async fn upload(&self, attachment: OutboundAttachment) -> Result<String, TransportError> {
        let part = reqwest::multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime_type)
            .map_err(|e| TransportError::RequestFailed {
                operation: "upload attachment".into(),
                reason: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new().part("attachment", part);
        let uploaded: UploadedAttachment = self
            .data(
                "upload attachment",
                self.request(Method::POST, &["attachment", "upload"]).multipart(form),
            )
            .await?;
        Ok(uploaded.path)
    }
}

#[async_trait]
impl Transport for BlueBubblesTransport {
    fn name(&self) -> &str {
        "bluebubbles"
    }

    async fn recent_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<PlatformMessage>, TransportError> {
        let limit = limit.to_string();
        let messages: Vec<ApiMessage> = self
            .data(
                "recent messages",
                self.request(Method::GET, &["chat", chat_id, "message"]).query(&[
                    ("with", "handle"),
                    ("sort", "DESC"),
                    ("limit", limit.as_str()),
                ]),
            )
            .await?;
        Ok(messages.into_iter().map(PlatformMessage::from).collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<PlatformMessage>, TransportError> {
        let request = self
            .request(Method::GET, &["message", message_id])
            .query(&[("with", "chats,participants")]);
        let response = self.send_unchecked("get message", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TransportError::RequestFailed {
                operation: "get message".into(),
                reason: format!("status {}", response.status()),
            });
        }
        let message: ApiMessage = Self::decode("get message", response).await?;
        Ok(Some(message.into()))
    }

    async fn send_text(&self, request: SendTextRequest) -> Result<(), TransportError> {
        let private = request.reply_to.is_some() || request.effect_id.is_some() || request.part_index.is_some();
        let mut body = json!({
            "chatGuid": request.chat_id,
            "tempGuid": uuid::Uuid::new_v4().to_string(),
            "message": request.text,
            "method": if private { "private-api" } else { "apple-script" },
        });
        if let Some(reply_to) = &request.reply_to {
            body["selectedMessageGuid"] = json!(reply_to);
            body["partIndex"] = json!(request.part_index.unwrap_or(0));
        }
        if let Some(effect) = &request.effect_id {
            body["effectId"] = json!(effect);
        }

        self.send("send text", self.request(Method::POST, &["message", "text"]).json(&body))
            .await?;
        info!(chat_id = %request.chat_id, threaded = request.reply_to.is_some(), "Sent text");
        Ok(())
    }

    async fn send_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: &str,
        part_index: Option<u32>,
    ) -> Result<(), TransportError> {
        if !ALLOWED_REACTIONS.contains(&reaction) {
            return Err(TransportError::RequestFailed {
                operation: "send reaction".into(),
                reason: format!("unsupported reaction {reaction}"),
            });
        }
        let body = json!({
            "chatGuid": chat_id,
            "selectedMessageGuid": message_id,
            "reaction": reaction,
            "partIndex": part_index.unwrap_or(0),
        });
        self.send("send reaction", self.request(Method::POST, &["message", "react"]).json(&body))
            .await?;
        info!(chat_id = %chat_id, reaction = %reaction, "Sent reaction");
        Ok(())
    }

    async fn send_multipart(
        &self,
        chat_id: &str,
        caption: Option<&str>,
        attachments: Vec<OutboundAttachment>,
    ) -> Result<(), TransportError> {
        let mut parts = Vec::new();
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            parts.push(json!({"partIndex": 0, "text": caption}));
        }
        for attachment in attachments.into_iter().filter(|a| !a.bytes.is_empty()) {
            let name = attachment.file_name.clone();
            match self.upload(attachment).await {
                Ok(path) => {
                    let index = parts.len();
                    parts.push(json!({"partIndex": index, "attachment": path, "name": name}));
                }
                Err(e) => warn!(chat_id = %chat_id, file = %name, error = %e, "Attachment upload failed, skipping"),
            }
        }
        if parts.is_empty() {
            return Err(TransportError::RequestFailed {
                operation: "send multipart".into(),
                reason: "no parts to send".into(),
            });
        }

        let count = parts.len();
        let body = json!({"chatGuid": chat_id, "parts": parts});
        self.send("send multipart", self.request(Method::POST, &["message", "multipart"]).json(&body))
            .await?;
        info!(chat_id = %chat_id, parts = count, "Sent multipart message");
        Ok(())
    }

    async fn download_attachment(&self, attachment_id: &str) -> Result<AttachmentData, TransportError> {
        let response = self
            .send(
                "download attachment",
                self.request(Method::GET, &["attachment", attachment_id, "download"]),
            )
            .await?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await.map_err(|e| TransportError::RequestFailed {
            operation: "download attachment".into(),
            reason: e.to_string(),
        })?;
        debug!(attachment_id = %attachment_id, size = bytes.len(), "Downloaded attachment");
        Ok(AttachmentData {
            mime_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, TransportError> {
        let chat: ApiChat = self
            .data(
                "chat info",
                self.request(Method::GET, &["chat", chat_id]).query(&[("with", "participants")]),
            )
            .await?;
        Ok(chat.into())
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), TransportError> {
        self.send(
            "rename chat",
            self.request(Method::PUT, &["chat", chat_id]).json(&json!({"displayName": name})),
        )
        .await?;
        info!(chat_id = %chat_id, "Renamed chat");
        Ok(())
    }

    async fn search_messages(
        &self,
        chat_id: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlatformMessage>, TransportError> {
        let mut body = json!({
            "chatGuid": chat_id,
            "sort": "DESC",
            "with": ["handle"],
            "limit": limit,
            "offset": offset,
            "where": [],
        });
        if !query.trim().is_empty() {
            body["where"] = json!([{
                "statement": "message.text LIKE :text",
                "args": {"text": format!("%{}%", query.trim())},
            }]);
        }
        let messages: Vec<ApiMessage> = self
            .data("search messages", self.request(Method::POST, &["message", "query"]).json(&body))
            .await?;
        Ok(messages.into_iter().map(PlatformMessage::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Recorded {
        fn take(&self) -> Vec<(String, Value)> {
            std::mem::take(&mut *self.requests.lock().unwrap())
        }
    }

    async fn fake_server() -> (BlueBubblesTransport, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/api/v1/message/text",
                post(
                    |State(r): State<Recorded>, Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                        r.requests.lock().unwrap().push((q.get("password").cloned().unwrap_or_default(), body));
                        Json(json!({"status": 200, "message": "Success", "data": {}}))
                    },
                ),
            )
            .route(
                "/api/v1/chat/{guid}/message",
                get(|Path(guid): Path<String>| async move {
                    Json(json!({"status": 200, "message": "Success", "data": [
                        {"guid": "m2", "text": "second", "isFromMe": true, "dateCreated": 1_700_000_100_000i64},
                        {"guid": "m1", "text": "first", "handle": {"address": guid}, "dateCreated": 1_700_000_000_000i64,
                         "attachments": [{"guid": "a1"}]}
                    ]}))
                }),
            )
            .route(
                "/api/v1/chat/{guid}",
                get(|Path(guid): Path<String>| async move {
                    Json(json!({"status": 200, "message": "Success", "data": {
                        "guid": guid, "displayName": "Weekend plans",
                        "participants": [{"address": "+1"}, {"address": "+2"}]
                    }}))
                }),
            )
            .route(
                "/api/v1/message/{guid}",
                get(|| async { (AxumStatus::NOT_FOUND, Json(json!({"status": 404, "message": "Not found"}))) }),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let transport =
            BlueBubblesTransport::new(&format!("http://{addr}"), "pw", Duration::from_secs(5)).unwrap();
        (transport, recorded)
    }

    #[test]
    fn urls_encode_chat_guids() {
        let transport =
            BlueBubblesTransport::new("http://localhost:1234/", "pw", Duration::from_secs(1)).unwrap();
        let url = transport.url(&["chat", "iMessage;-;+1 555", "message"]);
        assert_eq!(url.path(), "/api/v1/chat/iMessage;-;+1%20555/message");
    }

    #[test]
    fn invalid_base_url_is_not_configured() {
        assert!(matches!(
            BlueBubblesTransport::new("not a url", "pw", Duration::from_secs(1)),
            Err(TransportError::NotConfigured(_))
        ));
        assert!(matches!(
            BlueBubblesTransport::from_config(&AppConfig::default()),
            Err(TransportError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn send_text_posts_threaded_private_api_body() {
        let (transport, recorded) = fake_server().await;
        let request = SendTextRequest::new("chat-1", "Hey!").replying_to(Some("root-1".into()));
        transport.send_text(request).await.unwrap();

        let requests = recorded.take();
        assert_eq!(requests.len(), 1);
        let (password, body) = &requests[0];
        assert_eq!(password, "pw");
        assert_eq!(body["chatGuid"], "chat-1");
        assert_eq!(body["message"], "Hey!");
        assert_eq!(body["method"], "private-api");
        assert_eq!(body["selectedMessageGuid"], "root-1");
        assert!(body["tempGuid"].as_str().is_some_and(|g| !g.is_empty()));
    }

    #[tokio::test]
    async fn recent_messages_map_platform_fields() {
        let (transport, _) = fake_server().await;
        let messages = transport.recent_messages("chat-1", 2).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m2");
        assert!(messages[0].from_me);
        assert_eq!(messages[1].sender.as_deref(), Some("chat-1"));
        assert_eq!(messages[1].attachment_count, 1);
        assert_eq!(messages[1].timestamp.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn chat_info_and_missing_message() {
        let (transport, _) = fake_server().await;
        let info = transport.chat_info("chat-1").await.unwrap();
        assert_eq!(info.display_name.as_deref(), Some("Weekend plans"));
        assert!(info.is_group);

        assert!(transport.get_message("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsupported_reaction_is_rejected_locally() {
        let (transport, recorded) = fake_server().await;
        let err = transport.send_reaction("chat-1", "m1", "hug", None).await.unwrap_err();
        assert!(err.to_string().contains("unsupported reaction"));
        assert!(recorded.take().is_empty());
    }

    #[tokio::test]
    async fn empty_multipart_is_an_error() {
        let (transport, _) = fake_server().await;
        assert!(transport.send_multipart("chat-1", Some("  "), vec![]).await.is_err());
    }

    #[test]
    fn envelope_without_data_is_empty() {
        let envelope: Envelope<ApiMessage> =
            serde_json::from_str(r#"{"status": 200, "message": "Success"}"#).unwrap();
        assert!(envelope.data.is_none());
    }
}
