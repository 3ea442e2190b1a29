//! Network access to the chat server.
//!
//! [`ChatTransport`] is the seam the engine talks to; [`HttpTransport`] is
//! the reqwest implementation against the server's JSON routes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use rustls::RootCertStore;
use serde::de::DeserializeOwned;

use crate::config::{Endpoints, Settings};
use crate::error::{Result, SyncError};
use crate::message::{
    decode_messages, ConversationId, HistoryResponse, Message, NewMessagesResponse, SendResponse,
    UnreadCountResponse,
};
use crate::validation::validate_server_url;

const CSRF_HEADER: &str = "x-csrftoken";

/// One page of older messages.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// Server hint; `Some(false)` means this is the last page.
    pub has_more: Option<bool>,
}

/// A single file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub content: String,
    pub file: Option<FileUpload>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Messages newer than `after` (everything when `None`), oldest first.
    async fn fetch_new(&self, conversation: ConversationId, after: Option<i64>) -> Result<Vec<Message>>;

    /// Up to `limit` messages older than `before` (the latest page when `None`).
    async fn fetch_older(
        &self,
        conversation: ConversationId,
        before: Option<i64>,
        limit: usize,
    ) -> Result<HistoryPage>;

    /// Post text and at most one file. Returns the server's echo if it sent one.
    async fn send(&self, conversation: ConversationId, outgoing: &OutgoingMessage) -> Result<Option<Message>>;

    async fn mark_read(&self, message_id: i64) -> Result<()>;

    /// Unread messages across all conversations.
    async fn unread_count(&self) -> Result<u64>;
}

/// Build a rustls client configuration trusting the webpki root certificates
pub fn create_tls_config() -> Result<rustls::ClientConfig> {
    let mut root_store = RootCertStore::empty();

    // Use webpki-roots for cross-platform compatibility
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SyncError::Config(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

pub struct HttpTransport {
    client: Client,
    base: Url,
    endpoints: Endpoints,
    csrf_token: Option<String>,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let base = validate_server_url(&settings.server_url).map_err(SyncError::Config)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Some(cookie) = &settings.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| SyncError::Config(format!("invalid session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let mut builder = Client::builder()
            .use_preconfigured_tls(create_tls_config()?)
            .default_headers(headers);
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base,
            endpoints: settings.endpoints.clone(),
            csrf_token: settings.csrf_token.clone(),
        })
    }

    fn url(&self, template: &str, conversation: Option<ConversationId>, message: Option<i64>) -> Result<Url> {
        let mut path = template.to_string();
        if let Some(id) = conversation {
            path = path.replace("{conversation}", &id.to_string());
        }
        if let Some(id) = message {
            path = path.replace("{message}", &id.to_string());
        }
        self.base
            .join(&path)
            .map_err(|e| SyncError::Config(format!("bad endpoint {:?}: {}", path, e)))
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn fetch_new(&self, conversation: ConversationId, after: Option<i64>) -> Result<Vec<Message>> {
        let mut url = self.url(&self.endpoints.new_messages, Some(conversation), None)?;
        if let Some(after) = after {
            url.query_pairs_mut()
                .append_pair("last_message_id", &after.to_string());
        }
        let body: NewMessagesResponse = self.get_json(url).await?;
        let messages = decode_messages(body.messages);
        tracing::debug!(conversation_id = conversation, after, count = messages.len(), "fetched new messages");
        Ok(messages)
    }

    async fn fetch_older(
        &self,
        conversation: ConversationId,
        before: Option<i64>,
        limit: usize,
    ) -> Result<HistoryPage> {
        let mut url = self.url(&self.endpoints.history, Some(conversation), None)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(before) = before {
                query.append_pair("before", &before.to_string());
            }
            query.append_pair("limit", &limit.to_string());
        }
        let body: HistoryResponse = self.get_json(url).await?;
        let messages = decode_messages(body.messages);
        tracing::debug!(conversation_id = conversation, before, count = messages.len(), "fetched history page");
        Ok(HistoryPage {
            messages,
            has_more: body.has_more,
        })
    }

    async fn send(&self, conversation: ConversationId, outgoing: &OutgoingMessage) -> Result<Option<Message>> {
        let url = self.url(&self.endpoints.send, Some(conversation), None)?;

        let mut form = Form::new().text("content", outgoing.content.clone());
        if let Some(file) = &outgoing.file {
            form = form.part(
                "file",
                Part::bytes(file.bytes.clone()).file_name(file.file_name.clone()),
            );
        }

        let response = self.post(url).multipart(form).send().await?;
        let body: SendResponse = Self::read_json(response).await?;
        if !body.success {
            let reason = body.error.unwrap_or_else(|| "send rejected".to_string());
            return Err(SyncError::InvalidMessage(reason));
        }
        Ok(body
            .message
            .and_then(|value| decode_messages(vec![value]).into_iter().next()))
    }

    async fn mark_read(&self, message_id: i64) -> Result<()> {
        let url = self.url(&self.endpoints.mark_read, None, Some(message_id))?;
        let response = self.post(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64> {
        let url = self.url(&self.endpoints.unread_count, None, None)?;
        let body: UnreadCountResponse = self.get_json(url).await?;
        Ok(body.unread_count)
    }
}
