//! Gmail REST API v1 client for the signed-in mailbox (`users/me`).

mod normalize;
mod tools;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::info;

use crate::auth::{CredentialProvider, DEFAULT_TOKEN_DIR, OAuthClientConfig, OAuthEndpoint, TokenFile};
use crate::error::{ConfigError, VendorError};
use crate::pagination::{Page, PageRequest, collect};
use crate::session::{FailurePolicy, Session, read_empty, read_json};

pub use normalize::{EmailMessage, Header, MessagePart, PartBody, RawMessage};
pub use tools::all_tools;

use normalize::GMAIL_BASE64;

const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const MAX_LIST_PAGE_SIZE: usize = 500;

pub const GMAIL_SCOPES: &[&str] = &["https://mail.google.com/"];

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub oauth: OAuthClientConfig,
    pub token_dir: PathBuf,
    /// Appended to the token file name so several identities can coexist.
    pub token_suffix: String,
    pub scopes: Vec<String>,
    pub api_base_url: Option<String>,
}

impl GmailConfig {
    pub fn new(oauth: OAuthClientConfig) -> Self {
        Self {
            oauth,
            token_dir: PathBuf::from(DEFAULT_TOKEN_DIR),
            token_suffix: String::new(),
            scopes: GMAIL_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            api_base_url: None,
        }
    }

    pub fn from_client_secrets_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        OAuthClientConfig::from_google_client_secrets(path).map(Self::new)
    }

    pub fn token_file(&self) -> TokenFile {
        TokenFile::for_api(&self.token_dir, "gmail", "v1", &self.token_suffix)
    }

    fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    #[serde(default, alias = "threadId")]
    pub thread_id: String,
    #[serde(default, alias = "labelIds")]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessages {
    pub count: usize,
    pub messages: Vec<EmailMessage>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "messageListVisibility")]
    pub message_list_visibility: Option<String>,
    #[serde(default, alias = "labelListVisibility")]
    pub label_list_visibility: Option<String>,
    #[serde(rename = "type", default)]
    pub label_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: u64,
    #[serde(default)]
    pub threads_total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug)]
pub struct GmailClient {
    session: Session,
    sender: OnceCell<String>,
}

impl GmailClient {
    /// Opens a session, running the browser consent flow if no usable token
    /// file exists yet.
    pub async fn connect(config: GmailConfig) -> Result<Self, VendorError> {
        let endpoint = OAuthEndpoint::new(config.oauth.clone())?;
        let provider =
            CredentialProvider::new(Arc::new(endpoint), config.token_file(), config.scopes.clone());
        Self::with_credentials(&config, provider).await
    }

    pub async fn with_credentials(
        config: &GmailConfig,
        credentials: CredentialProvider,
    ) -> Result<Self, VendorError> {
        let http = Client::builder()
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        let session = Session::open(credentials, http, config.base_url()).await?;
        info!(token_file = %config.token_file().path().display(), "gmail session ready");

        Ok(Self {
            session,
            sender: OnceCell::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends a plain-text message with optional file attachments.
    ///
    /// `to` may hold several comma-separated addresses.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<SentMessage, VendorError> {
        let mut files = Vec::with_capacity(attachments.len());
        for path in attachments {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    VendorError::validation(format!("attachment {} has no file name", path.display()))
                })?;
            files.push((name, tokio::fs::read(path).await?));
        }

        let from = self.sender_address().await?;
        let raw = compose_raw(&from, to, subject, body, files)?;
        let payload = json!({ "raw": GMAIL_BASE64.encode(raw) });

        let sent: SentMessage = self.post("send_email", "messages/send", &payload).await?;
        info!(id = %sent.id, "message sent");
        Ok(sent)
    }

    /// Runs a Gmail search query and fetches every matching message in full.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
        policy: FailurePolicy,
    ) -> Result<EmailMessages, VendorError> {
        let result = self.search_messages(query, max_results, page_token).await;
        policy.apply("search_emails", result)
    }

    async fn search_messages(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<EmailMessages, VendorError> {
        let mut resume_from = page_token.map(str::to_string);
        let ids = collect(max_results, MAX_LIST_PAGE_SIZE, move |request: PageRequest| {
            let token = request.token.or_else(|| resume_from.take());
            async move {
                let mut params = vec![
                    ("q", query.to_string()),
                    ("maxResults", request.size.to_string()),
                ];
                if let Some(token) = token {
                    params.push(("pageToken", token));
                }
                let list: MessageList = self.fetch("search_emails", "messages", &params).await?;
                Ok::<_, VendorError>(Page::new(list.messages, list.next_page_token))
            }
        })
        .await?;

        let mut messages = Vec::with_capacity(ids.items.len());
        for message in &ids.items {
            messages.push(self.get(&message.id).await?);
        }

        Ok(EmailMessages {
            count: messages.len(),
            messages,
            next_page_token: ids.next,
        })
    }

    pub async fn get(&self, id: &str) -> Result<EmailMessage, VendorError> {
        let path = message_path(id)?;
        let raw: RawMessage = self
            .fetch("get_email", &path, &[("format", "full".to_string())])
            .await?;
        Ok(raw.into())
    }

    /// Moves a message to the trash.
    pub async fn delete(&self, id: &str, policy: FailurePolicy) -> Result<(), VendorError> {
        let trash_path = format!("{}/trash", message_path(id)?);
        let path = trash_path.as_str();
        let result = self
            .session
            .execute("delete_email", |handle| async move {
                read_empty(handle.request(Method::POST, path).header(CONTENT_LENGTH, 0)).await
            })
            .await;
        if result.is_ok() {
            info!(id, "message moved to trash");
        }
        policy.apply("delete_email", result)
    }

    pub async fn list_labels(&self, policy: FailurePolicy) -> Result<Labels, VendorError> {
        let result = self.fetch("list_labels", "labels", &[]).await;
        policy.apply("list_labels", result)
    }

    pub async fn profile(&self) -> Result<Profile, VendorError> {
        self.fetch("profile", "profile", &[]).await
    }

    async fn sender_address(&self) -> Result<String, VendorError> {
        self.sender
            .get_or_try_init(|| async { self.profile().await.map(|profile| profile.email_address) })
            .await
            .cloned()
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VendorError> {
        self.session
            .execute(operation, |handle| async move {
                read_json(handle.request(Method::GET, path).query(query)).await
            })
            .await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &Value,
    ) -> Result<T, VendorError> {
        self.session
            .execute(operation, |handle| async move {
                read_json(handle.request(Method::POST, path).json(body)).await
            })
            .await
    }
}

fn message_path(id: &str) -> Result<String, VendorError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(VendorError::validation("message id must not be empty"));
    }
    Ok(format!("messages/{id}"))
}

/// Builds the RFC 5322 message Gmail expects in the `raw` field.
fn compose_raw(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachments: Vec<(String, Vec<u8>)>,
) -> Result<Vec<u8>, VendorError> {
    let mailbox = |address: &str| {
        address.trim().parse::<Mailbox>().map_err(|err| {
            VendorError::validation(format!("invalid address {:?}: {err}", address.trim()))
        })
    };

    let mut builder = Message::builder().from(mailbox(from)?).subject(subject);
    let mut recipients = 0;
    for address in to.split(',').filter(|address| !address.trim().is_empty()) {
        builder = builder.to(mailbox(address)?);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(VendorError::validation("at least one recipient is required"));
    }

    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|err| VendorError::validation(err.to_string()))?;
    let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
    for (name, bytes) in attachments {
        multipart = multipart.singlepart(Attachment::new(name).body(bytes, octet_stream.clone()));
    }

    let message = builder
        .multipart(multipart)
        .map_err(|err| VendorError::validation(err.to_string()))?;
    Ok(message.formatted())
}
