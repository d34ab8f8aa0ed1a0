//! Authenticated vendor sessions and the single-retry call dispatcher.

use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{Credential, CredentialProvider, CredentialState, is_past_expiry};
use crate::error::VendorError;

/// HTTP session bound to one access token.
#[derive(Clone)]
pub struct ClientHandle {
    http: Client,
    base_url: String,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("base_url", &self.base_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl ClientHandle {
    pub fn new(http: Client, base_url: impl Into<String>, credential: &Credential) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: credential.access_token.clone(),
            expires_at: credential.expires_at,
        }
    }

    /// A new handle on the same transport, bound to `credential`.
    pub fn rebind(&self, credential: &Credential) -> Self {
        Self::new(self.http.clone(), self.base_url.clone(), credential)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.access_token)
    }

    pub fn is_expired(&self) -> bool {
        is_past_expiry(self.expires_at)
    }
}

pub async fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, VendorError> {
    let response = send(request).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| VendorError::Response(err.to_string()))
}

/// Sends a request whose response body is irrelevant.
pub async fn read_empty(request: RequestBuilder) -> Result<(), VendorError> {
    send(request).await.map(|_| ())
}

async fn send(request: RequestBuilder) -> Result<Response, VendorError> {
    let response = request
        .send()
        .await
        .map_err(|err| VendorError::Request(err.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "vendor returned error status");

    let message = extract_error_message(&body).unwrap_or_else(|| {
        if body.is_empty() {
            status.to_string()
        } else {
            body
        }
    });
    Err(VendorError::from_status(status.as_u16(), message, retry_after))
}

/// Pulls a human-readable message out of Google, Spotify or OAuth error bodies.
fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let error = value.get("error")?;

    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error_description").and_then(Value::as_str))
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// What a call site does with a vendor failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Propagate,
    /// Log the failure and hand back the operation's empty result.
    EmptyOnError,
}

impl FailurePolicy {
    pub fn apply<T: Default>(
        self,
        operation: &str,
        result: Result<T, VendorError>,
    ) -> Result<T, VendorError> {
        match (self, result) {
            (_, Ok(value)) => Ok(value),
            (_, Err(err @ VendorError::Validation(_))) => Err(err),
            (Self::EmptyOnError, Err(err)) => {
                warn!(operation, error = %err, "vendor call failed, returning empty result");
                Ok(T::default())
            }
            (Self::Propagate, Err(err)) => Err(err),
        }
    }
}

/// One vendor integration's credential plus the handle bound to it.
///
/// Calls go through [`Session::execute`], which renews the credential and
/// retries once when the vendor rejects the token.
#[derive(Debug)]
pub struct Session {
    credentials: Mutex<CredentialProvider>,
    handle: Mutex<ClientHandle>,
}

impl Session {
    pub async fn open(
        mut credentials: CredentialProvider,
        http: Client,
        base_url: impl Into<String>,
    ) -> Result<Self, VendorError> {
        let credential = credentials.obtain().await?;
        let handle = ClientHandle::new(http, base_url, &credential);
        Ok(Self {
            credentials: Mutex::new(credentials),
            handle: Mutex::new(handle),
        })
    }

    pub async fn credential_state(&self) -> Result<CredentialState, VendorError> {
        Ok(self.credentials.lock().await.state().await?)
    }

    /// Current handle, refreshed first if its token has already expired.
    pub async fn handle(&self) -> Result<ClientHandle, VendorError> {
        let mut handle = self.handle.lock().await;
        if handle.is_expired() {
            debug!("bound token expired, obtaining a fresh one");
            let credential = self.credentials.lock().await.obtain().await?;
            *handle = handle.rebind(&credential);
        }
        Ok(handle.clone())
    }

    pub async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, VendorError>
    where
        F: Fn(ClientHandle) -> Fut,
        Fut: Future<Output = Result<T, VendorError>>,
    {
        let handle = self.handle().await?;
        match call(handle).await {
            Err(err) if err.is_auth_rejection() => {
                warn!(operation, error = %err, "vendor rejected credential, renewing and retrying once");
                let handle = self.renew().await?;
                call(handle).await
            }
            result => result,
        }
    }

    async fn renew(&self) -> Result<ClientHandle, VendorError> {
        let mut handle = self.handle.lock().await;
        let credential = self.credentials.lock().await.renew().await?;
        *handle = handle.rebind(&credential);
        Ok(handle.clone())
    }
}
