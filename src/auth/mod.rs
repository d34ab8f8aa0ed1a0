//! Credential lifecycle for the vendor integrations.
//!
//! A [`CredentialProvider`] owns one token file for a vendor+scope+identity
//! triple and moves it through `Absent -> Valid -> Expired -> Valid | Revoked`.
//! Talking to the vendor's OAuth endpoints goes through [`TokenEndpoint`] so
//! the lifecycle can be exercised without a browser.

mod oauth;
mod store;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AuthError;

pub use oauth::{OAuthClientConfig, OAuthEndpoint};
pub use store::{DEFAULT_TOKEN_DIR, TokenFile};

/// Tokens are treated as expired this long before the vendor's deadline.
const EXPIRY_WINDOW_MINUTES: i64 = 5;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn is_expired(&self) -> bool {
        is_past_expiry(self.expires_at)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Whether every requested scope was granted to this credential.
    pub fn covers(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|scope| self.scopes.contains(scope))
    }
}

pub(crate) fn is_past_expiry(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_some_and(|at| at <= Utc::now() + Duration::minutes(EXPIRY_WINDOW_MINUTES))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Valid,
    Expired,
    Revoked,
}

/// Vendor OAuth operations the provider relies on.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Runs the interactive authorization flow for `scopes`.
    async fn authorize(&self, scopes: &[String]) -> Result<Credential, AuthError>;

    /// Exchanges the credential's refresh token for a new access token.
    /// Must return [`AuthError::Revoked`] when the vendor rejects the grant.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}

pub struct CredentialProvider {
    endpoint: Arc<dyn TokenEndpoint>,
    store: TokenFile,
    scopes: Vec<String>,
    revoked: bool,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("store", &self.store)
            .field("scopes", &self.scopes)
            .field("revoked", &self.revoked)
            .finish()
    }
}

impl CredentialProvider {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, store: TokenFile, scopes: Vec<String>) -> Self {
        Self {
            endpoint,
            store,
            scopes,
            revoked: false,
        }
    }

    pub fn store(&self) -> &TokenFile {
        &self.store
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub async fn state(&self) -> Result<CredentialState, AuthError> {
        if self.revoked {
            return Ok(CredentialState::Revoked);
        }
        Ok(match self.store.load().await? {
            None => CredentialState::Absent,
            Some(credential) if credential.is_expired() => CredentialState::Expired,
            Some(_) => CredentialState::Valid,
        })
    }

    /// Returns a usable credential, refreshing or authorizing as needed.
    pub async fn obtain(&mut self) -> Result<Credential, AuthError> {
        match self.store.load().await? {
            Some(credential) if !credential.covers(&self.scopes) => {
                debug!(path = %self.store.path().display(), "stored credential lacks requested scopes");
                self.authorize().await
            }
            Some(credential) if !credential.is_expired() => Ok(credential),
            Some(credential) if credential.can_refresh() => self.refresh(credential).await,
            _ => self.authorize().await,
        }
    }

    /// Replaces a credential the vendor just rejected, even if it has not
    /// reached its expiry yet.
    pub async fn renew(&mut self) -> Result<Credential, AuthError> {
        match self.store.load().await? {
            Some(credential) if credential.can_refresh() && credential.covers(&self.scopes) => {
                self.refresh(credential).await
            }
            _ => self.authorize().await,
        }
    }

    async fn refresh(&mut self, stale: Credential) -> Result<Credential, AuthError> {
        match self.endpoint.refresh(&stale).await {
            Ok(mut fresh) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = stale.refresh_token;
                }
                self.store.save(&fresh).await?;
                info!(path = %self.store.path().display(), "access token refreshed");
                Ok(fresh)
            }
            Err(AuthError::Revoked(message)) => {
                warn!(
                    path = %self.store.path().display(),
                    reason = %message,
                    "vendor revoked stored credential, discarding token file"
                );
                self.store.remove().await?;
                self.revoked = true;
                Err(AuthError::Revoked(message))
            }
            Err(err) => Err(err),
        }
    }

    async fn authorize(&mut self) -> Result<Credential, AuthError> {
        info!(path = %self.store.path().display(), "starting interactive authorization");
        let credential = self.endpoint.authorize(&self.scopes).await?;
        self.store.save(&credential).await?;
        self.revoked = false;
        Ok(credential)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::{Credential, CredentialProvider, TokenEndpoint, TokenFile};
    use crate::error::AuthError;

    /// Token endpoint that hands out fixed tokens and counts its calls.
    pub(crate) struct ScriptedEndpoint {
        authorized_token: String,
        refreshed_token: String,
        revoke_on_refresh: bool,
        authorize_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    impl ScriptedEndpoint {
        pub(crate) fn new(authorized_token: &str, refreshed_token: &str) -> Self {
            Self {
                authorized_token: authorized_token.to_string(),
                refreshed_token: refreshed_token.to_string(),
                revoke_on_refresh: false,
                authorize_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn revoking(mut self) -> Self {
            self.revoke_on_refresh = true;
            self
        }

        pub(crate) fn authorize_calls(&self) -> usize {
            self.authorize_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenEndpoint for ScriptedEndpoint {
        async fn authorize(&self, scopes: &[String]) -> Result<Credential, AuthError> {
            self.authorize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(live_credential(&self.authorized_token, scopes))
        }

        async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.revoke_on_refresh {
                return Err(AuthError::Revoked("invalid_grant".to_string()));
            }
            Ok(Credential::new(self.refreshed_token.clone())
                .with_expires_at(Utc::now() + Duration::hours(1))
                .with_scopes(credential.scopes.clone()))
        }
    }

    pub(crate) fn live_credential(token: &str, scopes: &[String]) -> Credential {
        Credential::new(token)
            .with_refresh_token("refresh-token")
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_scopes(scopes.to_vec())
    }

    /// Provider whose token file already holds an unexpired `token`.
    pub(crate) async fn seeded_provider(
        dir: &Path,
        endpoint: Arc<ScriptedEndpoint>,
        token: &str,
        scopes: &[&str],
    ) -> CredentialProvider {
        let scopes = scopes.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let store = TokenFile::for_api(dir, "test", "v1", "");
        store
            .save(&live_credential(token, &scopes))
            .await
            .expect("seed token file");
        CredentialProvider::new(endpoint, store, scopes)
    }
}
