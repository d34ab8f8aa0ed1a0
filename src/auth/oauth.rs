use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use reqwest::Url;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::auth::{Credential, TokenEndpoint};
use crate::error::{AuthError, ConfigError};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_LOOPBACK_REDIRECT: &str = "http://localhost";

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    /// Extra authorization-request parameters (Google needs
    /// `access_type=offline` to hand out refresh tokens).
    pub extra_params: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: Option<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl OAuthClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: redirect_url.into(),
            extra_params: Vec::new(),
        }
    }

    pub fn with_extra_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }

    /// Reads a Google Cloud console client secrets JSON (`installed` or `web`).
    pub fn from_google_client_secrets(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let secrets_error = |message: String| ConfigError::ClientSecrets {
            path: path.display().to_string(),
            message,
        };

        let contents = std::fs::read_to_string(path).map_err(|err| secrets_error(err.to_string()))?;
        let file = serde_json::from_str::<ClientSecretsFile>(&contents)
            .map_err(|err| secrets_error(err.to_string()))?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| secrets_error("expected an `installed` or `web` section".to_string()))?;

        let redirect_url = secrets
            .redirect_uris
            .into_iter()
            .next()
            .unwrap_or_else(|| GOOGLE_LOOPBACK_REDIRECT.to_string());

        Ok(Self::new(
            secrets.client_id,
            secrets.client_secret,
            secrets.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
            secrets.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            redirect_url,
        )
        .with_extra_param("access_type", "offline")
        .with_extra_param("prompt", "consent"))
    }
}

/// Authorization-code flow with PKCE against a vendor's OAuth server.
///
/// `authorize` prints the consent URL and waits for the browser redirect on
/// the loopback address named by `redirect_url` (port 0 or no port picks a
/// free one).
#[derive(Debug, Clone)]
pub struct OAuthEndpoint {
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl OAuthEndpoint {
    pub fn new(config: OAuthClientConfig) -> Result<Self, ConfigError> {
        parse_url(&config.auth_url, AuthUrl::new)?;
        parse_url(&config.token_url, TokenUrl::new)?;
        parse_url(&config.redirect_url, RedirectUrl::new)?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { config, http })
    }

    fn client(&self, redirect_url: &str) -> Result<ConfiguredClient, ConfigError> {
        let mut client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(parse_url(&self.config.auth_url, AuthUrl::new)?)
            .set_token_uri(parse_url(&self.config.token_url, TokenUrl::new)?)
            .set_redirect_uri(parse_url(redirect_url, RedirectUrl::new)?);
        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }
}

#[async_trait]
impl TokenEndpoint for OAuthEndpoint {
    async fn authorize(&self, scopes: &[String]) -> Result<Credential, AuthError> {
        let (listener, redirect_url) = bind_redirect_listener(&self.config.redirect_url).await?;
        let client = self.client(&redirect_url)?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);
        for scope in scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        for (name, value) in &self.config.extra_params {
            request = request.add_extra_param(name.as_str(), value.as_str());
        }
        let (auth_url, csrf_token) = request.url();

        eprintln!("Open this URL in your browser to authorize access:\n\n{auth_url}\n");
        info!(redirect = %redirect_url, "waiting for oauth redirect");

        let code = receive_code(&listener, csrf_token.secret()).await?;
        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(token_error)?;

        Ok(credential_from_response(&token, None, scopes))
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(AuthError::Revoked(
                "credential carries no refresh token".to_string(),
            ));
        };

        let client = self.client(&self.config.redirect_url)?;
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;

        Ok(credential_from_response(
            &token,
            credential.refresh_token.clone(),
            &credential.scopes,
        ))
    }
}

fn parse_url<T, E: std::fmt::Display>(
    url: &str,
    parse: impl FnOnce(String) -> Result<T, E>,
) -> Result<T, ConfigError> {
    parse(url.to_string()).map_err(|err| ConfigError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })
}

fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response)
            if *response.error() == BasicErrorResponseType::InvalidGrant =>
        {
            AuthError::Revoked(response.to_string())
        }
        other => AuthError::TokenExchange(other.to_string()),
    }
}

fn credential_from_response(
    token: &BasicTokenResponse,
    previous_refresh_token: Option<String>,
    requested_scopes: &[String],
) -> Credential {
    let scopes = token
        .scopes()
        .map(|granted| granted.iter().map(|scope| scope.to_string()).collect())
        .unwrap_or_else(|| requested_scopes.to_vec());

    Credential {
        access_token: token.access_token().secret().clone(),
        refresh_token: token
            .refresh_token()
            .map(|refresh| refresh.secret().clone())
            .or(previous_refresh_token),
        token_type: "Bearer".to_string(),
        expires_at: token
            .expires_in()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl),
        scopes,
    }
}

/// Binds the loopback listener and returns the redirect URL with the bound port.
async fn bind_redirect_listener(redirect_url: &str) -> Result<(TcpListener, String), AuthError> {
    let mut url = Url::parse(redirect_url).map_err(|err| ConfigError::InvalidUrl {
        url: redirect_url.to_string(),
        message: err.to_string(),
    })?;

    let host = match url.host_str() {
        Some("localhost") | None => "127.0.0.1".to_string(),
        Some(host) => host.trim_matches(['[', ']']).to_string(),
    };
    let port = url.port().unwrap_or(0);

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|err| AuthError::Authorization(format!("cannot listen on {host}:{port}: {err}")))?;
    let bound = listener
        .local_addr()
        .map_err(|err| AuthError::Authorization(err.to_string()))?;

    url.set_port(Some(bound.port())).map_err(|()| {
        AuthError::Authorization(format!("redirect url {redirect_url} cannot carry a port"))
    })?;

    Ok((listener, url.to_string()))
}

async fn receive_code(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, peer) = listener
            .accept()
            .await
            .map_err(|err| AuthError::Authorization(err.to_string()))?;

        let mut buffer = vec![0u8; 8192];
        let read = stream
            .read(&mut buffer)
            .await
            .map_err(|err| AuthError::Authorization(err.to_string()))?;
        let request = String::from_utf8_lossy(&buffer[..read]);
        let params = redirect_params(&request);
        debug!(%peer, params = params.len(), "oauth redirect listener received request");

        if let Some(error) = params.get("error") {
            respond(&mut stream, "400 Bad Request", "Authorization was denied.").await;
            return Err(AuthError::Authorization(error.clone()));
        }

        let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
            // Browsers also ask for favicons and the like.
            respond(&mut stream, "404 Not Found", "").await;
            continue;
        };

        if state != expected_state {
            respond(&mut stream, "400 Bad Request", "State mismatch.").await;
            return Err(AuthError::Authorization(
                "oauth state mismatch in redirect".to_string(),
            ));
        }

        respond(
            &mut stream,
            "200 OK",
            "Authorization complete. You can close this window.",
        )
        .await;
        return Ok(code.clone());
    }
}

fn redirect_params(request: &str) -> HashMap<String, String> {
    request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|target| Url::parse(&format!("http://localhost{target}")).ok())
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        debug!(error = %err, "failed to answer oauth redirect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_params_parse_request_line() {
        let params = redirect_params("GET /callback?code=abc&state=xyz HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(params.get("code").map(String::as_str), Some("abc"));
        assert_eq!(params.get("state").map(String::as_str), Some("xyz"));
        assert!(redirect_params("garbage").is_empty());
    }

    #[test]
    fn google_client_secrets_fill_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"id.apps","client_secret":"shh","redirect_uris":["http://localhost"]}}"#,
        )
        .expect("write");

        let config = OAuthClientConfig::from_google_client_secrets(&path).expect("parses");
        assert_eq!(config.client_id, "id.apps");
        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert!(
            config
                .extra_params
                .contains(&("access_type".to_string(), "offline".to_string()))
        );
        assert!(OAuthEndpoint::new(config).is_ok());
    }

    #[test]
    fn client_secrets_without_section_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{}").expect("write");
        assert!(matches!(
            OAuthClientConfig::from_google_client_secrets(&path),
            Err(ConfigError::ClientSecrets { .. })
        ));
    }

    #[tokio::test]
    async fn loopback_listener_accepts_redirect_with_matching_state() {
        let (listener, redirect) = bind_redirect_listener("http://localhost/")
            .await
            .expect("binds");
        let port = Url::parse(&redirect).expect("url").port().expect("port");

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
            stream
                .write_all(b"GET /?code=the-code&state=expected HTTP/1.1\r\n\r\n")
                .await
                .expect("write");
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.expect("read");
            reply
        });

        let code = receive_code(&listener, "expected").await.expect("code");
        assert_eq!(code, "the-code");
        let reply = client.await.expect("join");
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
    }
}
