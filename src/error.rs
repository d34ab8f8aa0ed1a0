use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("client secrets file {path}: {message}")]
    ClientSecrets { path: String, message: String },
    #[error("invalid oauth url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("http client setup failed: {0}")]
    HttpClient(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential revoked by vendor: {0}")]
    Revoked(String),
    #[error("interactive authorization failed: {0}")]
    Authorization(String),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("token file {path}: {message}")]
    TokenFile { path: String, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of one vendor operation, classified so the dispatcher can decide
/// whether a single credential renewal is worth attempting.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("access token rejected: {0}")]
    AuthExpired(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("credential revoked: {0}")]
    AuthRevoked(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited (retry after {retry_after_secs:?}s): {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transient vendor error {status}: {message}")]
    Transient { status: u16, message: String },
    #[error("vendor api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("vendor request failed: {0}")]
    Request(String),
    #[error("vendor response invalid: {0}")]
    Response(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VendorError {
    pub fn from_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            400 => Self::BadRequest(message),
            401 => Self::AuthExpired(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                retry_after_secs,
                message,
            },
            500..=599 => Self::Transient { status, message },
            _ => Self::Api { status, message },
        }
    }

    /// True for the responses that justify renewing the credential once.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::PermissionDenied(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<AuthError> for VendorError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Revoked(message) => Self::AuthRevoked(message),
            other => Self::Auth(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("duplicate tool registered: {0}")]
    Duplicate(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("dependency missing: {0}")]
    MissingDependency(&'static str),
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Vendor(#[from] VendorError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
