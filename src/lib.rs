//! Gmail and Spotify as agent tools.
//!
//! - `GmailClient` / `SpotifyClient` with OAuth token files that refresh on
//!   expiry and retry once when the vendor rejects a token
//! - Bounded pagination over vendor list endpoints
//! - `ToolSpec` registry with JSON schema validation and typed dependencies

pub mod auth;
pub mod error;
pub mod gmail;
pub mod pagination;
pub mod session;
pub mod spotify;
pub mod tools;

pub use auth::{Credential, CredentialProvider, CredentialState, TokenEndpoint, TokenFile};
pub use error::{AuthError, ConfigError, SchemaError, ToolError, VendorError};
pub use gmail::{EmailMessage, GmailClient, GmailConfig};
pub use session::{FailurePolicy, Session};
pub use spotify::{SpotifyClient, SpotifyConfig, TimeRange, VisibilityFilter};
pub use tools::{DependencyMap, ToolOutcome, ToolSpec, Toolbox};
