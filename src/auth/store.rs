use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::error::AuthError;

/// Directory (relative to the working directory) holding persisted tokens.
pub const DEFAULT_TOKEN_DIR: &str = "token files";

/// On-disk JSON file holding one vendor credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `token_<api>_<version><suffix>.json` inside `dir`.
    pub fn for_api(dir: impl AsRef<Path>, api_name: &str, api_version: &str, suffix: &str) -> Self {
        Self::new(
            dir.as_ref()
                .join(format!("token_{api_name}_{api_version}{suffix}.json")),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Reads the stored credential. A missing file is `None`; so is an
    /// unparseable one, which is left for the next `save` to overwrite.
    pub async fn load(&self) -> Result<Option<Credential>, AuthError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.error(err)),
        };

        match serde_json::from_str::<Credential>(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| self.error(err))?;
        }

        let json = serde_json::to_string_pretty(credential).map_err(|err| self.error(err))?;
        fs::write(&self.path, json)
            .await
            .map_err(|err| self.error(err))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|err| self.error(err))?;
        }

        debug!(path = %self.path.display(), "token file written");
        Ok(())
    }

    pub async fn remove(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "token file removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.error(err)),
        }
    }

    fn error(&self, err: impl std::fmt::Display) -> AuthError {
        AuthError::TokenFile {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
