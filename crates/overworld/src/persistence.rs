//! Sign-in and save-slot collaborators.
//!
//! The game treats both as fallible remote calls. [`LocalProfileBackend`]
//! keeps everything under the profiles directory so the game runs offline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use engine::{write_json_atomic, write_text_atomic, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const SESSION_FILE_NAME: &str = "session.json";
pub const SAVES_DIR_NAME: &str = "saves";
pub const LOCAL_PROVIDER: &str = "local";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session file {path} is corrupt: {source}")]
    CorruptSession {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("user id {0:?} cannot name a save slot")]
    InvalidUserId(String),
    #[error("sign-in provider {0:?} is not supported")]
    UnsupportedProvider(String),
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    pub provider: String,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, provider: &str) -> Result<UserSession, BackendError>;

    /// The current session, if any. `None` means the player must sign in.
    async fn get_session(&self) -> Result<Option<UserSession>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait SaveStore: Send + Sync {
    async fn save_state(&self, user_id: &str, payload: &str) -> Result<(), BackendError>;

    /// The stored payload, or `None` when the user has never saved.
    async fn load_state(&self, user_id: &str) -> Result<Option<String>, BackendError>;
}

/// Profile storage on the local filesystem, one slot per user.
#[derive(Debug, Clone)]
pub struct LocalProfileBackend {
    profiles_dir: PathBuf,
    local_user: String,
}

impl LocalProfileBackend {
    pub fn new(profiles_dir: impl Into<PathBuf>, local_user: impl Into<String>) -> Self {
        Self {
            profiles_dir: profiles_dir.into(),
            local_user: local_user.into(),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.profiles_dir.join(SESSION_FILE_NAME)
    }

    pub fn save_path(&self, user_id: &str) -> Result<PathBuf, BackendError> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BackendError::InvalidUserId(user_id.to_string()));
        }
        Ok(self
            .profiles_dir
            .join(SAVES_DIR_NAME)
            .join(format!("{user_id}.save.json")))
    }
}

#[async_trait]
impl AuthBackend for LocalProfileBackend {
    async fn sign_in(&self, provider: &str) -> Result<UserSession, BackendError> {
        if provider != LOCAL_PROVIDER {
            return Err(BackendError::UnsupportedProvider(provider.to_string()));
        }
        let session = UserSession {
            user_id: self.local_user.clone(),
            provider: provider.to_string(),
        };
        write_json_atomic(&self.session_path(), &session)?;
        info!(user_id = session.user_id.as_str(), provider, "signed_in");
        Ok(session)
    }

    async fn get_session(&self) -> Result<Option<UserSession>, BackendError> {
        let path = self.session_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| BackendError::CorruptSession { path, source })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let path = self.session_path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(BackendError::Remove { path, source }),
        }
        info!("signed_out");
        Ok(())
    }
}

#[async_trait]
impl SaveStore for LocalProfileBackend {
    async fn save_state(&self, user_id: &str, payload: &str) -> Result<(), BackendError> {
        let path = self.save_path(user_id)?;
        write_text_atomic(&path, payload)?;
        debug!(user_id, path = %path.display(), bytes = payload.len(), "save_slot_written");
        Ok(())
    }

    async fn load_state(&self, user_id: &str) -> Result<Option<String>, BackendError> {
        let path = self.save_path(user_id)?;
        read_optional(&path)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, BackendError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(BackendError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_survives_until_sign_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalProfileBackend::new(dir.path(), "player");

        assert_eq!(backend.get_session().await.expect("empty"), None);

        let session = backend.sign_in(LOCAL_PROVIDER).await.expect("sign in");
        assert_eq!(session.user_id, "player");
        assert_eq!(
            backend.get_session().await.expect("session"),
            Some(session)
        );

        backend.sign_out().await.expect("sign out");
        assert_eq!(backend.get_session().await.expect("signed out"), None);
        backend.sign_out().await.expect("second sign out is a no-op");
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalProfileBackend::new(dir.path(), "player");

        let error = backend.sign_in("github").await.expect_err("provider");
        assert!(matches!(error, BackendError::UnsupportedProvider(_)));
        assert!(!backend.session_path().exists());
    }

    #[tokio::test]
    async fn save_slot_round_trips_and_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalProfileBackend::new(dir.path(), "player");

        assert_eq!(backend.load_state("player").await.expect("empty"), None);

        backend.save_state("player", "{\"a\":1}").await.expect("save");
        backend.save_state("player", "{\"a\":2}").await.expect("overwrite");

        assert_eq!(
            backend.load_state("player").await.expect("load").as_deref(),
            Some("{\"a\":2}")
        );
        assert!(dir
            .path()
            .join(SAVES_DIR_NAME)
            .join("player.save.json")
            .exists());
    }

    #[tokio::test]
    async fn path_like_user_ids_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalProfileBackend::new(dir.path(), "player");

        let error = backend
            .save_state("../escape", "{}")
            .await
            .expect_err("invalid id");
        assert!(matches!(error, BackendError::InvalidUserId(_)));
    }

    #[tokio::test]
    async fn corrupt_session_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalProfileBackend::new(dir.path(), "player");
        fs::write(backend.session_path(), "not json").expect("write");

        assert!(matches!(
            backend.get_session().await,
            Err(BackendError::CorruptSession { .. })
        ));
    }
}
