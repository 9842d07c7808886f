use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{decode_claims, Role, TokenClaims};

/// Explicit credential context shared with the API client.
///
/// Login and logout update it synchronously; every outbound request reads it
/// at call time, so a request issued after logout can never carry the stale
/// credential. Cloning shares the same underlying slot.
#[derive(Clone, Default)]
pub struct SessionContext {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if authenticated.
    pub fn token(&self) -> Option<String> {
        self.token.read().expect("session lock poisoned").clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().expect("session lock poisoned").is_some()
    }

    pub(crate) fn install(&self, token: String) {
        *self.token.write().expect("session lock poisoned") = Some(token);
    }

    fn clear(&self) {
        *self.token.write().expect("session lock poisoned") = None;
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("login failed: {0}")]
    Transport(ApiError),
}

/// Holds the operator's session: the live credential context plus the token
/// persisted on disk so a restart resumes the session without a re-login.
pub struct SessionStore {
    context: SessionContext,
    token_path: PathBuf,
}

impl SessionStore {
    pub fn new(context: SessionContext, token_path: PathBuf) -> Self {
        Self {
            context,
            token_path,
        }
    }

    pub fn context(&self) -> SessionContext {
        self.context.clone()
    }

    /// Reinstate a persisted token, if one exists. Called once at startup,
    /// before any view is selected, so the first outbound call is already
    /// authenticated.
    pub fn restore(&self) -> bool {
        match fs::read_to_string(&self.token_path) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    return false;
                }
                debug!("restored persisted session token");
                self.context.install(token);
                true
            }
            Err(_) => false,
        }
    }

    /// Authenticate against the backend. On success the token is persisted
    /// and installed as the credential for all subsequent requests.
    pub async fn login(
        &self,
        api: &ApiClient,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let token = api.login(username, password).await.map_err(|e| match e {
            ApiError::Server { status, message } => AuthError::Rejected { status, message },
            other => AuthError::Transport(other),
        })?;

        if let Err(e) = fs::write(&self.token_path, &token) {
            warn!("failed to persist session token: {}", e);
        }
        self.context.install(token);
        Ok(())
    }

    /// Drop the session. Unconditional from the client's perspective: the
    /// credential and the persisted token are always cleared, whatever the
    /// state of the backend.
    pub fn logout(&self) {
        self.context.clear();
        if let Err(e) = fs::remove_file(&self.token_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove persisted token: {}", e);
            }
        }
    }

    /// Claims decoded from the current token, if any.
    pub fn current_claims(&self) -> Option<TokenClaims> {
        let token = self.context.token()?;
        match decode_claims(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!("failed to decode session claims: {}", e);
                None
            }
        }
    }

    /// Role claim of the current session. A malformed token downgrades to
    /// `User` with a logged warning rather than failing — the console must
    /// keep working, just with least privilege.
    pub fn current_role(&self) -> Role {
        self.current_claims().map(|c| c.role).unwrap_or_default()
    }
}
