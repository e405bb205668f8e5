use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{SecretHasher, parse_token};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::tracker::IdentityProvider;
use crate::types::Session;

pub const MAX_PASSWORD_LEN: usize = 1024;

/// The identity attached to a request, passed explicitly into every table
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    owner_id: Option<String>,
    session_id: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            session_id: None,
        }
    }

    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            owner_id: Some(session.owner_id.clone()),
            session_id: Some(session.id.clone()),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

impl IdentityProvider for SessionContext {
    fn current_owner(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    InvalidToken,
    Expired,
    InternalError,
}

/// A freshly created session together with the raw token handed to the client.
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

pub fn validate_password(password: &str) -> std::result::Result<(), String> {
    if password.trim().is_empty() {
        return Err("Password cannot be empty".to_string());
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!("Password cannot exceed {MAX_PASSWORD_LEN} bytes"));
    }
    Ok(())
}

/// Checks `password` against every owner and opens a session for the first
/// match. Returns `None` when no owner has this password.
pub fn login(
    store: &dyn Store,
    hasher: &SecretHasher,
    password: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<Option<IssuedSession>> {
    match store.delete_expired_sessions(now) {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired sessions"),
        Err(e) => tracing::warn!("Failed to purge expired sessions: {e}"),
    }

    for owner in store.list_owners()? {
        if !hasher.verify(password, &owner.password_hash)? {
            continue;
        }

        let (token, lookup, hash) = hasher.generate_token()?;
        let session = Session {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id,
            token_hash: hash,
            token_lookup: lookup,
            created_at: now,
            expires_at: now + ttl,
        };
        store.create_session(&session)?;

        tracing::info!(owner = %owner.name, session_id = %session.id, "Opened session");
        return Ok(Some(IssuedSession { token, session }));
    }

    Ok(None)
}

/// Resolves a raw session token into the caller's identity.
pub fn resolve_session(
    store: &dyn Store,
    hasher: &SecretHasher,
    raw_token: &str,
    now: DateTime<Utc>,
) -> std::result::Result<SessionContext, SessionError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| SessionError::InvalidToken)?;

    let session = store
        .get_session_by_lookup(&lookup)
        .map_err(|_| SessionError::InternalError)?
        .ok_or(SessionError::InvalidToken)?;

    if !hasher
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionError::InternalError)?
    {
        return Err(SessionError::InvalidToken);
    }

    if session.is_expired(now) {
        return Err(SessionError::Expired);
    }

    Ok(SessionContext::from_session(&session))
}

/// Ends the session behind `context`. Returns false if it was already gone.
pub fn logout(store: &dyn Store, context: &SessionContext) -> Result<bool> {
    match context.session_id() {
        Some(id) => store.delete_session(id),
        None => Ok(false),
    }
}

/// Replaces an owner's password and revokes all of their sessions.
pub fn set_password(
    store: &dyn Store,
    hasher: &SecretHasher,
    owner_id: &str,
    password: &str,
) -> Result<usize> {
    validate_password(password).map_err(Error::Config)?;
    let hash = hasher.hash(password)?;
    store.update_owner_password(owner_id, &hash)?;
    store.delete_owner_sessions(owner_id)
}
