mod middleware;
mod session;
mod token;

pub use middleware::{AuthError, RequireSession, SESSION_COOKIE, extract_session_token};
pub use session::{
    IssuedSession, MAX_PASSWORD_LEN, SessionContext, SessionError, login, logout,
    resolve_session, set_password, validate_password,
};
pub use token::{SecretHasher, parse_token};
