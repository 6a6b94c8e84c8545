/// The authenticated caller of a request
///
/// Authentication middleware resolves a bearer token or a session cookie
/// into an [`Identity`] and places it in the request extensions. Handlers
/// pass it to the policy gate in [`crate::auth::policy`].

use serde::Serialize;

use crate::auth::token::has_scope;
use crate::models::user::{Role, User};

/// How the identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Session cookie from an interactive login
    Session,

    /// API bearer token
    Token,
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub method: AuthMethod,

    /// Token scopes; `None` means unrestricted
    pub scopes: Option<Vec<String>>,

    pub token_id: Option<i64>,
    pub session_id: Option<i64>,
}

impl Identity {
    /// Identity for a session login
    pub fn from_session(user: &User, session_id: i64) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            method: AuthMethod::Session,
            scopes: None,
            token_id: None,
            session_id: Some(session_id),
        }
    }

    /// Identity for a bearer token
    ///
    /// A token issued without scopes carries the full rights of its user.
    pub fn from_token(user: &User, token_id: i64, scopes: Vec<String>) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            method: AuthMethod::Token,
            scopes: if scopes.is_empty() { None } else { Some(scopes) },
            token_id: Some(token_id),
            session_id: None,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    pub fn is_session(&self) -> bool {
        self.method == AuthMethod::Session
    }

    /// Checks a resource scope such as `accounts:read`
    ///
    /// Sessions and unscoped tokens always pass.
    pub fn has_scope(&self, required: &str) -> bool {
        match &self.scopes {
            None => true,
            Some(scopes) => has_scope(scopes, required),
        }
    }
}
