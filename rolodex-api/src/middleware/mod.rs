/// Middleware modules for the API server
///
/// - `auth`: Resolves bearer tokens and session cookies into an identity
/// - `security`: Security headers

pub mod auth;
pub mod security;
