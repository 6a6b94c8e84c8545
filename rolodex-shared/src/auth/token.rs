/// API token utilities
///
/// Generation, prefix extraction, bearer extraction and scope matching for
/// API tokens. Persistence and verification against stored digests live in
/// `models::token`.
///
/// # Token Format
///
/// A token is 32 bytes from the operating system RNG encoded as URL-safe
/// base64 without padding: 43 characters, 256 bits of entropy. The first 8
/// characters are stored in the clear as a lookup prefix; the full secret is
/// stored only as an Argon2id digest.
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::token::{generate_token, token_prefix, TOKEN_LENGTH};
///
/// let token = generate_token();
/// assert_eq!(token.len(), TOKEN_LENGTH);
/// assert_eq!(token_prefix(&token), &token[..8]);
/// ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes in a token secret
const TOKEN_BYTES: usize = 32;

/// Length of an encoded token
pub const TOKEN_LENGTH: usize = 43;

/// Number of leading characters stored as the lookup prefix
pub const PREFIX_LENGTH: usize = 8;

/// Longest lifetime a token may be issued with (ten years)
pub const MAX_TTL_SECS: i64 = 315_360_000;

/// Generates a new token secret
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns the lookup prefix of a presented token
///
/// Shorter values are returned whole; they will simply match nothing.
pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(PREFIX_LENGTH) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

/// Picks the bearer value presented with a request
///
/// The `Authorization: Bearer` header takes precedence over the `token`
/// query parameter. Empty values count as absent.
///
/// # Arguments
///
/// * `authorization` - Raw `Authorization` header value, if any
/// * `query_token` - Value of the `token` query parameter, if any
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::token::bearer_value;
///
/// assert_eq!(bearer_value(Some("Bearer abc"), Some("xyz")), Some("abc"));
/// assert_eq!(bearer_value(None, Some("xyz")), Some("xyz"));
/// assert_eq!(bearer_value(Some("Basic Zm9v"), None), None);
/// ```
pub fn bearer_value<'a>(authorization: Option<&'a str>, query_token: Option<&'a str>) -> Option<&'a str> {
    let from_header = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty());

    from_header.or_else(|| query_token.map(str::trim).filter(|value| !value.is_empty()))
}

/// Parses scopes from a comma-separated string
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::token::parse_scopes;
///
/// let scopes = parse_scopes("accounts:read, contacts:*");
/// assert_eq!(scopes, vec!["accounts:read", "contacts:*"]);
/// assert!(parse_scopes("").is_empty());
/// ```
pub fn parse_scopes(scopes_str: &str) -> Vec<String> {
    scopes_str
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Joins scopes into the stored comma-separated form
pub fn format_scopes(scopes: &[String]) -> String {
    scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Checks if a scope list grants a required scope
///
/// `*` grants everything and `accounts:*` grants every `accounts:` scope.
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::token::has_scope;
///
/// let scopes = vec!["accounts:read".to_string(), "contacts:*".to_string()];
/// assert!(has_scope(&scopes, "accounts:read"));
/// assert!(has_scope(&scopes, "contacts:write"));
/// assert!(!has_scope(&scopes, "accounts:write"));
/// ```
pub fn has_scope(scopes: &[String], required: &str) -> bool {
    scopes.iter().any(|scope| {
        if scope == "*" || scope == required {
            return true;
        }
        match scope.strip_suffix('*') {
            Some(prefix) if prefix.ends_with(':') => required.starts_with(prefix),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let first = generate_token();
        let second = generate_token();

        assert_eq!(first.len(), TOKEN_LENGTH);
        assert_ne!(first, second);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_prefix() {
        assert_eq!(token_prefix("abcdefghijkl"), "abcdefgh");
        assert_eq!(token_prefix("abc"), "abc");
        assert_eq!(token_prefix(""), "");
        assert_eq!(token_prefix("ééééééééé"), "éééééééé");
    }

    #[test]
    fn test_bearer_header_wins() {
        assert_eq!(bearer_value(Some("Bearer header"), Some("query")), Some("header"));
        assert_eq!(bearer_value(Some("Bearer "), Some("query")), Some("query"));
        assert_eq!(bearer_value(None, None), None);
        assert_eq!(bearer_value(None, Some("  ")), None);
        assert_eq!(bearer_value(Some("bearer lower"), None), None);
    }

    #[test]
    fn test_parse_and_format_scopes() {
        let scopes = parse_scopes(" accounts:read ,, opportunities:write ");
        assert_eq!(scopes, vec!["accounts:read", "opportunities:write"]);
        assert_eq!(format_scopes(&scopes), "accounts:read,opportunities:write");
        assert_eq!(format_scopes(&[]), "");
    }

    #[test]
    fn test_has_scope_wildcards() {
        let scopes = vec!["opportunities:*".to_string()];
        assert!(has_scope(&scopes, "opportunities:read"));
        assert!(has_scope(&scopes, "opportunities:write"));
        assert!(!has_scope(&scopes, "accounts:read"));

        assert!(has_scope(&["*".to_string()], "users:write"));
        assert!(!has_scope(&["accounts*".to_string()], "accounts:read"));
        assert!(!has_scope(&[], "accounts:read"));
    }
}
