/// Authentication and authorization for Rolodex
///
/// # Modules
///
/// - [`password`]: Argon2id hashing for passwords and token secrets
/// - [`token`]: API token generation, bearer extraction, scope matching
/// - [`session`]: login, logout, cookie sessions, identity resolution
/// - [`reset`]: signed single-use password-reset tokens
/// - [`identity`]: the authenticated caller of a request
/// - [`policy`]: the role-based access table and its gate
///
/// # Security Features
///
/// - **Password Hashing**: Argon2id, OWASP default cost, configurable
/// - **API Tokens**: 256-bit secrets, stored as prefix + Argon2id digest
/// - **Sessions**: random cookie secret, stored as SHA-256 digest, sliding idle expiry
/// - **Reset Links**: HS256, one hour, bound to the current password digest
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::auth::password::{Hasher, PasswordConfig};
/// use rolodex_shared::auth::policy::{authorize, Action, Resource};
/// use rolodex_shared::auth::session::{login, SessionConfig};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = Hasher::new(PasswordConfig::default())?;
/// let login = login(&pool, &hasher, &SessionConfig::default(), "ada@example.com", "pw123456").await?;
///
/// let scope = authorize(&login.identity, Resource::Opportunities, Action::List)?;
/// # Ok(())
/// # }
/// ```

pub mod identity;
pub mod password;
pub mod policy;
pub mod reset;
pub mod session;
pub mod token;
