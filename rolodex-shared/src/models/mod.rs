/// Database models for Rolodex
///
/// Each model owns its SQL. Functions that may run inside a caller's
/// transaction are generic over `sqlx::Executor`; pass `&pool` or
/// `&mut *tx`. Operations that must be atomic on their own open their own
/// transaction.
///
/// # Models
///
/// - `user`: staff accounts and roles
/// - `token`: API bearer tokens (prefix + Argon2id digest)
/// - `session`: server-side login sessions
/// - `account`: companies
/// - `contact`: people at an account
/// - `opportunity`: deals, owned by a user
/// - `page`: search and pagination helpers
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::db::{connect, pool::DatabaseConfig};
/// use rolodex_shared::models::account::{Account, CreateAccount};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = connect(DatabaseConfig::default()).await?;
///
/// let account = Account::create(&pool, CreateAccount {
///     name: "Acme Corp".to_string(),
///     ..Default::default()
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod account;
pub mod contact;
pub mod opportunity;
pub mod page;
pub mod session;
pub mod token;
pub mod user;
