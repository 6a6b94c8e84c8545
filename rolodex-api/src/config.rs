/// Configuration management for the API server
///
/// Configuration is read from environment variables, with a `.env` file
/// loaded first when present.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `PUBLIC_BASE_URL`: Base of links sent by mail (default: http://localhost:8080)
/// - `DATABASE_URL`: SQLite connection string (default: sqlite://rolodex.db)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `SECRET_KEY`: Signing key for reset links, at least 32 characters (required)
/// - `SESSION_LIFETIME_SECS`: Session idle lifetime (default: 3600)
/// - `SESSION_COOKIE_SECURE`: Marks the session cookie `Secure` (default: false)
/// - `PASSWORD_MEMORY_KIB`, `PASSWORD_ITERATIONS`, `PASSWORD_PARALLELISM`: Argon2id cost
/// - `AUDIT_LOG_PATH`: Audit trail file (default: audit.log)
/// - `MAIL_RELAY_URL`: HTTP mail relay; mail is only logged when unset
/// - `MAIL_FROM`: Sender address (default: noreply@rolodex.local)
/// - `BOOTSTRAP_ADMIN_EMAIL`, `BOOTSTRAP_ADMIN_PASSWORD`: First owner account
///
/// # Example
///
/// ```no_run
/// use rolodex_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use rolodex_shared::auth::password::{
    PasswordConfig, DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM,
};
use rolodex_shared::auth::session::{SessionConfig, DEFAULT_SESSION_LIFETIME_SECS};
use rolodex_shared::db::pool;

/// Minimum length of `SECRET_KEY`
pub const MIN_SECRET_LEN: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub audit: AuditConfig,
    pub mail: MailConfig,

    /// First owner account, created at startup when no users exist
    pub bootstrap: Option<BootstrapAdmin>,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Externally visible base URL, without trailing slash
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Secrets, sessions and password hashing
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// HS256 key for password-reset links
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret_key: String,

    pub session_lifetime_secs: i64,
    pub cookie_secure: bool,
    pub password: PasswordConfig,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SECRET_KEY` is missing or shorter than 32 characters
    /// - A numeric or boolean variable has an invalid value
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let secret_key = get("SECRET_KEY")
            .ok_or_else(|| anyhow::anyhow!("SECRET_KEY environment variable is required"))?;
        if secret_key.len() < MIN_SECRET_LEN {
            anyhow::bail!("SECRET_KEY must be at least {} characters long", MIN_SECRET_LEN);
        }

        let cors_origins = var("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let bootstrap = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin { email, password })
            }
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST", "0.0.0.0"),
                port: parse("API_PORT", &var("API_PORT", "8080"))?,
                cors_origins,
                production: parse_flag("PRODUCTION", get("PRODUCTION"))?,
                public_base_url: var("PUBLIC_BASE_URL", "http://localhost:8080")
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL", "sqlite://rolodex.db"),
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    &var("DATABASE_MAX_CONNECTIONS", "10"),
                )?,
            },
            security: SecurityConfig {
                secret_key,
                session_lifetime_secs: parse(
                    "SESSION_LIFETIME_SECS",
                    &var("SESSION_LIFETIME_SECS", &DEFAULT_SESSION_LIFETIME_SECS.to_string()),
                )?,
                cookie_secure: parse_flag("SESSION_COOKIE_SECURE", get("SESSION_COOKIE_SECURE"))?,
                password: PasswordConfig {
                    memory_kib: parse(
                        "PASSWORD_MEMORY_KIB",
                        &var("PASSWORD_MEMORY_KIB", &DEFAULT_MEMORY_KIB.to_string()),
                    )?,
                    iterations: parse(
                        "PASSWORD_ITERATIONS",
                        &var("PASSWORD_ITERATIONS", &DEFAULT_ITERATIONS.to_string()),
                    )?,
                    parallelism: parse(
                        "PASSWORD_PARALLELISM",
                        &var("PASSWORD_PARALLELISM", &DEFAULT_PARALLELISM.to_string()),
                    )?,
                },
            },
            audit: AuditConfig {
                path: var("AUDIT_LOG_PATH", "audit.log"),
            },
            mail: MailConfig {
                relay_url: get("MAIL_RELAY_URL").filter(|url| !url.is_empty()),
                from: var("MAIL_FROM", "noreply@rolodex.local"),
            },
            bootstrap,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lifetime: chrono::Duration::seconds(self.security.session_lifetime_secs),
            cookie_secure: self.security.cookie_secure,
        }
    }

    pub fn pool_config(&self) -> pool::DatabaseConfig {
        pool::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            ..Default::default()
        }
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, value, e))
}

fn parse_flag(key: &str, value: Option<String>) -> anyhow::Result<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "0" | "false" | "no" | "off" => Ok(false),
            "1" | "true" | "yes" | "on" => Ok(true),
            _ => anyhow::bail!("{} must be a boolean, got {:?}", key, v),
        },
    }
}
