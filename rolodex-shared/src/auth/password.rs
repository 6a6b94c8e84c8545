/// Password hashing using Argon2id
///
/// The same hasher protects user passwords and API token secrets. Digests
/// are PHC strings that carry the algorithm, version, cost parameters and
/// salt, so verification always uses the parameters a digest was created
/// with, and raising the cost only affects new digests.
///
/// # Cost parameters
///
/// Defaults follow the OWASP Password Storage Cheat Sheet (2023 revision)
/// for Argon2id: 19 MiB of memory, 2 iterations, 1 lane. They are read from
/// configuration so operators can raise them as hardware improves.
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::password::{Hasher, PasswordConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = Hasher::new(PasswordConfig::default())?;
///
/// let digest = hasher.hash("super_secret_password_123")?;
/// assert!(hasher.verify("super_secret_password_123", &digest));
/// assert!(!hasher.verify("wrong_password", &digest));
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// OWASP recommended Argon2id memory cost (KiB)
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;

/// OWASP recommended Argon2id iteration count
pub const DEFAULT_ITERATIONS: u32 = 2;

/// OWASP recommended Argon2id parallelism
pub const DEFAULT_PARALLELISM: u32 = 1;

const OUTPUT_LEN: usize = 32;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The configured cost parameters are rejected by Argon2
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// The blocking hash task was cancelled or panicked
    #[error("Hashing task failed: {0}")]
    TaskFailed(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,

    /// Number of passes
    pub iterations: u32,

    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Password and token-secret hasher
///
/// Cheap to clone; the dummy digest used for timing equalization is shared.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    dummy_digest: Arc<String>,
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

impl Hasher {
    /// Builds a hasher from cost parameters
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::InvalidParams` if Argon2 rejects the parameters
    /// (for example memory below 8 KiB per lane).
    pub fn new(config: PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(OUTPUT_LEN),
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;

        let mut hasher = Self {
            params,
            dummy_digest: Arc::new(String::new()),
        };
        hasher.dummy_digest = Arc::new(hasher.hash("rolodex-dummy-password")?);

        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a plaintext with a fresh random salt
    ///
    /// Output is a PHC string such as
    /// `$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::HashError` if hashing fails
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashError(e.to_string()))?;

        Ok(digest.to_string())
    }

    /// Verifies a plaintext against a digest
    ///
    /// Uses the algorithm and parameters embedded in the digest. Returns
    /// `false` for a wrong plaintext and for any digest that cannot be
    /// parsed; it never reports an error to the caller.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting unparseable password digest");
                return false;
            }
        };

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Password verification failed");
                false
            }
        }
    }

    /// Runs a verification against a fixed digest and discards the result
    ///
    /// Called when a login names an unknown email so that the response time
    /// matches a wrong password for a known one.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.dummy_digest);
    }

    /// [`Hasher::hash`] on the blocking thread pool
    pub async fn hash_async(&self, plaintext: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    /// [`Hasher::verify`] on the blocking thread pool
    ///
    /// A failed task counts as a mismatch.
    pub async fn verify_async(&self, plaintext: String, digest: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .unwrap_or(false)
    }

    /// [`Hasher::verify_dummy`] on the blocking thread pool
    pub async fn verify_dummy_async(&self, plaintext: String) {
        let hasher = self.clone();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&plaintext)).await;
    }
}

/// Validates password strength
///
/// Requirements:
/// - At least 8 characters long
/// - Contains at least one letter
/// - Contains at least one digit
///
/// # Example
///
/// ```
/// use rolodex_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("password123").is_ok());
/// assert!(validate_password_strength("short1").is_err());
/// assert!(validate_password_strength("no-digits-here").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter".to_string());
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}
