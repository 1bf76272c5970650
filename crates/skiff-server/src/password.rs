//! Password hashing behind a narrow trait so tests can substitute a cheap
//! implementation.

use bcrypt::BcryptError;

/// One-way password hashing plus verification.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plain-text password into a storable digest.
    fn hash(&self, plain: &str) -> Result<String, BcryptError>;

    /// Check a plain-text password against a stored digest.  A malformed
    /// digest counts as a mismatch, not an error.
    fn verify(&self, plain: &str, digest: &str) -> bool;
}

/// bcrypt-backed hasher used in production.
#[derive(Debug, Clone)]
pub struct Bcrypt {
    cost: u32,
}

impl Bcrypt {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for Bcrypt {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for Bcrypt {
    fn hash(&self, plain: &str) -> Result<String, BcryptError> {
        bcrypt::hash(plain, self.cost)
    }

    fn verify(&self, plain: &str, digest: &str) -> bool {
        bcrypt::verify(plain, digest).unwrap_or(false)
    }
}
