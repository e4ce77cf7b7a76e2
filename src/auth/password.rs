use bcrypt::{hash, verify};

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("stored password hash is not valid UTF-8")]
    Encoding,
}

/// One-way password hashing.
///
/// Both operations are CPU-bound; callers run them on the blocking pool.
pub trait HashService: Send + Sync {
    fn hash(&self, password: &str) -> Result<Vec<u8>, HashError>;
    /// `Ok(false)` means the password does not match `hashed`.
    fn compare(&self, password: &str, hashed: &[u8]) -> Result<bool, HashError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl HashService for BcryptHasher {
    fn hash(&self, password: &str) -> Result<Vec<u8>, HashError> {
        Ok(hash(password, self.cost)?.into_bytes())
    }

    fn compare(&self, password: &str, hashed: &[u8]) -> Result<bool, HashError> {
        let hashed = std::str::from_utf8(hashed).map_err(|_| HashError::Encoding)?;
        Ok(verify(password, hashed)?)
    }
}
