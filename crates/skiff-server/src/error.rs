use thiserror::Error;

/// Errors surfaced by the server runtime.
///
/// The session loop treats [`ServerError::Io`] as fatal for the connection
/// (transport broken); every other variant is answered with a single
/// `ERROR:` line and the connection stays open.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] skiff_store::StoreError),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}
