use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// A key pair with a blank key or secret.
    #[error("api key or secret is blank")]
    EmptyKey,
}
