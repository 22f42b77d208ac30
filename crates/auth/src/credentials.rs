//! Per-account API key pairs.

use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;

/// Key pair for one Bybit account (demo or real).
///
/// The secret is zeroed on drop and never shows up in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(try_from = "KeyPairFile")]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

/// Shape of a key pair inside the users file.
#[derive(Deserialize)]
struct KeyPairFile {
    api_key: String,
    secret_key: String,
}

impl TryFrom<KeyPairFile> for ApiCredentials {
    type Error = AuthError;

    fn try_from(file: KeyPairFile) -> Result<Self, AuthError> {
        let blank = |s: &str| s.trim().is_empty();
        if blank(&file.api_key) || blank(&file.secret_key) {
            return Err(AuthError::EmptyKey);
        }
        Ok(Self::new(file.api_key, file.secret_key))
    }
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: SecretString::from(secret_key.into()),
        }
    }

    /// Public half, sent as `X-BAPI-API-KEY`.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Secret half. Feed it to the signer and nowhere else.
    pub fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredentials({}, <redacted>)", self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_secret() {
        let creds = ApiCredentials::new("pub-key", "very-secret");
        let shown = format!("{creds:?}");
        assert_eq!(shown, "ApiCredentials(pub-key, <redacted>)");
    }

    #[test]
    fn loads_from_users_file_entry() {
        let creds: ApiCredentials =
            serde_json::from_str(r#"{"api_key": "k1", "secret_key": "s1"}"#).unwrap();
        assert_eq!(creds.api_key(), "k1");
        assert_eq!(creds.expose_secret(), "s1");
    }

    #[test]
    fn blank_halves_are_rejected() {
        for json in [
            r#"{"api_key": " ", "secret_key": "s1"}"#,
            r#"{"api_key": "k1", "secret_key": ""}"#,
        ] {
            assert!(serde_json::from_str::<ApiCredentials>(json).is_err());
        }
    }
}
