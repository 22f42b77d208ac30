//! Bybit environment configuration.
//!
//! The real venue runs against mainnet or testnet; the demo venue always uses
//! Bybit's dedicated demo-trading host.

use std::fmt;
use std::str::FromStr;

/// REST host for Bybit demo trading (paper accounts).
pub const DEMO_REST_BASE_URL: &str = "https://api-demo.bybit.com";

/// Bybit environment used for real-venue requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BybitEnvironment {
    /// Production environment (real money).
    #[default]
    Mainnet,
    /// Testnet environment (fake money, separate accounts).
    Testnet,
}

impl BybitEnvironment {
    /// REST API base URL.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.bybit.com",
            Self::Testnet => "https://api-testnet.bybit.com",
        }
    }

    /// Returns true if this is the production environment.
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Self::Mainnet)
    }

    /// Load environment from `BYBIT_ENVIRONMENT` env var.
    ///
    /// Returns `Mainnet` if not set or invalid.
    pub fn from_env() -> Self {
        std::env::var("BYBIT_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for BybitEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for BybitEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "production" | "prod" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'mainnet' or 'testnet'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}
