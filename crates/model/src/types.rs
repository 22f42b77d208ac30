use serde::{Deserialize, Serialize};
use std::fmt;

/// Order / position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Convert from Bybit string representation.
    pub fn from_bybit_str(s: &str) -> Option<Self> {
        match s {
            "Buy" => Some(Self::Buy),
            "Sell" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to Bybit string representation.
    pub fn as_bybit_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_bybit_str())
    }
}

/// Which account of a user an order goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Demo,
    Real,
}

impl Venue {
    pub const ALL: [Venue; 2] = [Venue::Demo, Venue::Real];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Real => "real",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentClass {
    Spot,
    /// USDT-margined perpetual.
    Linear,
}

impl InstrumentClass {
    pub const ALL: [InstrumentClass; 2] = [InstrumentClass::Spot, InstrumentClass::Linear];

    /// Bybit `category` parameter.
    pub fn category(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Linear => "linear",
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

/// Role of a position record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionKind {
    /// Cost-basis anchor opened by a signal.
    Main,
    /// DCA order enlarging an anchor; merged and deleted once filled.
    Averaging,
    /// Spot take-profit order closing an anchor.
    Tp,
}

impl PositionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Averaging => "averaging",
            Self::Tp => "tp",
        }
    }
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
