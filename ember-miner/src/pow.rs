//! Proof-of-work family selection.
//!
//! The family is chosen once at startup from the configured identifier.
//! An unknown identifier is a fatal configuration error; no valid device
//! set can be constructed without a family, so the daemon refuses to start.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::types::Hash32;

/// Closed set of supported proof-of-work families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PowFamily {
    /// Double BLAKE2b-style header hashing (reference backend uses sha256d)
    #[strum(serialize = "blake2bd")]
    Blake2bD,
    /// Cuckaroo cycle finding
    Cuckaroo,
    /// Cuckatoo cycle finding
    Cuckatoo,
}

impl PowFamily {
    /// Parse the configured identifier, failing startup on unknown values.
    pub fn from_config(name: &str) -> Result<Self> {
        Self::from_str(name)
            .map_err(|_| Error::Config(format!("unknown proof-of-work family '{name}'")))
    }

    /// Unit string for hash-rate display.
    ///
    /// Cycle-finding families measure graphs per second rather than hashes.
    pub fn rate_unit(&self) -> &'static str {
        match self {
            PowFamily::Blake2bD => "H/s",
            PowFamily::Cuckaroo | PowFamily::Cuckatoo => "GPS",
        }
    }

    /// Difficulty-one target: 32 leading zero bits.
    ///
    /// Hashes at or below this count as one normalized share for rate
    /// accounting, independent of the job's actual target.
    pub fn diff_one_target(&self) -> Hash32 {
        let mut bytes = [0xffu8; 32];
        bytes[28..].copy_from_slice(&[0, 0, 0, 0]);
        Hash32(bytes)
    }
}
