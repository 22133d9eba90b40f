//! The five-level account layout `m / 44' / 0' / account' / change / index`.
//!
//! Only Bitcoin mainnet is searched, so purpose and coin type are fixed.

use crate::bip32::{ChildNumber, DerivationPath};
use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// BIP-44 purpose (44')
pub const PURPOSE: u32 = 44;

/// Bitcoin mainnet coin type (0')
pub const COIN_TYPE_BITCOIN: u32 = 0;

/// Number of levels below the master key
pub const DEPTH: usize = 5;

/// Change level as defined in BIP-44
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// External chain (0) - addresses for receiving payments
    External,
    /// Internal chain (1) - addresses for change
    Internal,
}

impl Change {
    pub fn child_number(&self) -> ChildNumber {
        match self {
            Change::External => ChildNumber::Normal(0),
            Change::Internal => ChildNumber::Normal(1),
        }
    }
}

/// m / 44' / 0' / account' / change / address_index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bip44Path {
    pub account: u32,
    pub change: Change,
    pub address_index: u32,
}

impl Bip44Path {
    pub fn new(account: u32, change: Change, address_index: u32) -> Self {
        Bip44Path {
            account,
            change,
            address_index,
        }
    }

    /// Convert to a BIP-32 derivation path
    pub fn to_derivation_path(&self) -> DerivationPath {
        DerivationPath {
            path: vec![
                ChildNumber::Hardened(PURPOSE),
                ChildNumber::Hardened(COIN_TYPE_BITCOIN),
                ChildNumber::Hardened(self.account),
                self.change.child_number(),
                ChildNumber::Normal(self.address_index),
            ],
        }
    }
}

impl Default for Bip44Path {
    /// First receiving address of the first account: `m/44'/0'/0'/0/0`
    fn default() -> Self {
        Bip44Path::new(0, Change::External, 0)
    }
}

impl TryFrom<&DerivationPath> for Bip44Path {
    type Error = Error;

    fn try_from(path: &DerivationPath) -> Result<Self, Self::Error> {
        let levels: &[ChildNumber; DEPTH] = path.path.as_slice().try_into().map_err(|_| {
            Error::InvalidDerivationPath(format!(
                "expected {} levels, got {}",
                DEPTH,
                path.len()
            ))
        })?;

        match levels[0] {
            ChildNumber::Hardened(PURPOSE) => {}
            other => {
                return Err(Error::InvalidDerivationPath(format!(
                    "purpose must be 44', got {}",
                    other
                )))
            }
        }

        match levels[1] {
            ChildNumber::Hardened(COIN_TYPE_BITCOIN) => {}
            other => {
                return Err(Error::InvalidDerivationPath(format!(
                    "coin type must be 0', got {}",
                    other
                )))
            }
        }

        let account = match levels[2] {
            ChildNumber::Hardened(n) => n,
            _ => {
                return Err(Error::InvalidDerivationPath(
                    "account must be hardened".to_string(),
                ))
            }
        };

        let change = match levels[3] {
            ChildNumber::Normal(0) => Change::External,
            ChildNumber::Normal(1) => Change::Internal,
            _ => {
                return Err(Error::InvalidDerivationPath(
                    "change must be normal and 0 or 1".to_string(),
                ))
            }
        };

        let address_index = match levels[4] {
            ChildNumber::Normal(n) => n,
            _ => {
                return Err(Error::InvalidDerivationPath(
                    "address index must be normal".to_string(),
                ))
            }
        };

        Ok(Bip44Path {
            account,
            change,
            address_index,
        })
    }
}

impl FromStr for Bip44Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bip44Path::try_from(&DerivationPath::from_str(s)?)
    }
}

impl fmt::Display for Bip44Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_derivation_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path() {
        let path = Bip44Path::default();
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/0");
        assert_eq!(
            path.to_derivation_path().to_indices(),
            vec![0x8000_002C, 0x8000_0000, 0x8000_0000, 0, 0]
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let path: Bip44Path = "m/44'/0'/3'/1/17".parse().unwrap();
        assert_eq!(path, Bip44Path::new(3, Change::Internal, 17));
        assert_eq!(path.to_string(), "m/44'/0'/3'/1/17");
    }

    #[test]
    fn test_rejects_other_layouts() {
        for bad in [
            "m/44'/0'/0'/0",
            "m/44'/0'/0'/0/0/0",
            "m/49'/0'/0'/0/0",
            "m/44'/1'/0'/0/0",
            "m/44'/0'/0/0/0",
            "m/44'/0'/0'/2/0",
            "m/44'/0'/0'/0/0'",
            "m/44/0'/0'/0/0",
        ] {
            assert!(
                matches!(bad.parse::<Bip44Path>(), Err(Error::InvalidDerivationPath(_))),
                "{bad} should be rejected"
            );
        }
    }
}
