use crate::error::Error;
use crate::utils;
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Signing};
use std::fmt;
use std::str::FromStr;

/// HMAC key used to derive the master key from a seed
pub const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// Bit that marks a hardened child index
pub const HARDENED_BIT: u32 = 0x8000_0000;

/// A path element in a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildNumber {
    /// Normal derivation index (0..2^31-1)
    Normal(u32),
    /// Hardened derivation index (2^31..2^32-1)
    Hardened(u32),
}

impl ChildNumber {
    /// Maximum normal index
    pub const MAX_NORMAL_INDEX: u32 = HARDENED_BIT - 1;

    /// Interpret a raw index, the top bit selecting hardened derivation
    pub fn from_u32(index: u32) -> Self {
        if index & HARDENED_BIT != 0 {
            ChildNumber::Hardened(index & Self::MAX_NORMAL_INDEX)
        } else {
            ChildNumber::Normal(index)
        }
    }

    /// Convert to raw index value
    pub fn to_u32(&self) -> u32 {
        match self {
            ChildNumber::Normal(i) => *i,
            ChildNumber::Hardened(i) => i | HARDENED_BIT,
        }
    }

    /// Check if the child number is hardened
    pub fn is_hardened(&self) -> bool {
        matches!(self, ChildNumber::Hardened(_))
    }
}

impl fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChildNumber::Normal(i) => write!(f, "{}", i),
            ChildNumber::Hardened(i) => write!(f, "{}'", i),
        }
    }
}

impl FromStr for ChildNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, hardened) = match s.strip_suffix('\'').or_else(|| s.strip_suffix('h')) {
            Some(digits) => (digits, true),
            None => (s, false),
        };

        let index: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidDerivationPath(format!("invalid index {:?}", s)))?;

        if index > ChildNumber::MAX_NORMAL_INDEX {
            return Err(Error::InvalidDerivationPath(format!(
                "index {} out of range",
                index
            )));
        }

        Ok(if hardened {
            ChildNumber::Hardened(index)
        } else {
            ChildNumber::Normal(index)
        })
    }
}

/// An ordered list of child indices below the master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    pub path: Vec<ChildNumber>,
}

impl DerivationPath {
    /// Build a path from raw indices (top bit = hardened)
    pub fn from_indices(indices: &[u32]) -> Self {
        DerivationPath {
            path: indices.iter().map(|&i| ChildNumber::from_u32(i)).collect(),
        }
    }

    /// Raw indices of the path
    pub fn to_indices(&self) -> Vec<u32> {
        self.path.iter().map(ChildNumber::to_u32).collect()
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m")?;
        for child in &self.path {
            write!(f, "/{}", child)?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    /// Parse a path such as `m/44'/0'/0'/0/0`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = match s.strip_prefix('m') {
            Some("") => return Ok(DerivationPath { path: vec![] }),
            Some(rest) => rest.strip_prefix('/').ok_or_else(|| {
                Error::InvalidDerivationPath(format!("invalid path format {:?}", s))
            })?,
            None => {
                return Err(Error::InvalidDerivationPath(
                    "path must start with 'm'".to_string(),
                ))
            }
        };

        let path = rest
            .split('/')
            .map(str::parse::<ChildNumber>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DerivationPath { path })
    }
}

/// Private scalar and chain code at one level of the HD tree
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPrivKey {
    pub depth: u8,
    pub child_number: u32,
    pub chain_code: [u8; 32],
    pub private_key: SecretKey,
}

impl ExtendedPrivKey {
    /// Create the master extended private key from a seed
    pub fn new_master(seed: &[u8]) -> Result<Self, Error> {
        if seed.len() < 16 {
            return Err(Error::InvalidKey(
                "seed must be at least 16 bytes".to_string(),
            ));
        }

        let hmac_result = utils::hmac_sha512(MASTER_HMAC_KEY, seed)?;
        let (secret_key, chain_code) = split_hmac(&hmac_result);

        let private_key = SecretKey::from_slice(&secret_key)
            .map_err(|_| Error::InvalidKey("invalid master key from seed".to_string()))?;

        Ok(ExtendedPrivKey {
            depth: 0,
            child_number: 0,
            chain_code,
            private_key,
        })
    }

    /// Derive a child key (CKDpriv)
    pub fn derive_child<C: Signing>(
        &self,
        secp: &Secp256k1<C>,
        child_number: ChildNumber,
    ) -> Result<ExtendedPrivKey, Error> {
        let index = child_number.to_u32();
        let mut hmac_input = Vec::with_capacity(37);

        if child_number.is_hardened() {
            // 0x00 || private_key || index
            hmac_input.push(0);
            hmac_input.extend_from_slice(&self.private_key.secret_bytes());
        } else {
            // compressed public_key || index
            let public_key = PublicKey::from_secret_key(secp, &self.private_key);
            hmac_input.extend_from_slice(&public_key.serialize());
        }
        hmac_input.extend_from_slice(&index.to_be_bytes());

        let hmac_result = utils::hmac_sha512(&self.chain_code, &hmac_input)?;
        let (i_l, i_r) = split_hmac(&hmac_result);

        // child = (I_L + parent) mod n; I_L >= n or a zero sum is invalid
        let tweak = Scalar::from_be_bytes(i_l).map_err(|_| Error::InvalidChildKey(index))?;
        let private_key = self
            .private_key
            .add_tweak(&tweak)
            .map_err(|_| Error::InvalidChildKey(index))?;

        Ok(ExtendedPrivKey {
            depth: self.depth.saturating_add(1),
            child_number: index,
            chain_code: i_r,
            private_key,
        })
    }

    /// Derive a descendant by folding [`ExtendedPrivKey::derive_child`] over the path
    pub fn derive_path<C: Signing>(
        &self,
        secp: &Secp256k1<C>,
        path: &DerivationPath,
    ) -> Result<ExtendedPrivKey, Error> {
        path.path
            .iter()
            .try_fold(self.clone(), |key, &child| key.derive_child(secp, child))
    }

    /// Raw 32-byte private scalar
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.private_key.secret_bytes()
    }
}

impl fmt::Debug for ExtendedPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExtendedPrivKey")
            .field("depth", &self.depth)
            .field("child_number", &ChildNumber::from_u32(self.child_number))
            .finish_non_exhaustive()
    }
}

/// Master key from a seed, then every step of `path`
pub fn derive_path<C: Signing>(
    secp: &Secp256k1<C>,
    seed: &[u8],
    path: &DerivationPath,
) -> Result<ExtendedPrivKey, Error> {
    ExtendedPrivKey::new_master(seed)?.derive_path(secp, path)
}

fn split_hmac(hmac_result: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&hmac_result[0..32]);
    right.copy_from_slice(&hmac_result[32..64]);
    (left, right)
}
