//! Public-key derivation and the mainnet P2PKH address / WIF encodings.

use crate::error::Error;
use crate::utils;
use secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};
use std::fmt;

/// Version byte of a mainnet P2PKH address
pub const P2PKH_VERSION: u8 = 0x00;

/// Version byte of a mainnet WIF private key
pub const WIF_VERSION: u8 = 0x80;

/// Suffix marking a WIF key whose public key is compressed
pub const WIF_COMPRESSED_FLAG: u8 = 0x01;

/// Version + hash160 + checksum
pub const ADDRESS_LEN: usize = 25;

/// Serialized public key point
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyPoint {
    /// Parity prefix and x coordinate
    Compressed([u8; 33]),
    /// 0x04, x and y
    Uncompressed([u8; 65]),
}

impl PublicKeyPoint {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKeyPoint::Compressed(bytes) => bytes,
            PublicKeyPoint::Uncompressed(bytes) => bytes,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, PublicKeyPoint::Compressed(_))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Debug for PublicKeyPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKeyPoint({})", self.to_hex())
    }
}

/// Multiply the generator by `private_key`. Zero and scalars >= n are rejected.
pub fn public_key<C: Signing>(
    secp: &Secp256k1<C>,
    private_key: &[u8; 32],
    compressed: bool,
) -> Result<PublicKeyPoint, Error> {
    let secret_key = SecretKey::from_slice(private_key)
        .map_err(|e| Error::InvalidScalar(e.to_string()))?;
    let point = PublicKey::from_secret_key(secp, &secret_key);

    Ok(if compressed {
        PublicKeyPoint::Compressed(point.serialize())
    } else {
        PublicKeyPoint::Uncompressed(point.serialize_uncompressed())
    })
}

/// Encode a P2PKH address from a hash160
pub fn address_from_hash160(hash160: &[u8; 20]) -> String {
    let mut payload = [0u8; 21];
    payload[0] = P2PKH_VERSION;
    payload[1..].copy_from_slice(hash160);
    utils::base58check_encode(&payload)
}

/// Address of a serialized public key. Compressed and uncompressed
/// encodings of the same point give different addresses.
pub fn address_from_public_key(public_key: &PublicKeyPoint) -> String {
    address_from_hash160(&utils::hash160(public_key.as_bytes()))
}

/// Compressed-key P2PKH address of a private key
pub fn derive_address<C: Signing>(
    secp: &Secp256k1<C>,
    private_key: &[u8; 32],
) -> Result<String, Error> {
    let point = public_key(secp, private_key, true)?;
    Ok(address_from_public_key(&point))
}

/// Export a private key in WIF, flagged for a compressed public key
pub fn private_key_to_wif(private_key: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(WIF_VERSION);
    payload.extend_from_slice(private_key);
    payload.push(WIF_COMPRESSED_FLAG);
    utils::base58check_encode(&payload)
}

/// Decode a WIF string into the private key and its compression flag
pub fn wif_to_private_key(wif: &str) -> Result<([u8; 32], bool), Error> {
    let payload = utils::base58check_decode(wif)?;

    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == WIF_COMPRESSED_FLAG => true,
        34 => return Err(Error::InvalidKey("bad compression flag".to_string())),
        n => return Err(Error::InvalidKey(format!("unexpected WIF length {}", n))),
    };

    if payload[0] != WIF_VERSION {
        return Err(Error::InvalidKey(format!(
            "unexpected WIF version {:#04x}",
            payload[0]
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[1..33]);
    Ok((key, compressed))
}

/// Structural check: base58, exactly 25 bytes, checksum over the first 21
pub fn is_valid_address(address: &str) -> bool {
    match utils::base58_decode(address) {
        Ok(bytes) if bytes.len() == ADDRESS_LEN => {
            bytes[21..] == utils::checksum(&bytes[..21])[..]
        }
        _ => false,
    }
}

/// Validate a mainnet P2PKH address and return the hash160 it commits to
pub fn address_to_hash160(address: &str) -> Result<[u8; 20], Error> {
    let payload = utils::base58check_decode(address)
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;

    if payload.len() != ADDRESS_LEN - 4 {
        return Err(Error::InvalidAddress(format!(
            "{}: decodes to {} bytes",
            address,
            payload.len() + 4
        )));
    }
    if payload[0] != P2PKH_VERSION {
        return Err(Error::InvalidAddress(format!(
            "{}: not a mainnet P2PKH address (version {:#04x})",
            address, payload[0]
        )));
    }

    let mut hash160 = [0u8; 20];
    hash160.copy_from_slice(&payload[1..]);
    Ok(hash160)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    const KEY_ONE: [u8; 32] =
        hex!("0000000000000000000000000000000000000000000000000000000000000001");

    const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

    #[test]
    fn test_public_key_of_one_is_generator() {
        let secp = Secp256k1::new();
        let point = public_key(&secp, &KEY_ONE, true).unwrap();
        assert_eq!(
            point.as_bytes(),
            hex!("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
        );

        let full = public_key(&secp, &KEY_ONE, false).unwrap();
        assert!(!full.is_compressed());
        assert_eq!(full.as_bytes().len(), 65);
        assert_eq!(full.as_bytes()[0], 0x04);
        assert_eq!(&full.as_bytes()[1..33], &point.as_bytes()[1..]);
    }

    #[test]
    fn test_invalid_scalars() {
        let secp = Secp256k1::new();
        assert!(matches!(
            public_key(&secp, &[0u8; 32], true),
            Err(Error::InvalidScalar(_))
        ));
        // the group order itself
        let n = hex!("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141");
        assert!(matches!(
            public_key(&secp, &n, true),
            Err(Error::InvalidScalar(_))
        ));
    }

    #[test]
    fn test_address_and_wif_of_key_one() {
        let secp = Secp256k1::new();
        assert_eq!(
            derive_address(&secp, &KEY_ONE).unwrap(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert_eq!(
            address_from_public_key(&public_key(&secp, &KEY_ONE, false).unwrap()),
            "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm"
        );
        assert_eq!(
            private_key_to_wif(&KEY_ONE),
            "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"
        );
    }

    #[test]
    fn test_wif_decoding() {
        let (key, compressed) =
            wif_to_private_key("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn").unwrap();
        assert_eq!(key, KEY_ONE);
        assert!(compressed);

        let (key, compressed) =
            wif_to_private_key("5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf").unwrap();
        assert_eq!(key, KEY_ONE);
        assert!(!compressed);

        // an address is valid base58check but not a WIF
        assert!(wif_to_private_key("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));
        assert!(is_valid_address("1EciYvS7FFjSYfrWxsWYjGB8K9BobBfCXw"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAM"));
        assert!(!is_valid_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMh"));
        assert!(!is_valid_address("0BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"));

        assert_eq!(
            address_to_hash160("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap(),
            hex!("751e76e8199196d454941c45d1b3a323f1433bd6")
        );
        assert_eq!(
            address_from_hash160(&hex!("751e76e8199196d454941c45d1b3a323f1433bd6")),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert!(matches!(
            address_to_hash160("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"),
            Err(Error::InvalidAddress(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_single_character_mutation_is_rejected(
            position in 0usize..34,
            replacement in 0usize..58,
        ) {
            let address = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
            let mut bytes = address.as_bytes().to_vec();
            let new_char = BASE58_ALPHABET[replacement];
            prop_assume!(bytes[position] != new_char);
            bytes[position] = new_char;
            let mutated = String::from_utf8(bytes).unwrap();
            prop_assert!(!is_valid_address(&mutated));
        }

        #[test]
        fn prop_derive_address_is_pure(key in proptest::array::uniform32(1u8..)) {
            let secp = Secp256k1::new();
            let a = derive_address(&secp, &key);
            let b = derive_address(&secp, &key);
            prop_assert_eq!(a.is_ok(), b.is_ok());
            if let (Ok(a), Ok(b)) = (a, b) {
                prop_assert!(is_valid_address(&a));
                prop_assert_eq!(a, b);
            }
        }
    }
}
