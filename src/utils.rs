use crate::error::Error;
use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

pub type HmacSha512 = Hmac<Sha512>;

/// Compute HMAC-SHA512
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64], Error> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|_| Error::HmacError)?;
    mac.update(data);
    let result = mac.finalize().into_bytes();
    let mut hash = [0u8; 64];
    hash.copy_from_slice(&result[..]);
    Ok(hash)
}

/// Compute SHA256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Double SHA256 hash
pub fn hash_twice(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD160(SHA256(data)), the 20-byte public key hash
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let result = Ripemd160::digest(sha256(data));
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&result);
    hash
}

/// Calculate checksum (first 4 bytes of double-SHA256 hash)
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let hash = hash_twice(data);
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&hash[0..4]);
    checksum
}

/// Plain base58 encoding. Every leading zero byte becomes a leading '1'.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Plain base58 decoding, the exact inverse of [`base58_encode`]
pub fn base58_decode(data: &str) -> Result<Vec<u8>, Error> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| Error::Base58DecodeError(e.to_string()))
}

/// Encode a base58 string with a checksum
pub fn base58check_encode(data: &[u8]) -> String {
    let mut check_data = Vec::with_capacity(data.len() + 4);
    check_data.extend_from_slice(data);
    check_data.extend_from_slice(&checksum(data));
    base58_encode(&check_data)
}

/// Decode a base58 string and verify its checksum
pub fn base58check_decode(data: &str) -> Result<Vec<u8>, Error> {
    let mut decoded = base58_decode(data)?;

    if decoded.len() < 4 {
        return Err(Error::InvalidChecksum);
    }

    let checksum_index = decoded.len() - 4;
    let (data_part, checksum_part) = decoded.split_at(checksum_index);

    // Addresses are public data, so a short-circuiting comparison is fine here
    if checksum_part != &checksum(data_part)[..] {
        return Err(Error::InvalidChecksum);
    }

    decoded.truncate(checksum_index);
    Ok(decoded)
}
