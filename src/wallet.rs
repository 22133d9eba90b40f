//! Full key reconstruction for one phrase: seed, leaf key, public key,
//! WIF and address.

use crate::address::{self, PublicKeyPoint};
use crate::bip32::{self, DerivationPath};
use crate::bip39::{self, Seed};
use crate::bip44::Bip44Path;
use crate::error::Error;
use crate::utils;
use secp256k1::{All, Secp256k1};

/// Key material recovered for one phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredWallet {
    pub mnemonic: String,
    pub derivation_path: DerivationPath,
    pub seed: Seed,
    pub private_key: [u8; 32],
    pub public_key: PublicKeyPoint,
    pub wif: String,
    pub address: String,
}

impl RecoveredWallet {
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }
}

/// Phrase-to-address pipeline the search runs for every candidate
pub trait WalletDeriver {
    /// hash160 a target address must commit to
    fn fingerprint(&self, phrase: &str) -> Result<[u8; 20], Error>;

    fn derive(&self, phrase: &str) -> Result<RecoveredWallet, Error>;
}

/// Runs the derivation pipeline with one curve context, a fixed path and
/// passphrase. Shared by reference between worker threads.
pub struct KeyDeriver {
    secp: Secp256k1<All>,
    path: DerivationPath,
    passphrase: String,
}

impl KeyDeriver {
    pub fn new(path: DerivationPath, passphrase: impl Into<String>) -> Self {
        KeyDeriver {
            secp: Secp256k1::new(),
            path,
            passphrase: passphrase.into(),
        }
    }

    /// `m/44'/0'/0'/0/0` with the given passphrase
    pub fn bip44(passphrase: impl Into<String>) -> Self {
        Self::new(Bip44Path::default().to_derivation_path(), passphrase)
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub fn path(&self) -> &DerivationPath {
        &self.path
    }

    /// Leaf private key for a phrase. The phrase is not validated.
    pub fn private_key(&self, phrase: &str) -> Result<[u8; 32], Error> {
        let seed = bip39::derive_seed(phrase, &self.passphrase)?;
        self.private_key_from_seed(&seed)
    }

    fn private_key_from_seed(&self, seed: &Seed) -> Result<[u8; 32], Error> {
        let leaf = bip32::derive_path(&self.secp, seed.as_bytes(), &self.path)?;
        Ok(leaf.secret_bytes())
    }

    /// hash160 of the compressed public key, the value a target address commits to
    pub fn fingerprint(&self, phrase: &str) -> Result<[u8; 20], Error> {
        let private_key = self.private_key(phrase)?;
        let point = address::public_key(&self.secp, &private_key, true)?;
        Ok(utils::hash160(point.as_bytes()))
    }

    /// Reconstruct every piece of key material for a phrase
    pub fn derive(&self, phrase: &str) -> Result<RecoveredWallet, Error> {
        let seed = bip39::derive_seed(phrase, &self.passphrase)?;
        let private_key = self.private_key_from_seed(&seed)?;
        let public_key = address::public_key(&self.secp, &private_key, true)?;

        Ok(RecoveredWallet {
            mnemonic: phrase.to_string(),
            derivation_path: self.path.clone(),
            seed,
            private_key,
            wif: address::private_key_to_wif(&private_key),
            address: address::address_from_public_key(&public_key),
            public_key,
        })
    }
}

impl WalletDeriver for KeyDeriver {
    fn fingerprint(&self, phrase: &str) -> Result<[u8; 20], Error> {
        KeyDeriver::fingerprint(self, phrase)
    }

    fn derive(&self, phrase: &str) -> Result<RecoveredWallet, Error> {
        KeyDeriver::derive(self, phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_bip44_wallet_vector() {
        let deriver = KeyDeriver::bip44("");
        let wallet = deriver.derive(ABANDON).unwrap();
        assert_eq!(
            wallet.private_key,
            hex!("e284129cc0922579a535bbf4d1a3b25773090d28c909bc0fed73b5e0222cc372")
        );
        assert_eq!(wallet.wif, "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf");
        assert_eq!(wallet.address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
        assert_eq!(wallet.derivation_path.to_string(), "m/44'/0'/0'/0/0");
    }

    #[test]
    fn test_fingerprint_matches_address() {
        let deriver = KeyDeriver::bip44("");
        let wallet = deriver.derive(ABANDON).unwrap();
        assert_eq!(
            deriver.fingerprint(ABANDON).unwrap(),
            address::address_to_hash160(&wallet.address).unwrap()
        );
    }

    #[test]
    fn test_passphrase_changes_keys() {
        let plain = KeyDeriver::bip44("").derive(ABANDON).unwrap();
        let salted = KeyDeriver::bip44("TREZOR").derive(ABANDON).unwrap();
        assert_ne!(plain.private_key, salted.private_key);
        assert_ne!(plain.address, salted.address);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let deriver = KeyDeriver::bip44("");
        assert_eq!(deriver.derive(ABANDON).unwrap(), deriver.derive(ABANDON).unwrap());
    }
}
