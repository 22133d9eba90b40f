// BIP-44 mnemonic search
// Derives Bitcoin keys from BIP-39 phrases along a BIP-32/BIP-44 path and
// searches the ordered K-word selections of a small vocabulary for the
// phrase behind a known address.

pub mod address;
pub mod backend;
pub mod bip32;
pub mod bip39;
pub mod bip44;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod monitor;
pub mod search;
pub mod utils;
pub mod wallet;

pub use backend::CpuBackend;
pub use bip32::{ChildNumber, DerivationPath, ExtendedPrivKey};
pub use bip39::{derive_seed, Mnemonic, Seed, Vocabulary};
pub use bip44::Bip44Path;
pub use config::SearchConfig;
pub use enumerator::{total_candidates, CandidateEnumerator, SearchBatch};
pub use error::{BackendError, Error, ErrorKind};
pub use search::{
    CancellationToken, ComputeBackend, SearchCoordinator, SearchOptions, SearchOutcome,
    SearchReport, SearchResult, TargetFingerprint,
};
pub use wallet::{KeyDeriver, RecoveredWallet, WalletDeriver};

// Re-export types from dependencies that are part of our public API
pub use secp256k1::{self, Secp256k1};
