//! Search configuration, loaded from JSON and overridden from the command line.

use crate::address;
use crate::bip32::DerivationPath;
use crate::bip39::{Vocabulary, WORD_COUNT};
use crate::bip44::Bip44Path;
use crate::enumerator::total_candidates;
use crate::error::Error;
use crate::search::SearchOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Candidate vocabulary searched when no other list is configured
pub const DEFAULT_WORDS: [&str; 34] = [
    "inocente", "baseado", "global", "cadeado", "camada", "uniforme", "nordeste", "desafio",
    "entanto", "devido", "treino", "sonegar", "dinheiro", "criminal", "negativa", "pessoa",
    "zangado", "tarefa", "quase", "manter", "mestre", "ativo", "visto", "mais", "tabela",
    "clareza", "perfeito", "moeda", "verdade", "clone", "enquanto", "chave", "busca", "artigo",
];

/// Default search target
pub const DEFAULT_TARGET_ADDRESS: &str = "1EciYvS7FFjSYfrWxsWYjGB8K9BobBfCXw";

pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/0'/0'/0/0";

/// 256 work items per group, 4096 groups
pub const DEFAULT_BATCH_SIZE: u64 = 256 * 4096;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 40_500_000;

pub const DEFAULT_MAX_RETRIES: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// P2PKH address the recovered phrase must produce
    pub target_address: String,

    /// Candidate vocabulary, in index order
    #[serde(default = "default_words")]
    pub words: Vec<String>,

    /// One word per line; replaces `words` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordlist_path: Option<PathBuf>,

    #[serde(default = "default_word_count")]
    pub word_count: usize,

    #[serde(default)]
    pub passphrase: String,

    #[serde(default = "default_derivation_path")]
    pub derivation_path: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// First candidate index, for resuming an interrupted search
    #[serde(default)]
    pub start_index: u64,

    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Retries of a batch after transient failures; zero is rejected
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Worker threads for the CPU backend (None = one per core)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_words() -> Vec<String> {
    DEFAULT_WORDS.iter().map(|w| w.to_string()).collect()
}

fn default_word_count() -> usize {
    WORD_COUNT
}

fn default_derivation_path() -> String {
    DEFAULT_DERIVATION_PATH.to_string()
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig::new(DEFAULT_TARGET_ADDRESS)
    }
}

impl SearchConfig {
    pub fn new(target_address: impl Into<String>) -> Self {
        SearchConfig {
            target_address: target_address.into(),
            words: default_words(),
            wordlist_path: None,
            word_count: default_word_count(),
            passphrase: String::new(),
            derivation_path: default_derivation_path(),
            batch_size: default_batch_size(),
            start_index: 0,
            progress_interval: default_progress_interval(),
            max_retries: default_max_retries(),
            threads: None,
        }
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check every field against the others
    pub fn validate(&self) -> Result<(), Error> {
        address::address_to_hash160(&self.target_address)?;
        self.bip44_path()?;

        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }
        if self.word_count == 0 {
            return Err(Error::InvalidConfig("word_count must be positive".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries must be positive".to_string()));
        }
        if let Some(0) = self.threads {
            return Err(Error::InvalidConfig("threads must be positive".to_string()));
        }

        let vocabulary = self.vocabulary()?;
        let total = total_candidates(vocabulary.len(), self.word_count)?;
        if self.start_index > total {
            return Err(Error::IndexOutOfRange {
                index: self.start_index,
                total,
            });
        }

        Ok(())
    }

    /// The configured vocabulary, read from `wordlist_path` when set
    pub fn vocabulary(&self) -> Result<Vocabulary, Error> {
        match &self.wordlist_path {
            Some(path) => Vocabulary::from_lines(&std::fs::read_to_string(path)?),
            None => Vocabulary::new(self.words.iter().cloned()),
        }
    }

    pub fn bip44_path(&self) -> Result<Bip44Path, Error> {
        self.derivation_path.parse()
    }

    pub fn derivation_path(&self) -> Result<DerivationPath, Error> {
        Ok(self.bip44_path()?.to_derivation_path())
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            word_count: self.word_count,
            batch_size: self.batch_size,
            start_index: self.start_index,
            progress_interval: self.progress_interval,
            max_retries: self.max_retries,
        }
    }
}
