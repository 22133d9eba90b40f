//! Mnemonic codec and seed derivation over a fixed, reduced vocabulary.
//!
//! The vocabulary is a small subset of a full BIP-39 wordlist, so the
//! standard checksum cannot be checked against it and is never enforced.

use crate::error::Error;
use hmac::Hmac;
use rand::Rng;
use sha2::Sha512;
use std::collections::HashMap;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Number of words in every mnemonic handled by this crate
pub const WORD_COUNT: usize = 12;

/// Bits carried by one word index
pub const BITS_PER_WORD: usize = 11;

/// PBKDF2 iteration count for BIP-39 seed derivation
pub const PBKDF2_ROUNDS: u32 = 2048;

/// Salt prefix prepended to the passphrase
pub const SALT_PREFIX: &str = "mnemonic";

/// Length of a derived seed in bytes
pub const SEED_LEN: usize = 64;

/// Ordered set of candidate words. A word's index is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    words: Vec<String>,
    positions: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary, rejecting empty lists, duplicates and lists that
    /// do not fit an 11-bit index.
    pub fn new<I, S>(words: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();

        if words.is_empty() {
            return Err(Error::InvalidVocabulary("vocabulary is empty".to_string()));
        }
        if words.len() > 1 << BITS_PER_WORD {
            return Err(Error::InvalidVocabulary(format!(
                "{} words do not fit an {}-bit index",
                words.len(),
                BITS_PER_WORD
            )));
        }

        let mut positions = HashMap::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            if word.is_empty() || word.chars().any(char::is_whitespace) {
                return Err(Error::InvalidVocabulary(format!("invalid word {:?}", word)));
            }
            if positions.insert(word.clone(), i as u32).is_some() {
                return Err(Error::InvalidVocabulary(format!("duplicate word {}", word)));
            }
        }

        Ok(Vocabulary { words, positions })
    }

    /// Parse a wordlist with one word per line. Blank lines are ignored.
    pub fn from_lines(text: &str) -> Result<Self, Error> {
        Self::new(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn word(&self, index: u32) -> Option<&str> {
        self.words.get(index as usize).map(String::as_str)
    }

    pub fn position(&self, word: &str) -> Option<u32> {
        self.positions.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.positions.contains_key(word)
    }

    /// Check membership and the standard [`WORD_COUNT`] of a candidate phrase
    pub fn validate<S: AsRef<str>>(&self, words: &[S]) -> Result<(), Error> {
        self.validate_count(words, WORD_COUNT)
    }

    /// Check membership and an explicit word count
    pub fn validate_count<S: AsRef<str>>(&self, words: &[S], expected: usize) -> Result<(), Error> {
        if words.len() != expected {
            return Err(Error::InvalidWordCount {
                expected,
                actual: words.len(),
            });
        }

        match words.iter().find(|w| !self.contains(w.as_ref())) {
            Some(unknown) => Err(Error::UnknownWord(unknown.as_ref().to_string())),
            None => Ok(()),
        }
    }

    /// Map words to their positions. Words outside the vocabulary are
    /// skipped, so callers must validate first.
    pub fn words_to_indices<S: AsRef<str>>(&self, words: &[S]) -> Vec<u32> {
        words
            .iter()
            .filter_map(|w| self.position(w.as_ref()))
            .collect()
    }

    /// Inverse of [`Vocabulary::words_to_indices`]. Any index past the end
    /// of the vocabulary is an error.
    pub fn indices_to_words(&self, indices: &[u32]) -> Result<Vec<String>, Error> {
        indices
            .iter()
            .map(|&i| {
                self.word(i)
                    .map(str::to_string)
                    .ok_or(Error::IndexOutOfRange {
                        index: u64::from(i),
                        total: self.words.len() as u64,
                    })
            })
            .collect()
    }

    /// Pack each word index into an 11-bit field, most significant bit first
    pub fn words_to_bits<S: AsRef<str>>(&self, words: &[S]) -> Vec<bool> {
        let mut bits = Vec::with_capacity(words.len() * BITS_PER_WORD);
        for index in self.words_to_indices(words) {
            for shift in (0..BITS_PER_WORD).rev() {
                bits.push((index >> shift) & 1 == 1);
            }
        }
        bits
    }

    /// Recover the entropy bytes behind a phrase by dropping the trailing
    /// checksum bits (one per 33 bits). The checksum itself is not checked.
    pub fn words_to_entropy<S: AsRef<str>>(&self, words: &[S]) -> Entropy {
        let mut bits = self.words_to_bits(words);
        bits.truncate(bits.len() * 32 / 33);

        let bytes = bits
            .chunks(8)
            .map(|chunk| {
                let byte = chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8);
                byte << (8 - chunk.len())
            })
            .collect();

        Entropy(bytes)
    }
}

/// Raw entropy backing a mnemonic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entropy(Vec<u8>);

impl Entropy {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Split a phrase on any run of whitespace
pub fn split_phrase(phrase: &str) -> Vec<&str> {
    phrase.split_whitespace().collect()
}

/// A candidate phrase whose words all belong to a [`Vocabulary`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mnemonic {
    words: Vec<String>,
}

impl Mnemonic {
    /// Parse and validate a [`WORD_COUNT`]-word phrase against the vocabulary
    pub fn from_phrase(phrase: &str, vocabulary: &Vocabulary) -> Result<Self, Error> {
        Self::from_phrase_with_count(phrase, vocabulary, WORD_COUNT)
    }

    pub fn from_phrase_with_count(
        phrase: &str,
        vocabulary: &Vocabulary,
        word_count: usize,
    ) -> Result<Self, Error> {
        let words = split_phrase(phrase);
        vocabulary.validate_count(&words, word_count)?;

        Ok(Mnemonic {
            words: words.into_iter().map(str::to_string).collect(),
        })
    }

    /// Build a mnemonic from vocabulary indices. The word count is not checked.
    pub fn from_indices(indices: &[u32], vocabulary: &Vocabulary) -> Result<Self, Error> {
        Ok(Mnemonic {
            words: vocabulary.indices_to_words(indices)?,
        })
    }

    /// Draw `word_count` words uniformly, with replacement
    pub fn random<R: Rng>(vocabulary: &Vocabulary, word_count: usize, rng: &mut R) -> Self {
        let words = (0..word_count)
            .map(|_| vocabulary.words[rng.gen_range(0..vocabulary.len())].clone())
            .collect();
        Mnemonic { words }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn phrase(&self) -> String {
        self.words.join(" ")
    }

    pub fn indices(&self, vocabulary: &Vocabulary) -> Vec<u32> {
        vocabulary.words_to_indices(&self.words)
    }

    pub fn to_seed(&self, passphrase: &str) -> Result<Seed, Error> {
        derive_seed(&self.phrase(), passphrase)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

/// 64-byte stretched key material
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Seed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// PBKDF2-HMAC-SHA512 over the NFKD-normalized phrase, salted with
/// `"mnemonic" + passphrase`. The text is not validated.
pub fn derive_seed(mnemonic: &str, passphrase: &str) -> Result<Seed, Error> {
    let password: String = mnemonic.nfkd().collect();
    let salt: String = format!("{}{}", SALT_PREFIX, passphrase).nfkd().collect();

    let mut seed = [0u8; SEED_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha512>>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ROUNDS,
        &mut seed,
    )
    .map_err(|e| Error::SeedDerivation(e.to_string()))?;

    Ok(Seed(seed))
}
