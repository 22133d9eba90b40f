//! Indexing of ordered K-word selections without repetition.
//!
//! A candidate index is read as a mixed-radix number with radices
//! `V, V-1, ..., V-K+1`, least significant digit first. Digit `p` picks the
//! `d`-th word among those not used by positions `0..p`, so every index in
//! `[0, V!/(V-K)!)` maps to exactly one selection and back.

use crate::bip39::Vocabulary;
use crate::error::Error;
use std::ops::Range;

/// `V! / (V-K)!`, the number of ordered K-word selections without repetition
pub fn total_candidates(vocab_size: usize, k: usize) -> Result<u64, Error> {
    if k > vocab_size {
        return Err(Error::InvalidVocabulary(format!(
            "{} words cannot fill {} positions without repetition",
            vocab_size, k
        )));
    }

    ((vocab_size - k + 1)..=vocab_size).try_fold(1u64, |acc, radix| {
        acc.checked_mul(radix as u64).ok_or_else(|| {
            Error::SearchSpaceTooLarge(format!(
                "{}!/{}! does not fit in 64 bits",
                vocab_size,
                vocab_size - k
            ))
        })
    })
}

/// Maps candidate indices to word positions and back, one candidate at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateEnumerator {
    vocab_size: usize,
    k: usize,
    total: u64,
}

impl CandidateEnumerator {
    pub fn new(vocab_size: usize, k: usize) -> Result<Self, Error> {
        if k == 0 {
            return Err(Error::InvalidVocabulary(
                "candidates need at least one word".to_string(),
            ));
        }
        let total = total_candidates(vocab_size, k)?;
        Ok(CandidateEnumerator {
            vocab_size,
            k,
            total,
        })
    }

    pub fn for_vocabulary(vocabulary: &Vocabulary, k: usize) -> Result<Self, Error> {
        Self::new(vocabulary.len(), k)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn word_count(&self) -> usize {
        self.k
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Vocabulary positions of the candidate at `index`
    pub fn candidate_at(&self, index: u64) -> Result<Vec<u32>, Error> {
        if index >= self.total {
            return Err(Error::IndexOutOfRange {
                index,
                total: self.total,
            });
        }

        let mut unused: Vec<u32> = (0..self.vocab_size as u32).collect();
        let mut rest = index;
        let mut selection = Vec::with_capacity(self.k);

        for _ in 0..self.k {
            let radix = unused.len() as u64;
            let digit = (rest % radix) as usize;
            rest /= radix;
            selection.push(unused.remove(digit));
        }

        Ok(selection)
    }

    /// Inverse of [`CandidateEnumerator::candidate_at`]
    pub fn index_of(&self, selection: &[u32]) -> Result<u64, Error> {
        if selection.len() != self.k {
            return Err(Error::InvalidWordCount {
                expected: self.k,
                actual: selection.len(),
            });
        }

        let mut used = vec![false; self.vocab_size];
        let mut digits = Vec::with_capacity(self.k);

        for &position in selection {
            let slot = used.get_mut(position as usize).ok_or_else(|| {
                Error::InvalidVocabulary(format!("word position {} out of range", position))
            })?;
            if *slot {
                return Err(Error::InvalidVocabulary(format!(
                    "word position {} repeated",
                    position
                )));
            }
            *slot = true;

            // rank among the words still unused before this position
            let smaller_used = used[..position as usize].iter().filter(|&&u| u).count();
            digits.push((position as usize - smaller_used) as u64);
        }

        // Horner from the most significant digit; every partial value stays below `total`
        let index = digits
            .iter()
            .enumerate()
            .rev()
            .fold(0u64, |acc, (p, &digit)| {
                acc * (self.vocab_size - p) as u64 + digit
            });

        Ok(index)
    }

    /// Words of the candidate at `index`
    pub fn words_at(&self, vocabulary: &Vocabulary, index: u64) -> Result<Vec<String>, Error> {
        vocabulary.indices_to_words(&self.candidate_at(index)?)
    }

    /// Space-joined phrase of the candidate at `index`
    pub fn phrase_at(&self, vocabulary: &Vocabulary, index: u64) -> Result<String, Error> {
        Ok(self.words_at(vocabulary, index)?.join(" "))
    }
}

/// A contiguous range of candidate indices submitted together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBatch {
    pub start: u64,
    pub count: u64,
}

impl SearchBatch {
    pub fn new(start: u64, count: u64) -> Self {
        SearchBatch { start, count }
    }

    /// One past the last index of the batch
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn indices(&self) -> Range<u64> {
        self.start..self.end()
    }

    /// The parts of the batch before and after `index`, either possibly empty.
    /// `index` must lie inside the batch.
    pub fn split_around(&self, index: u64) -> (SearchBatch, SearchBatch) {
        let head = SearchBatch::new(self.start, index - self.start);
        let tail = SearchBatch::new(index + 1, self.end() - index - 1);
        (head, tail)
    }
}

/// Splits `[start, total)` into consecutive batches of `batch_size`,
/// the last one truncated at `total`
#[derive(Debug, Clone)]
pub struct BatchPlan {
    next: u64,
    total: u64,
    batch_size: u64,
}

impl BatchPlan {
    pub fn new(start: u64, total: u64, batch_size: u64) -> Result<Self, Error> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".to_string()));
        }
        if start > total {
            return Err(Error::IndexOutOfRange {
                index: start,
                total,
            });
        }
        Ok(BatchPlan {
            next: start,
            total,
            batch_size,
        })
    }

    /// First index not yet handed out
    pub fn position(&self) -> u64 {
        self.next
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.next
    }
}

impl Iterator for BatchPlan {
    type Item = SearchBatch;

    fn next(&mut self) -> Option<SearchBatch> {
        if self.next >= self.total {
            return None;
        }
        let count = self.batch_size.min(self.total - self.next);
        let batch = SearchBatch::new(self.next, count);
        self.next += count;
        Some(batch)
    }
}
