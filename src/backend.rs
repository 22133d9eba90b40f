//! Host-side compute backend: every index of a batch is rebuilt and hashed
//! on a rayon pool.

use crate::bip39::Vocabulary;
use crate::enumerator::{CandidateEnumerator, SearchBatch};
use crate::error::{BackendError, Error, ErrorKind};
use crate::search::{ComputeBackend, SearchResult, TargetFingerprint};
use crate::wallet::{KeyDeriver, WalletDeriver};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Default cap on candidates per dispatch
pub const DEFAULT_MAX_BATCH: u64 = 256 * 4096;

/// Reference [`ComputeBackend`] running the full derivation pipeline per candidate
pub struct CpuBackend<'a, D: ?Sized = KeyDeriver> {
    vocabulary: &'a Vocabulary,
    deriver: &'a D,
    enumerator: CandidateEnumerator,
    pool: ThreadPool,
    max_batch: u64,
    skipped: AtomicU64,
}

impl<'a, D: WalletDeriver + Sync + ?Sized> CpuBackend<'a, D> {
    /// `threads = None` uses rayon's default worker count
    pub fn new(
        vocabulary: &'a Vocabulary,
        deriver: &'a D,
        word_count: usize,
        threads: Option<usize>,
    ) -> Result<Self, Error> {
        let enumerator = CandidateEnumerator::for_vocabulary(vocabulary, word_count)?;

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("cpu-backend-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| BackendError::fatal(format!("cannot start worker pool: {}", e)))?;

        debug!(threads = pool.current_num_threads(), "cpu backend ready");

        Ok(CpuBackend {
            vocabulary,
            deriver,
            enumerator,
            pool,
            max_batch: DEFAULT_MAX_BATCH,
            skipped: AtomicU64::new(0),
        })
    }

    pub fn with_max_batch(mut self, max_batch: u64) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Candidates passed over because their keys could not be derived
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn candidate_matches(&self, index: u64, target: &[u8; 20]) -> Result<bool, Error> {
        let phrase = self.enumerator.phrase_at(self.vocabulary, index)?;
        Ok(self.deriver.fingerprint(&phrase)? == *target)
    }

    /// `Some(Ok)` on a hit, `Some(Err)` when the whole batch must fail,
    /// `None` to keep scanning
    fn check(&self, index: u64, target: &[u8; 20]) -> Option<Result<u64, BackendError>> {
        match self.candidate_matches(index, target) {
            Ok(true) => Some(Ok(index)),
            Ok(false) => None,
            Err(err) if err.kind() == ErrorKind::Derivation => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(index, error = %err, "candidate cannot be derived, skipped");
                None
            }
            Err(err) => Some(Err(BackendError::fatal(format!(
                "candidate {}: {}",
                index, err
            )))),
        }
    }
}

impl<D: WalletDeriver + Sync + ?Sized> ComputeBackend for CpuBackend<'_, D> {
    fn max_batch(&self) -> u64 {
        self.max_batch
    }

    fn evaluate(
        &mut self,
        batch: &SearchBatch,
        target: &TargetFingerprint,
    ) -> Result<SearchResult, BackendError> {
        let this = &*self;
        let hit = this.pool.install(|| {
            batch
                .indices()
                .into_par_iter()
                .find_map_any(|index| this.check(index, &target.hash160))
        });

        match hit {
            Some(Ok(index)) => Ok(SearchResult::found(index)),
            Some(Err(err)) => Err(err),
            None => Ok(SearchResult::no_match()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{NoProgress, SearchCoordinator, SearchOptions, SearchOutcome};
    use crate::wallet::RecoveredWallet;

    fn small_vocabulary() -> Vocabulary {
        Vocabulary::new(["artigo", "ativo", "busca", "baseado"]).unwrap()
    }

    fn address_of(vocabulary: &Vocabulary, deriver: &KeyDeriver, index: u64) -> String {
        let phrase = CandidateEnumerator::new(4, 2)
            .unwrap()
            .phrase_at(vocabulary, index)
            .unwrap();
        deriver.derive(&phrase).unwrap().address
    }

    /// Fails with a chosen error for one phrase
    struct BrokenAt<'a> {
        inner: &'a KeyDeriver,
        phrase: String,
        failure: fn() -> Error,
    }

    impl<'a> BrokenAt<'a> {
        fn new(
            vocabulary: &Vocabulary,
            inner: &'a KeyDeriver,
            index: u64,
            failure: fn() -> Error,
        ) -> Self {
            let phrase = CandidateEnumerator::new(4, 2)
                .unwrap()
                .phrase_at(vocabulary, index)
                .unwrap();
            BrokenAt {
                inner,
                phrase,
                failure,
            }
        }
    }

    impl WalletDeriver for BrokenAt<'_> {
        fn fingerprint(&self, phrase: &str) -> Result<[u8; 20], Error> {
            if phrase == self.phrase {
                return Err((self.failure)());
            }
            self.inner.fingerprint(phrase)
        }

        fn derive(&self, phrase: &str) -> Result<RecoveredWallet, Error> {
            if phrase == self.phrase {
                return Err((self.failure)());
            }
            self.inner.derive(phrase)
        }
    }

    #[test]
    fn test_finds_candidate_in_batch() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let enumerator = CandidateEnumerator::new(4, 2).unwrap();
        let address = deriver
            .derive(&enumerator.phrase_at(&vocabulary, 9).unwrap())
            .unwrap()
            .address;
        let target = TargetFingerprint::from_address(&address).unwrap();

        let mut backend = CpuBackend::new(&vocabulary, &deriver, 2, Some(2)).unwrap();
        assert_eq!(
            backend.evaluate(&SearchBatch::new(6, 6), &target).unwrap(),
            SearchResult::found(9)
        );
        assert_eq!(
            backend.evaluate(&SearchBatch::new(0, 6), &target).unwrap(),
            SearchResult::no_match()
        );
    }

    #[test]
    fn test_batch_past_the_space_is_fatal() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let target = TargetFingerprint::from_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap();
        let mut backend = CpuBackend::new(&vocabulary, &deriver, 2, Some(1)).unwrap();

        let err = backend.evaluate(&SearchBatch::new(10, 4), &target).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_underivable_candidate_is_skipped() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let address = address_of(&vocabulary, &deriver, 10);
        let target = TargetFingerprint::from_address(&address).unwrap();
        let broken =
            BrokenAt::new(&vocabulary, &deriver, 9, || Error::InvalidKey("zero".to_string()));
        let mut backend = CpuBackend::new(&vocabulary, &broken, 2, Some(2)).unwrap();

        assert_eq!(
            backend.evaluate(&SearchBatch::new(6, 4), &target).unwrap(),
            SearchResult::no_match()
        );
        assert_eq!(backend.skipped(), 1);
        assert_eq!(
            backend.evaluate(&SearchBatch::new(10, 2), &target).unwrap(),
            SearchResult::found(10)
        );
    }

    #[test]
    fn test_search_continues_past_underivable_candidate() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let address = address_of(&vocabulary, &deriver, 10);
        let broken = BrokenAt::new(&vocabulary, &deriver, 5, || Error::InvalidChildKey(0));

        let options = SearchOptions {
            word_count: 2,
            batch_size: 3,
            progress_interval: 0,
            ..SearchOptions::default()
        };
        let mut coordinator =
            SearchCoordinator::new(&vocabulary, &broken, &address, options).unwrap();
        let mut backend = CpuBackend::new(&vocabulary, &broken, 2, Some(1)).unwrap();

        let report = coordinator.run(&mut backend, &NoProgress).unwrap();
        assert!(matches!(report.outcome, SearchOutcome::Found { index: 10, .. }));
        assert_eq!(backend.skipped(), 1);
    }

    #[test]
    fn test_seed_or_input_failure_aborts_search() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let address = address_of(&vocabulary, &deriver, 10);
        let failures: [fn() -> Error; 2] = [
            || Error::SeedDerivation("invalid output length".to_string()),
            || Error::UnknownWord("zebra".to_string()),
        ];

        for failure in failures {
            let broken = BrokenAt::new(&vocabulary, &deriver, 7, failure);
            let options = SearchOptions {
                word_count: 2,
                batch_size: 3,
                progress_interval: 0,
                ..SearchOptions::default()
            };
            let mut coordinator =
                SearchCoordinator::new(&vocabulary, &broken, &address, options).unwrap();
            let mut backend = CpuBackend::new(&vocabulary, &broken, 2, Some(1)).unwrap();

            match coordinator.run(&mut backend, &NoProgress) {
                Err(err @ Error::SearchAborted { index: 6, .. }) => {
                    assert_eq!(err.kind(), ErrorKind::Backend);
                }
                other => panic!("unexpected result {:?}", other),
            }
            assert_eq!(backend.skipped(), 0);
        }
    }

    #[test]
    fn test_end_to_end_search() {
        let vocabulary = small_vocabulary();
        let deriver = KeyDeriver::bip44("");
        let enumerator = CandidateEnumerator::new(4, 2).unwrap();
        let address = deriver
            .derive(&enumerator.phrase_at(&vocabulary, 10).unwrap())
            .unwrap()
            .address;

        let options = SearchOptions {
            word_count: 2,
            batch_size: 4,
            progress_interval: 0,
            ..SearchOptions::default()
        };
        let mut coordinator =
            SearchCoordinator::new(&vocabulary, &deriver, &address, options).unwrap();
        let mut backend = CpuBackend::new(&vocabulary, &deriver, 2, None)
            .unwrap()
            .with_max_batch(3);

        let report = coordinator.run(&mut backend, &NoProgress).unwrap();
        match report.outcome {
            SearchOutcome::Found { index, wallet } => {
                assert_eq!(index, 10);
                assert_eq!(wallet.address, address);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // batches of 3: [0,3) [3,6) [6,9) [9,12)
        assert_eq!(report.stats.batches, 4);
    }
}
