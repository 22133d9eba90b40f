//! Brute-force search over the candidate space.
//!
//! The coordinator walks `[start_index, total)` in increasing, non-overlapping
//! batches, hands each batch to a [`ComputeBackend`] and only declares a
//! match after rebuilding the full key material for the reported candidate
//! and comparing its address with the target. A rejected hit only clears
//! that one index; the rest of its batch is dispatched again.

use crate::address;
use crate::bip39::Vocabulary;
use crate::enumerator::{BatchPlan, CandidateEnumerator, SearchBatch};
use crate::error::{BackendError, Error, ErrorKind};
use crate::wallet::{KeyDeriver, RecoveredWallet, WalletDeriver};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Address being searched for, with the hash160 it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFingerprint {
    pub address: String,
    pub hash160: [u8; 20],
}

impl TargetFingerprint {
    pub fn from_address(address: &str) -> Result<Self, Error> {
        Ok(TargetFingerprint {
            hash160: address::address_to_hash160(address)?,
            address: address.to_string(),
        })
    }
}

/// What a backend found in one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub winning_index: Option<u64>,
}

impl SearchResult {
    pub fn no_match() -> Self {
        SearchResult {
            winning_index: None,
        }
    }

    pub fn found(index: u64) -> Self {
        SearchResult {
            winning_index: Some(index),
        }
    }

    pub fn matched(&self) -> bool {
        self.winning_index.is_some()
    }
}

/// Evaluates a whole batch of candidate indices against a target.
///
/// Calls are synchronous from the coordinator's side; an implementation may
/// spread a batch over as many lanes as it likes. Failures carry their own
/// transient/fatal classification.
pub trait ComputeBackend {
    /// Largest batch accepted by one call
    fn max_batch(&self) -> u64;

    /// Batch sizes are rounded down to a multiple of this
    fn granularity(&self) -> u64 {
        1
    }

    fn evaluate(
        &mut self,
        batch: &SearchBatch,
        target: &TargetFingerprint,
    ) -> Result<SearchResult, BackendError>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn max_batch(&self) -> u64 {
        (**self).max_batch()
    }

    fn granularity(&self) -> u64 {
        (**self).granularity()
    }

    fn evaluate(
        &mut self,
        batch: &SearchBatch,
        target: &TargetFingerprint,
    ) -> Result<SearchResult, BackendError> {
        (**self).evaluate(batch, target)
    }
}

/// Cooperative stop request, observed between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Snapshot handed to a [`ProgressSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Candidates evaluated by this run
    pub tested: u64,
    /// First index of the batch about to be dispatched
    pub position: u64,
    /// Size of the whole candidate space
    pub total: u64,
    /// Words of the candidate at `position`
    pub sample: Vec<String>,
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Candidates per second since the run started
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.tested as f64 / secs
        } else {
            0.0
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.position as f64 * 100.0 / self.total as f64
        }
    }
}

/// Receives periodic progress. Errors are logged and otherwise ignored.
pub trait ProgressSink {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()>;

    /// Called once when the run ends, whatever the outcome
    fn finish(&self, _stats: &SearchStats) {}
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: &ProgressUpdate) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Coordinator states. `MatchFound`, `AllExhausted` and `Fatal` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Dispatching,
    AwaitingResult,
    MatchFound,
    BatchExhausted,
    AllExhausted,
    Retryable,
    Fatal,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchState::MatchFound | SearchState::AllExhausted | SearchState::Fatal
        )
    }
}

/// Tunables of one search run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Words per candidate
    pub word_count: usize,
    /// Requested batch size, capped by the backend
    pub batch_size: u64,
    /// First candidate index to evaluate
    pub start_index: u64,
    /// Candidates between two progress reports
    pub progress_interval: u64,
    /// Consecutive transient failures tolerated for one batch, at least 1
    pub max_retries: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            word_count: crate::bip39::WORD_COUNT,
            batch_size: 256 * 4096,
            start_index: 0,
            progress_interval: 40_500_000,
            max_retries: 8,
        }
    }
}

/// Counters kept by the coordinator thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub total_tested: u64,
    pub batches: u64,
    pub retries: u64,
    pub false_positives: u64,
    pub skipped_candidates: u64,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found {
        index: u64,
        wallet: Box<RecoveredWallet>,
    },
    Exhausted,
    /// Stopped on request; `next_index` is the first index not yet evaluated
    Cancelled { next_index: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub stats: SearchStats,
    pub elapsed: Duration,
}

/// Result of checking one backend answer
enum Verdict {
    NoHit,
    Found(SearchOutcome),
    /// The hit at this index was checked and is not the target. The other
    /// indices of the batch are still unverified.
    Rejected(u64),
    /// The backend named an index outside the batch
    Unreliable(u64),
}

/// Drives the dispatch loop. Owns all mutable search state; the only value
/// shared with other threads is the cancellation token.
pub struct SearchCoordinator<'a, D: ?Sized = KeyDeriver> {
    vocabulary: &'a Vocabulary,
    deriver: &'a D,
    enumerator: CandidateEnumerator,
    target: TargetFingerprint,
    options: SearchOptions,
    cancel: CancellationToken,
    state: SearchState,
    stats: SearchStats,
}

impl<'a, D: WalletDeriver + ?Sized> SearchCoordinator<'a, D> {
    pub fn new(
        vocabulary: &'a Vocabulary,
        deriver: &'a D,
        target_address: &str,
        options: SearchOptions,
    ) -> Result<Self, Error> {
        if options.max_retries == 0 {
            return Err(Error::InvalidConfig(
                "max_retries must be positive".to_string(),
            ));
        }
        let enumerator = CandidateEnumerator::for_vocabulary(vocabulary, options.word_count)?;
        let target = TargetFingerprint::from_address(target_address)?;

        if options.start_index > enumerator.total() {
            return Err(Error::IndexOutOfRange {
                index: options.start_index,
                total: enumerator.total(),
            });
        }

        Ok(SearchCoordinator {
            vocabulary,
            deriver,
            enumerator,
            target,
            options,
            cancel: CancellationToken::new(),
            state: SearchState::Idle,
            stats: SearchStats::default(),
        })
    }

    /// Use an externally owned token, e.g. one set from a signal handler
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn enumerator(&self) -> &CandidateEnumerator {
        &self.enumerator
    }

    pub fn target(&self) -> &TargetFingerprint {
        &self.target
    }

    /// Batch size actually dispatched: the requested size capped by the
    /// backend, rounded down to its granularity, never below one granule
    pub fn effective_batch_size<B: ComputeBackend + ?Sized>(&self, backend: &B) -> Result<u64, Error> {
        let granule = backend.granularity().max(1);
        let wanted = self.options.batch_size.min(backend.max_batch());
        if wanted == 0 {
            return Err(Error::InvalidConfig(
                "batch size must be positive".to_string(),
            ));
        }
        Ok((wanted / granule).max(1) * granule)
    }

    /// Run until a verified match, exhaustion, cancellation or a fatal error
    pub fn run<B, P>(&mut self, backend: &mut B, progress: &P) -> Result<SearchReport, Error>
    where
        B: ComputeBackend + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let batch_size = self.effective_batch_size(&*backend)?;
        let plan = BatchPlan::new(self.options.start_index, self.enumerator.total(), batch_size)?;
        let started = Instant::now();
        self.stats = SearchStats::default();

        info!(
            vocabulary = self.vocabulary.len(),
            words = self.enumerator.word_count(),
            total = self.enumerator.total(),
            start = self.options.start_index,
            batch_size,
            address = %self.target.address,
            "starting search"
        );

        let result = self.dispatch_all(plan, backend, progress, started);
        progress.finish(&self.stats);

        let outcome = result?;
        match &outcome {
            SearchOutcome::Found { index, wallet } => {
                info!(index, address = %wallet.address, "match confirmed")
            }
            SearchOutcome::Exhausted => {
                info!(tested = self.stats.total_tested, "search space exhausted")
            }
            SearchOutcome::Cancelled { next_index } => {
                info!(next_index, tested = self.stats.total_tested, "search cancelled")
            }
        }

        Ok(SearchReport {
            outcome,
            stats: self.stats,
            elapsed: started.elapsed(),
        })
    }

    fn dispatch_all<B, P>(
        &mut self,
        mut plan: BatchPlan,
        backend: &mut B,
        progress: &P,
        started: Instant,
    ) -> Result<SearchOutcome, Error>
    where
        B: ComputeBackend + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let mut last_report: Option<u64> = None;
        // leftovers of split batches, in index order, ahead of the plan
        let mut pending: VecDeque<SearchBatch> = VecDeque::new();

        while let Some(batch) = pending.pop_front().or_else(|| plan.next()) {
            let mut attempts = 0u32;

            loop {
                if self.cancel.is_cancelled() {
                    self.state = SearchState::Idle;
                    return Ok(SearchOutcome::Cancelled {
                        next_index: batch.start,
                    });
                }

                self.state = SearchState::Dispatching;
                self.maybe_report(progress, &batch, started, &mut last_report);
                debug!(start = batch.start, count = batch.count, attempt = attempts, "dispatching batch");

                self.state = SearchState::AwaitingResult;
                let failure = match backend.evaluate(&batch, &self.target) {
                    Ok(result) => match self.inspect(&batch, result)? {
                        Verdict::NoHit => {
                            self.state = SearchState::BatchExhausted;
                            self.complete(&batch);
                            break;
                        }
                        Verdict::Found(found) => {
                            self.state = SearchState::MatchFound;
                            self.complete(&batch);
                            return Ok(found);
                        }
                        Verdict::Rejected(index) => {
                            self.state = SearchState::BatchExhausted;
                            self.stats.total_tested += 1;
                            let (head, tail) = batch.split_around(index);
                            for part in [tail, head] {
                                if !part.is_empty() {
                                    pending.push_front(part);
                                }
                            }
                            break;
                        }
                        Verdict::Unreliable(index) => BackendError::transient(format!(
                            "reported index {} outside [{}, {})",
                            index,
                            batch.start,
                            batch.end()
                        )),
                    },
                    Err(err) => err,
                };

                if failure.is_recoverable() && attempts < self.options.max_retries {
                    attempts += 1;
                    self.stats.retries += 1;
                    self.state = SearchState::Retryable;
                    warn!(start = batch.start, attempt = attempts, error = %failure, "transient backend failure, retrying batch");
                    continue;
                }

                self.state = SearchState::Fatal;
                if failure.is_recoverable() {
                    error!(start = batch.start, attempts, error = %failure, "backend kept failing, giving up");
                } else {
                    error!(start = batch.start, error = %failure, "fatal backend failure");
                }
                return Err(Error::SearchAborted {
                    index: batch.start,
                    source: Box::new(Error::Backend(failure)),
                });
            }
        }

        self.state = SearchState::AllExhausted;
        Ok(SearchOutcome::Exhausted)
    }

    fn complete(&mut self, batch: &SearchBatch) {
        self.stats.total_tested += batch.count;
        self.stats.batches += 1;
    }

    /// Verify a backend hit by rebuilding the candidate's address.
    /// Mismatches are backend errors and the search goes on.
    fn inspect(&mut self, batch: &SearchBatch, result: SearchResult) -> Result<Verdict, Error> {
        let index = match result.winning_index {
            Some(index) => index,
            None => return Ok(Verdict::NoHit),
        };

        if !batch.contains(index) {
            self.stats.false_positives += 1;
            warn!(index, start = batch.start, end = batch.end(), "backend reported an index outside the batch");
            return Ok(Verdict::Unreliable(index));
        }

        let phrase = match self.enumerator.phrase_at(self.vocabulary, index) {
            Ok(phrase) => phrase,
            Err(err) => {
                self.stats.false_positives += 1;
                warn!(index, error = %err, "backend reported an unusable index");
                return Ok(Verdict::Rejected(index));
            }
        };

        match self.deriver.derive(&phrase) {
            Ok(wallet) if wallet.address == self.target.address => {
                Ok(Verdict::Found(SearchOutcome::Found {
                    index,
                    wallet: Box::new(wallet),
                }))
            }
            Ok(wallet) => {
                self.stats.false_positives += 1;
                warn!(index, derived = %wallet.address, "backend false positive");
                Ok(Verdict::Rejected(index))
            }
            Err(err) if err.kind() == ErrorKind::Derivation => {
                self.stats.skipped_candidates += 1;
                warn!(index, error = %err, "skipping candidate that cannot be derived");
                Ok(Verdict::Rejected(index))
            }
            Err(err) => {
                error!(index, error = %err, "key derivation failed");
                Err(Error::SearchAborted {
                    index,
                    source: Box::new(err),
                })
            }
        }
    }

    fn maybe_report<P: ProgressSink + ?Sized>(
        &self,
        progress: &P,
        batch: &SearchBatch,
        started: Instant,
        last_report: &mut Option<u64>,
    ) {
        let tested = self.stats.total_tested;
        let due = match *last_report {
            None => true,
            Some(last) => tested - last >= self.options.progress_interval,
        };
        if !due {
            return;
        }
        *last_report = Some(tested);

        let update = ProgressUpdate {
            tested,
            position: batch.start,
            total: self.enumerator.total(),
            sample: self
                .enumerator
                .words_at(self.vocabulary, batch.start)
                .unwrap_or_default(),
            elapsed: started.elapsed(),
        };
        if let Err(err) = progress.report(&update) {
            debug!(error = %err, "progress sink failed");
        }
    }
}
