//! Progress sinks for the search coordinator.

use crate::search::{ProgressSink, ProgressUpdate, SearchStats};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Writes each update as a structured `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        info!(
            tested = update.tested,
            position = update.position,
            total = update.total,
            percent = %format!("{:.6}", update.percent()),
            rate = %format!("{:.1}/s", update.rate()),
            "testing phrase: {}",
            update.sample.join(" ")
        );
        Ok(())
    }

    fn finish(&self, stats: &SearchStats) {
        info!(
            tested = stats.total_tested,
            batches = stats.batches,
            retries = stats.retries,
            false_positives = stats.false_positives,
            skipped = stats.skipped_candidates,
            "search finished"
        );
    }
}

/// Terminal progress bar over the whole candidate space
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new(total: u64, start: u64) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(total);
        bar.set_style(ProgressStyle::default_bar().template(BAR_TEMPLATE)?.progress_chars("#>-"));
        bar.set_position(start);
        bar.set_message("searching...");
        Ok(ProgressBarSink { bar })
    }

    /// A bar that draws nothing, for tests and non-interactive runs
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        ProgressBarSink { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        self.bar.set_position(update.position);
        self.bar.set_message(format!(
            "{:.0}/s {}",
            update.rate(),
            update.sample.join(" ")
        ));
        Ok(())
    }

    fn finish(&self, stats: &SearchStats) {
        self.bar
            .finish_with_message(format!("{} candidates tested", stats.total_tested));
    }
}

/// Fans every update out to several sinks; one failing sink does not
/// starve the others
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ProgressSink + Send + Sync>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, sink: impl ProgressSink + Send + Sync + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ProgressSink for MultiSink {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.report(update) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn finish(&self, stats: &SearchStats) {
        for sink in &self.sinks {
            sink.finish(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn update(position: u64) -> ProgressUpdate {
        ProgressUpdate {
            tested: 10,
            position,
            total: 100,
            sample: vec!["inocente".to_string(), "baseado".to_string()],
            elapsed: Duration::from_secs(2),
        }
    }

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl ProgressSink for Counting {
        fn report(&self, _update: &ProgressUpdate) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    impl ProgressSink for Broken {
        fn report(&self, _update: &ProgressUpdate) -> anyhow::Result<()> {
            anyhow::bail!("broken pipe")
        }
    }

    #[test]
    fn test_update_rates() {
        let u = update(25);
        assert_eq!(u.rate(), 5.0);
        assert_eq!(u.percent(), 25.0);
    }

    #[test]
    fn test_bar_follows_position() {
        let sink = ProgressBarSink::hidden(100);
        sink.report(&update(40)).unwrap();
        assert_eq!(sink.position(), 40);
        sink.finish(&SearchStats::default());
    }

    #[test]
    fn test_log_sink_never_fails() {
        assert!(LogProgress.report(&update(1)).is_ok());
    }

    #[test]
    fn test_multi_sink_reaches_every_sink() {
        let counter = Counting::default();
        let multi = MultiSink::new()
            .push(counter.clone())
            .push(Broken)
            .push(counter.clone());

        assert!(multi.report(&update(3)).is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
