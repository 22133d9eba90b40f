use anyhow::{bail, Context, Result};
use bip44search::address;
use bip44search::bip39::{split_phrase, Mnemonic, Vocabulary};
use bip44search::monitor::{LogProgress, MultiSink, ProgressBarSink};
use bip44search::{
    CancellationToken, CandidateEnumerator, CpuBackend, KeyDeriver, RecoveredWallet,
    SearchConfig, SearchCoordinator, SearchOutcome,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bip44search")]
#[command(about = "Recover a BIP-39 phrase over a small vocabulary from its BIP-44 address")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the vocabulary and search settings come from
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long, env = "BIP44SEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Wordlist file, one word per line
    #[arg(long)]
    wordlist: Option<PathBuf>,

    /// Words per candidate phrase
    #[arg(long)]
    word_count: Option<usize>,

    /// BIP-39 passphrase
    #[arg(long, env = "BIP44SEARCH_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Derivation path, m/44'/0'/account'/change/index
    #[arg(long)]
    path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the candidate space for the phrase behind an address
    Search {
        #[command(flatten)]
        config: ConfigArgs,

        /// Target P2PKH address
        #[arg(short, long, env = "BIP44SEARCH_TARGET")]
        target: Option<String>,

        /// Candidates per dispatch
        #[arg(short, long)]
        batch_size: Option<u64>,

        /// First candidate index (resume point)
        #[arg(short, long)]
        start_index: Option<u64>,

        /// Candidates between progress reports
        #[arg(long)]
        progress_interval: Option<u64>,

        /// Transient failures tolerated per batch
        #[arg(long)]
        max_retries: Option<u32>,

        /// Worker threads
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Log progress only, without a progress bar
        #[arg(long)]
        no_progress_bar: bool,

        /// Write the effective configuration to a file and exit
        #[arg(long)]
        save_config: Option<PathBuf>,
    },
    /// Derive seed, keys and address for one phrase
    Derive {
        #[command(flatten)]
        config: ConfigArgs,

        /// Phrase to derive
        #[arg(required_unless_present = "random")]
        phrase: Option<String>,

        /// Use a random phrase drawn from the vocabulary
        #[arg(long, conflicts_with = "phrase")]
        random: bool,

        /// Skip the vocabulary and word-count check
        #[arg(long)]
        unchecked: bool,
    },
    /// Check an address and print its hash160
    ValidateAddress {
        address: String,
    },
    /// Show the phrase at a candidate index, or the index of a phrase
    Candidate {
        #[command(flatten)]
        config: ConfigArgs,

        #[arg(required_unless_present = "phrase")]
        index: Option<u64>,

        #[arg(long, conflicts_with = "index")]
        phrase: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("bip44search={}", log_level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Search {
            config,
            target,
            batch_size,
            start_index,
            progress_interval,
            max_retries,
            threads,
            no_progress_bar,
            save_config,
        } => {
            let mut search_config = load_config(&config)?;
            if let Some(target) = target {
                search_config.target_address = target;
            }
            if let Some(batch_size) = batch_size {
                search_config.batch_size = batch_size;
            }
            if let Some(start_index) = start_index {
                search_config.start_index = start_index;
            }
            if let Some(interval) = progress_interval {
                search_config.progress_interval = interval;
            }
            if let Some(max_retries) = max_retries {
                search_config.max_retries = max_retries;
            }
            if threads.is_some() {
                search_config.threads = threads;
            }
            search_config
                .validate()
                .context("Invalid search configuration")?;

            if let Some(path) = save_config {
                search_config
                    .to_file(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "configuration saved");
                return Ok(());
            }

            run_search(&search_config, !no_progress_bar)
        }
        Commands::Derive {
            config,
            phrase,
            random,
            unchecked,
        } => {
            let search_config = load_config(&config)?;
            let vocabulary = search_config.vocabulary()?;
            let deriver = KeyDeriver::new(
                search_config.derivation_path()?,
                search_config.passphrase.clone(),
            );

            let word_count = search_config.word_count;
            let phrase = if random {
                Mnemonic::random(&vocabulary, word_count, &mut rand::thread_rng()).phrase()
            } else {
                let phrase = phrase.context("Missing phrase")?;
                if unchecked {
                    phrase
                } else {
                    Mnemonic::from_phrase_with_count(&phrase, &vocabulary, word_count)
                        .context("Phrase does not fit the vocabulary")?
                        .phrase()
                }
            };

            let wallet = deriver.derive(&phrase).context("Derivation failed")?;
            print_wallet(&wallet);
            if !unchecked {
                let entropy = vocabulary.words_to_entropy(&split_phrase(&phrase));
                println!("Entropy:        {}", entropy.to_hex());
            }
            Ok(())
        }
        Commands::ValidateAddress { address } => {
            if !address::is_valid_address(&address) {
                bail!("{} is not a valid base58check address", address);
            }
            let hash160 = address::address_to_hash160(&address)?;
            println!("Address:  {}", address);
            println!("Hash160:  {}", hex::encode(hash160));
            Ok(())
        }
        Commands::Candidate {
            config,
            index,
            phrase,
        } => {
            let search_config = load_config(&config)?;
            let vocabulary = search_config.vocabulary()?;
            let enumerator =
                CandidateEnumerator::for_vocabulary(&vocabulary, search_config.word_count)?;

            match (index, phrase) {
                (Some(index), _) => {
                    println!("{}", enumerator.phrase_at(&vocabulary, index)?);
                }
                (None, Some(phrase)) => {
                    let indices = positions_of(&vocabulary, &phrase)?;
                    println!("{}", enumerator.index_of(&indices)?);
                }
                (None, None) => bail!("Give an index or --phrase"),
            }
            println!("of {} candidates", enumerator.total());
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<SearchConfig> {
    let mut config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SearchConfig::default(),
    };

    if let Some(wordlist) = &args.wordlist {
        config.wordlist_path = Some(wordlist.clone());
    }
    if let Some(word_count) = args.word_count {
        config.word_count = word_count;
    }
    if let Some(passphrase) = &args.passphrase {
        config.passphrase = passphrase.clone();
    }
    if let Some(path) = &args.path {
        config.derivation_path = path.clone();
    }

    Ok(config)
}

fn positions_of(vocabulary: &Vocabulary, phrase: &str) -> Result<Vec<u32>> {
    split_phrase(phrase)
        .into_iter()
        .map(|word| {
            vocabulary
                .position(word)
                .with_context(|| format!("Unknown word: {}", word))
        })
        .collect()
}

fn run_search(config: &SearchConfig, progress_bar: bool) -> Result<()> {
    let vocabulary = config.vocabulary()?;
    let deriver = KeyDeriver::new(config.derivation_path()?, config.passphrase.clone());

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after the current batch");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut coordinator =
        SearchCoordinator::new(&vocabulary, &deriver, &config.target_address, config.search_options())?
            .with_cancellation(cancel);
    let mut backend = CpuBackend::new(&vocabulary, &deriver, config.word_count, config.threads)?
        .with_max_batch(config.batch_size);
    info!(threads = backend.threads(), "cpu backend");

    let mut sink = MultiSink::new().push(LogProgress);
    if progress_bar {
        sink = sink.push(ProgressBarSink::new(
            coordinator.enumerator().total(),
            config.start_index,
        )?);
    }

    let report = coordinator
        .run(&mut backend, &sink)
        .context("Search aborted")?;

    match report.outcome {
        SearchOutcome::Found { index, wallet } => {
            println!("Match found at candidate {}", index);
            print_wallet(&wallet);
        }
        SearchOutcome::Exhausted => {
            println!(
                "No phrase matches {} ({} candidates tested in {:.1?})",
                config.target_address, report.stats.total_tested, report.elapsed
            );
        }
        SearchOutcome::Cancelled { next_index } => {
            println!(
                "Search cancelled after {} candidates; resume with --start-index {}",
                report.stats.total_tested, next_index
            );
        }
    }

    Ok(())
}

fn print_wallet(wallet: &RecoveredWallet) {
    println!("Mnemonic:       {}", wallet.mnemonic);
    println!("Path:           {}", wallet.derivation_path);
    println!("Seed:           {}", wallet.seed.to_hex());
    println!("Private key:    {}", wallet.private_key_hex());
    println!("Public key:     {}", wallet.public_key.to_hex());
    println!("WIF:            {}", wallet.wif);
    println!("Address:        {}", wallet.address);
}
