//! Build one generation snapshot.

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pokedb_core::{
    CachePolicy, CanonicalSource, Collector, CompositeProvider, Config, FetchCache, Generation,
    HttpFetcher, OutputStorage, PastValuesProvider, ResourceKind, RunOutcome,
    ScrapedChangeLogProvider,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::CliError;

/// Collection settings after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Categories to collect
    pub kinds: Vec<ResourceKind>,
    /// Requested generation; `None` means latest
    pub generation: Option<u32>,
    /// Coalesce requests without memoizing them
    pub no_cache: bool,
    /// Wall-clock budget for the run
    pub time_budget: Option<Duration>,
    /// Concurrent entity tasks
    pub workers: usize,
    /// Root for `gen-N` directories
    pub output_root: PathBuf,
    /// Scraped change-log directory
    pub changelog_dir: Option<PathBuf>,
    /// Replace an existing snapshot
    pub force: bool,
    /// Draw progress bars
    pub progress: bool,
    /// Print the end-of-run summary
    pub summary: bool,
}

impl CollectOptions {
    /// Merge command-line flags over `config`.
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        let workers = cli
            .workers
            .and_then(|w| usize::try_from(w).ok())
            .unwrap_or(config.collect.max_workers);
        Self {
            kinds: cli.selected_kinds(),
            generation: cli.generation,
            no_cache: cli.no_cache,
            time_budget: cli
                .time_budget
                .map(Duration::from_secs)
                .or_else(|| config.collect.time_budget()),
            workers,
            output_root: cli
                .output
                .clone()
                .unwrap_or_else(|| config.paths.output_root.clone()),
            changelog_dir: cli
                .changelog_dir
                .clone()
                .or_else(|| config.paths.changelog_dir.clone()),
            force: cli.force,
            progress: !(cli.no_progress || cli.quiet),
            summary: !cli.quiet,
        }
    }
}

/// Requested generation, clamped to what the source knows about.
pub fn clamp_generation(requested: Option<u32>, latest: Generation) -> Generation {
    match requested {
        Some(n) if n > latest.get() => {
            warn!(
                "Generation {} is beyond the latest ({}); collecting generation {} instead",
                n, latest, latest
            );
            latest
        },
        Some(n) => Generation::new(n),
        None => latest,
    }
}

/// Run a collection.
pub async fn execute(config: &Config, options: &CollectOptions) -> Result<RunOutcome, CliError> {
    let transport = HttpFetcher::new(&config.fetch).map_err(CliError::internal)?;
    let policy = if options.no_cache {
        CachePolicy::CoalesceOnly
    } else {
        CachePolicy::Memoize
    };
    let cache = FetchCache::from_config(Arc::new(transport), &config.fetch).with_policy(policy);
    let source = Arc::new(
        CanonicalSource::new(Arc::new(cache), &config.fetch.api_base_url)
            .map_err(CliError::usage)?
            .with_list_limit(config.fetch.list_limit),
    );

    let latest = source.latest_generation().await.map_err(CliError::network)?;
    let target = clamp_generation(options.generation, latest);
    let catalog = Arc::new(source.catalog(latest).await.map_err(CliError::network)?);

    let mut changes = CompositeProvider::new().with(Arc::new(PastValuesProvider::new(
        Arc::clone(&source),
        Arc::clone(&catalog),
    )));
    // Added last so scraped records win over the source's own history per field.
    if let Some(dir) = &options.changelog_dir {
        info!("Reading scraped change logs from {}", dir.display());
        changes = changes.with(Arc::new(ScrapedChangeLogProvider::new(dir, latest)));
    }

    let storage = OutputStorage::new(&options.output_root, target);
    storage.prepare(options.force).map_err(CliError::usage)?;
    info!(
        "Collecting generation {} into {}",
        target,
        storage.generation_dir().display()
    );

    let mut collector = Collector::new(
        source,
        catalog,
        Arc::new(changes),
        Arc::new(storage),
        target,
    )
    .with_workers(options.workers)
    .with_time_budget(options.time_budget);

    let bars = options.progress.then(ProgressBars::new);
    if let Some(bars) = &bars {
        let bars = bars.clone();
        collector = collector.with_progress(move |kind, done, total| bars.update(kind, done, total));
    }

    let outcome = collector.run(&options.kinds).await?;
    if let Some(bars) = bars {
        bars.finish();
    }
    if options.summary {
        print_summary(&outcome);
    }
    Ok(outcome)
}

/// One progress bar per kind, created when the kind starts.
#[derive(Clone)]
struct ProgressBars {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<ResourceKind, ProgressBar>>>,
}

impl ProgressBars {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn update(&self, kind: ResourceKind, done: usize, total: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let bar = bars.entry(kind).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total as u64));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:>8} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar.set_message(kind.as_str());
            bar
        });
        bar.set_position(done as u64);
        if done >= total {
            bar.finish();
        }
    }

    fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        for bar in bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn print_summary(outcome: &RunOutcome) {
    let report = &outcome.report;
    let header = format!("Generation {} snapshot", report.generation);
    println!("{}", header.bold());

    for (kind, counts) in &report.kinds {
        if let Some(error) = &counts.listing_error {
            println!("  {:<8} {}", kind.as_str(), error.red());
            continue;
        }
        let mut line = format!("  {:<8} {} written", kind.as_str(), counts.written.to_string().green());
        if counts.skipped > 0 {
            line.push_str(&format!(", {} skipped", counts.skipped));
        }
        if counts.failed > 0 {
            line.push_str(&format!(", {}", format!("{} failed", counts.failed).red()));
        }
        if counts.cancelled > 0 {
            line.push_str(&format!(", {}", format!("{} cancelled", counts.cancelled).yellow()));
        }
        println!("{line}");
    }

    for failure in report.failures.iter().take(10) {
        println!(
            "  {} {} {} ({}): {}",
            "✗".red(),
            failure.kind.as_str(),
            failure.name,
            failure.category,
            failure.message.dimmed()
        );
    }
    if report.failures.len() > 10 {
        println!("  … and {} more, see report.json", report.failures.len() - 10);
    }

    let status = if report.partial {
        "partial".yellow()
    } else {
        "complete".green()
    };
    println!("{} {}", "Status:".bold(), status);
}
