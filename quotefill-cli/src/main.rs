//! Quotefill CLI: session run, kind cache refresh and table maintenance.
//!
//! Commands:
//! - `run`: backfill, poll until the close, final snapshot, classification
//! - `classify`: refresh the `[kinds]` cache in the config file
//! - `tables ensure`: create a table for every symbol that lacks one
//! - `tables rename`: rename code-only tables to code + name

mod config;
mod kinds;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quotefill_core::fields::names;
use quotefill_core::{
    Classifier, CsvWorkbookOpener, HttpTransport, RetryingFetcher, RowLayout, SinkOpener,
    Transport, YahooSearchClassifier,
};
use quotefill_runner::{
    ensure_symbol_tables, rename_code_only_tables, AlwaysReconfirm, CancelToken, Ingestor,
    SessionConfig, SessionOrchestrator, SessionReport, SystemClock,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{write_kinds, AppConfig};
use crate::kinds::{resolve_kinds, KindResolution};

#[derive(Parser)]
#[command(
    name = "quotefill",
    about = "Quotefill: market data ingestion into a workbook of tables"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "quotefill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full session: backfill, intraday polling, final snapshot, classification.
    Run {
        /// Run the final snapshot twice.
        #[arg(long, default_value_t = false)]
        reconfirm: bool,

        /// Stop polling once this file exists.
        #[arg(long)]
        stop_file: Option<PathBuf>,
    },
    /// Refresh the classification cache in the config file.
    Classify {
        /// Look every symbol up again, ignoring cached kinds.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// Symbol table maintenance.
    Tables {
        #[command(subcommand)]
        action: TablesAction,
    },
}

#[derive(Subcommand)]
enum TablesAction {
    /// Create a table for every symbol that has none.
    Ensure,
    /// Rename tables named only by a code to code + name.
    Rename,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "quotefill=info,quotefill_core=info,quotefill_runner=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            reconfirm,
            stop_file,
        } => run_session(&cli.config, reconfirm, stop_file),
        Commands::Classify { refresh } => run_classify(&cli.config, refresh),
        Commands::Tables { action } => run_tables(&cli.config, action),
    }
}

struct Wiring {
    config: AppConfig,
    session: SessionConfig,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn Classifier>,
}

impl Wiring {
    fn load(path: &Path) -> Result<Self> {
        let config = AppConfig::from_file(path)?;
        let session = config.session_config()?;
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::new(session.fetch_timeout).context("failed to build HTTP client")?,
        );
        let fetcher = RetryingFetcher::new(Arc::clone(&transport), session.retry);
        let classifier: Arc<dyn Classifier> =
            Arc::new(YahooSearchClassifier::new(fetcher, config.endpoints.clone()));
        Ok(Self {
            config,
            session,
            transport,
            classifier,
        })
    }

    fn opener(&self) -> CsvWorkbookOpener {
        CsvWorkbookOpener::new(
            &self.config.workbook_dir,
            &self.config.primary_table,
            RowLayout::default(),
        )
    }

    /// Resolve kinds and write the cache back when it changed.
    fn resolve(&self, path: &Path, refresh: bool) -> Result<KindResolution> {
        let symbols = self.config.load_symbols()?;
        let resolution = resolve_kinds(&symbols, &self.config.kinds, self.classifier.as_ref(), refresh);
        if resolution.changed {
            write_kinds(path, &resolution.cache)?;
            info!(cached = resolution.cache.len(), "kind cache updated");
        }
        Ok(resolution)
    }
}

fn run_session(path: &Path, reconfirm: bool, stop_file: Option<PathBuf>) -> Result<()> {
    let wiring = Wiring::load(path)?;
    std::fs::create_dir_all(&wiring.config.workbook_dir).with_context(|| {
        format!("failed to create {}", wiring.config.workbook_dir.display())
    })?;
    let resolution = wiring.resolve(path, false)?;
    let opener = wiring.opener();

    if resolution.changed {
        let mut sink = opener.open()?;
        ensure_symbol_tables(sink.as_mut(), &resolution.entries)?;
        sink.close()?;
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());
    let finished = CancelToken::new();
    let watcher = stop_file.and_then(|file| spawn_stop_watcher(file, cancel.clone(), finished.clone()));

    let ingestor = Ingestor::from_config(
        &wiring.session,
        Arc::clone(&wiring.transport),
        wiring.config.endpoints.clone(),
        Some(Arc::clone(&wiring.classifier)),
    )?
    .with_cancel(cancel.clone());
    let mut orchestrator = SessionOrchestrator::new(wiring.session.clone(), ingestor, opener, SystemClock)
        .with_cancel(cancel);
    if reconfirm {
        orchestrator = orchestrator.with_reconfirm(AlwaysReconfirm);
    }

    let outcome = orchestrator.run(&resolution.entries);
    finished.cancel();
    if let Some(handle) = watcher {
        let _ = handle.join();
    }

    match outcome {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(abort) => {
            error!(phase = %abort.phase, "session aborted");
            Err(abort.into())
        }
    }
}

/// First Ctrl-C finishes the current pass and skips the remaining phases;
/// a second one exits immediately.
fn install_interrupt_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        info!("interrupt received, finishing current pass (Ctrl-C again to exit now)");
        cancel.cancel();
    });
    if let Err(e) = result {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }
}

/// Raise `cancel` once `file` appears; exit when `finished` is raised.
fn spawn_stop_watcher(
    file: PathBuf,
    cancel: CancelToken,
    finished: CancelToken,
) -> Option<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("quotefill-stop-watcher".into())
        .spawn(move || {
            while !finished.is_cancelled() {
                if file.exists() {
                    info!(file = %file.display(), "stop file found, finishing current pass");
                    cancel.cancel();
                    return;
                }
                thread::sleep(Duration::from_millis(500));
            }
        })
        .map_err(|e| error!(error = %e, "failed to start stop-file watcher"))
        .ok()
}

fn run_classify(path: &Path, refresh: bool) -> Result<()> {
    let wiring = Wiring::load(path)?;
    let resolution = wiring.resolve(path, refresh)?;

    for entry in &resolution.entries {
        let kind = entry.kind.map_or("unresolved", |k| k.as_str());
        println!("{:<8} {kind}", entry.symbol.as_str());
    }
    println!(
        "{} looked up, {} failed, cache {}",
        resolution.fetched,
        resolution.failed.len(),
        if resolution.changed { "updated" } else { "unchanged" }
    );
    Ok(())
}

fn run_tables(path: &Path, action: TablesAction) -> Result<()> {
    let config = AppConfig::from_file(path)?;
    let session = config.session_config()?;
    let layout = RowLayout::default();
    let opener = CsvWorkbookOpener::new(&config.workbook_dir, &config.primary_table, layout.clone());
    let mut sink = opener.open()?;

    match action {
        TablesAction::Ensure => {
            let symbols = config.load_symbols()?;
            let entries: Vec<_> = symbols
                .into_iter()
                .map(|s| quotefill_core::SymbolEntry::new(s, None))
                .collect();
            let created = ensure_symbol_tables(sink.as_mut(), &entries)?;
            println!("created {} table(s)", created.len());
            for name in created {
                println!("  {name}");
            }
        }
        TablesAction::Rename => {
            let name_col = layout.column(names::NAME).context("layout has no name column")?;
            let renamed = rename_code_only_tables(
                sink.as_mut(),
                layout.symbol_column(),
                name_col,
                session.first_data_row,
            )?;
            println!("renamed {} table(s)", renamed.len());
            for (from, to) in renamed {
                println!("  {from} -> {to}");
            }
        }
    }

    sink.close()?;
    Ok(())
}

fn print_summary(report: &SessionReport) {
    println!();
    println!("=== Session Summary ===");
    for phase in &report.phases {
        println!(
            "{:<20} passes: {:>4}  failed: {:>3}  row failures: {:>3}",
            phase.phase.as_str(),
            phase.passes,
            phase.failed_passes,
            phase.sink_failures
        );
        if !phase.degraded.is_empty() {
            let list: Vec<&str> = phase.degraded.iter().map(|s| s.as_str()).collect();
            println!("{:<20} partially filled: {}", "", list.join(", "));
        }
    }
    if report.cancelled {
        println!("Stopped by operator; remaining phases skipped.");
    }
}
