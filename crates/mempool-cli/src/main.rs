use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use mempool_data::esplora::EsploraBackend;
use mempool_data::{MempoolBackend, StrippedTransaction, TransactionExtended};
use mempool_sync::{FlushProtectionConfig, MempoolSync, SyncConfig};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct AppContext {
    esplora_url: String,
}

#[derive(Parser, Debug)]
#[command(name = "mempool-mirror")]
#[command(about = "Live in-memory mirror of a node's pending-transaction pool")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Esplora-compatible endpoint; falls back to MEMPOOL_ESPLORA_URL.
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror the upstream mempool until interrupted.
    Run(RunArgs),
    /// One-shot upstream pool summary.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Pass period in milliseconds; the per-pass fetch budget is ten times
    /// this.
    #[arg(long, default_value_t = 2_000)]
    refresh_rate_ms: u64,

    /// Rate smoothing window in seconds.
    #[arg(long, default_value_t = 150)]
    rate_window_seconds: u64,

    /// Capacity of the latest-arrivals list.
    #[arg(long, default_value_t = 6)]
    latest_capacity: usize,

    /// Cache size above which flush protection may arm.
    #[arg(long, default_value_t = 20_000)]
    flush_min_size: usize,

    /// Arm flush protection when upstream/cache ratio drops to this or
    /// below.
    #[arg(long, default_value_t = 0.80)]
    flush_ratio: f64,

    /// Flush-protection cooldown in milliseconds.
    #[arg(long, default_value_t = 120_000)]
    flush_cooldown_ms: u64,

    /// Seconds between rate reports once in sync.
    #[arg(long, default_value_t = 10)]
    report_interval_s: u64,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        esplora_url: cli
            .esplora_url
            .or_else(|| std::env::var("MEMPOOL_ESPLORA_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:3000".to_string()),
    };

    match cli.command {
        Commands::Run(args) => handle_run(&ctx, args).await,
        Commands::Status(args) => handle_status(&ctx, args).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn handle_run(ctx: &AppContext, args: RunArgs) -> Result<()> {
    let config = SyncConfig {
        refresh_rate_ms: args.refresh_rate_ms,
        rate_window_seconds: args.rate_window_seconds,
        flush_protection: FlushProtectionConfig {
            min_before_size: args.flush_min_size,
            ratio_threshold: args.flush_ratio,
            cooldown_ms: args.flush_cooldown_ms,
        },
        latest_capacity: args.latest_capacity,
    };

    let backend = Arc::new(EsploraBackend::new(&ctx.esplora_url).await?);
    let engine = Arc::new(
        MempoolSync::new(
            backend,
            |tx: &TransactionExtended| StrippedTransaction::from(tx),
            config,
        )
        .wrap_err("failed to construct sync engine")?,
    );

    engine.set_observer(|_, added, removed| {
        if !added.is_empty() || !removed.is_empty() {
            debug!(
                added = added.len(),
                removed = removed.len(),
                "mempool changed"
            );
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("syncing mempool from upstream");

    let mut synced = false;
    let mut ticks: u64 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;

                if !synced {
                    let cached = engine.snapshot().len();
                    spinner.set_message(format!("syncing mempool: {} transactions cached", cached));
                    if engine.is_in_sync() {
                        spinner.finish_with_message(format!("in sync: {} transactions cached", cached));
                        synced = true;
                    }
                } else if ticks % args.report_interval_s.max(1) == 0 {
                    let rates = engine.rates();
                    let upstream = engine.info();
                    info!(
                        tx_per_second = format!("{:.2}", rates.tx_per_second),
                        vbytes_per_second = rates.vbytes_per_second,
                        cached = engine.snapshot().len(),
                        upstream_size = upstream.size,
                        latest = engine.latest().len(),
                        "mempool mirror report"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.wrap_err("failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    shutdown_tx.send(true).ok();
    runner.await.wrap_err("sync task panicked")?;

    info!("mempool mirror stopped");
    Ok(())
}

async fn handle_status(ctx: &AppContext, args: StatusArgs) -> Result<()> {
    let backend = EsploraBackend::new(&ctx.esplora_url).await?;

    let info = backend.get_mempool_info().await?;
    let ids = backend
        .list_pending_ids()
        .await
        .wrap_err("failed to list pending transaction ids")?;

    let checked_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    match args.output.to_lowercase().as_str() {
        "json" => {
            #[derive(serde::Serialize)]
            struct StatusOutput<'a> {
                endpoint: &'a str,
                pending_transactions: u64,
                pool_vsize: u64,
                listed_txids: usize,
                checked_at: &'a str,
            }

            let output = StatusOutput {
                endpoint: &ctx.esplora_url,
                pending_transactions: info.size,
                pool_vsize: info.bytes,
                listed_txids: ids.len(),
                checked_at: &checked_at,
            };

            let json_str =
                serde_json::to_string_pretty(&output).wrap_err("failed to serialize JSON")?;
            println!("{}", json_str);
        }
        "table" => {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Metric", "Value"]);

            table.add_row(vec!["Endpoint", ctx.esplora_url.as_str()]);
            table.add_row(vec!["Pending transactions", &format!("{}", info.size)]);
            table.add_row(vec!["Pool vsize (vB)", &format!("{}", info.bytes)]);
            table.add_row(vec!["Listed txids", &format!("{}", ids.len())]);
            table.add_row(vec!["Checked at", &checked_at]);

            println!("\n{table}\n");
        }
        other => {
            return Err(color_eyre::eyre::eyre!(
                "unknown output format '{}'; use 'table' or 'json'",
                other
            ))
        }
    }

    info!(
        pending = info.size,
        vsize = info.bytes,
        listed = ids.len(),
        "status command completed"
    );

    Ok(())
}
