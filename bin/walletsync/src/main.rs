//! Walletsync - TRC20 transfer exporter.
//!
//! # Usage
//!
//! ```bash
//! # Export one wallet by label or address
//! walletsync run Treasury
//!
//! # Export every internal wallet, October only, and mirror to a sheet
//! walletsync run my_wallets --from-date 2025-10-01 --to-date 2025-10-31 --sheet-id 1AbC...
//!
//! # With environment overrides
//! TRONSCAN_API_KEY=... OUTPUT_DIR=exports walletsync run my_wallets
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use walletsync_core::directory::WalletDirectory;
use walletsync_core::models::DateRange;
use walletsync_core::ports::{FixedRates, RemoteSink};
use walletsync_core::services::{BatchReport, SyncConfig, SyncService};
use walletsync_sinks::{CsvFileSink, SheetsConfig, SheetsSink};
use walletsync_tronscan::{TronscanClient, TronscanConfig, USDT_CONTRACT};

/// Wallet argument selecting every internal wallet of the directory.
const MY_WALLETS: &str = "my_wallets";

/// Walletsync CLI - TRON USDT transfer exporter.
#[derive(Parser, Debug)]
#[command(name = "walletsync")]
#[command(about = "Export TRC20 transfers into CSV files and Google Sheets")]
#[command(version)]
struct Cli {
    /// Wallet directory CSV (address,label,owner_type).
    #[arg(
        long,
        env = "WALLET_DIRECTORY",
        default_value = "resources/wallet_directory.csv"
    )]
    directory: PathBuf,

    /// Directory receiving one CSV file per wallet.
    #[arg(long, env = "OUTPUT_DIR", default_value = "outputs/trc_usdt")]
    output_dir: PathBuf,

    /// Tronscan API base URL.
    #[arg(
        long,
        env = "TRONSCAN_URL",
        default_value = "https://apilist.tronscanapi.com"
    )]
    tronscan_url: String,

    /// Tronscan API key (optional, raises rate limits).
    #[arg(long, env = "TRONSCAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Transfers requested per page.
    #[arg(
        long,
        env = "TRONSCAN_PAGE_SIZE",
        default_value = "50",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    page_size: u32,

    /// Maximum pages fetched per wallet.
    #[arg(long, env = "TRONSCAN_MAX_PAGES", default_value = "100")]
    max_pages: u32,

    /// Per-request HTTP timeout, in seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "15")]
    http_timeout_secs: u64,

    /// Google service-account JSON key, used with --sheet-id.
    #[arg(
        long,
        env = "GSHEETS_CREDENTIALS",
        default_value = "credentials/gsheets_service_account.json"
    )]
    credentials: PathBuf,

    /// Token symbol (file prefix, tab prefix, fallback SYMB).
    #[arg(long, env = "TOKEN_SYMBOL", default_value = "USDT")]
    symbol: String,

    /// TRC20 contract address.
    #[arg(long, env = "TOKEN_CONTRACT", default_value = USDT_CONTRACT)]
    contract: String,

    /// Rate override as SYMB=VALUE. Repeatable. Stablecoins default to 1.
    #[arg(long = "rate", value_name = "SYMB=VALUE", value_parser = parse_rate)]
    rates: Vec<(String, Decimal)>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export transfers of one wallet, or of all internal wallets with `my_wallets`.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Wallet label, TRON address, or `my_wallets`.
    wallet: String,

    /// Output CSV path (single wallet only).
    output: Option<PathBuf>,

    /// First day included (YYYY-MM-DD, UTC).
    #[arg(long, value_parser = parse_date)]
    from_date: Option<NaiveDate>,

    /// Last day included (YYYY-MM-DD, UTC).
    #[arg(long, value_parser = parse_date)]
    to_date: Option<NaiveDate>,

    /// Also write each wallet to a tab of this spreadsheet.
    #[arg(long)]
    sheet_id: Option<String>,
}

/// Parse a `YYYY-MM-DD` date.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD.", s))
}

/// Parse a `SYMB=VALUE` rate override.
fn parse_rate(s: &str) -> Result<(String, Decimal), String> {
    let (symbol, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid rate '{}'. Use SYMB=VALUE.", s))?;

    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(format!("Invalid rate '{}': empty symbol.", s));
    }

    let rate: Decimal = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid rate '{}': '{}' is not a number.", s, value.trim()))?;
    if rate.is_sign_negative() {
        return Err(format!("Invalid rate '{}': rate cannot be negative.", s));
    }

    Ok((symbol, rate))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match &cli.command {
        Command::Run(args) => run(&cli, args).await,
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<ExitCode> {
    let range = DateRange::new(args.from_date, args.to_date).map_err(|e| anyhow!(e))?;

    let rates = cli
        .rates
        .iter()
        .fold(FixedRates::stablecoins(), |rates, (symbol, rate)| {
            rates.with_rate(symbol, *rate)
        });

    // ─────────────────────────────────────────────────────────────────────────
    // 📒 WALLET DIRECTORY
    // ─────────────────────────────────────────────────────────────────────────
    let directory =
        WalletDirectory::load(&cli.directory).context("Failed to load wallet directory")?;
    info!(
        wallets = directory.len(),
        internal = directory.internal().count(),
        "📒 Wallet directory loaded"
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 🔌 ADAPTERS
    // ─────────────────────────────────────────────────────────────────────────
    let timeout = Duration::from_secs(cli.http_timeout_secs);

    let source = TronscanClient::new(TronscanConfig {
        base_url: cli.tronscan_url.clone(),
        api_key: cli.api_key.clone().filter(|k| !k.trim().is_empty()),
        contract: cli.contract.clone(),
        symbol: cli.symbol.to_uppercase(),
        page_size: cli.page_size,
        max_pages: cli.max_pages,
        timeout,
    })
    .context("Failed to create Tronscan client")?;
    debug!(url = %cli.tronscan_url, "Tronscan endpoint");

    let remote: Option<Arc<dyn RemoteSink>> = match &args.sheet_id {
        Some(spreadsheet_id) => {
            let sink = SheetsSink::new(SheetsConfig {
                spreadsheet_id: spreadsheet_id.clone(),
                credentials_path: cli.credentials.clone(),
                timeout,
                ..Default::default()
            })
            .context("Invalid Google Sheets settings")?;
            info!(destination = %sink.destination(), "📊 Sheets output enabled");
            Some(Arc::new(sink) as Arc<dyn RemoteSink>)
        }
        None => None,
    };

    let config = SyncConfig {
        output_dir: cli.output_dir.clone(),
        file_prefix: format!("trc_{}", cli.symbol.to_lowercase()),
        symbol: cli.symbol.to_uppercase(),
        range,
    };

    let service = SyncService::new(
        config,
        Arc::new(source),
        Arc::new(CsvFileSink::new()),
        remote,
        Arc::new(rates),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 🔄 SYNC
    // ─────────────────────────────────────────────────────────────────────────
    if is_batch_target(&args.wallet) {
        if let Some(output) = &args.output {
            warn!(output = %output.display(), "⚠️  OUTPUT is ignored in my_wallets mode");
        }

        let report = service.sync_internal(&directory).await?;
        return Ok(summarize(&report));
    }

    let wallet = directory.resolve(&args.wallet)?;
    match service
        .sync_wallet(&directory, &wallet, args.output.as_deref())
        .await
    {
        Ok(report) => {
            info!(
                wallet = %report.label,
                rows = report.rows,
                filtered = report.filtered,
                file = %report.file.display(),
                "✅ Export complete"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(
                wallet = %wallet.account_label(),
                stage = %e.stage(),
                error = %e,
                "❌ Export failed"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Whether the wallet argument asks for every internal wallet.
fn is_batch_target(wallet: &str) -> bool {
    wallet.trim().eq_ignore_ascii_case(MY_WALLETS)
}

/// Log the outcome of a batch and pick the exit code.
fn summarize(report: &BatchReport) -> ExitCode {
    for wallet in &report.succeeded {
        info!(
            wallet = %wallet.label,
            rows = wallet.rows,
            file = %wallet.file.display(),
            "✅ Wallet exported"
        );
    }

    if report.is_success() {
        info!(
            wallets = report.succeeded.len(),
            rows = report.total_rows(),
            "🏁 Batch complete"
        );
        return ExitCode::SUCCESS;
    }

    let failed: Vec<&str> = report.failed.iter().map(|f| f.label.as_str()).collect();
    error!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        wallets = %failed.join(", "),
        "❌ Batch finished with failures"
    );
    ExitCode::FAILURE
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}
