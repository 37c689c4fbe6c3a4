//! Sync service - orchestrates fetch, normalize and write per wallet.
//!
//! Wallets are processed strictly one after another. The directory is
//! passed in by reference on every call and never mutated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use crate::directory::WalletDirectory;
use crate::error::{NormalizeError, SinkFailures, SyncError, SyncResult};
use crate::models::{DateRange, NormalizedRow, WalletEntry};
use crate::ports::{LocalSink, RateSource, RemoteSink, TransferSource};
use crate::services::Normalizer;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding per-wallet CSV files.
    pub output_dir: PathBuf,
    /// File name prefix: `{prefix}_{account_label}.csv`.
    pub file_prefix: String,
    /// Token symbol used in tab names: `{symbol}_{account_label}_RAW`.
    pub symbol: String,
    /// Inclusive date bounds applied to every wallet.
    pub range: DateRange,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs/trc_usdt"),
            file_prefix: "trc_usdt".to_string(),
            symbol: "USDT".to_string(),
            range: DateRange::unbounded(),
        }
    }
}

impl SyncConfig {
    /// Default CSV path for a wallet.
    pub fn output_path(&self, wallet: &WalletEntry) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.csv", self.file_prefix, wallet.account_label()))
    }

    /// Remote tab name for a wallet.
    pub fn tab_name(&self, wallet: &WalletEntry) -> String {
        format!("{}_{}_RAW", self.symbol, wallet.account_label())
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of a successful wallet sync.
#[derive(Debug, Clone)]
pub struct WalletReport {
    pub label: String,
    pub address: String,
    /// Rows written to each sink.
    pub rows: usize,
    /// Transfers dropped by the date filter.
    pub filtered: usize,
    /// Transfers skipped because neither end was the wallet.
    pub unrelated: usize,
    pub file: PathBuf,
    /// Tab written, if the remote sink is enabled.
    pub tab: Option<String>,
}

/// A wallet that failed during a batch.
#[derive(Debug)]
pub struct WalletFailure {
    pub label: String,
    pub address: String,
    pub error: SyncError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<WalletReport>,
    pub failed: Vec<WalletFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.succeeded.iter().map(|r| r.rows).sum()
    }
}

/// Rows collected for one wallet plus skip counters.
struct CollectedRows {
    rows: Vec<NormalizedRow>,
    filtered: usize,
    unrelated: usize,
}

// =============================================================================
// SyncService
// =============================================================================

/// Fetch → filter → normalize → write pipeline.
///
/// # Flow
///
/// 1. Stream transfers for the wallet until the source is exhausted
/// 2. Drop transfers outside the configured date range
/// 3. Normalize each transfer against the directory
/// 4. Write all rows to the local file, then to the remote tab if enabled
///
/// Rows are only written once the stream is fully consumed, so a fetch or
/// normalize failure never reaches the sinks.
pub struct SyncService<S: TransferSource, L: LocalSink> {
    config: SyncConfig,
    source: Arc<S>,
    local: Arc<L>,
    remote: Option<Arc<dyn RemoteSink>>,
    rates: Arc<dyn RateSource>,
}

impl<S: TransferSource, L: LocalSink> SyncService<S, L> {
    pub fn new(
        config: SyncConfig,
        source: Arc<S>,
        local: Arc<L>,
        remote: Option<Arc<dyn RemoteSink>>,
        rates: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            config,
            source,
            local,
            remote,
            rates,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sync one wallet.
    ///
    /// `output` overrides the default CSV path.
    #[instrument(skip_all, fields(wallet = %wallet.account_label()))]
    pub async fn sync_wallet(
        &self,
        directory: &WalletDirectory,
        wallet: &WalletEntry,
        output: Option<&Path>,
    ) -> SyncResult<WalletReport> {
        let file = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.output_path(wallet));
        let tab = self.config.tab_name(wallet);

        info!(address = %wallet.address, file = %file.display(), "🔄 Exporting transfers");

        let collected = self.collect_rows(directory, wallet).await?;
        let tab = self.write_sinks(&collected.rows, &file, &tab).await?;

        Ok(WalletReport {
            label: wallet.account_label(),
            address: wallet.address.clone(),
            rows: collected.rows.len(),
            filtered: collected.filtered,
            unrelated: collected.unrelated,
            file,
            tab,
        })
    }

    /// Sync every wallet in order, continuing past failures.
    pub async fn sync_batch<'w>(
        &self,
        directory: &WalletDirectory,
        wallets: impl IntoIterator<Item = &'w WalletEntry>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for wallet in wallets {
            match self.sync_wallet(directory, wallet, None).await {
                Ok(wallet_report) => report.succeeded.push(wallet_report),
                Err(e) => {
                    error!(
                        wallet = %wallet.account_label(),
                        stage = %e.stage(),
                        error = %e,
                        "❌ Wallet sync failed"
                    );
                    report.failed.push(WalletFailure {
                        label: wallet.account_label(),
                        address: wallet.address.clone(),
                        error: e,
                    });
                }
            }
        }

        report
    }

    /// Sync all internal wallets of the directory (`my_wallets` mode).
    pub async fn sync_internal(&self, directory: &WalletDirectory) -> SyncResult<BatchReport> {
        let wallets: Vec<&WalletEntry> = directory.internal().collect();
        if wallets.is_empty() {
            return Err(SyncError::NoInternalWallets);
        }
        info!(wallets = wallets.len(), "📦 Syncing internal wallets");
        Ok(self.sync_batch(directory, wallets).await)
    }

    /// Consume the transfer stream and normalize every transfer in range.
    async fn collect_rows(
        &self,
        directory: &WalletDirectory,
        wallet: &WalletEntry,
    ) -> SyncResult<CollectedRows> {
        let normalizer = Normalizer::new(directory, self.rates.as_ref());
        let range = &self.config.range;
        let mut stream = self.source.fetch(&wallet.address, range).await?;

        let mut collected = CollectedRows {
            rows: Vec::new(),
            filtered: 0,
            unrelated: 0,
        };

        while let Some(result) = stream.next().await {
            let raw = result?;

            if !range.contains(raw.time.date()) {
                collected.filtered += 1;
                continue;
            }

            match normalizer.normalize(&raw, wallet) {
                Ok(row) => collected.rows.push(row),
                Err(NormalizeError::UnrelatedTransfer { tx_id, .. }) => {
                    debug!(tx = %tx_id, "Transfer does not involve wallet, skipping");
                    collected.unrelated += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            rows = collected.rows.len(),
            filtered = collected.filtered,
            unrelated = collected.unrelated,
            "Transfers normalized"
        );

        Ok(collected)
    }

    /// Write rows to both sinks. Each sink is attempted regardless of the other.
    ///
    /// Returns the tab name when the remote sink was written.
    async fn write_sinks(
        &self,
        rows: &[NormalizedRow],
        file: &Path,
        tab: &str,
    ) -> SyncResult<Option<String>> {
        let mut failures = SinkFailures::default();

        match self.local.write(rows, file).await {
            Ok(()) => info!(rows = rows.len(), file = %file.display(), "📝 CSV written"),
            Err(e) => {
                warn!(error = %e, "⚠️  Local write failed");
                failures.local = Some(e);
            }
        }

        let mut written_tab = None;
        if let Some(remote) = &self.remote {
            match remote.write(rows, tab).await {
                Ok(()) => {
                    info!(rows = rows.len(), tab, destination = %remote.destination(), "📊 Sheet tab written");
                    written_tab = Some(tab.to_string());
                }
                Err(e) => {
                    warn!(error = %e, "⚠️  Remote write failed");
                    failures.remote = Some(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(written_tab)
        } else {
            Err(SyncError::Sinks(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use futures::stream;
    use rust_decimal::Decimal;

    use crate::error::{FetchError, FetchResult, SinkError, SinkResult, Stage};
    use crate::models::{OwnerType, RawTransfer, TransferTime};
    use crate::ports::{FixedRates, TransferStream};

    const EXCHANGE: &str = "TNXoiAJ3dct8Fjg4M9fkLFh9S2v9TXc32G";
    const W1: &str = "TJDENsfBJs4RFETt1X1W8wMDc8M5XnJhCe";
    const W2: &str = "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE";
    const W3: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    /// Per-address canned transfers; addresses in `failing` error mid-stream.
    #[derive(Default)]
    struct MockSource {
        transfers: HashMap<String, Vec<RawTransfer>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl TransferSource for MockSource {
        async fn fetch(&self, address: &str, _range: &DateRange) -> FetchResult<TransferStream> {
            let mut items: Vec<FetchResult<RawTransfer>> = self
                .transfers
                .get(address)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(Ok)
                .collect();
            if self.failing.iter().any(|a| a == address) {
                items.push(Err(FetchError::RateLimited("429 Too Many Requests".into())));
            }
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Writes a simple CSV to disk so tests can inspect produced files.
    struct FileRecorder;

    #[async_trait]
    impl LocalSink for FileRecorder {
        async fn write(&self, rows: &[NormalizedRow], path: &Path) -> SinkResult<()> {
            let body: String = rows.iter().map(|r| r.to_record().join(",") + "\n").collect();
            std::fs::create_dir_all(path.parent().unwrap_or(Path::new(".")))
                .and_then(|_| std::fs::write(path, body))
                .map_err(|e| SinkError::Local {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
        }
    }

    struct BrokenLocal;

    #[async_trait]
    impl LocalSink for BrokenLocal {
        async fn write(&self, _rows: &[NormalizedRow], path: &Path) -> SinkResult<()> {
            Err(SinkError::Local {
                path: path.to_path_buf(),
                message: "read-only file system".into(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryRemote {
        tabs: Mutex<HashMap<String, Vec<NormalizedRow>>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteSink for MemoryRemote {
        async fn write(&self, rows: &[NormalizedRow], tab: &str) -> SinkResult<()> {
            if self.fail {
                return Err(SinkError::Remote {
                    tab: tab.to_string(),
                    message: "PERMISSION_DENIED".into(),
                });
            }
            self.tabs
                .lock()
                .unwrap()
                .insert(tab.to_string(), rows.to_vec());
            Ok(())
        }

        fn destination(&self) -> String {
            "memory".into()
        }
    }

    /// Remote whose credentials cannot be loaded: every tab write fails.
    struct UnconfiguredRemote;

    #[async_trait]
    impl RemoteSink for UnconfiguredRemote {
        async fn write(&self, _rows: &[NormalizedRow], tab: &str) -> SinkResult<()> {
            Err(SinkError::Remote {
                tab: tab.to_string(),
                message: "cannot load service account from /missing/key.json".into(),
            })
        }

        fn destination(&self) -> String {
            "unconfigured".into()
        }
    }

    fn day(y: i32, m: u32, d: u32) -> TransferTime {
        TransferTime::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn incoming(to: &str, time: TransferTime, units: i64) -> RawTransfer {
        RawTransfer {
            tx_id: format!("{}-{}", to, units),
            time,
            symbol: "USDT".into(),
            quantity: Decimal::from(units),
            from: EXCHANGE.into(),
            to: to.into(),
        }
    }

    fn directory() -> WalletDirectory {
        WalletDirectory::from_entries(vec![
            WalletEntry::new(EXCHANGE, "Binance", OwnerType::Client),
            WalletEntry::new(W1, "One", OwnerType::Internal),
            WalletEntry::new(W2, "Two", OwnerType::Internal),
            WalletEntry::new(W3, "Three", OwnerType::Internal),
        ])
        .unwrap()
    }

    fn config(dir: &Path, range: DateRange) -> SyncConfig {
        SyncConfig {
            output_dir: dir.to_path_buf(),
            range,
            ..Default::default()
        }
    }

    fn service<L: LocalSink>(
        config: SyncConfig,
        source: MockSource,
        local: L,
        remote: Option<Arc<dyn RemoteSink>>,
    ) -> SyncService<MockSource, L> {
        SyncService::new(
            config,
            Arc::new(source),
            Arc::new(local),
            remote,
            Arc::new(FixedRates::stablecoins()),
        )
    }

    // Test critique: le batch continue après l'échec de fetch du portefeuille 2
    #[tokio::test]
    async fn test_batch_continues_past_fetch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        for wallet in [W1, W2, W3] {
            source
                .transfers
                .insert(wallet.into(), vec![incoming(wallet, day(2025, 10, 1), 10)]);
        }
        source.failing.push(W2.into());

        let svc = service(config(tmp.path(), DateRange::unbounded()), source, FileRecorder, None);
        let report = svc.sync_internal(&dir).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].label, "Two");
        assert_eq!(report.failed[0].error.stage(), Stage::Fetch);

        assert!(tmp.path().join("trc_usdt_One.csv").exists());
        assert!(!tmp.path().join("trc_usdt_Two.csv").exists());
        assert!(tmp.path().join("trc_usdt_Three.csv").exists());
    }

    // Test critique: filtre de dates, ordre d'origine conservé
    #[tokio::test]
    async fn test_from_date_filter_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        source.transfers.insert(
            W1.into(),
            vec![
                incoming(W1, day(2025, 9, 30), 1),
                incoming(W1, day(2025, 10, 1), 2),
                incoming(W1, day(2025, 10, 15), 3),
            ],
        );
        let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 10, 1), None).unwrap();
        let remote = Arc::new(MemoryRemote::default());

        let svc = service(
            config(tmp.path(), range),
            source,
            FileRecorder,
            Some(remote.clone() as Arc<dyn RemoteSink>),
        );
        let wallet = dir.get(W1).unwrap();
        let report = svc.sync_wallet(&dir, wallet, None).await.unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.tab.as_deref(), Some("USDT_One_RAW"));

        let tabs = remote.tabs.lock().unwrap();
        let dates: Vec<String> = tabs["USDT_One_RAW"]
            .iter()
            .map(|r| r.date.to_string())
            .collect();
        assert_eq!(dates, vec!["2025-10-01", "2025-10-15"]);
    }

    // L'échec distant ne bloque pas l'écriture locale
    #[tokio::test]
    async fn test_remote_failure_keeps_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        source
            .transfers
            .insert(W1.into(), vec![incoming(W1, day(2025, 10, 1), 5)]);
        let remote = Arc::new(MemoryRemote {
            fail: true,
            ..Default::default()
        });

        let svc = service(
            config(tmp.path(), DateRange::unbounded()),
            source,
            FileRecorder,
            Some(remote as Arc<dyn RemoteSink>),
        );
        let err = svc
            .sync_wallet(&dir, dir.get(W1).unwrap(), None)
            .await
            .unwrap_err();

        match err {
            SyncError::Sinks(failures) => {
                assert!(failures.local.is_none());
                assert!(matches!(failures.remote, Some(SinkError::Remote { .. })));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(tmp.path().join("trc_usdt_One.csv").exists());
    }

    // Test critique: clé de service illisible, chaque CSV du batch est quand même écrit
    #[tokio::test]
    async fn test_unusable_remote_credentials_keep_batch_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        for wallet in [W1, W2, W3] {
            source
                .transfers
                .insert(wallet.into(), vec![incoming(wallet, day(2025, 10, 1), 7)]);
        }

        let svc = service(
            config(tmp.path(), DateRange::unbounded()),
            source,
            FileRecorder,
            Some(Arc::new(UnconfiguredRemote) as Arc<dyn RemoteSink>),
        );
        let report = svc.sync_internal(&dir).await.unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 3);
        for failure in &report.failed {
            assert_eq!(failure.error.stage(), Stage::Write);
            match &failure.error {
                SyncError::Sinks(failures) => {
                    assert!(failures.local.is_none());
                    assert!(failures.remote.is_some());
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        for label in ["One", "Two", "Three"] {
            assert!(tmp.path().join(format!("trc_usdt_{label}.csv")).exists());
        }
    }

    // Les deux sinks sont tentés même si le local échoue
    #[tokio::test]
    async fn test_local_failure_still_attempts_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        source
            .transfers
            .insert(W1.into(), vec![incoming(W1, day(2025, 10, 1), 5)]);
        let remote = Arc::new(MemoryRemote::default());

        let svc = service(
            config(tmp.path(), DateRange::unbounded()),
            source,
            BrokenLocal,
            Some(remote.clone() as Arc<dyn RemoteSink>),
        );
        let err = svc
            .sync_wallet(&dir, dir.get(W1).unwrap(), None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Write);
        assert!(remote.tabs.lock().unwrap().contains_key("USDT_One_RAW"));
    }

    #[tokio::test]
    async fn test_unrelated_transfers_skipped_and_output_override() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = directory();
        let mut source = MockSource::default();
        source.transfers.insert(
            W1.into(),
            vec![
                incoming(W2, day(2025, 10, 1), 9),
                incoming(W1, day(2025, 10, 2), 4),
            ],
        );
        let custom = tmp.path().join("custom").join("out.csv");

        let svc = service(config(tmp.path(), DateRange::unbounded()), source, FileRecorder, None);
        let report = svc
            .sync_wallet(&dir, dir.get(W1).unwrap(), Some(&custom))
            .await
            .unwrap();

        assert_eq!(report.rows, 1);
        assert_eq!(report.unrelated, 1);
        assert_eq!(report.tab, None);
        assert!(custom.exists());
    }

    #[tokio::test]
    async fn test_no_internal_wallets() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = WalletDirectory::from_entries(vec![WalletEntry::new(
            EXCHANGE,
            "Binance",
            OwnerType::Client,
        )])
        .unwrap();

        let svc = service(
            config(tmp.path(), DateRange::unbounded()),
            MockSource::default(),
            FileRecorder,
            None,
        );
        let err = svc.sync_internal(&dir).await.unwrap_err();
        assert!(matches!(err, SyncError::NoInternalWallets));
    }

    #[test]
    fn test_paths_and_tabs_use_account_label() {
        let cfg = SyncConfig::default();
        let unlabeled = WalletEntry::new(W3, "", OwnerType::Internal);
        assert_eq!(
            cfg.output_path(&unlabeled),
            PathBuf::from("outputs/trc_usdt/trc_usdt_gjLj6t.csv")
        );
        assert_eq!(cfg.tab_name(&unlabeled), "USDT_gjLj6t_RAW");
    }
}
