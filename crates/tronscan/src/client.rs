//! Tronscan HTTP client implementing the transfer source port.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use futures::{Stream, TryStreamExt, stream};
use tracing::{debug, instrument, trace, warn};
use url::Url;

use walletsync_core::error::{FetchError, FetchResult};
use walletsync_core::models::{DateRange, RawTransfer};
use walletsync_core::ports::{TransferSource, TransferStream};

use crate::parse::{parse_page, truncate};

/// USDT TRC20 contract on TRON mainnet.
pub const USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

const TRANSFERS_PATH: &str = "api/transfer/trc20";
const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";
const ERROR_BODY_CHARS: usize = 200;

/// Configuration for the Tronscan client.
#[derive(Debug, Clone)]
pub struct TronscanConfig {
    /// API base URL (e.g., "https://apilist.tronscanapi.com").
    pub base_url: String,
    /// Optional API key, sent as `TRON-PRO-API-KEY`.
    pub api_key: Option<String>,
    /// TRC20 contract address to filter on.
    pub contract: String,
    /// Symbol used when a record has no `tokenInfo.tokenAbbr`.
    pub symbol: String,
    /// Records per page.
    pub page_size: u32,
    /// Maximum pages fetched per wallet.
    pub max_pages: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for TronscanConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apilist.tronscanapi.com".to_string(),
            api_key: None,
            contract: USDT_CONTRACT.to_string(),
            symbol: "USDT".to_string(),
            page_size: 50,
            max_pages: 100,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Tronscan adapter implementing the TransferSource port.
pub struct TronscanClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    endpoint: Url,
    config: TronscanConfig,
}

impl TronscanClient {
    /// Build a client. No request is sent until [`TransferSource::fetch`].
    #[instrument(skip_all, fields(url = %config.base_url))]
    pub fn new(config: TronscanConfig) -> FetchResult<Self> {
        if config.page_size == 0 {
            return Err(FetchError::Config("page size must be at least 1".into()));
        }

        let endpoint = endpoint_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        debug!(
            authenticated = config.api_key.is_some(),
            page_size = config.page_size,
            max_pages = config.max_pages,
            "Tronscan client ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                config,
            }),
        })
    }
}

#[async_trait]
impl TransferSource for TronscanClient {
    async fn fetch(&self, address: &str, range: &DateRange) -> FetchResult<TransferStream> {
        let inner = Arc::clone(&self.inner);
        let address = address.to_string();
        let range = *range;
        let page_size = inner.config.page_size;
        let max_pages = inner.config.max_pages;

        let transfers = paginate(page_size, max_pages, move |start| {
            let inner = Arc::clone(&inner);
            let address = address.clone();
            async move { inner.fetch_page(&address, &range, start).await }
        });

        Ok(Box::pin(transfers))
    }
}

impl Inner {
    #[instrument(skip(self, range))]
    async fn fetch_page(
        &self,
        address: &str,
        range: &DateRange,
        start: u32,
    ) -> FetchResult<Vec<RawTransfer>> {
        let url = page_url(&self.endpoint, &self.config, address, range, start);
        trace!(%url, "Requesting page");

        let mut request = self.http.get(url);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        check_status(status, &body)?;
        let transfers = parse_page(&body, &self.config.symbol)?;
        debug!(count = transfers.len(), "Fetched page");
        Ok(transfers)
    }
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct PageCursor {
    page: u32,
    start: u32,
}

/// Lazily page through a source until an empty page or the page cap.
///
/// `fetch_page` receives the offset of the first record of the page.
fn paginate<F, Fut>(
    page_size: u32,
    max_pages: u32,
    fetch_page: F,
) -> impl Stream<Item = FetchResult<RawTransfer>> + Send + 'static
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<Vec<RawTransfer>>> + Send + 'static,
{
    let fetch_page = Arc::new(fetch_page);

    stream::try_unfold(PageCursor { page: 0, start: 0 }, move |cursor| {
        next_page(Arc::clone(&fetch_page), cursor, page_size, max_pages)
    })
    .map_ok(|transfers| stream::iter(transfers.into_iter().map(Ok::<_, FetchError>)))
    .try_flatten()
}

async fn next_page<F, Fut>(
    fetch_page: Arc<F>,
    cursor: PageCursor,
    page_size: u32,
    max_pages: u32,
) -> FetchResult<Option<(Vec<RawTransfer>, PageCursor)>>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = FetchResult<Vec<RawTransfer>>>,
{
    if cursor.page >= max_pages {
        warn!(max_pages, "⚠️  Page cap reached, older transfers may be missing");
        return Ok(None);
    }

    let transfers = fetch_page(cursor.start).await?;
    if transfers.is_empty() {
        return Ok(None);
    }

    let next = PageCursor {
        page: cursor.page + 1,
        start: cursor.start.saturating_add(page_size),
    };
    Ok(Some((transfers, next)))
}

// =============================================================================
// Request helpers
// =============================================================================

fn endpoint_url(base_url: &str) -> FetchResult<Url> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join(TRANSFERS_PATH))
        .map_err(|e| FetchError::Config(format!("invalid base URL '{}': {}", base_url, e)))
}

/// Page request URL. Date bounds become millisecond timestamps covering
/// whole UTC days.
fn page_url(
    endpoint: &Url,
    config: &TronscanConfig,
    address: &str,
    range: &DateRange,
    start: u32,
) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("address", address)
            .append_pair("trc20Id", &config.contract)
            .append_pair("start", &start.to_string())
            .append_pair("limit", &config.page_size.to_string())
            .append_pair("direction", "0")
            .append_pair("reverse", "false")
            .append_pair("db_version", "1");

        if let Some(from) = range.from {
            let ms = from.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
            query.append_pair("start_timestamp", &ms.to_string());
        }
        if let Some(to) = range.to
            && let Some(next_day) = to.succ_opt()
        {
            let ms = next_day.and_time(NaiveTime::MIN).and_utc().timestamp_millis() - 1;
            query.append_pair("end_timestamp", &ms.to_string());
        }
    }
    url
}

fn check_status(status: u16, body: &str) -> FetchResult<()> {
    match status {
        200 => Ok(()),
        429 => Err(FetchError::RateLimited(truncate(body, ERROR_BODY_CHARS))),
        _ => Err(FetchError::Api {
            status,
            body: truncate(body, ERROR_BODY_CHARS),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use futures::StreamExt;
    use rust_decimal::Decimal;
    use walletsync_core::models::TransferTime;

    fn transfer(n: u32) -> RawTransfer {
        RawTransfer {
            tx_id: format!("tx{}", n),
            time: TransferTime::Date(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()),
            symbol: "USDT".into(),
            quantity: Decimal::from(n),
            from: "TA".into(),
            to: "TB".into(),
        }
    }

    /// Pages of `sizes[i]` transfers, then empty pages. Records requested offsets.
    fn pages(
        sizes: Vec<u32>,
        offsets: Arc<Mutex<Vec<u32>>>,
    ) -> impl Fn(u32) -> futures::future::Ready<FetchResult<Vec<RawTransfer>>> + Send + Sync + 'static
    {
        move |start| {
            let mut seen = offsets.lock().unwrap();
            let page = seen.len();
            seen.push(start);
            let count = sizes.get(page).copied().unwrap_or(0);
            futures::future::ready(Ok((0..count).map(|i| transfer(start + i)).collect()))
        }
    }

    // Test critique: la pagination s'arrête sur la première page vide
    #[tokio::test]
    async fn test_paginate_stops_on_empty_page() {
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let stream = paginate(2, 100, pages(vec![2, 2, 1], offsets.clone()));
        let transfers: Vec<RawTransfer> = stream.try_collect().await.unwrap();

        let ids: Vec<&str> = transfers.iter().map(|t| t.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["tx0", "tx1", "tx2", "tx3", "tx4"]);
        assert_eq!(*offsets.lock().unwrap(), vec![0, 2, 4, 6]);
    }

    #[tokio::test]
    async fn test_paginate_respects_page_cap() {
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let stream = paginate(1, 3, pages(vec![1; 10], offsets.clone()));
        let transfers: Vec<RawTransfer> = stream.try_collect().await.unwrap();

        assert_eq!(transfers.len(), 3);
        assert_eq!(offsets.lock().unwrap().len(), 3);
    }

    // Une erreur au milieu du flux est remontée après les pages précédentes
    #[tokio::test]
    async fn test_paginate_surfaces_mid_stream_error() {
        let stream = paginate(1, 10, |start| async move {
            if start == 0 {
                Ok(vec![transfer(0)])
            } else {
                Err(FetchError::RateLimited("slow down".into()))
            }
        });
        let results: Vec<FetchResult<RawTransfer>> = stream.collect().await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(FetchError::RateLimited(_))));
    }

    #[test]
    fn test_page_url_parameters() {
        let config = TronscanConfig::default();
        let endpoint = endpoint_url("https://apilist.tronscanapi.com/").unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 10, 1),
            NaiveDate::from_ymd_opt(2025, 10, 1),
        )
        .unwrap();

        let url = page_url(&endpoint, &config, "TJDENsfBJs4RFETt1X1W8wMDc8M5XnJhCe", &range, 50);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(url.path(), "/api/transfer/trc20");
        assert_eq!(get("trc20Id"), Some(USDT_CONTRACT));
        assert_eq!(get("start"), Some("50"));
        assert_eq!(get("limit"), Some("50"));
        assert_eq!(get("reverse"), Some("false"));
        assert_eq!(get("start_timestamp"), Some("1759276800000"));
        assert_eq!(get("end_timestamp"), Some("1759363199999"));

        let unbounded = page_url(&endpoint, &config, "T", &DateRange::unbounded(), 0);
        assert!(!unbounded.query().unwrap().contains("timestamp"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(200, "").is_ok());
        assert!(matches!(check_status(429, "busy"), Err(FetchError::RateLimited(_))));

        let long = "x".repeat(500);
        match check_status(503, &long) {
            Err(FetchError::Api { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    // Une mauvaise configuration ne doit pas ressembler à une panne réseau
    #[test]
    fn test_invalid_config_is_config_error() {
        let config = TronscanConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            TronscanClient::new(config),
            Err(FetchError::Config(ref m)) if m.contains("base URL")
        ));

        let config = TronscanConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(TronscanClient::new(config), Err(FetchError::Config(_))));
    }
}
