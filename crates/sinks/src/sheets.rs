//! Google Sheets tab sink using the Sheets v4 REST API.
//!
//! Each write replaces a whole tab: the tab is created if absent, cleared,
//! then filled from `A1` with the header and rows as raw values.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use url::Url;

use walletsync_core::error::{SinkError, SinkResult};
use walletsync_core::models::{NormalizedRow, ROW_HEADER};
use walletsync_core::ports::RemoteSink;

/// OAuth scope needed to read and write spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const NEW_TAB_ROWS: u32 = 1000;
const NEW_TAB_COLUMNS: u32 = 10;
const ERROR_BODY_CHARS: usize = 200;

/// Configuration for the Sheets sink.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Target spreadsheet ID.
    pub spreadsheet_id: String,
    /// Service-account JSON key file.
    pub credentials_path: PathBuf,
    /// API root, without trailing slash.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            credentials_path: PathBuf::from("credentials/gsheets_service_account.json"),
            api_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Remote sink writing one tab per wallet.
///
/// The service-account key is loaded on the first write, so a bad key fails
/// each tab write instead of the whole run. A failed load is retried on the
/// next write.
pub struct SheetsSink {
    http: reqwest::Client,
    auth: OnceCell<Arc<dyn TokenProvider>>,
    config: SheetsConfig,
}

impl SheetsSink {
    /// Build the HTTP client. No file is read and no request is sent until
    /// the first write.
    #[instrument(skip_all, fields(spreadsheet = %config.spreadsheet_id))]
    pub fn new(config: SheetsConfig) -> SinkResult<Self> {
        if config.spreadsheet_id.trim().is_empty() {
            return Err(SinkError::Setup("spreadsheet ID is empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Setup(e.to_string()))?;

        debug!("Sheets sink ready");

        Ok(Self {
            http,
            auth: OnceCell::new(),
            config,
        })
    }

    async fn token_provider(&self, tab: &str) -> SinkResult<&Arc<dyn TokenProvider>> {
        self.auth
            .get_or_try_init(|| async { load_service_account(&self.config.credentials_path) })
            .await
            .map_err(|e| remote_error(tab, e))
    }

    /// Spreadsheet URL with extra path segments, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, String> {
        spreadsheet_url(&self.config.api_url, &self.config.spreadsheet_id, segments)
    }

    async fn send(&self, tab: &str, request: RequestBuilder) -> SinkResult<Value> {
        let token = self
            .token_provider(tab)
            .await?
            .token(&[SHEETS_SCOPE])
            .await
            .map_err(|e| remote_error(tab, format!("authentication failed: {}", e)))?;

        let response = request
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| remote_error(tab, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| remote_error(tab, e))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(remote_error(tab, format!("HTTP {}: {}", status.as_u16(), snippet)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| remote_error(tab, e))
    }

    async fn call(
        &self,
        tab: &str,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> SinkResult<Value> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(tab, request).await
    }

    async fn tab_exists(&self, tab: &str) -> SinkResult<bool> {
        let mut url = self.url(&[]).map_err(|e| remote_error(tab, e))?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let metadata = self.call(tab, Method::GET, url, None).await?;
        let metadata: SpreadsheetMetadata =
            serde_json::from_value(metadata).map_err(|e| remote_error(tab, e))?;
        Ok(metadata.has_tab(tab))
    }
}

#[async_trait]
impl RemoteSink for SheetsSink {
    #[instrument(skip_all, fields(tab = %tab, rows = rows.len()))]
    async fn write(&self, rows: &[NormalizedRow], tab: &str) -> SinkResult<()> {
        if !self.tab_exists(tab).await? {
            let id = format!("{}:batchUpdate", self.config.spreadsheet_id);
            let url = spreadsheet_url(&self.config.api_url, &id, &[])
                .map_err(|e| remote_error(tab, e))?;
            self.call(tab, Method::POST, url, Some(add_sheet_request(tab)))
                .await?;
            debug!("Tab created");
        }

        let clear_range = format!("{}:clear", quote_tab(tab));
        let url = self
            .url(&["values", &clear_range])
            .map_err(|e| remote_error(tab, e))?;
        self.call(tab, Method::POST, url, Some(json!({}))).await?;

        let range = a1_range(tab);
        let mut url = self
            .url(&["values", &range])
            .map_err(|e| remote_error(tab, e))?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.call(tab, Method::PUT, url, Some(values_body(&range, rows)))
            .await?;

        debug!("Tab replaced");
        Ok(())
    }

    fn destination(&self) -> String {
        format!("spreadsheet {}", self.config.spreadsheet_id)
    }
}

// =============================================================================
// Request payloads
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetMetadata>,
}

#[derive(Debug, Deserialize)]
struct SheetMetadata {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

impl SpreadsheetMetadata {
    fn has_tab(&self, tab: &str) -> bool {
        self.sheets.iter().any(|s| s.properties.title == tab)
    }
}

fn load_service_account(path: &Path) -> Result<Arc<dyn TokenProvider>, String> {
    let account = CustomServiceAccount::from_file(path).map_err(|e| {
        format!("cannot load service account from {}: {}", path.display(), e)
    })?;
    debug!(path = %path.display(), "Service account loaded");
    Ok(Arc::new(account))
}

fn remote_error(tab: &str, err: impl ToString) -> SinkError {
    SinkError::Remote {
        tab: tab.to_string(),
        message: err.to_string(),
    }
}

fn spreadsheet_url(api_url: &str, spreadsheet_id: &str, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(api_url).map_err(|e| format!("invalid Sheets API URL: {}", e))?;
    url.path_segments_mut()
        .map_err(|_| "Sheets API URL cannot have a path".to_string())?
        .pop_if_empty()
        .push(spreadsheet_id)
        .extend(segments);
    Ok(url)
}

/// Tab name quoted for A1 notation, with embedded quotes doubled.
fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

fn a1_range(tab: &str) -> String {
    format!("{}!A1", quote_tab(tab))
}

fn add_sheet_request(tab: &str) -> Value {
    json!({
        "requests": [{
            "addSheet": {
                "properties": {
                    "title": tab,
                    "gridProperties": {
                        "rowCount": NEW_TAB_ROWS,
                        "columnCount": NEW_TAB_COLUMNS
                    }
                }
            }
        }]
    })
}

fn values_body(range: &str, rows: &[NormalizedRow]) -> Value {
    let mut values: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    values.push(ROW_HEADER.iter().map(|h| h.to_string()).collect());
    values.extend(rows.iter().map(|row| row.to_record().to_vec()));

    json!({
        "range": range,
        "majorDimension": "ROWS",
        "values": values
    })
}
