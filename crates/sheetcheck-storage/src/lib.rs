//! Input acquisition and proof artifact storage for sheetcheck.
//!
//! Everything that touches the filesystem or the network lives here so the
//! verification engine stays a pure, synchronous pass over in-memory tables.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sheetcheck_core::{CellValue, Record, Table};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "sheetcheck-storage";

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Parses a record export: a bare array of objects, or an object holding that
/// array under `objects` (preferred) or `assets`. Non-object entries are skipped.
pub fn parse_records(value: JsonValue) -> Vec<Record> {
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => {
            let objects = map.remove("objects").filter(is_non_empty_array);
            match objects.or_else(|| map.remove("assets")) {
                Some(JsonValue::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    };
    items.into_iter().filter_map(Record::from_json).collect()
}

fn is_non_empty_array(value: &JsonValue) -> bool {
    value.as_array().is_some_and(|items| !items.is_empty())
}

pub async fn load_records(path: impl AsRef<Path>) -> anyhow::Result<Vec<Record>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let value: JsonValue =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(parse_records(value))
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

/// Parses an observed table dump: a values-API response or a bare array of rows.
pub fn parse_observed_json(text: &str) -> anyhow::Result<Vec<Vec<CellValue>>> {
    let value: JsonValue = serde_json::from_str(text).context("parsing observed table json")?;
    let rows = match value {
        JsonValue::Array(_) => serde_json::from_value::<Vec<Vec<JsonValue>>>(value)
            .context("observed table rows must be arrays")?,
        JsonValue::Object(_) => {
            serde_json::from_value::<ValueRange>(value)
                .context("observed table object must carry a `values` array")?
                .values
        }
        _ => return Err(anyhow!("observed table json must be an array or an object")),
    };
    Ok(into_cells(rows))
}

/// Parses an observed table exported as CSV; every cell is text.
pub fn parse_observed_csv(bytes: &[u8]) -> anyhow::Result<Vec<Vec<CellValue>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading csv record {}", line + 1))?;
        rows.push(record.iter().map(CellValue::text).collect());
    }
    Ok(rows)
}

fn into_cells(rows: Vec<Vec<JsonValue>>) -> Vec<Vec<CellValue>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(CellValue::from).collect())
        .collect()
}

/// Writes a table as CSV, header first.
pub fn write_table_csv<W: Write>(writer: W, table: &Table) -> anyhow::Result<()> {
    let mut out = csv::WriterBuilder::new().from_writer(writer);
    out.write_record(&table.header).context("writing csv header")?;
    for row in &table.rows {
        out.write_record(row).context("writing csv row")?;
    }
    out.flush().context("flushing csv output")?;
    Ok(())
}

/// Where the observed table comes from. Implementations must finish before the
/// engine starts; the engine never calls back into them.
#[async_trait]
pub trait ObservedSource: Send + Sync {
    fn describe(&self) -> String;

    async fn read_raw(&self) -> anyhow::Result<Vec<Vec<CellValue>>>;
}

#[derive(Debug, Clone)]
pub struct FileObservedSource {
    path: PathBuf,
}

impl FileObservedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_csv(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
    }
}

#[async_trait]
impl ObservedSource for FileObservedSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_raw(&self) -> anyhow::Result<Vec<Vec<CellValue>>> {
        let bytes = fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        if self.is_csv() {
            parse_observed_csv(&bytes).with_context(|| format!("parsing {}", self.path.display()))
        } else {
            let text = String::from_utf8(bytes)
                .with_context(|| format!("decoding {} as utf-8", self.path.display()))?;
            parse_observed_json(&text).with_context(|| format!("parsing {}", self.path.display()))
        }
    }
}

/// Reads one tab through the spreadsheet values API with a caller-supplied
/// bearer token.
#[derive(Debug)]
pub struct SheetValuesSource {
    fetcher: HttpFetcher,
    base_url: String,
    access_token: String,
    sheet_id: String,
    tab: String,
}

impl SheetValuesSource {
    pub fn new(
        fetcher: HttpFetcher,
        access_token: impl Into<String>,
        sheet_id: impl Into<String>,
        tab: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            access_token: access_token.into(),
            sheet_id: sheet_id.into(),
            tab: tab.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn values_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("parsing sheets base url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("sheets base url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend([self.sheet_id.as_str(), "values", self.tab.as_str()]);
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "FORMATTED_VALUE");
        Ok(url)
    }
}

#[async_trait]
impl ObservedSource for SheetValuesSource {
    fn describe(&self) -> String {
        format!("{}/{}", self.sheet_id, self.tab)
    }

    async fn read_raw(&self) -> anyhow::Result<Vec<Vec<CellValue>>> {
        let url = self.values_url()?;
        let response = self
            .fetcher
            .fetch_bytes(&self.tab, url.as_str(), Some(&self.access_token))
            .await
            .with_context(|| format!("reading tab {} of sheet {}", self.tab, self.sheet_id))?;
        let range: ValueRange = serde_json::from_slice(&response.body)
            .with_context(|| format!("parsing values response from {}", response.final_url))?;
        debug!(rows = range.values.len(), tab = %self.tab, "read sheet values");
        Ok(into_cells(range.values))
    }
}

/// Whether a failed sheet read is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Throttling and server-side failures are transient; other statuses are not.
pub fn classify_status(status: StatusCode) -> RetryDisposition {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => RetryDisposition::Retryable,
        s if s.is_server_error() => RetryDisposition::Retryable,
        _ => RetryDisposition::NonRetryable,
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_body() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Exponential delay doubling from `base_delay`, never above `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt).unwrap_or(u32::MAX).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// GET client with bearer auth and retry on transient failures.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("sheet request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sheet request to {url} returned http {status}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    fn disposition(&self) -> RetryDisposition {
        match self {
            FetchError::Request(err) => classify_reqwest_error(err),
            FetchError::HttpStatus { status, .. } => StatusCode::from_u16(*status)
                .map_or(RetryDisposition::NonRetryable, classify_status),
        }
    }
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        Ok(Self {
            client: builder.build().context("building http client")?,
            backoff: config.backoff,
        })
    }

    pub async fn fetch_bytes(
        &self,
        label: &str,
        url: &str,
        bearer_token: Option<&str>,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("sheet_fetch", label, url);
        async {
            let mut attempt = 0;
            loop {
                match self.send_once(url, bearer_token).await {
                    Ok(response) => return Ok(response),
                    Err(err)
                        if attempt < self.backoff.max_retries
                            && err.disposition() == RetryDisposition::Retryable =>
                    {
                        let delay = self.backoff.delay_for_attempt(attempt);
                        warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying sheet request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn send_once(
        &self,
        url: &str,
        bearer_token: Option<&str>,
    ) -> Result<FetchedResponse, FetchError> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = response.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed archive of proof reports.
#[derive(Debug, Clone)]
pub struct ProofArchive {
    root: PathBuf,
}

impl ProofArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn artifact_relative_path(
        &self,
        generated_at: DateTime<Utc>,
        label: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = generated_at.format("%Y%m%d_%H%M%S").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(stamp)
            .join(sanitize_label(label))
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn store_bytes(
        &self,
        generated_at: DateTime<Utc>,
        label: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path =
            self.artifact_relative_path(generated_at, label, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);

        let stored = |deduplicated| StoredArtifact {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking artifact path {}", absolute_path.display()))?
        {
            return Ok(stored(true));
        }

        match write_atomic(&absolute_path, bytes).await {
            Ok(()) => Ok(stored(false)),
            Err(err) if is_already_exists(&err) => Ok(stored(true)),
            Err(err) => Err(err),
        }
    }
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::AlreadyExists)
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned
    }
}

/// Writes through a sibling temp file and renames it into place.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(anyhow::Error::new(err).context(format!(
            "renaming temp file {} -> {}",
            temp_path.display(),
            path.display()
        )));
    }
    Ok(())
}
