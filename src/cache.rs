/// In-memory worksheet cache and the spreadsheet access seam.
///
/// The cache is an explicitly constructed object with a defined lifecycle:
/// built at run start, preloaded, read for the remainder of the run,
/// discarded at process exit. It guarantees at most one remote fetch per
/// worksheet per run unless a worksheet is explicitly invalidated.
///
/// Remote access goes through the `RowSource` trait so tests can swap in a
/// fake data source; `GoogleSheetSource` is the live implementation over the
/// Sheets `values` REST endpoints.

use std::collections::HashMap;

use serde::Deserialize;

use crate::limiter::RateLimiter;
use crate::model::HabError;

// ---------------------------------------------------------------------------
// Rows and worksheets
// ---------------------------------------------------------------------------

/// One worksheet row: an opaque mapping of column name to cell text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: HashMap<String, String>,
}

impl Row {
    /// Builds a row by zipping header names with cell values. Missing
    /// trailing cells become empty strings; surplus cells are dropped.
    pub fn from_cells(headers: &[String], values: &[String]) -> Row {
        let mut cells = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            let value = values.get(i).cloned().unwrap_or_default();
            cells.insert(header.clone(), value);
        }
        Row { cells }
    }

    /// Cell text for a column, or `""` if the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Numeric cell parsed as u32; unparseable or empty cells read as 0.
    pub fn get_u32(&self, column: &str) -> u32 {
        self.get(column).trim().replace(',', "").parse().unwrap_or(0)
    }

    /// Numeric cell parsed as f64, or `None` when empty/unparseable.
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).trim().parse().ok()
    }
}

/// A fetched worksheet: ordered headers plus its row set.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Worksheet {
    /// Builds a worksheet from raw cell values, first row as headers.
    ///
    /// A duplicate header makes column-keyed row access ambiguous, so it is
    /// a fatal configuration error rather than a runtime fallback case.
    pub fn from_values(name: &str, values: Vec<Vec<String>>) -> Result<Worksheet, HabError> {
        let mut iter = values.into_iter();
        let headers = iter.next().unwrap_or_default();

        let mut seen = std::collections::HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(HabError::Configuration(format!(
                    "worksheet '{}' has duplicate header '{}'",
                    name, header
                )));
            }
        }

        let rows = iter.map(|cells| Row::from_cells(&headers, &cells)).collect();
        Ok(Worksheet { headers, rows })
    }
}

// ---------------------------------------------------------------------------
// Access seams
// ---------------------------------------------------------------------------

/// Read access to a worksheet-backed data source.
pub trait RowSource {
    fn fetch_worksheet(
        &mut self,
        name: &str,
        limiter: &mut RateLimiter,
    ) -> Result<Worksheet, HabError>;
}

/// Write access for the `beach_status` write-back at end of run.
pub trait SheetWriter {
    fn replace_rows(
        &mut self,
        name: &str,
        headers: &[&str],
        rows: &[Vec<String>],
        limiter: &mut RateLimiter,
    ) -> Result<(), HabError>;
}

// ---------------------------------------------------------------------------
// Sheet cache
// ---------------------------------------------------------------------------

pub struct SheetCache<S: RowSource> {
    source: S,
    tables: HashMap<String, Worksheet>,
}

impl<S: RowSource> SheetCache<S> {
    pub fn new(source: S) -> Self {
        SheetCache {
            source,
            tables: HashMap::new(),
        }
    }

    /// Fetches every named worksheet that is not already cached.
    pub fn preload(&mut self, names: &[&str], limiter: &mut RateLimiter) -> Result<(), HabError> {
        for name in names {
            if !self.tables.contains_key(*name) {
                let sheet = self.source.fetch_worksheet(name, limiter)?;
                self.tables.insert((*name).to_string(), sheet);
            }
        }
        Ok(())
    }

    /// Returns the cached worksheet, fetching and caching it on demand if
    /// absent.
    pub fn get(&mut self, name: &str, limiter: &mut RateLimiter) -> Result<&Worksheet, HabError> {
        if !self.tables.contains_key(name) {
            let sheet = self.source.fetch_worksheet(name, limiter)?;
            self.tables.insert(name.to_string(), sheet);
        }
        Ok(&self.tables[name])
    }

    /// Drops one cached worksheet; the next `get` will refetch it.
    pub fn invalidate(&mut self, name: &str) {
        self.tables.remove(name);
    }

    /// Drops every cached worksheet.
    pub fn invalidate_all(&mut self) {
        self.tables.clear();
    }

    /// Access to the underlying source, for the write-back path.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

// ---------------------------------------------------------------------------
// Live Google Sheets source
// ---------------------------------------------------------------------------

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Values-API response shape. Cells arrive as JSON scalars of mixed type.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Thin blocking client for the Sheets `values` endpoints.
///
/// Credential handling is deliberately minimal: a pre-issued bearer token is
/// a trusted input, and the OAuth service-account flow is out of scope.
pub struct GoogleSheetSource {
    client: reqwest::blocking::Client,
    sheet_id: String,
    api_token: String,
}

impl GoogleSheetSource {
    pub fn new(sheet_id: &str, api_token: &str) -> Result<Self, HabError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| HabError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(GoogleSheetSource {
            client,
            sheet_id: sheet_id.to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn values_url(&self, worksheet: &str) -> String {
        format!("{}/{}/values/{}", SHEETS_BASE_URL, self.sheet_id, worksheet)
    }

    fn check_status(worksheet: &str, response: &reqwest::blocking::Response) -> Result<(), HabError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(HabError::UpstreamService {
            code: Some(status.as_u16() as i64),
            message: format!("Sheets API error for worksheet '{}'", worksheet),
        })
    }

    fn cell_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl RowSource for GoogleSheetSource {
    fn fetch_worksheet(
        &mut self,
        name: &str,
        limiter: &mut RateLimiter,
    ) -> Result<Worksheet, HabError> {
        limiter.wait_if_needed();

        let response = self
            .client
            .get(self.values_url(name))
            .bearer_auth(&self.api_token)
            .send()
            .map_err(|e| HabError::Transport(format!("worksheet '{}' fetch failed: {}", name, e)))?;
        Self::check_status(name, &response)?;

        let range: ValueRange = response.json().map_err(|e| {
            HabError::MalformedResponse(format!("worksheet '{}' values: {}", name, e))
        })?;

        let values = range
            .values
            .iter()
            .map(|row| row.iter().map(Self::cell_text).collect())
            .collect();
        Worksheet::from_values(name, values)
    }
}

impl SheetWriter for GoogleSheetSource {
    fn replace_rows(
        &mut self,
        name: &str,
        headers: &[&str],
        rows: &[Vec<String>],
        limiter: &mut RateLimiter,
    ) -> Result<(), HabError> {
        limiter.wait_if_needed();
        let clear = self
            .client
            .post(format!("{}:clear", self.values_url(name)))
            .bearer_auth(&self.api_token)
            .send()
            .map_err(|e| HabError::Transport(format!("worksheet '{}' clear failed: {}", name, e)))?;
        Self::check_status(name, &clear)?;

        let mut values: Vec<Vec<String>> =
            vec![headers.iter().map(|h| h.to_string()).collect()];
        values.extend(rows.iter().cloned());

        limiter.wait_if_needed();
        let update = self
            .client
            .put(format!("{}?valueInputOption=RAW", self.values_url(name)))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "values": values }))
            .send()
            .map_err(|e| HabError::Transport(format!("worksheet '{}' update failed: {}", name, e)))?;
        Self::check_status(name, &update)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
