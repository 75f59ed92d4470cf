/// FWC HAB Data API Client
///
/// Retrieves red tide (Karenia brevis) sample features from the Florida Fish
/// and Wildlife Conservation Commission's ArcGIS query endpoint, and matches
/// them to the beaches' mapped sampling sites.
///
/// Endpoint: https://atoll.floridamarine.org/arcgis/rest/services/FWC_GIS/OpenData_HAB/MapServer/9/query
///
/// The API returns either `{ "features": [...] }` or `{ "error": { ... } }`;
/// the parser branches on shape rather than assuming keys exist, and an empty
/// feature list is valid data, not a failure.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::thread;
use std::time::Duration;

use crate::limiter::RateLimiter;
use crate::logging::{self, DataSource};
use crate::model::{HabError, SampleSite, StatusThresholds};

/// Default FWC HAB query endpoint.
pub const FWC_API_URL: &str =
    "https://atoll.floridamarine.org/arcgis/rest/services/FWC_GIS/OpenData_HAB/MapServer/9/query";

/// Fixed backoff before the single quota retry, per FWC guidance.
const QUOTA_BACKOFF_SECS: u64 = 60;

/// How many of the most recent samples to request per run.
const RESULT_RECORD_COUNT: u32 = 1000;

// ============================================================================
// FWC API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FwcFeature {
    pub attributes: FwcAttributes,
}

/// Attribute subset this service consumes; the API returns many more fields.
#[derive(Debug, Deserialize)]
pub struct FwcAttributes {
    #[serde(rename = "HAB_ID", default)]
    pub hab_id: Option<String>,
    #[serde(rename = "LOCATION", default)]
    pub location: Option<String>,
    #[serde(rename = "Abundance", default)]
    pub abundance: Option<String>,
    /// Epoch milliseconds.
    #[serde(rename = "SAMPLE_DATE", default)]
    pub sample_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

// ============================================================================
// Query URL
// ============================================================================

/// Builds the ArcGIS query URL: all fields, WGS84, most recent samples first.
pub fn build_query_url(base: &str) -> String {
    format!(
        "{}?where=1%3D1&outFields=*&outSR=4326&f=json&orderByFields=SAMPLE_DATE+DESC&resultRecordCount={}",
        base, RESULT_RECORD_COUNT
    )
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parses a query response body, branching on response shape.
///
/// - a JSON object with an `error` member → `UpstreamService`
/// - a JSON object with a list-valued `features` member → the features
///   (an empty list means "no data for this query", which is not an error)
/// - anything else → `MalformedResponse`
pub fn parse_query_response(body: &str) -> Result<Vec<FwcFeature>, HabError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| HabError::MalformedResponse(format!("response is not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| HabError::MalformedResponse("response is not a mapping".to_string()))?;

    if let Some(error_value) = object.get("error") {
        let err: ServiceError = serde_json::from_value(error_value.clone()).unwrap_or(ServiceError {
            code: None,
            message: None,
            details: Vec::new(),
        });
        let mut message = err.message.unwrap_or_else(|| "unspecified error".to_string());
        if !err.details.is_empty() {
            message = format!("{} ({})", message, err.details.join("; "));
        }
        return Err(HabError::UpstreamService { code: err.code, message });
    }

    match object.get("features") {
        Some(features) if features.is_array() => {
            serde_json::from_value(features.clone())
                .map_err(|e| HabError::MalformedResponse(format!("bad feature shape: {}", e)))
        }
        Some(_) => Err(HabError::MalformedResponse(
            "'features' is present but not a list".to_string(),
        )),
        None => Err(HabError::MalformedResponse(
            "response has neither 'features' nor 'error'".to_string(),
        )),
    }
}

// ============================================================================
// Abundance parsing
// ============================================================================

/// Converts FWC abundance category text to a representative cell count
/// (cells/L). Category labels map to fixed representative counts; when the
/// text embeds a numeric range, the midpoint is used instead. Missing or
/// unrecognized text yields `None` - an unusable sample, not a zero count.
pub fn parse_abundance(text: &str) -> Option<u32> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    let numbers = extract_numbers(&lower);
    let midpoint = || -> Option<u32> {
        if numbers.len() >= 2 {
            Some(((numbers[0] + numbers[1]) / 2) as u32)
        } else {
            None
        }
    };

    if lower.contains("not present") || lower.contains("background") {
        Some(500)
    } else if lower.contains("very low") {
        Some(2_500)
    } else if lower.contains("low") {
        Some(midpoint().unwrap_or(5_000))
    } else if lower.contains("medium") {
        Some(midpoint().unwrap_or(50_000))
    } else if lower.contains("high") {
        Some(midpoint().unwrap_or(500_000))
    } else {
        None
    }
}

/// Pulls comma-grouped integers out of free text, e.g.
/// `"low (10,000 - 100,000 cells/L)"` → `[10000, 100000]`.
fn extract_numbers(text: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    let mut run = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() || (c == ',' && !run.is_empty()) {
            run.push(c);
        } else if !run.is_empty() {
            if let Ok(n) = run.trim_matches(',').replace(',', "").parse() {
                numbers.push(n);
            }
            run.clear();
        }
    }
    if let Ok(n) = run.trim_matches(',').replace(',', "").parse() {
        numbers.push(n);
    }
    numbers
}

// ============================================================================
// Sample weighting
// ============================================================================

/// Weight by distance from the beach to the sampling site.
pub fn distance_weight(distance_mi: f64) -> f64 {
    if distance_mi <= 1.0 {
        1.0
    } else if distance_mi <= 3.0 {
        0.7
    } else if distance_mi <= 10.0 {
        0.4
    } else {
        0.2
    }
}

/// Weight by sample age: full weight for the first week, then a linear
/// falloff floored at 0.1 so very old samples never dominate but still
/// register.
pub fn age_weight(age_days: i64) -> f64 {
    if age_days <= 7 {
        1.0
    } else {
        (1.0 - age_days as f64 / 7.0).max(0.1)
    }
}

// ============================================================================
// Fetched dataset and site matching
// ============================================================================

/// One usable sample row out of the bulk query.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub hab_id: Option<String>,
    pub location: String,
    pub abundance: Option<String>,
    pub sample_date: Option<DateTime<Utc>>,
}

/// The run's bulk FWC feature set, fetched once and matched in memory.
#[derive(Debug, Clone, Default)]
pub struct FwcDataset {
    samples: Vec<RawSample>,
}

impl FwcDataset {
    pub fn from_features(features: Vec<FwcFeature>) -> FwcDataset {
        let samples = features
            .into_iter()
            .map(|f| RawSample {
                hab_id: f.attributes.hab_id,
                location: f.attributes.location.unwrap_or_default(),
                abundance: f.attributes.abundance,
                sample_date: f
                    .attributes
                    .sample_date
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            })
            .collect();
        FwcDataset { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Finds the sample for a mapped site: exact `HAB_ID` match first, then
    /// a case-insensitive substring match on the location text, preferring
    /// recent samples. Location-matched samples older than ten days score
    /// zero and are not matched at all.
    pub fn find(&self, hab_id: &str, sample_location: &str, now: DateTime<Utc>) -> Option<&RawSample> {
        if !hab_id.is_empty() {
            if let Some(sample) = self
                .samples
                .iter()
                .find(|s| s.hab_id.as_deref() == Some(hab_id))
            {
                return Some(sample);
            }
        }

        let wanted = sample_location.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<(&RawSample, i64)> = None;
        for sample in &self.samples {
            let location = sample.location.to_lowercase();
            if location.is_empty() {
                continue;
            }
            if !(location.contains(&wanted) || wanted.contains(&location)) {
                continue;
            }
            let Some(date) = sample.sample_date else {
                continue;
            };
            let age_days = (now - date).num_days();
            let score = (10 - age_days).max(0);
            if score > best.map(|(_, s)| s).unwrap_or(0) {
                best = Some((sample, score));
            }
        }
        best.map(|(sample, _)| sample)
    }
}

// ============================================================================
// Sample source
// ============================================================================

/// What the resolver asks the fetcher for: one beach's mapped sampling site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteQuery {
    pub hab_id: String,
    pub sample_location: String,
    pub distance_mi: f64,
}

/// Fetcher seam. The live implementation is `FwcSource`; tests substitute
/// fakes that script successes, empties, and failures per query.
pub trait SampleSource {
    fn fetch(
        &mut self,
        query: &SiteQuery,
        now: DateTime<Utc>,
        limiter: &mut RateLimiter,
    ) -> Result<Option<SampleSite>, HabError>;
}

enum FetchState {
    Idle,
    Ready(FwcDataset),
    Failed(HabError),
}

/// Live FWC source: one bulk dataset fetch per run, on first use, through
/// the shared rate limiter. A failed fetch is remembered so every location
/// in the run sees the same fallback-eligible error instead of hammering a
/// down service.
pub struct FwcSource {
    client: reqwest::blocking::Client,
    url: String,
    thresholds: StatusThresholds,
    state: FetchState,
}

impl FwcSource {
    pub fn new(base_url: &str, thresholds: StatusThresholds) -> Result<Self, HabError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HabError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(FwcSource {
            client,
            url: build_query_url(base_url),
            thresholds,
            state: FetchState::Idle,
        })
    }

    fn ensure_dataset(&mut self, limiter: &mut RateLimiter) -> Result<&FwcDataset, HabError> {
        if matches!(self.state, FetchState::Idle) {
            self.state = match self.fetch_dataset(limiter) {
                Ok(dataset) => {
                    logging::info(
                        DataSource::Fwc,
                        None,
                        &format!("fetched {} HAB samples", dataset.len()),
                    );
                    FetchState::Ready(dataset)
                }
                Err(e) => {
                    logging::log_fetch_failure(DataSource::Fwc, None, "bulk query", &e);
                    FetchState::Failed(e)
                }
            };
        }
        match &self.state {
            FetchState::Ready(dataset) => Ok(dataset),
            FetchState::Failed(e) => Err(e.clone()),
            FetchState::Idle => unreachable!("dataset state resolved above"),
        }
    }

    fn fetch_dataset(&self, limiter: &mut RateLimiter) -> Result<FwcDataset, HabError> {
        limiter.wait_if_needed();
        let mut response = self.send()?;

        // Quota-exceeded is the one signal worth a retry; everything else
        // goes straight to the fallback chain.
        if response.status().as_u16() == 429 {
            logging::warn(
                DataSource::Fwc,
                None,
                &format!("quota exceeded, retrying once in {}s", QUOTA_BACKOFF_SECS),
            );
            thread::sleep(Duration::from_secs(QUOTA_BACKOFF_SECS));
            limiter.wait_if_needed();
            response = self.send()?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(HabError::UpstreamService {
                code: Some(status.as_u16() as i64),
                message: format!("FWC API returned HTTP {}", status),
            });
        }

        let body = response
            .text()
            .map_err(|e| HabError::Transport(format!("failed to read FWC response: {}", e)))?;
        let features = parse_query_response(&body)?;
        Ok(FwcDataset::from_features(features))
    }

    fn send(&self) -> Result<reqwest::blocking::Response, HabError> {
        self.client.get(&self.url).send().map_err(|e| {
            if e.is_timeout() {
                HabError::Transport(format!("FWC request timed out: {}", e))
            } else {
                HabError::Transport(format!("FWC request failed: {}", e))
            }
        })
    }
}

impl SampleSource for FwcSource {
    fn fetch(
        &mut self,
        query: &SiteQuery,
        now: DateTime<Utc>,
        limiter: &mut RateLimiter,
    ) -> Result<Option<SampleSite>, HabError> {
        let thresholds = self.thresholds;
        let dataset = self.ensure_dataset(limiter)?;

        let Some(raw) = dataset.find(&query.hab_id, &query.sample_location, now) else {
            return Ok(None);
        };
        let Some(cell_count) = raw.abundance.as_deref().and_then(parse_abundance) else {
            return Ok(None);
        };
        let Some(sample_date) = raw.sample_date else {
            return Ok(None);
        };

        let age_days = (now - sample_date).num_days();
        let weight = distance_weight(query.distance_mi) * age_weight(age_days);

        Ok(Some(SampleSite {
            hab_id: raw.hab_id.clone().unwrap_or_default(),
            location: raw.location.clone(),
            cell_count,
            status: thresholds.classify(cell_count),
            sample_date,
            weight,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
