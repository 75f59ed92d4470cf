/// Core data types for the HAB status sync service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O and no external service knowledge - only types, the
/// threshold classification they carry, and the error taxonomy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Beach advisory status, in ascending order of severity.
///
/// `NoData` sorts below `Safe`: a location with no information never
/// escalates a rollup, and rollup averaging skips it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NoData,
    Safe,
    Caution,
    Avoid,
}

impl Status {
    /// Returns the more severe of two statuses.
    pub fn worst(self, other: Status) -> Status {
        self.max(other)
    }

    /// Parses the wire/sheet spelling (`safe`, `caution`, `avoid`, `no_data`).
    pub fn parse(s: &str) -> Option<Status> {
        match s.trim() {
            "safe" => Some(Status::Safe),
            "caution" => Some(Status::Caution),
            "avoid" => Some(Status::Avoid),
            "no_data" => Some(Status::NoData),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Safe => write!(f, "safe"),
            Status::Caution => write!(f, "caution"),
            Status::Avoid => write!(f, "avoid"),
            Status::NoData => write!(f, "no_data"),
        }
    }
}

// ---------------------------------------------------------------------------
// Source tier
// ---------------------------------------------------------------------------

/// Which tier of the fallback chain produced a `LocationStatus`.
///
/// Exactly one tier is authoritative per location per run - a status is
/// never a blend of live and cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Derived from live FWC sample data fetched this run.
    Live,
    /// Read from the last-known `beach_status` worksheet row.
    Cached,
    /// Synthesized default - no live data and no cached row.
    Default,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Live => write!(f, "live"),
            SourceTier::Cached => write!(f, "cached"),
            SourceTier::Default => write!(f, "default"),
        }
    }
}

/// Kind of location a status record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Beach,
    City,
    Region,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKind::Beach => write!(f, "beach"),
            LocationKind::City => write!(f, "city"),
            LocationKind::Region => write!(f, "region"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample and status types
// ---------------------------------------------------------------------------

/// A single HAB sample matched to a beach's mapped sampling site.
///
/// Produced by `ingest::fwc` from a raw ArcGIS feature plus the mapping row
/// that requested it. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSite {
    /// FWC HAB_ID of the matched feature, when one was present.
    pub hab_id: String,
    /// FWC LOCATION text of the matched feature.
    pub location: String,
    /// Representative cell count (cells/L) derived from the abundance text.
    pub cell_count: u32,
    /// Per-site status from the configured thresholds.
    pub status: Status,
    /// When the sample was taken.
    pub sample_date: DateTime<Utc>,
    /// Combined distance/age weight in (0, 1]; the resolver's confidence
    /// input for this site.
    pub weight: f64,
}

/// The resolved status of one location for this run.
///
/// One instance per location per run; pushed downstream immediately, never
/// persisted locally.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationStatus {
    pub name: String,
    pub kind: LocationKind,
    pub status: Status,
    /// Highest cell count among contributing samples (cells/L).
    pub peak_count: u32,
    /// Mean cell count among contributing samples (cells/L).
    pub avg_count: u32,
    /// 0-100 reliability score for this resolution.
    pub confidence: u32,
    /// Date of the most recent contributing sample.
    pub sample_date: Option<NaiveDate>,
    pub region: String,
    pub city: String,
    pub slug: String,
    /// Which fallback tier produced this record.
    pub source: SourceTier,
}

/// City- or region-level rollup derived purely from beach `LocationStatus`
/// entries of a single run. Recomputed each run, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    pub name: String,
    pub kind: LocationKind,
    pub status: Status,
    pub peak_count: u32,
    pub avg_count: u32,
    pub confidence: u32,
    pub sample_date: Option<NaiveDate>,
    pub beach_count: u32,
    /// Distinct cities under a region; 0 for city records.
    pub city_count: u32,
    pub beaches_safe: u32,
    pub beaches_caution: u32,
    pub beaches_avoid: u32,
    pub region: String,
    pub slug: String,
    /// Slugs of child beaches, sorted. Relationship lookups resolve these
    /// to published CMS identifiers.
    pub beach_slugs: Vec<String>,
    /// Slugs of child cities, sorted; empty for city records.
    pub city_slugs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Cell-count breakpoints for classifying a sample.
///
/// Breakpoints are configuration, not logic: `thresholds.toml` may override
/// the defaults. Counts below `caution_min_cells` are safe (including 0);
/// counts at or above `avoid_min_cells` are avoid.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StatusThresholds {
    pub caution_min_cells: u32,
    pub avoid_min_cells: u32,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        // Matches the FWC category mapping: "very low" (~2,500) stays safe,
        // "low" (~5,000) is caution, "medium" (~50,000) and up is avoid.
        StatusThresholds {
            caution_min_cells: 5_000,
            avoid_min_cells: 50_000,
        }
    }
}

impl StatusThresholds {
    pub fn classify(&self, cell_count: u32) -> Status {
        if cell_count >= self.avoid_min_cells {
            Status::Avoid
        } else if cell_count >= self.caution_min_cells {
            Status::Caution
        } else {
            Status::Safe
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, reconciling, or publishing data.
///
/// The first three variants are fallback-eligible: the resolver handles them
/// locally and the run continues. `Configuration` is fatal and must surface
/// immediately - it is never masked by the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum HabError {
    /// The upstream service returned a structured error object.
    UpstreamService { code: Option<i64>, message: String },
    /// Network-level failure (connect, timeout, read).
    Transport(String),
    /// The response was not a mapping, or `features` was present but not a
    /// list.
    MalformedResponse(String),
    /// Missing credentials, duplicate/misordered worksheet headers, bad
    /// option values.
    Configuration(String),
    /// A publisher field was assigned a value of the wrong kind (e.g. a
    /// count in a relationship field).
    FieldKindMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
}

impl HabError {
    /// Whether the fallback resolver may absorb this error and continue.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            HabError::UpstreamService { .. }
                | HabError::Transport(_)
                | HabError::MalformedResponse(_)
        )
    }
}

impl fmt::Display for HabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HabError::UpstreamService { code: Some(c), message } => {
                write!(f, "upstream service error {}: {}", c, message)
            }
            HabError::UpstreamService { code: None, message } => {
                write!(f, "upstream service error: {}", message)
            }
            HabError::Transport(msg) => write!(f, "transport error: {}", msg),
            HabError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            HabError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            HabError::FieldKindMismatch { field, expected, got } => {
                write!(
                    f,
                    "field '{}' expects a {} value, got {}",
                    field, expected, got
                )
            }
        }
    }
}

impl std::error::Error for HabError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
