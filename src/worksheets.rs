/// Worksheet contracts and row mapping.
///
/// Defines the canonical worksheet names, the 17-column `beach_status`
/// header contract, and the conversions between opaque cached rows and the
/// domain model. This is the single source of truth for column names - all
/// other modules should reference them from here rather than hardcoding
/// strings.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::cache::Worksheet;
use crate::model::{HabError, LocationKind, LocationStatus, AggregateRecord, SourceTier, Status};

// ---------------------------------------------------------------------------
// Worksheet names
// ---------------------------------------------------------------------------

/// Beach reference data: city, region, coordinates, address.
pub const WS_LOCATIONS: &str = "locations";
/// Beach → HAB sampling site mapping with distances.
pub const WS_SAMPLE_MAPPING: &str = "sample_mapping";
/// Last run's resolved statuses; the cached fallback substrate.
pub const WS_BEACH_STATUS: &str = "beach_status";

// ---------------------------------------------------------------------------
// beach_status header contract
// ---------------------------------------------------------------------------

/// Expected `beach_status` columns, in order. A sheet that deviates from
/// this contract breaks both the cached-fallback reads and the write-back,
/// so a mismatch is fatal configuration, not a runtime fallback case.
pub const STATUS_HEADERS: [&str; 17] = [
    "location_name",
    "location_type",
    "date",
    "current_status",
    "peak_count",
    "avg_count",
    "confidence_score",
    "sample_date",
    "last_updated",
    "region",
    "city",
    "slug",
    "beach_count",
    "city_count",
    "beaches_safe",
    "beaches_caution",
    "beaches_avoid",
];

/// Checks the `beach_status` worksheet headers against the contract.
///
/// Reports duplicates, then missing and extra columns, so a misconfigured
/// sheet can be fixed in one pass.
pub fn verify_status_headers(headers: &[String]) -> Result<(), HabError> {
    let mut seen = std::collections::HashSet::new();
    for header in headers {
        if !seen.insert(header.as_str()) {
            return Err(HabError::Configuration(format!(
                "beach_status has duplicate header '{}'",
                header
            )));
        }
    }

    if headers.len() == STATUS_HEADERS.len()
        && headers.iter().zip(STATUS_HEADERS.iter()).all(|(a, b)| a == b)
    {
        return Ok(());
    }

    let missing: Vec<&str> = STATUS_HEADERS
        .iter()
        .filter(|expected| !headers.iter().any(|h| h == *expected))
        .copied()
        .collect();
    let extra: Vec<&str> = headers
        .iter()
        .filter(|h| !STATUS_HEADERS.contains(&h.as_str()))
        .map(String::as_str)
        .collect();

    Err(HabError::Configuration(format!(
        "beach_status headers don't match the {}-column contract \
         (missing: {:?}, extra: {:?})",
        STATUS_HEADERS.len(),
        missing,
        extra
    )))
}

// ---------------------------------------------------------------------------
// Reference data rows
// ---------------------------------------------------------------------------

/// A beach from the `locations` worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct BeachLocation {
    pub beach: String,
    pub city: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: String,
    pub zip: String,
}

/// One beach → sampling site association from `sample_mapping`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMapping {
    pub beach: String,
    pub hab_id: String,
    pub sample_location: String,
    /// Miles from the beach to the sampling site; distant sites carry less
    /// weight. Missing values read as far away rather than nearby.
    pub sample_distance_mi: f64,
}

/// Parses the `locations` worksheet, preserving sheet order.
pub fn parse_locations(sheet: &Worksheet) -> Vec<BeachLocation> {
    sheet
        .rows
        .iter()
        .filter(|row| !row.get("beach").trim().is_empty())
        .map(|row| BeachLocation {
            beach: row.get("beach").trim().to_string(),
            city: row.get("city").trim().to_string(),
            region: row.get("region").trim().to_string(),
            // The latitude column is misspelled in the sheet itself.
            latitude: row.get_f64("lattitude"),
            longitude: row.get_f64("longitude"),
            address: row.get("address").trim().to_string(),
            zip: row.get("zip").trim().to_string(),
        })
        .collect()
}

/// Parses `sample_mapping`, grouped by beach name.
pub fn parse_sample_mapping(sheet: &Worksheet) -> HashMap<String, Vec<SampleMapping>> {
    let mut mapping: HashMap<String, Vec<SampleMapping>> = HashMap::new();
    for row in &sheet.rows {
        let beach = row.get("beach").trim().to_string();
        if beach.is_empty() {
            continue;
        }
        mapping.entry(beach.clone()).or_default().push(SampleMapping {
            beach,
            hab_id: row.get("HAB_id").trim().to_string(),
            sample_location: row.get("sample_location").trim().to_string(),
            sample_distance_mi: row.get_f64("sample_distance").unwrap_or(99.0),
        });
    }
    mapping
}

/// Parses the prior run's beach rows out of `beach_status`, keyed by beach
/// name. City and region rows are rollups, not fallback substrate, and are
/// skipped.
pub fn parse_beach_status(sheet: &Worksheet) -> HashMap<String, LocationStatus> {
    let mut prior = HashMap::new();
    for row in &sheet.rows {
        if row.get("location_type").trim() != "beach" {
            continue;
        }
        let name = row.get("location_name").trim().to_string();
        if name.is_empty() {
            continue;
        }
        let status = Status::parse(row.get("current_status")).unwrap_or(Status::NoData);
        prior.insert(
            name.clone(),
            LocationStatus {
                slug: non_empty_or(row.get("slug"), &slug(&name)),
                name,
                kind: LocationKind::Beach,
                status,
                peak_count: row.get_u32("peak_count"),
                avg_count: row.get_u32("avg_count"),
                confidence: row.get_u32("confidence_score"),
                sample_date: NaiveDate::parse_from_str(row.get("sample_date").trim(), "%Y-%m-%d")
                    .ok(),
                region: row.get("region").trim().to_string(),
                city: row.get("city").trim().to_string(),
                source: SourceTier::Cached,
            },
        );
    }
    prior
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Write-back rows
// ---------------------------------------------------------------------------

/// Serializes a beach status to a 17-cell `beach_status` row. Rollup-only
/// columns are written as zero.
pub fn status_row(status: &LocationStatus, run_date: NaiveDate, last_updated: &str) -> Vec<String> {
    vec![
        status.name.clone(),
        status.kind.to_string(),
        run_date.format("%Y-%m-%d").to_string(),
        status.status.to_string(),
        status.peak_count.to_string(),
        status.avg_count.to_string(),
        status.confidence.to_string(),
        status
            .sample_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        last_updated.to_string(),
        status.region.clone(),
        status.city.clone(),
        status.slug.clone(),
        "0".to_string(), // beach_count
        "0".to_string(), // city_count
        "0".to_string(), // beaches_safe
        "0".to_string(), // beaches_caution
        "0".to_string(), // beaches_avoid
    ]
}

/// Serializes a city/region rollup to a 17-cell `beach_status` row.
pub fn rollup_row(record: &AggregateRecord, run_date: NaiveDate, last_updated: &str) -> Vec<String> {
    vec![
        record.name.clone(),
        record.kind.to_string(),
        run_date.format("%Y-%m-%d").to_string(),
        record.status.to_string(),
        record.peak_count.to_string(),
        record.avg_count.to_string(),
        record.confidence.to_string(),
        record
            .sample_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        last_updated.to_string(),
        record.region.clone(),
        String::new(), // city - rollups have no single parent city
        record.slug.clone(),
        record.beach_count.to_string(),
        record.city_count.to_string(),
        record.beaches_safe.to_string(),
        record.beaches_caution.to_string(),
        record.beaches_avoid.to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// URL-friendly slug: lowercase alphanumerics separated by single hyphens.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
        // Other punctuation is dropped without forcing a separator.
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> Worksheet {
        let mut values = vec![headers.iter().map(|s| s.to_string()).collect::<Vec<_>>()];
        for row in rows {
            values.push(row.iter().map(|s| s.to_string()).collect());
        }
        Worksheet::from_values("test", values).unwrap()
    }

    // --- Header contract ----------------------------------------------------

    #[test]
    fn test_contract_headers_pass_verification() {
        let headers: Vec<String> = STATUS_HEADERS.iter().map(|s| s.to_string()).collect();
        assert!(verify_status_headers(&headers).is_ok());
    }

    #[test]
    fn test_duplicate_header_is_fatal() {
        let mut headers: Vec<String> = STATUS_HEADERS.iter().map(|s| s.to_string()).collect();
        headers[5] = "peak_count".to_string(); // duplicates column 4
        match verify_status_headers(&headers) {
            Err(HabError::Configuration(msg)) => {
                assert!(msg.contains("duplicate"), "got: {}", msg)
            }
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_extra_headers_are_reported() {
        let headers = vec!["location_name".to_string(), "bogus_column".to_string()];
        match verify_status_headers(&headers) {
            Err(HabError::Configuration(msg)) => {
                assert!(msg.contains("current_status"), "missing columns listed: {}", msg);
                assert!(msg.contains("bogus_column"), "extra columns listed: {}", msg);
            }
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_reordered_headers_fail_the_contract() {
        let mut headers: Vec<String> = STATUS_HEADERS.iter().map(|s| s.to_string()).collect();
        headers.swap(0, 1);
        assert!(verify_status_headers(&headers).is_err(), "order is part of the contract");
    }

    // --- Reference parsing --------------------------------------------------

    #[test]
    fn test_parse_locations_reads_misspelled_latitude_column() {
        let sheet = sheet(
            &["beach", "city", "region", "lattitude", "longitude", "address", "zip"],
            &[&["Siesta Key", "Sarasota", "Southwest", "27.2675", "-82.5462", "948 Beach Rd", "34242"]],
        );
        let locations = parse_locations(&sheet);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].beach, "Siesta Key");
        assert_eq!(locations[0].latitude, Some(27.2675));
        assert_eq!(locations[0].longitude, Some(-82.5462));
    }

    #[test]
    fn test_parse_locations_skips_blank_rows() {
        let sheet = sheet(
            &["beach", "city", "region"],
            &[&["", "", ""], &["Lido Key", "Sarasota", "Southwest"]],
        );
        assert_eq!(parse_locations(&sheet).len(), 1);
    }

    #[test]
    fn test_parse_sample_mapping_groups_by_beach() {
        let sheet = sheet(
            &["beach", "HAB_id", "sample_location", "sample_distance"],
            &[
                &["Siesta Key", "FWC-001", "Siesta Key Beach", "0.5"],
                &["Siesta Key", "FWC-002", "Point of Rocks", "2.1"],
                &["Lido Key", "FWC-003", "Lido Beach", "0.8"],
            ],
        );
        let mapping = parse_sample_mapping(&sheet);
        assert_eq!(mapping["Siesta Key"].len(), 2);
        assert_eq!(mapping["Lido Key"].len(), 1);
        assert_eq!(mapping["Siesta Key"][1].sample_distance_mi, 2.1);
    }

    #[test]
    fn test_parse_sample_mapping_defaults_missing_distance_to_far() {
        let sheet = sheet(
            &["beach", "HAB_id", "sample_location", "sample_distance"],
            &[&["Siesta Key", "FWC-001", "Siesta Key Beach", ""]],
        );
        let mapping = parse_sample_mapping(&sheet);
        assert_eq!(mapping["Siesta Key"][0].sample_distance_mi, 99.0);
    }

    #[test]
    fn test_parse_beach_status_keeps_only_beach_rows() {
        let headers: Vec<&str> = STATUS_HEADERS.to_vec();
        let sheet = sheet(
            &headers,
            &[
                &[
                    "Siesta Key", "beach", "2026-08-29", "caution", "12000", "8000", "70",
                    "2026-08-28", "2026-08-29 10:00:00", "Southwest", "Sarasota", "siesta-key",
                    "0", "0", "0", "0", "0",
                ],
                &[
                    "Sarasota", "city", "2026-08-29", "caution", "12000", "8000", "70",
                    "2026-08-28", "2026-08-29 10:00:00", "Southwest", "", "sarasota",
                    "3", "0", "2", "1", "0",
                ],
            ],
        );
        let prior = parse_beach_status(&sheet);
        assert_eq!(prior.len(), 1, "city rollup rows must not enter the fallback cache");
        let siesta = &prior["Siesta Key"];
        assert_eq!(siesta.status, Status::Caution);
        assert_eq!(siesta.peak_count, 12_000);
        assert_eq!(siesta.source, SourceTier::Cached);
        assert_eq!(siesta.sample_date, NaiveDate::from_ymd_opt(2026, 8, 28));
    }

    #[test]
    fn test_parse_beach_status_unknown_status_reads_as_no_data() {
        let headers: Vec<&str> = STATUS_HEADERS.to_vec();
        let sheet = sheet(
            &headers,
            &[&[
                "Turtle Beach", "beach", "", "???", "0", "0", "0", "", "", "Southwest",
                "Sarasota", "", "0", "0", "0", "0", "0",
            ]],
        );
        let prior = parse_beach_status(&sheet);
        assert_eq!(prior["Turtle Beach"].status, Status::NoData);
        assert_eq!(prior["Turtle Beach"].slug, "turtle-beach", "empty slug is regenerated");
    }

    // --- Write-back rows ----------------------------------------------------

    #[test]
    fn test_status_row_matches_contract_width() {
        let status = LocationStatus {
            name: "Siesta Key".to_string(),
            kind: LocationKind::Beach,
            status: Status::Safe,
            peak_count: 500,
            avg_count: 400,
            confidence: 85,
            sample_date: NaiveDate::from_ymd_opt(2026, 8, 28),
            region: "Southwest".to_string(),
            city: "Sarasota".to_string(),
            slug: "siesta-key".to_string(),
            source: SourceTier::Live,
        };
        let row = status_row(&status, NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(), "ts");
        assert_eq!(row.len(), STATUS_HEADERS.len());
        assert_eq!(row[0], "Siesta Key");
        assert_eq!(row[3], "safe");
        assert_eq!(row[7], "2026-08-28");
    }

    #[test]
    fn test_rollup_row_matches_contract_width() {
        let record = AggregateRecord {
            name: "Sarasota".to_string(),
            kind: LocationKind::City,
            status: Status::Avoid,
            peak_count: 50_000,
            avg_count: 20_000,
            confidence: 60,
            sample_date: NaiveDate::from_ymd_opt(2026, 8, 28),
            beach_count: 3,
            city_count: 0,
            beaches_safe: 1,
            beaches_caution: 1,
            beaches_avoid: 1,
            region: "Southwest".to_string(),
            slug: "sarasota".to_string(),
            beach_slugs: vec!["lido-key".to_string()],
            city_slugs: vec![],
        };
        let row = rollup_row(&record, NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(), "ts");
        assert_eq!(row.len(), STATUS_HEADERS.len());
        assert_eq!(row[1], "city");
        assert_eq!(row[14], "1"); // beaches_safe
        assert_eq!(row[16], "1"); // beaches_avoid
    }

    // --- Slugs ---------------------------------------------------------------

    #[test]
    fn test_slug_generation() {
        assert_eq!(slug("Siesta Key"), "siesta-key");
        assert_eq!(slug("St. Pete Beach"), "st-pete-beach");
        assert_eq!(slug("Anna Maria Island -- North"), "anna-maria-island-north");
        assert_eq!(slug("  Venice  "), "venice");
        assert_eq!(slug("O'Leno"), "oleno");
    }
}
