/// End-to-end fallback chain tests driven through fakes.
///
/// These tests run the real pipeline (worksheet parsing → per-beach
/// resolution → rollup → write-back rows) against an in-memory sheet source
/// and a scripted sample source, so they exercise the same seams the live
/// run uses without touching the network.
///
/// The contract under test: every configured beach ends the run with exactly
/// one status, and the tier that produced it is recorded.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};

use habsync::analysis::rollup::{rollup_cities, rollup_regions};
use habsync::cache::{RowSource, SheetCache, Worksheet};
use habsync::ingest::fwc::{SampleSource, SiteQuery};
use habsync::limiter::RateLimiter;
use habsync::model::{HabError, SampleSite, SourceTier, Status};
use habsync::resolve::resolve_beach;
use habsync::worksheets::{
    parse_beach_status, parse_locations, parse_sample_mapping, status_row, STATUS_HEADERS,
    WS_BEACH_STATUS, WS_LOCATIONS, WS_SAMPLE_MAPPING,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()
}

/// In-memory sheet source holding all three worksheets.
struct MemorySource {
    sheets: HashMap<String, Vec<Vec<String>>>,
    fetches: usize,
}

impl MemorySource {
    fn new() -> Self {
        let mut sheets = HashMap::new();
        sheets.insert(
            WS_LOCATIONS.to_string(),
            vec![
                row(&["beach", "city", "region", "lattitude", "longitude", "address", "zip"]),
                row(&["Siesta Key", "Sarasota", "Southwest", "27.26", "-82.54", "948 Beach Rd", "34242"]),
                row(&["Lido Key", "Sarasota", "Southwest", "27.31", "-82.57", "400 Ben Franklin Dr", "34236"]),
                row(&["Venice Beach", "Venice", "Southwest", "27.09", "-82.46", "101 The Esplanade", "34285"]),
            ],
        );
        sheets.insert(
            WS_SAMPLE_MAPPING.to_string(),
            vec![
                row(&["beach", "HAB_id", "sample_location", "sample_distance"]),
                row(&["Siesta Key", "HAB123", "Siesta Key Beach Access", "0.5"]),
                row(&["Lido Key", "HAB456", "Lido Key North", "1.8"]),
                row(&["Venice Beach", "HAB789", "Venice Fishing Pier", "0.3"]),
            ],
        );
        let mut status_rows = vec![STATUS_HEADERS.iter().map(|h| h.to_string()).collect()];
        status_rows.push(cached_status_row("Lido Key", "caution", "2600", "2100", "55"));
        sheets.insert(WS_BEACH_STATUS.to_string(), status_rows);
        MemorySource { sheets, fetches: 0 }
    }
}

impl RowSource for MemorySource {
    fn fetch_worksheet(
        &mut self,
        name: &str,
        _limiter: &mut RateLimiter,
    ) -> Result<Worksheet, HabError> {
        self.fetches += 1;
        let values = self
            .sheets
            .get(name)
            .cloned()
            .ok_or_else(|| HabError::Configuration(format!("no worksheet named '{}'", name)))?;
        Worksheet::from_values(name, values)
    }
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn cached_status_row(beach: &str, status: &str, peak: &str, avg: &str, conf: &str) -> Vec<String> {
    row(&[
        beach, "beach", "2026-08-23", status, peak, avg, conf, "2026-08-22",
        "2026-08-23 06:00:00", "Southwest", "Sarasota", "", "0", "0", "0", "0", "0",
    ])
}

/// Sample source scripted per HAB id: a sample, an empty result, or an error.
struct ScriptedSource {
    outcomes: HashMap<String, Result<Option<SampleSite>, HabError>>,
}

impl SampleSource for ScriptedSource {
    fn fetch(
        &mut self,
        query: &SiteQuery,
        _now: chrono::DateTime<Utc>,
        _limiter: &mut RateLimiter,
    ) -> Result<Option<SampleSite>, HabError> {
        self.outcomes.get(&query.hab_id).cloned().unwrap_or(Ok(None))
    }
}

fn live_sample(hab_id: &str, cell_count: u32, status: Status) -> SampleSite {
    SampleSite {
        hab_id: hab_id.to_string(),
        location: "scripted".to_string(),
        cell_count,
        status,
        sample_date: fixed_now() - chrono::Duration::days(1),
        weight: 1.0,
    }
}

/// Runs the resolution phase for every configured beach.
fn resolve_all(
    source: &mut ScriptedSource,
) -> Vec<habsync::model::LocationStatus> {
    let mut limiter = RateLimiter::new(0.0);
    let mut cache = SheetCache::new(MemorySource::new());
    cache
        .preload(&[WS_LOCATIONS, WS_SAMPLE_MAPPING, WS_BEACH_STATUS], &mut limiter)
        .unwrap();

    let locations = parse_locations(cache.get(WS_LOCATIONS, &mut limiter).unwrap());
    let mappings = parse_sample_mapping(cache.get(WS_SAMPLE_MAPPING, &mut limiter).unwrap());
    let prior = parse_beach_status(cache.get(WS_BEACH_STATUS, &mut limiter).unwrap());

    locations
        .iter()
        .map(|beach| {
            let sites = mappings.get(&beach.beach).map(Vec::as_slice).unwrap_or(&[]);
            resolve_beach(beach, sites, source, &prior, fixed_now(), &mut limiter)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fallback Chain Tests
// ---------------------------------------------------------------------------

#[test]
fn test_every_beach_gets_exactly_one_status_with_tier_recorded() {
    // Siesta Key resolves live; Lido Key's fetch fails (cached row exists);
    // Venice Beach gets no live match and has no cached row (default).
    let mut source = ScriptedSource {
        outcomes: HashMap::from([
            ("HAB123".to_string(), Ok(Some(live_sample("HAB123", 60_000, Status::Avoid)))),
            (
                "HAB456".to_string(),
                Err(HabError::UpstreamService { code: Some(503), message: "down".into() }),
            ),
            ("HAB789".to_string(), Ok(None)),
        ]),
    };

    let statuses = resolve_all(&mut source);
    assert_eq!(statuses.len(), 3, "one status per configured beach");

    let by_name: HashMap<&str, &habsync::model::LocationStatus> =
        statuses.iter().map(|s| (s.name.as_str(), s)).collect();

    let siesta = by_name["Siesta Key"];
    assert_eq!(siesta.source, SourceTier::Live);
    assert_eq!(siesta.status, Status::Avoid);

    let lido = by_name["Lido Key"];
    assert_eq!(lido.source, SourceTier::Cached);
    assert_eq!(lido.status, Status::Caution, "cached row supplies the status");
    assert_eq!(lido.peak_count, 2_600);

    let venice = by_name["Venice Beach"];
    assert_eq!(venice.source, SourceTier::Default);
    assert_eq!(venice.status, Status::NoData);
    assert_eq!(venice.confidence, 0);
}

#[test]
fn test_total_outage_resolves_everything_without_a_panic() {
    let outage = || -> Result<Option<SampleSite>, HabError> {
        Err(HabError::Transport("connection refused".into()))
    };
    let mut source = ScriptedSource {
        outcomes: HashMap::from([
            ("HAB123".to_string(), outage()),
            ("HAB456".to_string(), outage()),
            ("HAB789".to_string(), outage()),
        ]),
    };

    let statuses = resolve_all(&mut source);
    assert_eq!(statuses.len(), 3);
    assert!(
        statuses.iter().all(|s| s.source != SourceTier::Live),
        "nothing can resolve live during an outage"
    );
    // Lido Key has a cached row; the others land on the default tier.
    let cached = statuses.iter().filter(|s| s.source == SourceTier::Cached).count();
    let defaulted = statuses.iter().filter(|s| s.source == SourceTier::Default).count();
    assert_eq!((cached, defaulted), (1, 2));
}

#[test]
fn test_preload_fetches_each_worksheet_once() {
    let mut limiter = RateLimiter::new(0.0);
    let mut cache = SheetCache::new(MemorySource::new());
    cache
        .preload(&[WS_LOCATIONS, WS_SAMPLE_MAPPING, WS_BEACH_STATUS], &mut limiter)
        .unwrap();
    for _ in 0..3 {
        cache.get(WS_BEACH_STATUS, &mut limiter).unwrap();
        cache.get(WS_LOCATIONS, &mut limiter).unwrap();
    }
    assert_eq!(
        cache.source_mut().fetches, 3,
        "repeated reads never refetch a preloaded worksheet"
    );
}

// ---------------------------------------------------------------------------
// Snapshot Round Trip
// ---------------------------------------------------------------------------

#[test]
fn test_written_rows_parse_back_as_the_cached_tier() {
    // A run's write-back must be readable as the next run's cached tier.
    let mut source = ScriptedSource {
        outcomes: HashMap::from([(
            "HAB123".to_string(),
            Ok(Some(live_sample("HAB123", 7_500, Status::Caution))),
        )]),
    };
    let statuses = resolve_all(&mut source);

    let run_date = fixed_now().date_naive();
    let mut values: Vec<Vec<String>> =
        vec![STATUS_HEADERS.iter().map(|h| h.to_string()).collect()];
    values.extend(statuses.iter().map(|s| status_row(s, run_date, "2026-08-30 12:00:00")));

    let sheet = Worksheet::from_values(WS_BEACH_STATUS, values).unwrap();
    let reparsed = parse_beach_status(&sheet);

    assert_eq!(reparsed.len(), statuses.len());
    let siesta = &reparsed["Siesta Key"];
    assert_eq!(siesta.status, Status::Caution);
    assert_eq!(siesta.peak_count, 7_500);
    assert_eq!(siesta.source, SourceTier::Cached, "reparsed rows are the cached tier");
}

// ---------------------------------------------------------------------------
// Rollup Consistency
// ---------------------------------------------------------------------------

#[test]
fn test_rollups_reflect_the_same_snapshot_as_the_statuses() {
    let mut source = ScriptedSource {
        outcomes: HashMap::from([
            ("HAB123".to_string(), Ok(Some(live_sample("HAB123", 60_000, Status::Avoid)))),
            ("HAB456".to_string(), Ok(Some(live_sample("HAB456", 1_000, Status::Safe)))),
            ("HAB789".to_string(), Ok(Some(live_sample("HAB789", 8_000, Status::Caution)))),
        ]),
    };
    let statuses = resolve_all(&mut source);

    let cities = rollup_cities(&statuses);
    let regions = rollup_regions(&statuses);

    assert_eq!(cities.len(), 2, "Sarasota and Venice");
    let sarasota = cities.iter().find(|c| c.name == "Sarasota").unwrap();
    assert_eq!(sarasota.beach_count, 2);
    assert_eq!(sarasota.status, Status::Avoid, "worst beach drives the city");

    assert_eq!(regions.len(), 1);
    let southwest = &regions[0];
    assert_eq!(southwest.beach_count, 3);
    assert_eq!(southwest.city_count, 2);
    assert_eq!(
        southwest.beaches_safe + southwest.beaches_caution + southwest.beaches_avoid,
        3,
        "every beach is counted exactly once"
    );
}
