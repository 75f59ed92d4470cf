/// Per-beach fallback resolution.
///
/// Three tiers, strict priority, first success wins:
///   1. Live - weighted status over the beach's mapped sampling sites.
///   2. Cached - the last-known `beach_status` worksheet row.
///   3. Default - synthesized `no_data` with zeroed counts.
///
/// A status is never a blend: a fetch error while querying any of a beach's
/// sites taints the whole live tier for that beach, and the cached row is
/// used as-is. Retries are not attempted here - retry policy belongs to the
/// transport layer.
///
/// # Clock injection
/// `resolve_beach` takes `now: DateTime<Utc>` rather than reading the clock,
/// so age weighting and recency matching are deterministic in tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::ingest::fwc::{SampleSource, SiteQuery};
use crate::limiter::RateLimiter;
use crate::logging;
use crate::model::{LocationKind, LocationStatus, SampleSite, SourceTier, Status};
use crate::worksheets::{slug, BeachLocation, SampleMapping};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

pub fn resolve_beach(
    beach: &BeachLocation,
    sites: &[SampleMapping],
    source: &mut dyn SampleSource,
    prior: &HashMap<String, LocationStatus>,
    now: DateTime<Utc>,
    limiter: &mut RateLimiter,
) -> LocationStatus {
    let mut samples = Vec::new();
    let mut fetch_error = None;

    for site in sites {
        let query = SiteQuery {
            hab_id: site.hab_id.clone(),
            sample_location: site.sample_location.clone(),
            distance_mi: site.sample_distance_mi,
        };
        match source.fetch(&query, now, limiter) {
            Ok(Some(sample)) => samples.push(sample),
            Ok(None) => {}
            Err(e) if e.is_fallback_eligible() => {
                logging::log_fetch_failure(
                    logging::DataSource::Fwc,
                    Some(&beach.beach),
                    &format!("site query '{}'", site.sample_location),
                    &e,
                );
                fetch_error = Some(e);
                break;
            }
            Err(e) => {
                // Configuration-class errors must not be masked by fallback;
                // but the contract is that the fetch seam only returns
                // fallback-eligible errors. Treat anything else as such and
                // let it surface loudly in the log.
                logging::error(
                    logging::DataSource::Fwc,
                    Some(&beach.beach),
                    &format!("unexpected fetch error: {}", e),
                );
                fetch_error = Some(e);
                break;
            }
        }
    }

    if fetch_error.is_none() && !samples.is_empty() {
        let status = live_status(beach, &samples);
        logging::log_tier_resolution(&beach.beach, SourceTier::Live, None);
        return status;
    }

    if let Some(cached) = prior.get(&beach.beach) {
        logging::log_tier_resolution(&beach.beach, SourceTier::Cached, fetch_error.as_ref());
        // Reference data (city/region/slug) always comes from the current
        // locations sheet; only the measurements are last-known.
        let mut status = cached.clone();
        status.region = beach.region.clone();
        status.city = beach.city.clone();
        status.slug = slug(&beach.beach);
        status.source = SourceTier::Cached;
        return status;
    }

    logging::log_tier_resolution(&beach.beach, SourceTier::Default, fetch_error.as_ref());
    default_status(beach)
}

/// The synthesized tier-3 record: `no_data`, zeroed counts. `no_data` rather
/// than `safe` - a public-safety feed must not claim safety without evidence.
pub fn default_status(beach: &BeachLocation) -> LocationStatus {
    LocationStatus {
        name: beach.beach.clone(),
        kind: LocationKind::Beach,
        status: Status::NoData,
        peak_count: 0,
        avg_count: 0,
        confidence: 0,
        sample_date: None,
        region: beach.region.clone(),
        city: beach.city.clone(),
        slug: slug(&beach.beach),
        source: SourceTier::Default,
    }
}

// ---------------------------------------------------------------------------
// Live tier scoring
// ---------------------------------------------------------------------------

fn status_score(status: Status) -> f64 {
    match status {
        Status::Safe | Status::NoData => 0.0,
        Status::Caution => 1.0,
        Status::Avoid => 2.0,
    }
}

fn live_status(beach: &BeachLocation, samples: &[SampleSite]) -> LocationStatus {
    let weighted_sum: f64 = samples.iter().map(|s| status_score(s.status) * s.weight).sum();
    let avg_weighted_score = weighted_sum / samples.len() as f64;

    let status = if avg_weighted_score >= 1.5 {
        Status::Avoid
    } else if avg_weighted_score >= 0.5 {
        Status::Caution
    } else {
        Status::Safe
    };

    let weight_total: f64 = samples.iter().map(|s| s.weight).sum();
    let confidence = (weight_total * 40.0 + samples.len() as f64 * 15.0).min(100.0) as u32;

    let peak_count = samples.iter().map(|s| s.cell_count).max().unwrap_or(0);
    let avg_count =
        (samples.iter().map(|s| s.cell_count as u64).sum::<u64>() / samples.len() as u64) as u32;
    let sample_date = samples.iter().map(|s| s.sample_date).max().map(|d| d.date_naive());

    LocationStatus {
        name: beach.beach.clone(),
        kind: LocationKind::Beach,
        status,
        peak_count,
        avg_count,
        confidence,
        sample_date,
        region: beach.region.clone(),
        city: beach.city.clone(),
        slug: slug(&beach.beach),
        source: SourceTier::Live,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
