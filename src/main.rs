/// Run orchestration for the HAB status sync.
///
/// Phases run strictly in order: configuration, cache preload, header
/// verification, per-beach resolution, city/region rollup, worksheet
/// write-back, CMS publish, summary. Every configured beach ends the run
/// with exactly one status, whatever the upstream services did.

use std::process::ExitCode;

use chrono::Utc;

use habsync::analysis::rollup::{rollup_cities, rollup_regions};
use habsync::cache::{GoogleSheetSource, SheetCache, SheetWriter};
use habsync::config::Config;
use habsync::ingest::fwc::FwcSource;
use habsync::limiter::RateLimiter;
use habsync::logging::{self, init_logger, DataSource, LogLevel};
use habsync::model::{HabError, SourceTier};
use habsync::publish::{publish_all, WpClient};
use habsync::resolve::resolve_beach;
use habsync::verify;
use habsync::worksheets::{
    parse_beach_status, parse_locations, parse_sample_mapping, rollup_row, status_row,
    verify_status_headers, STATUS_HEADERS, WS_BEACH_STATUS, WS_LOCATIONS, WS_SAMPLE_MAPPING,
};

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let min_level = if config.test_mode { LogLevel::Debug } else { LogLevel::Info };
    let log_file = std::env::var("LOG_FILE").ok();
    init_logger(min_level, log_file.as_deref());

    if std::env::args().nth(1).as_deref() == Some("verify") {
        return run_verification(&config);
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(DataSource::System, None, &format!("sync aborted: {}", e));
            eprintln!("\n❌ HAB status sync failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_verification(config: &Config) -> ExitCode {
    let mut limiter = RateLimiter::new(config.rate_limit_secs);
    let mut source = match GoogleSheetSource::new(&config.sheet.sheet_id, &config.sheet.api_token) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let report = verify::run_full_verification(config, &mut source, &mut limiter);
    verify::print_summary(&report);

    let healthy = report.fwc.status != verify::VerificationStatus::Failed
        && report.sheet.status != verify::VerificationStatus::Failed;
    if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn run(config: &Config) -> Result<(), HabError> {
    println!("🔄 Starting HAB status sync...");
    let now = Utc::now();
    let mut limiter = RateLimiter::new(config.rate_limit_secs);

    // Phase 1: load the worksheets, one fetch each.
    let source = GoogleSheetSource::new(&config.sheet.sheet_id, &config.sheet.api_token)?;
    let mut cache = SheetCache::new(source);
    cache.preload(&[WS_LOCATIONS, WS_SAMPLE_MAPPING, WS_BEACH_STATUS], &mut limiter)?;

    // Phase 2: the header contract is checked before anything else reads
    // beach_status; drift here is fatal, never a fallback case.
    verify_status_headers(&cache.get(WS_BEACH_STATUS, &mut limiter)?.headers)?;

    let locations = parse_locations(cache.get(WS_LOCATIONS, &mut limiter)?);
    let mappings = parse_sample_mapping(cache.get(WS_SAMPLE_MAPPING, &mut limiter)?);
    let prior = parse_beach_status(cache.get(WS_BEACH_STATUS, &mut limiter)?);
    println!(
        "✅ Loaded {} beaches, {} mapped sites, {} cached status rows",
        locations.len(),
        mappings.values().map(Vec::len).sum::<usize>(),
        prior.len()
    );

    // Phase 3: resolve each beach through the fallback chain.
    let mut fetcher = FwcSource::new(&config.fwc_api_url, config.thresholds)?;
    let selected: Vec<_> = if config.test_mode {
        println!("🧪 Test mode: limiting run to {} beaches", config.test_limit);
        locations.iter().take(config.test_limit).collect()
    } else {
        locations.iter().collect()
    };

    let mut statuses = Vec::with_capacity(selected.len());
    for beach in &selected {
        let sites = mappings.get(&beach.beach).map(Vec::as_slice).unwrap_or(&[]);
        statuses.push(resolve_beach(beach, sites, &mut fetcher, &prior, now, &mut limiter));
    }

    let tier_count =
        |tier: SourceTier| statuses.iter().filter(|s| s.source == tier).count();
    println!(
        "📊 Resolved {} beaches: {} live, {} cached, {} default",
        statuses.len(),
        tier_count(SourceTier::Live),
        tier_count(SourceTier::Cached),
        tier_count(SourceTier::Default)
    );

    // Phase 4: rollups.
    let cities = rollup_cities(&statuses);
    let regions = rollup_regions(&statuses);
    println!("📊 Aggregated {} cities, {} regions", cities.len(), regions.len());

    // Phase 5: write the snapshot back so the next run has a cached tier.
    let run_date = now.date_naive();
    let last_updated = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let mut rows: Vec<Vec<String>> = statuses
        .iter()
        .map(|s| status_row(s, run_date, &last_updated))
        .collect();
    rows.extend(cities.iter().map(|r| rollup_row(r, run_date, &last_updated)));
    rows.extend(regions.iter().map(|r| rollup_row(r, run_date, &last_updated)));
    cache
        .source_mut()
        .replace_rows(WS_BEACH_STATUS, &STATUS_HEADERS, &rows, &mut limiter)?;
    cache.invalidate(WS_BEACH_STATUS);
    println!("✅ Wrote {} rows back to {}", rows.len(), WS_BEACH_STATUS);

    // Phase 6: publish to the CMS, beaches first so parents can reference
    // their children.
    match &config.cms {
        Some(cms) => {
            let mut client = WpClient::new(cms)?;
            client.check_auth(&mut limiter)?;
            let summary = publish_all(
                &mut client,
                &statuses,
                &cities,
                &regions,
                &locations,
                config.use_acf_relationships,
                now,
                &mut limiter,
            )?;
            logging::log_sync_summary(
                DataSource::Cms,
                summary.attempted(),
                summary.published(),
                summary.attempted() - summary.published(),
            );
            println!(
                "📝 Published {}/{} beaches, {}/{} cities, {}/{} regions",
                summary.beaches_published,
                summary.beaches_attempted,
                summary.cities_published,
                summary.cities_attempted,
                summary.regions_published,
                summary.regions_attempted
            );
        }
        None => {
            println!("📝 No CMS credentials configured; skipping publish");
        }
    }

    println!("\n✅ HAB status sync complete!");
    Ok(())
}
