/// habsync: Harmful Algal Bloom status synchronization.
///
/// Fetches HAB sample data from the Florida FWC query API, merges it with
/// cached spreadsheet reference data through a three-tier fallback chain
/// (live, cached, default), rolls beach statuses up to cities and regions,
/// writes the results back to the spreadsheet, and publishes them to a
/// WordPress CMS.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod limiter;
pub mod logging;
pub mod model;
pub mod publish;
pub mod resolve;
pub mod verify;
pub mod worksheets;
