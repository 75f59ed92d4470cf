/// Data aggregation utilities for the HAB sync service.
///
/// Pure functions over the run's resolved statuses; no I/O. Rollups are
/// deterministic and independent of input ordering so a rerun over the same
/// snapshot always produces identical records.
///
/// Submodules:
/// - `rollup` - city and region aggregation over beach statuses.

pub mod rollup;
