/// External data ingestion.
///
/// Submodules:
/// - `fwc` - FWC ArcGIS HAB query API client and sample matching.

pub mod fwc;
