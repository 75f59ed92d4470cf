/// Run configuration.
///
/// Credentials and tunables come from the environment (a `.env` file is
/// honored), status breakpoints from an optional `thresholds.toml`. Missing
/// required credentials are a fatal `Configuration` error surfaced before
/// any network traffic - configuration problems must never be absorbed by
/// the fallback chain.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::ingest::fwc::FWC_API_URL;
use crate::model::{HabError, StatusThresholds};

pub const DEFAULT_RATE_LIMIT_SECS: f64 = 1.1;
pub const DEFAULT_TEST_LIMIT: usize = 3;
pub const DEFAULT_THRESHOLDS_FILE: &str = "./thresholds.toml";

// ---------------------------------------------------------------------------
// Configuration surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SheetConfig {
    pub sheet_id: String,
    pub api_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmsConfig {
    pub site_url: String,
    pub username: String,
    pub app_password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Minimum spacing between outbound API calls, in seconds.
    pub rate_limit_secs: f64,
    /// Whether rollup payloads carry ACF relationship fields.
    pub use_acf_relationships: bool,
    /// Process only the first `test_limit` beaches and skip CMS publishing
    /// when credentials are absent.
    pub test_mode: bool,
    pub test_limit: usize,
    pub fwc_api_url: String,
    pub sheet: SheetConfig,
    /// CMS credentials; may be absent only in test mode.
    pub cms: Option<CmsConfig>,
    pub thresholds: StatusThresholds,
}

impl Config {
    /// Loads `.env`, the process environment, and the thresholds file.
    pub fn from_env() -> Result<Config, HabError> {
        dotenv::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        let mut config = Config::from_map(&vars)?;
        let path = vars
            .get("THRESHOLDS_FILE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_THRESHOLDS_FILE.to_string());
        config.thresholds = load_thresholds(&path)?;
        Ok(config)
    }

    /// Builds a config from an explicit key/value map (thresholds default).
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Config, HabError> {
        let rate_limit_secs = match vars.get("API_RATE_LIMIT_SECONDS") {
            Some(raw) => parse_f64("API_RATE_LIMIT_SECONDS", raw)?,
            None => DEFAULT_RATE_LIMIT_SECS,
        };
        let use_acf_relationships = match vars.get("USE_ACF_RELATIONSHIPS") {
            Some(raw) => parse_bool("USE_ACF_RELATIONSHIPS", raw)?,
            None => true,
        };
        let test_mode = match vars.get("TEST_MODE") {
            Some(raw) => parse_bool("TEST_MODE", raw)?,
            None => false,
        };
        let test_limit = match vars.get("TEST_LIMIT") {
            Some(raw) => parse_usize("TEST_LIMIT", raw)?,
            None => DEFAULT_TEST_LIMIT,
        };
        let fwc_api_url = vars
            .get("FWC_API_URL")
            .cloned()
            .unwrap_or_else(|| FWC_API_URL.to_string());

        let missing: Vec<&str> = ["GOOGLE_SHEET_ID", "GOOGLE_API_TOKEN"]
            .into_iter()
            .filter(|key| vars.get(*key).map(|v| v.trim().is_empty()).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(HabError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let sheet = SheetConfig {
            sheet_id: vars["GOOGLE_SHEET_ID"].clone(),
            api_token: vars["GOOGLE_API_TOKEN"].clone(),
        };

        let cms = Self::cms_from_map(vars, test_mode)?;

        Ok(Config {
            rate_limit_secs,
            use_acf_relationships,
            test_mode,
            test_limit,
            fwc_api_url,
            sheet,
            cms,
            thresholds: StatusThresholds::default(),
        })
    }

    fn cms_from_map(
        vars: &HashMap<String, String>,
        test_mode: bool,
    ) -> Result<Option<CmsConfig>, HabError> {
        let keys = ["WORDPRESS_SITE_URL", "WORDPRESS_USERNAME", "WORDPRESS_APP_PASSWORD"];
        let present: Vec<&str> = keys
            .into_iter()
            .filter(|key| vars.get(*key).map(|v| !v.trim().is_empty()).unwrap_or(false))
            .collect();

        if present.len() == keys.len() {
            return Ok(Some(CmsConfig {
                site_url: vars["WORDPRESS_SITE_URL"].trim_end_matches('/').to_string(),
                username: vars["WORDPRESS_USERNAME"].clone(),
                app_password: vars["WORDPRESS_APP_PASSWORD"].clone(),
            }));
        }
        if !present.is_empty() {
            let missing: Vec<&str> =
                keys.into_iter().filter(|k| !present.contains(k)).collect();
            return Err(HabError::Configuration(format!(
                "partial WordPress credentials: missing {}",
                missing.join(", ")
            )));
        }
        if test_mode {
            // Test runs may exercise fetch + rollup without a CMS target.
            return Ok(None);
        }
        Err(HabError::Configuration(
            "missing WordPress credentials (set TEST_MODE=true to run without publishing)"
                .to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Value parsing
// ---------------------------------------------------------------------------

fn parse_bool(key: &str, raw: &str) -> Result<bool, HabError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(HabError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_f64(key: &str, raw: &str) -> Result<f64, HabError> {
    raw.trim().parse().map_err(|_| {
        HabError::Configuration(format!("{} must be a number, got '{}'", key, raw))
    })
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, HabError> {
    raw.trim().parse().map_err(|_| {
        HabError::Configuration(format!("{} must be a non-negative integer, got '{}'", key, raw))
    })
}

// ---------------------------------------------------------------------------
// Thresholds file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ThresholdsFile {
    thresholds: StatusThresholds,
}

/// Loads status breakpoints from a TOML file; a missing file means the
/// built-in defaults.
pub fn load_thresholds(path: &str) -> Result<StatusThresholds, HabError> {
    if !Path::new(path).exists() {
        return Ok(StatusThresholds::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| HabError::Configuration(format!("cannot read {}: {}", path, e)))?;
    parse_thresholds(&text, path)
}

fn parse_thresholds(text: &str, path: &str) -> Result<StatusThresholds, HabError> {
    let file: ThresholdsFile = toml::from_str(text)
        .map_err(|e| HabError::Configuration(format!("invalid thresholds in {}: {}", path, e)))?;
    let t = file.thresholds;
    if t.caution_min_cells >= t.avoid_min_cells {
        return Err(HabError::Configuration(format!(
            "thresholds must ascend: caution_min_cells ({}) >= avoid_min_cells ({})",
            t.caution_min_cells, t.avoid_min_cells
        )));
    }
    Ok(t)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
