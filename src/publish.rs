/// CMS publisher.
///
/// Maps resolved statuses and rollups onto WordPress REST payloads and issues
/// create-or-update calls in hierarchical order (beaches, then cities, then
/// regions) so relationship fields can reference already-published children.
///
/// Payload fields go through a typed field table: every field name is declared
/// with a kind (scalar, count, identifier list) per post type, and inserting a
/// value of the wrong kind is rejected before any network call. Relationship
/// fields carry identifier arrays, possibly empty, never counts.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::CmsConfig;
use crate::limiter::RateLimiter;
use crate::logging::{self, DataSource};
use crate::model::{AggregateRecord, HabError, LocationKind, LocationStatus, Status};
use crate::worksheets::BeachLocation;

const CMS_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Typed field table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free-form text or flag value.
    Scalar,
    /// Non-negative numeric tally.
    Count,
    /// Array of CMS post identifiers.
    IdentifierList,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Count => "count",
            FieldKind::IdentifierList => "identifier list",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Number(i64),
    Ids(Vec<u64>),
}

impl FieldValue {
    fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) | FieldValue::Flag(_) => FieldKind::Scalar,
            FieldValue::Number(_) => FieldKind::Count,
            FieldValue::Ids(_) => FieldKind::IdentifierList,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Flag(b) => Value::Bool(*b),
            FieldValue::Number(n) => json!(n),
            FieldValue::Ids(ids) => json!(ids),
        }
    }
}

/// Declared kind of each ACF field, per post type. Unknown fields have no
/// kind and are rejected outright.
fn field_kind(post_type: LocationKind, field: &str) -> Option<FieldKind> {
    use FieldKind::*;

    // Fields common to every post type.
    match field {
        "current_status" | "status_color" | "last_updated" | "url_slug" | "region" | "state"
        | "featured_location" => return Some(Scalar),
        _ => {}
    }

    match post_type {
        LocationKind::Beach => match field {
            "city" | "coordinates" | "full_address" | "zip_code" | "sample_date" => Some(Scalar),
            "peak_count" | "confidence_score" => Some(Count),
            _ => None,
        },
        LocationKind::City | LocationKind::Region => match field {
            "sample_date" => Some(Scalar),
            "peak_count" | "avg_count" | "confidence_score" | "beach_count" | "beaches_safe"
            | "beaches_caution" | "beaches_avoid" => Some(Count),
            "related_beaches" => Some(IdentifierList),
            "city_count" if post_type == LocationKind::Region => Some(Count),
            "related_cities" if post_type == LocationKind::Region => Some(IdentifierList),
            _ => None,
        },
    }
}

/// An ordered ACF field set for one post, validated on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    post_type: LocationKind,
    fields: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new(post_type: LocationKind) -> Self {
        FieldMap { post_type, fields: Vec::new() }
    }

    /// Adds a field after checking it against the declared kind table.
    pub fn insert(&mut self, field: &str, value: FieldValue) -> Result<(), HabError> {
        let expected = field_kind(self.post_type, field).ok_or_else(|| {
            HabError::Configuration(format!(
                "field '{}' is not declared for post type '{}'",
                field, self.post_type
            ))
        })?;
        if value.kind() != expected {
            return Err(HabError::FieldKindMismatch {
                field: field.to_string(),
                expected: expected.name(),
                got: value.kind().name(),
            });
        }
        self.fields.push((field.to_string(), value));
        Ok(())
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Payload construction
// ---------------------------------------------------------------------------

pub fn status_color(status: Status) -> &'static str {
    match status {
        Status::Safe => "#28a745",
        Status::Caution => "#ffc107",
        Status::Avoid => "#dc3545",
        Status::NoData => "#6c757d",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPayload {
    pub title: String,
    pub slug: String,
    pub meta_description: String,
    pub fields: FieldMap,
}

impl PostPayload {
    pub fn to_json(&self) -> Value {
        json!({
            "title": self.title,
            "slug": self.slug,
            "status": "publish",
            "acf": self.fields.to_json(),
            "meta": { "_yoast_wpseo_metadesc": self.meta_description },
        })
    }
}

fn titles(post_type: LocationKind, name: &str) -> (String, String) {
    match post_type {
        LocationKind::Beach => (
            format!("{} Red Tide Status - Current Conditions & Updates", name),
            format!(
                "Current red tide conditions at {}. Real-time HAB monitoring data, safety information, and beach status updates.",
                name
            ),
        ),
        LocationKind::City => (
            format!("{} Red Tide Status - All Beaches Current Conditions", name),
            format!(
                "Red tide conditions for all beaches in {}, FL. Current status, safety advisories, and detailed monitoring data.",
                name
            ),
        ),
        LocationKind::Region => (
            format!("{} Red Tide Status - Regional Overview & Beach Conditions", name),
            format!(
                "Comprehensive red tide monitoring for {}. Track conditions across all beaches and cities in the region.",
                name
            ),
        ),
    }
}

fn common_fields(
    fields: &mut FieldMap,
    status: Status,
    slug: &str,
    region: &str,
    now: DateTime<Utc>,
) -> Result<(), HabError> {
    fields.insert("current_status", FieldValue::Text(status.to_string()))?;
    fields.insert("status_color", FieldValue::Text(status_color(status).to_string()))?;
    fields.insert(
        "last_updated",
        FieldValue::Text(now.format("%Y-%m-%d %H:%M:%S").to_string()),
    )?;
    fields.insert("url_slug", FieldValue::Text(slug.to_string()))?;
    fields.insert("region", FieldValue::Text(region.to_string()))?;
    fields.insert("state", FieldValue::Text("FL".to_string()))?;
    fields.insert("featured_location", FieldValue::Flag(false))?;
    Ok(())
}

fn sample_date_text(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn coordinates_text(location: &BeachLocation) -> String {
    match (location.latitude, location.longitude) {
        (Some(lat), Some(lon)) => format!("{}, {}", lat, lon),
        (Some(lat), None) => lat.to_string(),
        (None, Some(lon)) => lon.to_string(),
        (None, None) => String::new(),
    }
}

/// Builds a beach post payload, folding in reference data from the
/// `locations` worksheet when the beach has a row there.
pub fn beach_payload(
    status: &LocationStatus,
    location: Option<&BeachLocation>,
    now: DateTime<Utc>,
) -> Result<PostPayload, HabError> {
    let (title, meta_description) = titles(LocationKind::Beach, &status.name);
    let mut fields = FieldMap::new(LocationKind::Beach);
    common_fields(&mut fields, status.status, &status.slug, &status.region, now)?;
    fields.insert("city", FieldValue::Text(status.city.clone()))?;
    if let Some(location) = location {
        fields.insert("coordinates", FieldValue::Text(coordinates_text(location)))?;
        fields.insert("full_address", FieldValue::Text(location.address.clone()))?;
        fields.insert("zip_code", FieldValue::Text(location.zip.clone()))?;
    }
    fields.insert("peak_count", FieldValue::Number(status.peak_count as i64))?;
    fields.insert("confidence_score", FieldValue::Number(status.confidence as i64))?;
    fields.insert("sample_date", FieldValue::Text(sample_date_text(status.sample_date)))?;

    Ok(PostPayload { title, slug: status.slug.clone(), meta_description, fields })
}

/// Builds a city or region payload from a rollup record. Relationship fields
/// are included only when `relationships` is `Some`; an empty id list is
/// still a list.
pub fn rollup_payload(
    record: &AggregateRecord,
    relationships: Option<&Relationships>,
    now: DateTime<Utc>,
) -> Result<PostPayload, HabError> {
    let (title, meta_description) = titles(record.kind, &record.name);
    let mut fields = FieldMap::new(record.kind);
    common_fields(&mut fields, record.status, &record.slug, &record.region, now)?;
    fields.insert("peak_count", FieldValue::Number(record.peak_count as i64))?;
    fields.insert("avg_count", FieldValue::Number(record.avg_count as i64))?;
    fields.insert("confidence_score", FieldValue::Number(record.confidence as i64))?;
    fields.insert("sample_date", FieldValue::Text(sample_date_text(record.sample_date)))?;
    fields.insert("beach_count", FieldValue::Number(record.beach_count as i64))?;
    fields.insert("beaches_safe", FieldValue::Number(record.beaches_safe as i64))?;
    fields.insert("beaches_caution", FieldValue::Number(record.beaches_caution as i64))?;
    fields.insert("beaches_avoid", FieldValue::Number(record.beaches_avoid as i64))?;
    if record.kind == LocationKind::Region {
        fields.insert("city_count", FieldValue::Number(record.city_count as i64))?;
    }
    if let Some(rel) = relationships {
        fields.insert("related_beaches", FieldValue::Ids(rel.beach_ids.clone()))?;
        if record.kind == LocationKind::Region {
            fields.insert("related_cities", FieldValue::Ids(rel.city_ids.clone()))?;
        }
    }

    Ok(PostPayload { title, slug: record.slug.clone(), meta_description, fields })
}

/// Published child ids for a rollup's relationship fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationships {
    pub beach_ids: Vec<u64>,
    pub city_ids: Vec<u64>,
}

// ---------------------------------------------------------------------------
// CMS endpoint
// ---------------------------------------------------------------------------

/// Seam between payload construction and the live CMS; tests substitute an
/// in-memory fake.
pub trait CmsEndpoint {
    /// Looks up an existing post id by slug; `None` means create.
    fn find_by_slug(
        &mut self,
        post_type: LocationKind,
        slug: &str,
        limiter: &mut RateLimiter,
    ) -> Result<Option<u64>, HabError>;

    /// Creates (`post_id = None`) or updates a post, returning its id.
    fn upsert(
        &mut self,
        post_type: LocationKind,
        post_id: Option<u64>,
        payload: &Value,
        limiter: &mut RateLimiter,
    ) -> Result<u64, HabError>;
}

/// Blocking WordPress REST client with application-password basic auth.
pub struct WpClient {
    client: reqwest::blocking::Client,
    site_url: String,
    username: String,
    app_password: String,
}

impl WpClient {
    pub fn new(config: &CmsConfig) -> Result<WpClient, HabError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(CMS_TIMEOUT)
            .build()
            .map_err(|e| HabError::Transport(format!("CMS client construction failed: {}", e)))?;
        Ok(WpClient {
            client,
            site_url: config.site_url.clone(),
            username: config.username.clone(),
            app_password: config.app_password.clone(),
        })
    }

    fn post_type_url(&self, post_type: LocationKind) -> String {
        format!("{}/wp-json/wp/v2/{}", self.site_url, post_type)
    }

    /// Confirms the credentials work before a sync run starts.
    pub fn check_auth(&self, limiter: &mut RateLimiter) -> Result<(), HabError> {
        limiter.wait_if_needed();
        let url = format!("{}/wp-json/wp/v2/users/me", self.site_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .map_err(|e| HabError::Transport(format!("CMS auth check failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(HabError::Configuration(format!(
                "CMS rejected credentials: HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

impl CmsEndpoint for WpClient {
    fn find_by_slug(
        &mut self,
        post_type: LocationKind,
        slug: &str,
        limiter: &mut RateLimiter,
    ) -> Result<Option<u64>, HabError> {
        limiter.wait_if_needed();
        let response = self
            .client
            .get(self.post_type_url(post_type))
            .query(&[("slug", slug)])
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .map_err(|e| HabError::Transport(format!("slug search failed: {}", e)))?;

        if !response.status().is_success() {
            // A failed search is survivable; the upsert falls back to create.
            logging::warn(
                DataSource::Cms,
                Some(slug),
                &format!("slug search returned HTTP {}", response.status().as_u16()),
            );
            return Ok(None);
        }

        let posts: Vec<Value> = response
            .json()
            .map_err(|e| HabError::MalformedResponse(format!("slug search body: {}", e)))?;
        Ok(posts.first().and_then(|p| p.get("id")).and_then(|id| id.as_u64()))
    }

    fn upsert(
        &mut self,
        post_type: LocationKind,
        post_id: Option<u64>,
        payload: &Value,
        limiter: &mut RateLimiter,
    ) -> Result<u64, HabError> {
        limiter.wait_if_needed();
        let url = match post_id {
            Some(id) => format!("{}/{}", self.post_type_url(post_type), id),
            None => self.post_type_url(post_type),
        };
        // WordPress uses POST for updates as well as creates.
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.app_password))
            .json(payload)
            .send()
            .map_err(|e| HabError::Transport(format!("upsert failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HabError::UpstreamService {
                code: Some(status.as_u16() as i64),
                message: body.chars().take(200).collect(),
            });
        }
        let body: Value = response
            .json()
            .map_err(|e| HabError::MalformedResponse(format!("upsert body: {}", e)))?;
        body.get("id").and_then(|id| id.as_u64()).ok_or_else(|| {
            HabError::MalformedResponse("upsert response has no post id".to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Sync orchestration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub beaches_attempted: usize,
    pub beaches_published: usize,
    pub cities_attempted: usize,
    pub cities_published: usize,
    pub regions_attempted: usize,
    pub regions_published: usize,
}

impl PublishSummary {
    pub fn attempted(&self) -> usize {
        self.beaches_attempted + self.cities_attempted + self.regions_attempted
    }

    pub fn published(&self) -> usize {
        self.beaches_published + self.cities_published + self.regions_published
    }
}

/// Publishes the run's results in hierarchical order. Payload construction
/// errors are fatal (they mean a broken field table); a failed network upsert
/// is logged and skipped so one bad post cannot sink the run.
pub fn publish_all(
    endpoint: &mut dyn CmsEndpoint,
    beaches: &[LocationStatus],
    cities: &[AggregateRecord],
    regions: &[AggregateRecord],
    locations: &[BeachLocation],
    use_acf_relationships: bool,
    now: DateTime<Utc>,
    limiter: &mut RateLimiter,
) -> Result<PublishSummary, HabError> {
    let mut summary = PublishSummary::default();
    let mut beach_ids: HashMap<String, u64> = HashMap::new();
    let mut city_ids: HashMap<String, u64> = HashMap::new();

    for beach in beaches {
        summary.beaches_attempted += 1;
        let reference = locations.iter().find(|l| l.beach == beach.name);
        let payload = beach_payload(beach, reference, now)?;
        if let Some(id) = publish_one(endpoint, LocationKind::Beach, &payload, limiter) {
            beach_ids.insert(beach.slug.clone(), id);
            summary.beaches_published += 1;
        }
    }

    for city in cities {
        summary.cities_attempted += 1;
        let relationships = use_acf_relationships.then(|| Relationships {
            beach_ids: resolve_ids(&city.beach_slugs, &beach_ids),
            city_ids: Vec::new(),
        });
        let payload = rollup_payload(city, relationships.as_ref(), now)?;
        if let Some(id) = publish_one(endpoint, LocationKind::City, &payload, limiter) {
            city_ids.insert(city.slug.clone(), id);
            summary.cities_published += 1;
        }
    }

    for region in regions {
        summary.regions_attempted += 1;
        let relationships = use_acf_relationships.then(|| Relationships {
            beach_ids: resolve_ids(&region.beach_slugs, &beach_ids),
            city_ids: resolve_ids(&region.city_slugs, &city_ids),
        });
        let payload = rollup_payload(region, relationships.as_ref(), now)?;
        if publish_one(endpoint, LocationKind::Region, &payload, limiter).is_some() {
            summary.regions_published += 1;
        }
    }

    Ok(summary)
}

/// Maps child slugs to the ids published earlier this run. A child that
/// failed to publish is simply absent from the list.
fn resolve_ids(slugs: &[String], ids: &HashMap<String, u64>) -> Vec<u64> {
    slugs.iter().filter_map(|slug| ids.get(slug).copied()).collect()
}

fn publish_one(
    endpoint: &mut dyn CmsEndpoint,
    post_type: LocationKind,
    payload: &PostPayload,
    limiter: &mut RateLimiter,
) -> Option<u64> {
    let existing = match endpoint.find_by_slug(post_type, &payload.slug, limiter) {
        Ok(id) => id,
        Err(err) => {
            logging::log_fetch_failure(DataSource::Cms, Some(&payload.slug), "slug search", &err);
            None
        }
    };

    match endpoint.upsert(post_type, existing, &payload.to_json(), limiter) {
        Ok(id) => {
            logging::debug(
                DataSource::Cms,
                Some(&payload.slug),
                &format!(
                    "{} {} post (id {})",
                    if existing.is_some() { "updated" } else { "created" },
                    post_type,
                    id
                ),
            );
            Some(id)
        }
        Err(err) => {
            logging::log_fetch_failure(DataSource::Cms, Some(&payload.slug), "upsert", &err);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
