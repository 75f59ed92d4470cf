/// City and region rollups over beach statuses.
///
/// Group status is the worst among children; peak is the max child peak;
/// averages skip `no_data` children rather than treating them as zero, so a
/// defaulted beach never drags a city toward "all clear". Grouping uses
/// `BTreeMap` and sorted child lists: the output is a pure function of the
/// input set, not of its ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AggregateRecord, LocationKind, LocationStatus, Status};
use crate::worksheets::slug;

// ---------------------------------------------------------------------------
// Public rollups
// ---------------------------------------------------------------------------

/// Rolls beach statuses up to one record per city. Beaches without a city
/// are left out, as are non-beach inputs.
pub fn rollup_cities(statuses: &[LocationStatus]) -> Vec<AggregateRecord> {
    let mut groups: BTreeMap<&str, Vec<&LocationStatus>> = BTreeMap::new();
    for status in beaches(statuses) {
        if !status.city.is_empty() {
            groups.entry(status.city.as_str()).or_default().push(status);
        }
    }

    groups
        .into_iter()
        .map(|(city, children)| aggregate(city, LocationKind::City, children))
        .collect()
}

/// Rolls beach statuses up to one record per region, counting the distinct
/// cities under each.
pub fn rollup_regions(statuses: &[LocationStatus]) -> Vec<AggregateRecord> {
    let mut groups: BTreeMap<&str, Vec<&LocationStatus>> = BTreeMap::new();
    for status in beaches(statuses) {
        if !status.region.is_empty() {
            groups.entry(status.region.as_str()).or_default().push(status);
        }
    }

    groups
        .into_iter()
        .map(|(region, children)| {
            let cities: BTreeSet<&str> = children
                .iter()
                .filter(|c| !c.city.is_empty())
                .map(|c| c.city.as_str())
                .collect();
            let mut record = aggregate(region, LocationKind::Region, children);
            record.city_count = cities.len() as u32;
            record.city_slugs = cities.iter().map(|c| slug(c)).collect();
            // A region is the top of the hierarchy; the region column stays
            // empty on its own row.
            record.region = String::new();
            record
        })
        .collect()
}

fn beaches(statuses: &[LocationStatus]) -> impl Iterator<Item = &LocationStatus> {
    statuses.iter().filter(|s| s.kind == LocationKind::Beach)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn aggregate(name: &str, kind: LocationKind, mut children: Vec<&LocationStatus>) -> AggregateRecord {
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let beaches_safe = count_status(&children, Status::Safe);
    let beaches_caution = count_status(&children, Status::Caution);
    let beaches_avoid = count_status(&children, Status::Avoid);

    let status = if beaches_avoid > 0 {
        Status::Avoid
    } else if beaches_caution > 0 {
        Status::Caution
    } else if beaches_safe > 0 {
        Status::Safe
    } else {
        Status::NoData
    };

    let peak_count = children.iter().map(|c| c.peak_count).max().unwrap_or(0);

    // no_data children carry no measurement; skipping them keeps the mean
    // honest instead of diluting it with synthetic zeros.
    let measured: Vec<&&LocationStatus> =
        children.iter().filter(|c| c.status != Status::NoData).collect();
    let avg_count = mean(measured.iter().map(|c| c.avg_count as u64));
    let confidence = mean(
        children
            .iter()
            .filter(|c| c.confidence > 0)
            .map(|c| c.confidence as u64),
    );

    let sample_date = children.iter().filter_map(|c| c.sample_date).max();
    let region = children
        .first()
        .map(|c| c.region.clone())
        .unwrap_or_default();
    let beach_slugs = children.iter().map(|c| c.slug.clone()).collect();

    AggregateRecord {
        name: name.to_string(),
        kind,
        status,
        peak_count,
        avg_count,
        confidence,
        sample_date,
        beach_count: children.len() as u32,
        city_count: 0,
        beaches_safe,
        beaches_caution,
        beaches_avoid,
        region,
        slug: slug(name),
        beach_slugs,
        city_slugs: Vec::new(),
    }
}

fn count_status(children: &[&LocationStatus], status: Status) -> u32 {
    children.iter().filter(|c| c.status == status).count() as u32
}

fn mean(values: impl Iterator<Item = u64>) -> u32 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 { 0 } else { (sum / count) as u32 }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceTier;
    use chrono::NaiveDate;

    fn beach(
        name: &str,
        city: &str,
        region: &str,
        status: Status,
        peak: u32,
        avg: u32,
        confidence: u32,
    ) -> LocationStatus {
        LocationStatus {
            name: name.to_string(),
            kind: LocationKind::Beach,
            status,
            peak_count: peak,
            avg_count: avg,
            confidence,
            sample_date: NaiveDate::from_ymd_opt(2026, 8, 28),
            region: region.to_string(),
            city: city.to_string(),
            slug: slug(name),
            source: SourceTier::Live,
        }
    }

    fn sarasota_beaches() -> Vec<LocationStatus> {
        vec![
            beach("Siesta Key", "Sarasota", "Southwest", Status::Safe, 0, 0, 80),
            beach("Lido Key", "Sarasota", "Southwest", Status::Caution, 500, 400, 60),
            beach("Turtle Beach", "Sarasota", "Southwest", Status::Avoid, 5_000, 3_000, 70),
        ]
    }

    #[test]
    fn test_city_rollup_counts_and_peak() {
        let records = rollup_cities(&sarasota_beaches());
        assert_eq!(records.len(), 1);
        let city = &records[0];
        assert_eq!(city.name, "Sarasota");
        assert_eq!(city.kind, LocationKind::City);
        assert_eq!(city.beaches_safe, 1);
        assert_eq!(city.beaches_caution, 1);
        assert_eq!(city.beaches_avoid, 1);
        assert_eq!(city.peak_count, 5_000);
        assert_eq!(city.beach_count, 3);
        assert_eq!(city.status, Status::Avoid, "worst child status wins");
        assert_eq!(
            city.beach_slugs,
            vec!["lido-key", "siesta-key", "turtle-beach"],
            "child slugs are sorted by beach name"
        );
    }

    #[test]
    fn test_rollup_is_independent_of_input_order() {
        let mut reversed = sarasota_beaches();
        reversed.reverse();
        assert_eq!(
            rollup_cities(&sarasota_beaches()),
            rollup_cities(&reversed),
            "result must not depend on input order"
        );
        assert_eq!(rollup_regions(&sarasota_beaches()), rollup_regions(&reversed));
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let beaches = sarasota_beaches();
        let first = rollup_cities(&beaches);
        let second = rollup_cities(&beaches);
        assert_eq!(first, second, "identical input must yield identical records");
    }

    #[test]
    fn test_no_data_children_are_skipped_when_averaging() {
        let beaches = vec![
            beach("A", "Venice", "Southwest", Status::Safe, 1_000, 1_000, 50),
            beach("B", "Venice", "Southwest", Status::NoData, 0, 0, 0),
        ];
        let city = &rollup_cities(&beaches)[0];
        assert_eq!(city.avg_count, 1_000, "no_data is not averaged in as zero");
        assert_eq!(city.confidence, 50, "zero confidences are excluded from the mean");
        assert_eq!(city.status, Status::Safe);
        assert_eq!(city.beach_count, 2);
    }

    #[test]
    fn test_all_no_data_children_yield_no_data_group() {
        let beaches = vec![
            beach("A", "Venice", "Southwest", Status::NoData, 0, 0, 0),
            beach("B", "Venice", "Southwest", Status::NoData, 0, 0, 0),
        ];
        let city = &rollup_cities(&beaches)[0];
        assert_eq!(city.status, Status::NoData);
        assert_eq!(city.avg_count, 0);
        assert_eq!(city.peak_count, 0);
    }

    #[test]
    fn test_beaches_without_city_are_left_out_of_city_rollups() {
        let beaches = vec![
            beach("A", "", "Southwest", Status::Safe, 100, 100, 50),
            beach("B", "Venice", "Southwest", Status::Safe, 200, 200, 50),
        ];
        let records = rollup_cities(&beaches);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].beach_count, 1);
        // The cityless beach still participates in its region.
        let regions = rollup_regions(&beaches);
        assert_eq!(regions[0].beach_count, 2);
    }

    #[test]
    fn test_region_rollup_counts_distinct_cities() {
        let beaches = vec![
            beach("A", "Sarasota", "Southwest", Status::Safe, 100, 100, 50),
            beach("B", "Sarasota", "Southwest", Status::Caution, 800, 600, 40),
            beach("C", "Venice", "Southwest", Status::Safe, 50, 50, 90),
        ];
        let regions = rollup_regions(&beaches);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.name, "Southwest");
        assert_eq!(region.city_count, 2);
        assert_eq!(region.city_slugs, vec!["sarasota", "venice"]);
        assert_eq!(region.beach_count, 3);
        assert_eq!(region.status, Status::Caution);
        assert_eq!(region.region, "", "a region row has no parent region");
    }

    #[test]
    fn test_multiple_cities_sorted_by_name() {
        let beaches = vec![
            beach("Z Beach", "Venice", "Southwest", Status::Safe, 1, 1, 1),
            beach("A Beach", "Bradenton", "Southwest", Status::Safe, 1, 1, 1),
        ];
        let rollups = rollup_cities(&beaches);
        let names: Vec<&str> = rollups.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Bradenton", "Venice"]);
    }

    #[test]
    fn test_group_sample_date_is_most_recent_child_date() {
        let mut beaches = sarasota_beaches();
        beaches[1].sample_date = NaiveDate::from_ymd_opt(2026, 8, 30);
        let city = &rollup_cities(&beaches)[0];
        assert_eq!(city.sample_date, NaiveDate::from_ymd_opt(2026, 8, 30));
    }
}
