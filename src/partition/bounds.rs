//! Bound discovery over the ordering field
//!
//! The index cannot be listed, so the smallest and largest values of the
//! ordering field are found by binary search with count queries: the lower
//! bound is the smallest value `v` with `count(field le v) > 0`, the upper
//! bound the largest `v` with `count(field ge v) > 0`.

use tracing::{debug, warn};

use crate::client::IndexClient;
use crate::domain::{Bound, OrderingDomain};
use crate::error::Result;
use crate::filter::RangeFilter;

/// Smallest and largest ordering-field values present in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Bound,
    pub upper: Bound,
}

/// Find both bounds; `None` when there is nothing to export.
pub async fn find_bounds(
    client: &dyn IndexClient,
    field: &str,
    domain: &dyn OrderingDomain,
) -> Result<Option<Bounds>> {
    let Some(lower) = find_lower_bound(client, field, domain).await? else {
        return Ok(None);
    };
    let Some(upper) = find_upper_bound(client, field, domain).await? else {
        return Ok(None);
    };
    debug!("Bounds of '{}': [{}, {}]", field, lower, upper);
    Ok(Some(Bounds { lower, upper }))
}

/// Find the smallest value of `field` held by at least one document
///
/// # Returns
/// * `Result<Option<Bound>>` - The lower bound, or None if the index is empty
pub async fn find_lower_bound(
    client: &dyn IndexClient,
    field: &str,
    domain: &dyn OrderingDomain,
) -> Result<Option<Bound>> {
    if client.count(None).await? == 0 {
        debug!("Index '{}' is empty", client.index_name());
        return Ok(None);
    }

    let (min, max) = domain.ordinal_range();
    let at_most = |ordinal| RangeFilter::at_most(field, domain.from_ordinal(ordinal));

    if client.count(Some(&at_most(max))).await? == 0 {
        let beyond = RangeFilter::above(field, domain.from_ordinal(max));
        if client.count(Some(&beyond)).await? > 0 {
            warn!(
                "Every value of '{}' sorts above {}; documents beyond it are not partitioned",
                field,
                domain.from_ordinal(max)
            );
            return Ok(Some(domain.from_ordinal(max)));
        }
        warn!("No document has a {} value in '{}'", domain.kind(), field);
        return Ok(None);
    }

    // count(field le hi) > 0 holds throughout
    let (mut lo, mut hi) = (min, max);
    let mut probes = 0u32;
    while lo < hi {
        let mid = domain.midpoint(lo, hi).clamp(lo, hi - 1);
        probes += 1;
        if client.count(Some(&at_most(mid))).await? > 0 {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    debug!("Lower bound search on '{}' took {} probes", field, probes);

    // values between two representable ordinals sort below from_ordinal(hi)
    let below = RangeFilter::below(field, domain.from_ordinal(hi));
    if client.count(Some(&below)).await? > 0 {
        if hi > min {
            hi -= 1;
        } else {
            warn!(
                "Documents with '{}' below {} are not partitioned",
                field,
                domain.from_ordinal(min)
            );
        }
    }

    Ok(Some(domain.from_ordinal(hi)))
}

/// Find the largest value of `field` held by at least one document
///
/// # Returns
/// * `Result<Option<Bound>>` - The upper bound, or None if the index is empty
pub async fn find_upper_bound(
    client: &dyn IndexClient,
    field: &str,
    domain: &dyn OrderingDomain,
) -> Result<Option<Bound>> {
    if client.count(None).await? == 0 {
        debug!("Index '{}' is empty", client.index_name());
        return Ok(None);
    }

    let (min, max) = domain.ordinal_range();
    let at_least = |ordinal| RangeFilter::at_least(field, domain.from_ordinal(ordinal));

    if client.count(Some(&at_least(min))).await? == 0 {
        let beyond = RangeFilter::below(field, domain.from_ordinal(min));
        if client.count(Some(&beyond)).await? > 0 {
            warn!(
                "Every value of '{}' sorts below {}; documents beyond it are not partitioned",
                field,
                domain.from_ordinal(min)
            );
            return Ok(Some(domain.from_ordinal(min)));
        }
        warn!("No document has a {} value in '{}'", domain.kind(), field);
        return Ok(None);
    }

    // count(field ge lo) > 0 holds throughout
    let (mut lo, mut hi) = (min, max);
    let mut probes = 0u32;
    while lo < hi {
        let mid = domain.midpoint(lo, hi).clamp(lo, hi - 1) + 1;
        probes += 1;
        if client.count(Some(&at_least(mid))).await? > 0 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    debug!("Upper bound search on '{}' took {} probes", field, probes);

    let above = RangeFilter::above(field, domain.from_ordinal(lo));
    if client.count(Some(&above)).await? > 0 {
        if lo < max {
            lo += 1;
        } else {
            warn!(
                "Documents with '{}' above {} are not partitioned",
                field,
                domain.from_ordinal(max)
            );
        }
    }

    Ok(Some(domain.from_ordinal(lo)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryIndexClient;
    use crate::domain::{IntegerDomain, StringDomain, TimestampDomain};
    use chrono::{Duration, TimeZone, Utc};
    use mongodb::bson::{Document, doc};

    fn integers(values: &[i64]) -> MemoryIndexClient {
        let docs = values.iter().map(|v| doc! { "n": *v }).collect();
        MemoryIndexClient::new("numbers", docs)
    }

    #[tokio::test]
    async fn test_integer_bounds() {
        let client = integers(&[42, -7, 1_000_000, 3]);
        let bounds = find_bounds(&client, "n", &IntegerDomain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bounds.lower, Bound::Integer(-7));
        assert_eq!(bounds.upper, Bound::Integer(1_000_000));
    }

    #[tokio::test]
    async fn test_single_document_bounds_are_equal() {
        let client = integers(&[i64::MAX]);
        let bounds = find_bounds(&client, "n", &IntegerDomain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bounds.lower, bounds.upper);
        assert_eq!(bounds.upper, Bound::Integer(i64::MAX));
    }

    #[tokio::test]
    async fn test_empty_index_probes_once() {
        let client = integers(&[]);
        assert!(find_lower_bound(&client, "n", &IntegerDomain).await.unwrap().is_none());
        assert!(find_bounds(&client, "n", &IntegerDomain).await.unwrap().is_none());
        // only the unfiltered total was queried each time
        assert_eq!(client.count_queries(), 2);
    }

    #[tokio::test]
    async fn test_field_missing_everywhere() {
        let client = MemoryIndexClient::new("docs", vec![doc! { "other": 1_i64 }]);
        assert!(find_bounds(&client, "n", &IntegerDomain).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timestamp_bounds_millisecond_precision() {
        let start = Utc.with_ymd_and_hms(2021, 3, 14, 1, 59, 26).unwrap();
        let docs: Vec<Document> = (0..10)
            .map(|i| {
                let ts = start + Duration::milliseconds(i * 37);
                doc! { "ts": mongodb::bson::DateTime::from_millis(ts.timestamp_millis()) }
            })
            .collect();
        let client = MemoryIndexClient::new("events", docs);

        let bounds = find_bounds(&client, "ts", &TimestampDomain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bounds.lower, Bound::Timestamp(start));
        assert_eq!(
            bounds.upper,
            Bound::Timestamp(start + Duration::milliseconds(9 * 37))
        );
    }

    #[tokio::test]
    async fn test_string_bounds_cover_unrepresentable_values() {
        let domain = StringDomain::new(3).unwrap();
        let docs = ["banana", "apple", "cherry"]
            .iter()
            .map(|s| doc! { "name": *s })
            .collect();
        let client = MemoryIndexClient::new("fruit", docs);

        let bounds = find_bounds(&client, "name", &domain).await.unwrap().unwrap();
        let cover = RangeFilter::between("name", bounds.lower.clone(), bounds.upper.clone());
        for name in ["apple", "banana", "cherry"] {
            assert!(cover.contains(&Bound::String(name.to_string())), "{name}");
        }
        assert_eq!(client.count(Some(&cover)).await.unwrap(), 3);
    }
}
