//! Adaptive range subdivision
//!
//! Splits `[lower, upper]` into consecutive ranges holding at most
//! `max_partition_size` documents each, using only count queries. Ranges are
//! handled as half-open ordinal intervals `[start, end)`; every partition but
//! the last gets a `ge a and lt b` filter and the last one `ge a and le upper`,
//! so equal field values always land in exactly one partition.

use tracing::{debug, warn};

use crate::client::IndexClient;
use crate::domain::{Bound, OrderingDomain};
use crate::error::{ConfigError, Result};
use crate::filter::RangeFilter;

use super::manifest::Partition;

/// Candidate range of ordinals, `[start, end)`.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: i128,
    end: i128,
    /// Whether this span reaches the upper bound.
    last: bool,
}

impl Span {
    fn is_indivisible(&self) -> bool {
        self.end - self.start <= 1
    }

    fn filter(&self, field: &str, domain: &dyn OrderingDomain) -> RangeFilter {
        let lower = domain.from_ordinal(self.start);
        if self.last {
            RangeFilter::between(field, lower, domain.from_ordinal(self.end - 1))
        } else {
            RangeFilter::half_open(field, lower, domain.from_ordinal(self.end))
        }
    }

    fn split(&self, domain: &dyn OrderingDomain) -> (Span, Span) {
        let mid = domain
            .midpoint(self.start, self.end)
            .clamp(self.start + 1, self.end - 1);
        (
            Span {
                start: self.start,
                end: mid,
                last: false,
            },
            Span {
                start: mid,
                end: self.end,
                last: self.last,
            },
        )
    }
}

/// Partition `[lower, upper]` into ranges of at most `max_partition_size` documents
///
/// # Arguments
/// * `client` - Index to count against
/// * `field` - Ordering field
/// * `domain` - Ordering strategy of the field's kind
/// * `lower` - Lower bound, inclusive
/// * `upper` - Upper bound, inclusive
/// * `max_partition_size` - Largest document count of a divisible partition
///
/// # Returns
/// * `Result<Vec<Partition>>` - Non-empty partitions in ascending order
pub async fn generate_partitions(
    client: &dyn IndexClient,
    field: &str,
    domain: &dyn OrderingDomain,
    lower: &Bound,
    upper: &Bound,
    max_partition_size: u64,
) -> Result<Vec<Partition>> {
    if max_partition_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "partition.max_partition_size".to_string(),
            value: "0".to_string(),
        }
        .into());
    }

    let start = domain.to_ordinal(lower)?;
    let last = domain.to_ordinal(upper)?;
    if start > last {
        return Err(ConfigError::Generic(format!(
            "lower bound {lower} is above upper bound {upper}"
        ))
        .into());
    }

    let mut partitions = Vec::new();
    let mut count_queries = 0u64;
    // right halves are pushed first so ranges pop in ascending order
    let mut pending = vec![Span {
        start,
        end: last + 1,
        last: true,
    }];

    while let Some(span) = pending.pop() {
        let filter = span.filter(field, domain);
        let count = client.count(Some(&filter)).await?;
        count_queries += 1;

        if count == 0 {
            continue;
        }

        if count <= max_partition_size {
            debug!("Partition '{}' holds {} documents", filter, count);
            partitions.push(Partition::new(filter, count));
            continue;
        }

        if span.is_indivisible() {
            warn!(
                "Partition '{}' holds {} documents, more than {}, but cannot be split further",
                filter, count, max_partition_size
            );
            partitions.push(Partition::oversized(filter, count));
            continue;
        }

        let (left, right) = span.split(domain);
        pending.push(right);
        pending.push(left);
    }

    debug!(
        "Generated {} partitions of '{}' with {} count queries",
        partitions.len(),
        field,
        count_queries
    );
    Ok(partitions)
}
