//! Range filter expressions over the ordering field
//!
//! A [`RangeFilter`] restricts a single field to an interval whose ends may
//! be open, inclusive or exclusive. Filters have a textual OData-style form
//! (`timestamp ge 2022-01-01T00:00:00.000Z and timestamp lt 2022-02-01T00:00:00.000Z`)
//! that is stored in partition manifests, and they translate to MongoDB
//! query documents or evaluate directly against BSON documents.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use mongodb::bson::Document;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::Bound;
use crate::error::{ExportError, FilterError, Result};

mod parser;

/// One end of a range.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub value: Bound,
    pub inclusive: bool,
}

/// Interval restriction on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    field: String,
    lower: Option<Endpoint>,
    upper: Option<Endpoint>,
}

impl Endpoint {
    pub fn inclusive(value: Bound) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: Bound) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

impl RangeFilter {
    pub fn new(field: impl Into<String>, lower: Option<Endpoint>, upper: Option<Endpoint>) -> Self {
        Self {
            field: field.into(),
            lower,
            upper,
        }
    }

    /// `field le value`
    pub fn at_most(field: impl Into<String>, value: Bound) -> Self {
        Self::new(field, None, Some(Endpoint::inclusive(value)))
    }

    /// `field ge value`
    pub fn at_least(field: impl Into<String>, value: Bound) -> Self {
        Self::new(field, Some(Endpoint::inclusive(value)), None)
    }

    /// `field lt value`
    pub fn below(field: impl Into<String>, value: Bound) -> Self {
        Self::new(field, None, Some(Endpoint::exclusive(value)))
    }

    /// `field gt value`
    pub fn above(field: impl Into<String>, value: Bound) -> Self {
        Self::new(field, Some(Endpoint::exclusive(value)), None)
    }

    /// `field ge lower and field le upper`
    pub fn between(field: impl Into<String>, lower: Bound, upper: Bound) -> Self {
        Self::new(
            field,
            Some(Endpoint::inclusive(lower)),
            Some(Endpoint::inclusive(upper)),
        )
    }

    /// `field ge lower and field lt upper`
    pub fn half_open(field: impl Into<String>, lower: Bound, upper: Bound) -> Self {
        Self::new(
            field,
            Some(Endpoint::inclusive(lower)),
            Some(Endpoint::exclusive(upper)),
        )
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lower(&self) -> Option<&Endpoint> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&Endpoint> {
        self.upper.as_ref()
    }

    /// Fail unless this filter restricts `field`.
    pub fn ensure_field(&self, field: &str) -> Result<()> {
        if self.field != field {
            return Err(FilterError::FieldMismatch {
                expected: field.to_string(),
                found: self.field.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Whether a value lies inside the range.
    ///
    /// Values of a kind incomparable with the endpoints never match, which
    /// mirrors type-bracketed comparisons on the server.
    pub fn contains(&self, value: &Bound) -> bool {
        let lower_ok = match &self.lower {
            None => true,
            Some(end) => match value.compare(&end.value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => end.inclusive,
                _ => false,
            },
        };
        let upper_ok = match &self.upper {
            None => true,
            Some(end) => match value.compare(&end.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => end.inclusive,
                _ => false,
            },
        };
        lower_ok && upper_ok
    }

    /// Whether a document's field value lies inside the range.
    pub fn matches(&self, document: &Document) -> bool {
        document
            .get(&self.field)
            .and_then(Bound::from_bson)
            .is_some_and(|value| self.contains(&value))
    }

    /// MongoDB query document for this filter.
    pub fn to_document(&self) -> Document {
        let mut condition = Document::new();
        if let Some(end) = &self.lower {
            let op = if end.inclusive { "$gte" } else { "$gt" };
            condition.insert(op, end.value.to_bson());
        }
        if let Some(end) = &self.upper {
            let op = if end.inclusive { "$lte" } else { "$lt" };
            condition.insert(op, end.value.to_bson());
        }
        if condition.is_empty() {
            condition.insert("$exists", true);
        }
        let mut query = Document::new();
        query.insert(self.field.clone(), condition);
        query
    }

    fn is_single_value(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) => lo.inclusive && hi.inclusive && lo.value == hi.value,
            _ => false,
        }
    }
}

impl fmt::Display for RangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_value() {
            if let Some(lo) = &self.lower {
                return write!(f, "{} eq {}", self.field, lo.value);
            }
        }

        let mut clauses = Vec::with_capacity(2);
        if let Some(end) = &self.lower {
            let op = if end.inclusive { "ge" } else { "gt" };
            clauses.push(format!("{} {op} {}", self.field, end.value));
        }
        if let Some(end) = &self.upper {
            let op = if end.inclusive { "le" } else { "lt" };
            clauses.push(format!("{} {op} {}", self.field, end.value));
        }
        if clauses.is_empty() {
            // unbounded: every value of the field
            return write!(f, "{} ne null", self.field);
        }
        write!(f, "{}", clauses.join(" and "))
    }
}

impl FromStr for RangeFilter {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse(s)
    }
}

impl Serialize for RangeFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RangeFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mongodb::bson::doc;

    fn ts(day: u32) -> Bound {
        Bound::Timestamp(Utc.with_ymd_and_hms(2022, 1, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_render_half_open() {
        let filter = RangeFilter::half_open("timestamp", ts(1), ts(3));
        assert_eq!(
            filter.to_string(),
            "timestamp ge 2022-01-01T00:00:00.000Z and timestamp lt 2022-01-03T00:00:00.000Z"
        );
        let parsed: RangeFilter = filter.to_string().parse().unwrap();
        assert_eq!(parsed, filter);
    }

    #[test]
    fn test_render_single_value() {
        let filter = RangeFilter::between("n", Bound::Integer(5), Bound::Integer(5));
        assert_eq!(filter.to_string(), "n eq 5");
        assert_eq!("n eq 5".parse::<RangeFilter>().unwrap(), filter);
    }

    #[test]
    fn test_half_open_boundaries() {
        let filter = RangeFilter::half_open("n", Bound::Integer(10), Bound::Integer(20));
        assert!(filter.contains(&Bound::Integer(10)));
        assert!(filter.contains(&Bound::Integer(19)));
        assert!(!filter.contains(&Bound::Integer(20)));
        assert!(!filter.contains(&Bound::Integer(9)));
        assert!(!filter.contains(&Bound::String("15".into())));
        assert!(filter.contains(&Bound::Float(19.5)));
    }

    #[test]
    fn test_matches_document() {
        let filter = RangeFilter::at_most("n", Bound::Integer(3));
        assert!(filter.matches(&doc! { "n": 3 }));
        assert!(!filter.matches(&doc! { "n": 4 }));
        assert!(!filter.matches(&doc! { "other": 1 }));
    }

    #[test]
    fn test_mongo_document() {
        let filter = RangeFilter::half_open("n", Bound::Integer(1), Bound::Integer(9));
        assert_eq!(
            filter.to_document(),
            doc! { "n": { "$gte": 1_i64, "$lt": 9_i64 } }
        );
        let filter = RangeFilter::above("n", Bound::Integer(1));
        assert_eq!(filter.to_document(), doc! { "n": { "$gt": 1_i64 } });
    }

    #[test]
    fn test_serde_as_string() {
        let filter = RangeFilter::at_least("name", Bound::String("o'brien".into()));
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#""name ge 'o''brien'""#);
        let back: RangeFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn test_ensure_field() {
        let filter = RangeFilter::at_least("a", Bound::Integer(1));
        assert!(filter.ensure_field("a").is_ok());
        assert!(filter.ensure_field("b").is_err());
    }
}
