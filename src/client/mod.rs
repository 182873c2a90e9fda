//! Remote index capability
//!
//! The partitioning and export algorithms only need two primitives from a
//! search backend: counting the documents matching a filter, and a sorted,
//! projected, paged fetch bounded by the service's result window. This
//! module defines that capability ([`IndexClient`]) and provides:
//!
//! - [`mongo::MongoIndexClient`]: a MongoDB collection as the index
//! - [`memory::MemoryIndexClient`]: an in-process index for tests and demos
//! - [`retry::RetryingClient`]: the transport resilience policy as a
//!   decorator over any client

use std::collections::BTreeSet;

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::{ConfigError, Result};
use crate::filter::RangeFilter;

pub mod memory;
pub mod mongo;
pub mod pages;
pub mod retry;

pub use memory::MemoryIndexClient;
pub use mongo::MongoIndexClient;
pub use pages::{CursorPages, DocumentPages, VecPages};
pub use retry::{RetryPolicy, RetryingClient};

/// Count and paged-fetch access to one index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Service endpoint, recorded in manifests.
    fn endpoint(&self) -> String;

    /// Name of the index being exported.
    fn index_name(&self) -> String;

    /// Maximum number of documents a single query can retrieve.
    fn max_result_window(&self) -> u64;

    /// Count documents matching `filter`, or all documents when `None`.
    async fn count(&self, filter: Option<&RangeFilter>) -> Result<u64>;

    /// Start a sorted, paged fetch.
    ///
    /// The returned sequence is lazy, finite and single-pass; retrying
    /// requires a new call.
    async fn paged_fetch(&self, request: FetchRequest) -> Result<Box<dyn DocumentPages>>;
}

/// Parameters of a paged fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Documents to match.
    pub filter: RangeFilter,
    /// Field to sort ascending by.
    pub sort_field: String,
    /// Fields to return.
    pub projection: Projection,
    /// Upper limit on documents returned; must not exceed the result window.
    pub max_results: u64,
    /// Documents per page.
    pub page_size: u32,
}

/// Which document fields a fetch returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every field.
    #[default]
    All,
    /// Only these fields.
    Include(Vec<String>),
    /// Every field except these.
    Exclude(Vec<String>),
}

/// Field definitions of the exported index.
///
/// Schema reflection is outside this crate; callers describe the fields they
/// know about. An empty field list means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<String>,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    fn check_known(&self, names: &[String]) -> Result<()> {
        if self.fields.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.fields.contains(name) {
                return Err(ConfigError::InvalidValue {
                    field: format!("field selection for index '{}'", self.name),
                    value: name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl Projection {
    /// Resolve include/exclude field lists into one projection.
    ///
    /// When both lists are given, the include list wins and the exclude list
    /// is subtracted from it. An exclude-only selection becomes an include
    /// list over the schema's fields when the schema lists them.
    pub fn resolve(schema: &IndexSchema, include: &[String], exclude: &[String]) -> Result<Self> {
        schema.check_known(include)?;
        schema.check_known(exclude)?;

        let excluded: BTreeSet<&String> = exclude.iter().collect();

        if !include.is_empty() {
            let mut seen = BTreeSet::new();
            let fields: Vec<String> = include
                .iter()
                .filter(|f| !excluded.contains(f) && seen.insert(f.as_str()))
                .cloned()
                .collect();
            if fields.is_empty() {
                return Err(ConfigError::Generic(
                    "field selection excludes every included field".to_string(),
                )
                .into());
            }
            return Ok(Projection::Include(fields));
        }

        if !exclude.is_empty() {
            if schema.fields.is_empty() {
                return Ok(Projection::Exclude(exclude.to_vec()));
            }
            let fields: Vec<String> = schema
                .fields
                .iter()
                .filter(|f| !excluded.contains(f))
                .cloned()
                .collect();
            if fields.is_empty() {
                return Err(ConfigError::Generic(
                    "field selection excludes every field of the index".to_string(),
                )
                .into());
            }
            return Ok(Projection::Include(fields));
        }

        Ok(Projection::All)
    }

    /// Apply the projection to a document in memory.
    pub fn apply(&self, document: &Document) -> Document {
        match self {
            Projection::All => document.clone(),
            Projection::Include(fields) => document
                .iter()
                .filter(|(k, _)| fields.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Projection::Exclude(fields) => document
                .iter()
                .filter(|(k, _)| !fields.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// MongoDB projection document, `None` for all fields.
    pub fn to_document(&self) -> Option<Document> {
        match self {
            Projection::All => None,
            Projection::Include(fields) => {
                let mut projection = Document::new();
                for field in fields {
                    projection.insert(field.clone(), 1);
                }
                if !fields.iter().any(|f| f == "_id") {
                    projection.insert("_id", 0);
                }
                Some(projection)
            }
            Projection::Exclude(fields) => {
                let mut projection = Document::new();
                for field in fields {
                    projection.insert(field.clone(), 0);
                }
                Some(projection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_projection_include_wins_then_subtracts() {
        let schema = IndexSchema::new("idx", names(&["id", "timestamp", "body"]));
        let p = Projection::resolve(&schema, &names(&["id", "body"]), &names(&["body"])).unwrap();
        assert_eq!(p, Projection::Include(names(&["id"])));
    }

    #[test]
    fn test_projection_exclude_uses_schema() {
        let schema = IndexSchema::new("idx", names(&["id", "timestamp", "body"]));
        let p = Projection::resolve(&schema, &[], &names(&["body"])).unwrap();
        assert_eq!(p, Projection::Include(names(&["id", "timestamp"])));

        let unknown = IndexSchema::new("idx", vec![]);
        let p = Projection::resolve(&unknown, &[], &names(&["body"])).unwrap();
        assert_eq!(p, Projection::Exclude(names(&["body"])));
    }

    #[test]
    fn test_projection_errors() {
        let schema = IndexSchema::new("idx", names(&["id", "timestamp"]));
        assert!(Projection::resolve(&schema, &names(&["missing"]), &[]).is_err());
        assert!(Projection::resolve(&schema, &names(&["id"]), &names(&["id"])).is_err());
        assert!(Projection::resolve(&schema, &[], &names(&["id", "timestamp"])).is_err());
        assert_eq!(
            Projection::resolve(&schema, &[], &[]).unwrap(),
            Projection::All
        );
    }

    #[test]
    fn test_projection_apply_and_mongo_document() {
        let document = doc! { "_id": 1, "id": "a", "body": "text" };
        let include = Projection::Include(names(&["id"]));
        assert_eq!(include.apply(&document), doc! { "id": "a" });
        assert_eq!(include.to_document(), Some(doc! { "id": 1, "_id": 0 }));

        let exclude = Projection::Exclude(names(&["body"]));
        assert_eq!(exclude.apply(&document), doc! { "_id": 1, "id": "a" });
        assert_eq!(Projection::All.to_document(), None);
    }
}
