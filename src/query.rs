use std::num::NonZeroUsize;

use crate::error::{FeatureQueryError, Result};
use crate::feature::AttributeName;
use crate::filter::Predicate;

/// Everything a store needs to run one query. Built once, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDescriptor {
    target_type: String,
    namespace: Option<String>,
    predicate: Predicate,
    max_results: Option<NonZeroUsize>,
}

/// Bundles a predicate with the feature type it runs against.
///
/// `target_type` is the local name of the feature type and must not be blank.
/// `max_results`, when given, must be at least 1; `None` leaves the result
/// set unbounded.
pub fn build_query(
    target_type: &str,
    namespace: Option<&str>,
    predicate: Predicate,
    max_results: Option<usize>,
) -> Result<QueryDescriptor> {
    let target_type = target_type.trim();
    if target_type.is_empty() {
        return Err(FeatureQueryError::InvalidTargetType(target_type.to_owned()));
    }
    let max_results = match max_results {
        Some(n) => Some(NonZeroUsize::new(n).ok_or(FeatureQueryError::InvalidLimit(n))?),
        None => None,
    };
    Ok(QueryDescriptor {
        target_type: target_type.to_owned(),
        namespace: namespace.map(str::trim).filter(|ns| !ns.is_empty()).map(str::to_owned),
        predicate,
        max_results,
    })
}

impl QueryDescriptor {
    pub fn target_type(&self) -> &str {
        &self.target_type
    }
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
    pub fn max_results(&self) -> Option<NonZeroUsize> {
        self.max_results
    }
    /// The qualified name the store is asked to open.
    pub fn type_name(&self) -> AttributeName {
        AttributeName::new(self.namespace.clone().unwrap_or_default(), self.target_type.clone())
    }
}
