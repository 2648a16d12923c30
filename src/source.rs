//! The feature source client: submits a [`QueryDescriptor`] to a store and
//! hands back a lazy, single-pass sequence of features.
//!
//! The store side is abstracted by [`FeatureSource`] (open a type, start a
//! scan, close) and [`FeatureScan`] (pull the next feature). The client wraps
//! the scan in a [`FeatureCursor`] that moves through
//! `Open -> Iterating -> Exhausted | Closed | Error` and closes the store
//! handle exactly once, whichever way the cursor ends: running dry, hitting
//! the result limit, an explicit [`FeatureCursor::close`], a store error, or
//! simply being dropped.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;
// we will use a fast hashing algo for type registries keyed by name
use seahash::SeaHasher;
use tracing::{debug, info, warn};

use crate::error::{FeatureQueryError, Result};
use crate::feature::{AttributeName, Feature};
use crate::filter::Predicate;
use crate::query::QueryDescriptor;

pub type TypeHasher = BuildHasherDefault<SeaHasher>;

/// A running store-side scan. Each call may block on the store.
pub trait FeatureScan {
    fn next_feature(&mut self) -> Option<Result<Feature>>;
}

/// The capability a storage/mapping subsystem provides.
pub trait FeatureSource {
    /// Store resource held while a type is open.
    type Handle;
    type Scan: FeatureScan;
    /// Fails with [`FeatureQueryError::TypeNotFound`] for unknown types.
    fn open(&self, type_name: &AttributeName) -> Result<Self::Handle>;
    /// Starts a scan. The store is expected to stop after `max_results`
    /// matches; failures surface as [`FeatureQueryError::SourceExecution`].
    fn query(
        &self,
        handle: &Self::Handle,
        predicate: &Predicate,
        max_results: Option<NonZeroUsize>,
    ) -> Result<Self::Scan>;
    /// Idempotent.
    fn close(&self, handle: &Self::Handle);
}

/// Whether a registered type answers a request for `requested`. A request
/// without a namespace matches on the local part alone.
pub fn type_matches(requested: &AttributeName, registered: &AttributeName) -> bool {
    requested == registered
        || (requested.namespace().is_empty() && requested.local_part() == registered.local_part())
}

/// Finds the registered type answering `requested`. An exact match wins;
/// otherwise an unqualified request needs exactly one type with its local
/// part, and an ambiguous one finds nothing.
pub fn lookup_type<'m, V>(
    types: &'m HashMap<AttributeName, V, TypeHasher>,
    requested: &AttributeName,
) -> Option<(&'m AttributeName, &'m V)> {
    if let Some(found) = types.get_key_value(requested) {
        return Some(found);
    }
    let mut candidates = types.iter().filter(|(registered, _)| type_matches(requested, registered));
    let found = candidates.next()?;
    if candidates.next().is_some() {
        warn!(type_name = %requested, "ambiguous type name, qualify it with a namespace");
        return None;
    }
    Some(found)
}

/// Opens the descriptor's type and submits its predicate and limit.
pub fn execute<'s, S: FeatureSource>(source: &'s S, descriptor: &QueryDescriptor) -> Result<FeatureCollection<'s, S>> {
    let type_name = descriptor.type_name();
    let handle = source.open(&type_name)?;
    let scan = match source.query(&handle, descriptor.predicate(), descriptor.max_results()) {
        Ok(scan) => scan,
        Err(e) => {
            warn!(type_name = %type_name, error = %e, "query submission failed");
            source.close(&handle);
            return Err(e);
        }
    };
    info!(
        type_name = %type_name,
        filter = %descriptor.predicate(),
        max_results = ?descriptor.max_results(),
        "query submitted"
    );
    Ok(FeatureCollection {
        type_name,
        cursor: Some(FeatureCursor::new(source, handle, scan, descriptor.max_results())),
    })
}

// ------------- FeatureCollection -------------
/// The result of [`execute`]. Its features can be taken exactly once.
pub struct FeatureCollection<'s, S: FeatureSource> {
    type_name: AttributeName,
    cursor: Option<FeatureCursor<'s, S>>,
}
impl<'s, S: FeatureSource> FeatureCollection<'s, S> {
    pub fn type_name(&self) -> &AttributeName {
        &self.type_name
    }
    /// Hands out the cursor; a second call fails with
    /// [`FeatureQueryError::AlreadyConsumed`].
    pub fn features(&mut self) -> Result<FeatureCursor<'s, S>> {
        self.cursor.take().ok_or(FeatureQueryError::AlreadyConsumed)
    }
}

// ------------- FeatureCursor -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Iterating,
    Exhausted,
    Closed,
    Error,
}
impl CursorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CursorState::Exhausted | CursorState::Closed | CursorState::Error)
    }
}

pub struct FeatureCursor<'s, S: FeatureSource> {
    source: &'s S,
    handle: Option<S::Handle>,
    scan: Option<S::Scan>,
    state: CursorState,
    limit: Option<NonZeroUsize>,
    delivered: usize,
}
impl<'s, S: FeatureSource> FeatureCursor<'s, S> {
    fn new(source: &'s S, handle: S::Handle, scan: S::Scan, limit: Option<NonZeroUsize>) -> Self {
        Self {
            source,
            handle: Some(handle),
            scan: Some(scan),
            state: CursorState::Open,
            limit,
            delivered: 0,
        }
    }
    pub fn state(&self) -> CursorState {
        self.state
    }
    /// Features handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }
    /// Abandons the cursor. A no-op once the cursor has already ended.
    pub fn close(&mut self) {
        if !self.state.is_terminal() {
            self.release(CursorState::Closed);
        }
    }
    fn release(&mut self, state: CursorState) {
        // the scan goes first, it may borrow store resources behind the handle
        self.scan = None;
        if let Some(handle) = self.handle.take() {
            self.source.close(&handle);
            debug!(?state, delivered = self.delivered, "store handle released");
        }
        self.state = state;
    }
    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.delivered >= limit.get())
    }
}
impl<'s, S: FeatureSource> Iterator for FeatureCursor<'s, S> {
    type Item = Result<Feature>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.state.is_terminal() {
            return None;
        }
        let scan = self.scan.as_mut()?;
        match scan.next_feature() {
            Some(Ok(feature)) => {
                self.state = CursorState::Iterating;
                self.delivered += 1;
                if self.limit_reached() {
                    self.release(CursorState::Exhausted);
                }
                Some(Ok(feature))
            }
            Some(Err(e)) => {
                warn!(error = %e, delivered = self.delivered, "scan failed");
                self.release(CursorState::Error);
                Some(Err(e))
            }
            None => {
                self.release(CursorState::Exhausted);
                None
            }
        }
    }
}
impl<'s, S: FeatureSource> FusedIterator for FeatureCursor<'s, S> {}
impl<'s, S: FeatureSource> Drop for FeatureCursor<'s, S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.release(CursorState::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_requests_match_on_local_part() {
        let registered = AttributeName::new("urn:x", "MappedFeature");
        assert!(type_matches(&AttributeName::local("MappedFeature"), &registered));
        assert!(type_matches(&registered, &registered));
        assert!(!type_matches(&AttributeName::new("urn:y", "MappedFeature"), &registered));
        assert!(!type_matches(&AttributeName::local("Other"), &registered));
    }

    #[test]
    fn shared_local_part_needs_a_namespace() {
        let mut types: HashMap<AttributeName, u8, TypeHasher> = HashMap::default();
        types.insert(AttributeName::new("urn:x", "MappedFeature"), 1);
        assert_eq!(lookup_type(&types, &AttributeName::local("MappedFeature")).map(|(_, v)| *v), Some(1));
        types.insert(AttributeName::new("urn:y", "MappedFeature"), 2);
        assert!(lookup_type(&types, &AttributeName::local("MappedFeature")).is_none());
        let exact = AttributeName::new("urn:y", "MappedFeature");
        assert_eq!(lookup_type(&types, &exact).map(|(_, v)| *v), Some(2));
    }

    #[test]
    fn only_ended_states_are_terminal() {
        assert!(!CursorState::Open.is_terminal());
        assert!(!CursorState::Iterating.is_terminal());
        assert!(CursorState::Exhausted.is_terminal());
        assert!(CursorState::Closed.is_terminal());
        assert!(CursorState::Error.is_terminal());
    }
}
