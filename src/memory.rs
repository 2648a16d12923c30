//! An in-memory [`FeatureSource`], handy for embedding and tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FeatureQueryError, Result};
use crate::evaluate::Matcher;
use crate::feature::{AttributeName, Feature};
use crate::filter::Predicate;
use crate::source::{FeatureScan, FeatureSource, TypeHasher, lookup_type};

#[derive(Debug, Default)]
pub struct MemoryFeatureSource {
    types: HashMap<AttributeName, Arc<Vec<Feature>>, TypeHasher>,
    open_handles: Cell<usize>,
}

#[derive(Debug)]
pub struct MemoryHandle {
    type_name: AttributeName,
    features: Arc<Vec<Feature>>,
    closed: Cell<bool>,
}

impl MemoryFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers (or replaces) the features of one type, in scan order.
    pub fn insert(&mut self, type_name: AttributeName, features: Vec<Feature>) {
        self.types.insert(type_name, Arc::new(features));
    }
    pub fn with_type(mut self, type_name: AttributeName, features: Vec<Feature>) -> Self {
        self.insert(type_name, features);
        self
    }
    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }
}

impl FeatureSource for MemoryFeatureSource {
    type Handle = MemoryHandle;
    type Scan = MemoryScan;

    fn open(&self, type_name: &AttributeName) -> Result<MemoryHandle> {
        let (registered, features) = lookup_type(&self.types, type_name)
            .ok_or_else(|| FeatureQueryError::TypeNotFound(type_name.to_string()))?;
        self.open_handles.set(self.open_handles.get() + 1);
        Ok(MemoryHandle {
            type_name: registered.clone(),
            features: Arc::clone(features),
            closed: Cell::new(false),
        })
    }

    fn query(
        &self,
        handle: &MemoryHandle,
        predicate: &Predicate,
        max_results: Option<NonZeroUsize>,
    ) -> Result<MemoryScan> {
        if handle.closed.get() {
            return Err(FeatureQueryError::source(format!("{} is closed", handle.type_name)));
        }
        Ok(MemoryScan {
            features: Arc::clone(&handle.features),
            matcher: Matcher::compile(predicate)?,
            position: 0,
            remaining: max_results.map(NonZeroUsize::get),
        })
    }

    fn close(&self, handle: &MemoryHandle) {
        if !handle.closed.replace(true) {
            self.open_handles.set(self.open_handles.get().saturating_sub(1));
            debug!(type_name = %handle.type_name, "closed");
        }
    }
}

/// Lazily filters the registered features; nothing is copied ahead of the
/// feature being returned.
pub struct MemoryScan {
    features: Arc<Vec<Feature>>,
    matcher: Matcher,
    position: usize,
    remaining: Option<usize>,
}

impl FeatureScan for MemoryScan {
    fn next_feature(&mut self) -> Option<Result<Feature>> {
        if self.remaining == Some(0) {
            return None;
        }
        while let Some(feature) = self.features.get(self.position) {
            self.position += 1;
            if self.matcher.matches(feature) {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(feature.clone()));
            }
        }
        None
    }
}
