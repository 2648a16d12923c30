#![allow(dead_code)]

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::rc::Rc;

use featurewalk::error::{FeatureQueryError, Result};
use featurewalk::feature::{AttributeName, ComplexAttribute, Feature, Property};
use featurewalk::filter::Predicate;
use featurewalk::source::{FeatureScan, FeatureSource, type_matches};

pub const GML: &str = "http://www.opengis.net/gml";
pub const GSML: &str = "urn:cgi:xmlns:CGI:GeoSciML:2.0";

pub fn gml_name() -> AttributeName {
    AttributeName::new(GML, "name")
}
pub fn shape() -> AttributeName {
    AttributeName::new(GSML, "shape")
}
pub fn mapped_feature() -> AttributeName {
    AttributeName::new(GSML, "MappedFeature")
}

/// A feature with a complex `gml:name` holding `name` as simple content.
pub fn named(id: &str, name: &str) -> Feature {
    Feature::new(id).with_property(Property::new(
        gml_name(),
        ComplexAttribute::new(gml_name()).with_simple_content(name),
    ))
}

/// Calls seen by a [`ScriptedSource`]. Every `close` call is counted, even
/// repeated ones, so tests can see double releases.
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: Cell<usize>,
    pub closes: Cell<usize>,
    pub queries: Cell<usize>,
    pub pulls: Cell<usize>,
}

/// Hands out a fixed list of features, unfiltered, and can be told to fail.
pub struct ScriptedSource {
    type_name: AttributeName,
    features: Vec<Feature>,
    pub counters: Rc<Counters>,
    fail_at: Option<usize>,
    fail_on_query: bool,
    honour_limit: bool,
}

impl ScriptedSource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            type_name: mapped_feature(),
            features,
            counters: Rc::new(Counters::default()),
            fail_at: None,
            fail_on_query: false,
            honour_limit: true,
        }
    }
    /// The pull with this zero-based index fails instead of returning a feature.
    pub fn failing_at(mut self, pull: usize) -> Self {
        self.fail_at = Some(pull);
        self
    }
    pub fn failing_on_query(mut self) -> Self {
        self.fail_on_query = true;
        self
    }
    /// Makes the store ignore `max_results`, leaving the limit to the cursor.
    pub fn ignoring_limit(mut self) -> Self {
        self.honour_limit = false;
        self
    }
    pub fn opens(&self) -> usize {
        self.counters.opens.get()
    }
    pub fn closes(&self) -> usize {
        self.counters.closes.get()
    }
    pub fn pulls(&self) -> usize {
        self.counters.pulls.get()
    }
}

pub struct ScriptedScan {
    features: Vec<Feature>,
    position: usize,
    fail_at: Option<usize>,
    remaining: Option<usize>,
    counters: Rc<Counters>,
}

impl FeatureSource for ScriptedSource {
    type Handle = ();
    type Scan = ScriptedScan;

    fn open(&self, type_name: &AttributeName) -> Result<()> {
        if !type_matches(type_name, &self.type_name) {
            return Err(FeatureQueryError::TypeNotFound(type_name.to_string()));
        }
        self.counters.opens.set(self.counters.opens.get() + 1);
        Ok(())
    }

    fn query(&self, _handle: &(), _predicate: &Predicate, max_results: Option<NonZeroUsize>) -> Result<ScriptedScan> {
        self.counters.queries.set(self.counters.queries.get() + 1);
        if self.fail_on_query {
            return Err(FeatureQueryError::source("query rejected"));
        }
        Ok(ScriptedScan {
            features: self.features.clone(),
            position: 0,
            fail_at: self.fail_at,
            remaining: max_results.filter(|_| self.honour_limit).map(NonZeroUsize::get),
            counters: Rc::clone(&self.counters),
        })
    }

    fn close(&self, _handle: &()) {
        self.counters.closes.set(self.counters.closes.get() + 1);
    }
}

impl FeatureScan for ScriptedScan {
    fn next_feature(&mut self) -> Option<Result<Feature>> {
        self.counters.pulls.set(self.counters.pulls.get() + 1);
        if self.remaining == Some(0) {
            return None;
        }
        let position = self.position;
        self.position += 1;
        if self.fail_at == Some(position) {
            return Some(Err(FeatureQueryError::source("connection reset")));
        }
        let feature = self.features.get(position)?.clone();
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(feature))
    }
}
