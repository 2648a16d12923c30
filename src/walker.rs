//! Walks query results and pulls named attributes out of each feature.
//!
//! Lookup rules for a requested name:
//! * the first top-level property with that exact name is used;
//! * a scalar or geometry renders directly;
//! * a complex attribute renders its simple-content child, or failing that a
//!   nested property carrying the same name, or failing that the
//!   [`NO_SIMPLE_VALUE`] placeholder;
//! * no matching property at all is [`Lookup::Absent`], which is not an error.

use std::fmt;
use tracing::{debug, warn};

use crate::error::{FeatureQueryError, Result};
use crate::feature::{AttributeName, ComplexAttribute, Feature, FeatureValue, Property};
use crate::source::{CursorState, FeatureCursor, FeatureSource};

/// Rendering used for a complex attribute without a simple value.
pub const NO_SIMPLE_VALUE: &str = "no simple value";

// ------------- Lookup -------------
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
}
impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Lookup::Found(t) => Lookup::Found(t),
            Lookup::Absent => Lookup::Absent,
        }
    }
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(t) => Lookup::Found(f(t)),
            Lookup::Absent => Lookup::Absent,
        }
    }
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(t) => Some(t),
            Lookup::Absent => None,
        }
    }
}

/// The value a present attribute resolves to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved<'f> {
    Value(&'f FeatureValue),
    NoSimpleValue,
}
impl<'f> Resolved<'f> {
    pub fn value(&self) -> Option<&'f FeatureValue> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::NoSimpleValue => None,
        }
    }
    pub fn render(&self) -> String {
        match self {
            Resolved::Value(v) => v.render().unwrap_or_else(|| NO_SIMPLE_VALUE.to_owned()),
            Resolved::NoSimpleValue => NO_SIMPLE_VALUE.to_owned(),
        }
    }
}

// ------------- navigation -------------
fn check(feature: &Feature, property: &Property) -> Result<()> {
    if property.is_well_formed() {
        Ok(())
    } else {
        Err(FeatureQueryError::MalformedFeature {
            feature: feature.identifier().to_owned(),
            property: property.name().to_string(),
            declared: property.declared_kind(),
            actual: property.value().kind(),
        })
    }
}

fn resolve_property<'f>(feature: &Feature, property: &'f Property) -> Result<Resolved<'f>> {
    check(feature, property)?;
    match property.value() {
        FeatureValue::Complex(complex) => resolve_complex(feature, property.name(), complex),
        value => Ok(Resolved::Value(value)),
    }
}

fn resolve_complex<'f>(
    feature: &Feature,
    name: &AttributeName,
    complex: &'f ComplexAttribute,
) -> Result<Resolved<'f>> {
    if let Some(content) = complex.simple_content() {
        return resolve_property(feature, content);
    }
    if let Some(nested) = complex.property(name) {
        return resolve_property(feature, nested);
    }
    Ok(Resolved::NoSimpleValue)
}

/// Resolves the first top-level property named `name`.
pub fn resolve<'f>(feature: &'f Feature, name: &AttributeName) -> Result<Lookup<Resolved<'f>>> {
    match feature.property(name) {
        Some(property) => resolve_property(feature, property).map(Lookup::Found),
        None => Ok(Lookup::Absent),
    }
}

/// Resolves every top-level property named `name`, in feature order.
pub fn resolve_all<'f>(
    feature: &'f Feature,
    name: &'f AttributeName,
) -> impl Iterator<Item = Result<Resolved<'f>>> + 'f {
    feature
        .properties_named(name)
        .map(move |property| resolve_property(feature, property))
}

/// Follows explicit steps, e.g. `[gml:name, simpleContent]`. The first step
/// addresses a top-level property, later steps children of complex values.
/// A `simpleContent` step matches on its local part.
pub fn lookup_path<'f>(feature: &'f Feature, path: &[AttributeName]) -> Result<Lookup<Resolved<'f>>> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(Lookup::Absent);
    };
    let Some(mut current) = feature.property(first) else {
        return Ok(Lookup::Absent);
    };
    for step in rest {
        check(feature, current)?;
        let Some(complex) = current.value().as_complex() else {
            return Ok(Lookup::Absent);
        };
        let child = if step.is_simple_content() {
            complex.simple_content()
        } else {
            complex.property(step)
        };
        match child {
            Some(child) => current = child,
            None => return Ok(Lookup::Absent),
        }
    }
    resolve_property(feature, current).map(Lookup::Found)
}

// ------------- records -------------
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: AttributeName,
    pub value: Lookup<String>,
}

/// One output line per feature: the requested attributes in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub identifier: String,
    pub fields: Vec<Field>,
}
impl Record {
    pub fn get(&self, name: &AttributeName) -> Option<&Lookup<String>> {
        self.fields.iter().find(|f| &f.name == name).map(|f| &f.value)
    }
    /// Only the fields that were present on the feature.
    pub fn found(&self) -> impl Iterator<Item = (&AttributeName, &str)> {
        self.fields.iter().filter_map(|f| match &f.value {
            Lookup::Found(v) => Some((&f.name, v.as_str())),
            Lookup::Absent => None,
        })
    }
}
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.identifier)?;
        for field in &self.fields {
            match &field.value {
                Lookup::Found(v) => write!(f, "|{}={}", field.name, v)?,
                Lookup::Absent => write!(f, "|{}=<absent>", field.name)?,
            }
        }
        Ok(())
    }
}

// ------------- ResultWalker -------------
#[derive(Clone, Debug)]
pub struct ResultWalker {
    attributes: Vec<AttributeName>,
}
impl ResultWalker {
    pub fn new(attributes: impl IntoIterator<Item = AttributeName>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
        }
    }
    pub fn attributes(&self) -> &[AttributeName] {
        &self.attributes
    }
    pub fn record(&self, feature: &Feature) -> Result<Record> {
        let mut fields = Vec::with_capacity(self.attributes.len());
        for name in &self.attributes {
            let value = resolve(feature, name)?.map(|r| r.render());
            if value.is_absent() {
                debug!(feature = feature.identifier(), attribute = %name, "attribute absent");
            }
            fields.push(Field {
                name: name.clone(),
                value,
            });
        }
        Ok(Record {
            identifier: feature.identifier().to_owned(),
            fields,
        })
    }
    /// Streams records off `cursor` in store order without reading ahead.
    pub fn walk<'w, 's, S: FeatureSource>(&'w self, cursor: FeatureCursor<'s, S>) -> Walk<'w, 's, S> {
        Walk {
            walker: self,
            cursor,
            failed: false,
        }
    }
}

pub struct Walk<'w, 's, S: FeatureSource> {
    walker: &'w ResultWalker,
    cursor: FeatureCursor<'s, S>,
    failed: bool,
}
impl<'w, 's, S: FeatureSource> Walk<'w, 's, S> {
    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }
    /// Stops early, releasing the store handle.
    pub fn close(mut self) {
        self.cursor.close();
    }
}
impl<'w, 's, S: FeatureSource> Iterator for Walk<'w, 's, S> {
    type Item = Result<Record>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.cursor.next()? {
            Ok(feature) => match self.walker.record(&feature) {
                Ok(record) => Some(Ok(record)),
                Err(e) => {
                    warn!(error = %e, "abandoning traversal");
                    // release before the error reaches the caller
                    self.cursor.close();
                    self.failed = true;
                    Some(Err(e))
                }
            },
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{SIMPLE_CONTENT, ValueKind};

    fn name() -> AttributeName {
        AttributeName::new("http://www.opengis.net/gml", "name")
    }

    #[test]
    fn path_lookup_walks_into_simple_content() {
        let feature = Feature::new("mf.1").with_property(Property::new(
            name(),
            ComplexAttribute::new(name()).with_simple_content("UNITED KINGDOM"),
        ));
        let path = [name(), AttributeName::local(SIMPLE_CONTENT)];
        let found = lookup_path(&feature, &path).unwrap();
        assert_eq!(found.map(|r| r.render()), Lookup::Found("UNITED KINGDOM".to_owned()));
        let missing = [name(), AttributeName::local("codeSpace")];
        assert!(lookup_path(&feature, &missing).unwrap().is_absent());
        assert!(lookup_path(&feature, &[]).unwrap().is_absent());
    }

    #[test]
    fn path_through_a_scalar_is_absent() {
        let feature = Feature::new("f").with_property(Property::new(name(), "plain"));
        let path = [name(), AttributeName::local("child")];
        assert!(lookup_path(&feature, &path).unwrap().is_absent());
    }

    #[test]
    fn nested_identical_name_is_followed() {
        let inner = ComplexAttribute::new(name()).with_simple_content("deep");
        let outer = ComplexAttribute::new(name()).with_property(Property::new(name(), inner));
        let feature = Feature::new("f").with_property(Property::new(name(), outer));
        let resolved = resolve(&feature, &name()).unwrap();
        assert_eq!(resolved.map(|r| r.render()), Lookup::Found("deep".to_owned()));
    }

    #[test]
    fn malformed_nested_simple_content_is_reported() {
        let broken = ComplexAttribute::new(name()).with_property(Property::declared(
            AttributeName::local(SIMPLE_CONTENT),
            ValueKind::Integer,
            "twelve",
        ));
        let feature = Feature::new("f").with_property(Property::new(name(), broken));
        let err = resolve(&feature, &name()).unwrap_err();
        assert!(matches!(err, FeatureQueryError::MalformedFeature { .. }));
    }

    #[test]
    fn record_display_marks_absent_fields() {
        let record = Record {
            identifier: "mf.7".to_owned(),
            fields: vec![
                Field { name: AttributeName::local("name"), value: Lookup::Found("FRANCE".to_owned()) },
                Field { name: AttributeName::local("date"), value: Lookup::Absent },
            ],
        };
        assert_eq!(record.to_string(), "mf.7|name=FRANCE|date=<absent>");
        assert_eq!(record.found().count(), 1);
    }
}
