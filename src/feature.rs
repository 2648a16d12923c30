//! The feature data model: qualified names, values and the property tree.
//!
//! A [`Feature`] is an ordered list of [`Property`] values. A property holds a
//! [`FeatureValue`], which is either a scalar ([`Primitive`]), a geometry, or a
//! nested [`ComplexAttribute`] with further properties of its own. Multiplicity
//! is expressed as repeated sibling properties with the same name, never as a
//! collection inside one property.

// used for instants
use chrono::{DateTime, SecondsFormat, Utc};
// used for geometries and their canonical text form
use geo_types::Geometry;
use wkt::ToWkt;

// used to parse Clark notation
use lazy_static::lazy_static;
use regex::Regex;

// used to print out readable forms
use std::fmt;

/// Conventional local name of the child slot holding a complex attribute's
/// scalar rendering.
pub const SIMPLE_CONTENT: &str = "simpleContent";

lazy_static! {
    static ref CLARK: Regex = Regex::new(r"^\{([^}]*)\}(.+)$").unwrap();
}

// ------------- AttributeName -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeName {
    namespace: String,
    local: String,
}
impl AttributeName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }
    /// A name without a namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }
    /// Parses `{namespace}local` or a bare `local`. Returns `None` when the
    /// local part is empty.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(captures) = CLARK.captures(text) {
            return Some(Self::new(&captures[1], &captures[2]));
        }
        if text.is_empty() || text.starts_with('{') {
            return None;
        }
        Some(Self::local(text))
    }
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn local_part(&self) -> &str {
        &self.local
    }
    pub fn is_simple_content(&self) -> bool {
        self.local == SIMPLE_CONTENT
    }
}
impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

// ------------- Values -------------
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Instant(DateTime<Utc>),
}
impl Primitive {
    pub fn kind(&self) -> ValueKind {
        match self {
            Primitive::Text(_) => ValueKind::Text,
            Primitive::Integer(_) => ValueKind::Integer,
            Primitive::Number(_) => ValueKind::Number,
            Primitive::Boolean(_) => ValueKind::Boolean,
            Primitive::Instant(_) => ValueKind::Instant,
        }
    }
}
impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Primitive::Text(s) => write!(f, "{}", s),
            Primitive::Integer(i) => write!(f, "{}", i),
            Primitive::Number(n) => write!(f, "{}", n),
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Instant(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// The tag a feature type declares for a property, compared against the
/// payload by the result walker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Integer,
    Number,
    Boolean,
    Instant,
    Geometry,
    Complex,
}
impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Instant => "instant",
            ValueKind::Geometry => "geometry",
            ValueKind::Complex => "complex",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeatureValue {
    Primitive(Primitive),
    Geometry(Geometry<f64>),
    Complex(ComplexAttribute),
}
impl FeatureValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FeatureValue::Primitive(p) => p.kind(),
            FeatureValue::Geometry(_) => ValueKind::Geometry,
            FeatureValue::Complex(_) => ValueKind::Complex,
        }
    }
    /// Textual rendering of a scalar or geometry. Complex values have no
    /// direct rendering and yield `None`.
    pub fn render(&self) -> Option<String> {
        match self {
            FeatureValue::Primitive(p) => Some(p.to_string()),
            FeatureValue::Geometry(g) => Some(g.wkt_string()),
            FeatureValue::Complex(_) => None,
        }
    }
    pub fn as_instant(&self) -> Option<&DateTime<Utc>> {
        match self {
            FeatureValue::Primitive(Primitive::Instant(t)) => Some(t),
            _ => None,
        }
    }
    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            FeatureValue::Geometry(g) => Some(g),
            _ => None,
        }
    }
    pub fn as_complex(&self) -> Option<&ComplexAttribute> {
        match self {
            FeatureValue::Complex(c) => Some(c),
            _ => None,
        }
    }
}
impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self { FeatureValue::Primitive(Primitive::Text(s.to_owned())) }
}
impl From<String> for FeatureValue {
    fn from(s: String) -> Self { FeatureValue::Primitive(Primitive::Text(s)) }
}
impl From<i64> for FeatureValue {
    fn from(i: i64) -> Self { FeatureValue::Primitive(Primitive::Integer(i)) }
}
impl From<f64> for FeatureValue {
    fn from(n: f64) -> Self { FeatureValue::Primitive(Primitive::Number(n)) }
}
impl From<bool> for FeatureValue {
    fn from(b: bool) -> Self { FeatureValue::Primitive(Primitive::Boolean(b)) }
}
impl From<DateTime<Utc>> for FeatureValue {
    fn from(t: DateTime<Utc>) -> Self { FeatureValue::Primitive(Primitive::Instant(t)) }
}
impl From<Geometry<f64>> for FeatureValue {
    fn from(g: Geometry<f64>) -> Self { FeatureValue::Geometry(g) }
}
impl From<ComplexAttribute> for FeatureValue {
    fn from(c: ComplexAttribute) -> Self { FeatureValue::Complex(c) }
}

// ------------- Property -------------
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    name: AttributeName,
    declared: ValueKind,
    value: FeatureValue,
}
impl Property {
    /// A property whose declared kind is taken from its value.
    pub fn new(name: AttributeName, value: impl Into<FeatureValue>) -> Self {
        let value = value.into();
        Self {
            name,
            declared: value.kind(),
            value,
        }
    }
    /// A property whose declared kind comes from the feature type, which may
    /// disagree with the payload when the backing data is bad.
    pub fn declared(name: AttributeName, declared: ValueKind, value: impl Into<FeatureValue>) -> Self {
        Self {
            name,
            declared,
            value: value.into(),
        }
    }
    pub fn name(&self) -> &AttributeName {
        &self.name
    }
    pub fn declared_kind(&self) -> ValueKind {
        self.declared
    }
    pub fn value(&self) -> &FeatureValue {
        &self.value
    }
    pub fn is_well_formed(&self) -> bool {
        self.declared == self.value.kind()
    }
}

// ------------- ComplexAttribute -------------
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexAttribute {
    identifier: Option<String>,
    name: AttributeName,
    properties: Vec<Property>,
}
impl ComplexAttribute {
    pub fn new(name: AttributeName) -> Self {
        Self {
            identifier: None,
            name,
            properties: Vec::new(),
        }
    }
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
    /// Adds the conventional simple-content child.
    pub fn with_simple_content(self, value: impl Into<FeatureValue>) -> Self {
        self.with_property(Property::new(AttributeName::local(SIMPLE_CONTENT), value))
    }
    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }
    pub fn name(&self) -> &AttributeName {
        &self.name
    }
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
    /// The simple-content child, matched on its local part only.
    pub fn simple_content(&self) -> Option<&Property> {
        self.properties.iter().find(|p| p.name().is_simple_content())
    }
    pub fn property(&self, name: &AttributeName) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }
}

// ------------- Feature -------------
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    identifier: String,
    properties: Vec<Property>,
}
impl Feature {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            properties: Vec::new(),
        }
    }
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
    /// The first top-level property carrying `name`.
    pub fn property(&self, name: &AttributeName) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }
    pub fn properties_named<'f>(&'f self, name: &'f AttributeName) -> impl Iterator<Item = &'f Property> + 'f {
        self.properties.iter().filter(move |p| p.name() == name)
    }
}
