//! The filter algebra: atomic temporal, spatial and textual predicates and
//! their boolean combination.
//!
//! Constructors validate their arguments and never touch a store. Evaluation
//! belongs to whichever [`crate::source::FeatureSource`] receives the
//! predicate; [`crate::evaluate`] holds the reference evaluator used by the
//! bundled stores.

use chrono::{DateTime, SecondsFormat, Utc};
use geo_types::{Rect, coord};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::error::{FeatureQueryError, Result};
use crate::evaluate::like_to_regex;
use crate::feature::AttributeName;

lazy_static! {
    // AUTHORITY:CODE or an OGC style URN, no embedded whitespace
    static ref SRS: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*(:[A-Za-z0-9_.\-]*)*:[A-Za-z0-9_.\-]+$").unwrap();
}

// ------------- Srs -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Srs(String);
impl Srs {
    pub fn parse(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim();
        if SRS.is_match(identifier) {
            Ok(Self(identifier.to_owned()))
        } else {
            Err(FeatureQueryError::InvalidSrs(identifier.to_owned()))
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ------------- BBox -------------
/// Axis-aligned box, `min <= max` on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}
impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        // written so that NaN fails as well
        if !(min_x <= max_x && min_y <= max_y) {
            return Err(FeatureQueryError::InvalidBBox { min_x, min_y, max_x, max_y });
        }
        Ok(Self { min_x, min_y, max_x, max_y })
    }
    pub fn min_x(&self) -> f64 {
        self.min_x
    }
    pub fn min_y(&self) -> f64 {
        self.min_y
    }
    pub fn max_x(&self) -> f64 {
        self.max_x
    }
    pub fn max_y(&self) -> f64 {
        self.max_y
    }
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }
}

// ------------- Predicate -------------
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    TemporalRange {
        attribute: AttributeName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    SpatialBBox {
        attribute: AttributeName,
        bbox: BBox,
        srs: Srs,
    },
    TextLike {
        attribute: AttributeName,
        pattern: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Matches when the instant-valued `attribute` lies in `[start, end]`.
pub fn temporal_range(attribute: AttributeName, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Predicate> {
    if start > end {
        return Err(FeatureQueryError::InvalidRange { start, end });
    }
    Ok(Predicate::TemporalRange { attribute, start, end })
}

/// Matches when the geometry-valued `attribute` intersects the box given in `srs`.
pub fn spatial_bbox(
    attribute: AttributeName,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    srs: &str,
) -> Result<Predicate> {
    let bbox = BBox::new(min_x, min_y, max_x, max_y)?;
    let srs = Srs::parse(srs)?;
    Ok(Predicate::SpatialBBox { attribute, bbox, srs })
}

/// Matches when the text `attribute` matches `pattern`, where `%` stands for
/// any run of characters and `\` escapes the next one.
pub fn text_like(attribute: AttributeName, pattern: impl Into<String>) -> Result<Predicate> {
    let pattern = pattern.into();
    if pattern.is_empty() {
        return Err(FeatureQueryError::InvalidPattern(format!(
            "empty LIKE pattern for {}",
            attribute
        )));
    }
    // a pattern that will not compile is rejected here, not at the store
    like_to_regex(&pattern)?;
    Ok(Predicate::TextLike { attribute, pattern })
}

/// Conjunction; with no children it holds for every feature.
pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::And(predicates.into_iter().collect())
}

/// Disjunction; with no children it holds for no feature.
pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Or(predicates.into_iter().collect())
}

impl Predicate {
    pub fn include() -> Self {
        Predicate::And(Vec::new())
    }
    pub fn exclude() -> Self {
        Predicate::Or(Vec::new())
    }
    /// Every attribute the predicate refers to, in tree order.
    pub fn attributes(&self) -> Vec<&AttributeName> {
        let mut found = Vec::new();
        self.collect_attributes(&mut found);
        found
    }
    fn collect_attributes<'p>(&'p self, found: &mut Vec<&'p AttributeName>) {
        match self {
            Predicate::TemporalRange { attribute, .. }
            | Predicate::SpatialBBox { attribute, .. }
            | Predicate::TextLike { attribute, .. } => found.push(attribute),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_attributes(found);
                }
            }
        }
    }
}

// CQL flavoured rendering, used when logging queries
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::TemporalRange { attribute, start, end } => write!(
                f,
                "{} DURING {}/{}",
                attribute,
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
                end.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            Predicate::SpatialBBox { attribute, bbox, srs } => write!(
                f,
                "BBOX({}, {}, {}, {}, {}, '{}')",
                attribute, bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y, srs
            ),
            Predicate::TextLike { attribute, pattern } => {
                write!(f, "{} LIKE '{}'", attribute, pattern.replace('\'', "''"))
            }
            Predicate::And(children) if children.is_empty() => write!(f, "INCLUDE"),
            Predicate::Or(children) if children.is_empty() => write!(f, "EXCLUDE"),
            Predicate::And(children) => write_joined(f, children, " AND "),
            Predicate::Or(children) => write_joined(f, children, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter, children: &[Predicate], separator: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        match child {
            Predicate::And(c) | Predicate::Or(c) if c.len() > 1 => write!(f, "({})", child)?,
            _ => write!(f, "{}", child)?,
        }
    }
    Ok(())
}
