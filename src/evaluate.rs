//! Reference evaluation of a [`Predicate`] against a [`Feature`].
//!
//! Stores that cannot push a predicate down evaluate it here, per feature.
//! Attributes are resolved with the result walker's rules, so a complex
//! attribute is compared through its simple content. Repeated properties
//! match when any of them does; absent or incomparable values never match.

use chrono::{DateTime, Utc};
use geo::Intersects;
use geo_types::Polygon;
use regex::Regex;

use crate::error::{FeatureQueryError, Result};
use crate::feature::{AttributeName, Feature};
use crate::filter::Predicate;
use crate::walker::{Resolved, resolve_all};

/// A predicate with its LIKE patterns compiled, ready to test many features.
#[derive(Clone, Debug)]
pub struct Matcher {
    node: Node,
}

#[derive(Clone, Debug)]
enum Node {
    Temporal {
        attribute: AttributeName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Spatial {
        attribute: AttributeName,
        area: Polygon<f64>,
    },
    Like {
        attribute: AttributeName,
        regex: Regex,
    },
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Matcher {
    pub fn compile(predicate: &Predicate) -> Result<Self> {
        Ok(Self {
            node: compile(predicate)?,
        })
    }
    pub fn matches(&self, feature: &Feature) -> bool {
        evaluate(&self.node, feature)
    }
}

fn compile(predicate: &Predicate) -> Result<Node> {
    Ok(match predicate {
        Predicate::TemporalRange { attribute, start, end } => Node::Temporal {
            attribute: attribute.clone(),
            start: *start,
            end: *end,
        },
        Predicate::SpatialBBox { attribute, bbox, .. } => Node::Spatial {
            attribute: attribute.clone(),
            area: bbox.to_rect().to_polygon(),
        },
        Predicate::TextLike { attribute, pattern } => Node::Like {
            attribute: attribute.clone(),
            regex: like_to_regex(pattern)?,
        },
        Predicate::And(children) => Node::And(children.iter().map(compile).collect::<Result<_>>()?),
        Predicate::Or(children) => Node::Or(children.iter().map(compile).collect::<Result<_>>()?),
    })
}

fn evaluate(node: &Node, feature: &Feature) -> bool {
    match node {
        Node::Temporal { attribute, start, end } => any_value(feature, attribute, |resolved| {
            resolved
                .value()
                .and_then(|v| v.as_instant())
                .is_some_and(|t| start <= t && t <= end)
        }),
        Node::Spatial { attribute, area } => any_value(feature, attribute, |resolved| {
            resolved
                .value()
                .and_then(|v| v.as_geometry())
                .is_some_and(|g| g.intersects(area))
        }),
        Node::Like { attribute, regex } => any_value(feature, attribute, |resolved| {
            resolved
                .value()
                .and_then(|v| v.render())
                .is_some_and(|text| regex.is_match(&text))
        }),
        Node::And(children) => children.iter().all(|child| evaluate(child, feature)),
        Node::Or(children) => children.iter().any(|child| evaluate(child, feature)),
    }
}

fn any_value<F>(feature: &Feature, attribute: &AttributeName, test: F) -> bool
where
    F: Fn(&Resolved) -> bool,
{
    // malformed properties are skipped here, the walker reports them
    resolve_all(feature, attribute).any(|resolved| resolved.is_ok_and(|r| test(&r)))
}

/// Translates a LIKE pattern into an anchored regex: `%` is any run of
/// characters and `\` takes the next character literally. Everything else,
/// `_` included, matches itself.
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push_str("^(?s:");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => translated.push_str(".*"),
            '\\' => match chars.next() {
                Some(escaped) => translated.push_str(&regex::escape(&escaped.to_string())),
                None => {
                    return Err(FeatureQueryError::InvalidPattern(format!(
                        "dangling escape in '{}'",
                        pattern
                    )));
                }
            },
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push_str(")$");
    Regex::new(&translated).map_err(|e| FeatureQueryError::InvalidPattern(e.to_string()))
}
