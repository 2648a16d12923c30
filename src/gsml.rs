//! The GeoSciML `MappedFeature` type served from a flat GDELT-style table.
//!
//! The table is flat; the mapping folds `Actor1Name`/`Actor1Code` into a
//! complex `gml:name` carrying simple content and a `codeSpace` child, and
//! `EventCode` into a complex `gsml:observationMethod` that has no simple
//! content of its own.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::info;

use crate::error::Result;
use crate::feature::{AttributeName, ValueKind};
use crate::filter::{Predicate, and, spatial_bbox, temporal_range, text_like};
use crate::persist::{AttributeMapping, FeatureTypeMapping};

pub const GSML_NAMESPACE: &str = "urn:cgi:xmlns:CGI:GeoSciML:2.0";
pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml";

pub const TABLE: &str = "gdelt";

pub fn mapped_feature() -> AttributeName {
    AttributeName::new(GSML_NAMESPACE, "MappedFeature")
}
pub fn name() -> AttributeName {
    AttributeName::new(GML_NAMESPACE, "name")
}
pub fn code_space() -> AttributeName {
    AttributeName::new(GML_NAMESPACE, "codeSpace")
}
pub fn shape() -> AttributeName {
    AttributeName::new(GSML_NAMESPACE, "shape")
}
pub fn cal_date() -> AttributeName {
    AttributeName::new(GML_NAMESPACE, "CalDate")
}
pub fn observation_method() -> AttributeName {
    AttributeName::new(GSML_NAMESPACE, "observationMethod")
}
pub fn term_value() -> AttributeName {
    AttributeName::new(GSML_NAMESPACE, "value")
}

pub fn mapping() -> FeatureTypeMapping {
    FeatureTypeMapping::new(mapped_feature(), TABLE, "GLOBALEVENTID")
        .with_attribute(AttributeMapping::complex(
            name(),
            Some(("Actor1Name", ValueKind::Text)),
            vec![AttributeMapping::column(code_space(), "Actor1Code", ValueKind::Text)],
        ))
        .with_attribute(AttributeMapping::column(shape(), "geom", ValueKind::Geometry))
        .with_attribute(AttributeMapping::column(cal_date(), "SQLDATE", ValueKind::Instant))
        .with_attribute(AttributeMapping::complex(
            observation_method(),
            None,
            vec![AttributeMapping::column(term_value(), "EventCode", ValueKind::Text)],
        ))
}

/// Builds `[CalDate DURING window AND] BBOX(shape, ...) AND name LIKE pattern`.
/// The time filter is only added when a window is given.
pub fn base_filter(
    bbox: [f64; 4],
    srs: &str,
    name_pattern: &str,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Predicate> {
    let mut parts = Vec::with_capacity(3);
    if let Some((start, end)) = window {
        parts.push(temporal_range(cal_date(), start, end)?);
    }
    let [min_x, min_y, max_x, max_y] = bbox;
    parts.push(spatial_bbox(shape(), min_x, min_y, max_x, max_y, srs)?);
    parts.push(text_like(name(), name_pattern)?);
    Ok(and(parts))
}

const DEMO_ROWS: [(i64, Option<&str>, Option<&str>, &str, &str, &str); 6] = [
    (1, Some("UNITED KINGDOM"), Some("GBR"), "POINT(31.605 44.005)", "2013-03-14", "010"),
    (2, Some("FRANCE"), Some("FRA"), "POINT(31.601 44.002)", "2013-05-02", "043"),
    (3, Some("UNITED NATIONS"), Some("IGOUNO"), "POINT(31.608 44.009)", "2014-02-20", "036"),
    (4, Some("UNITED STATES"), Some("USA"), "POINT(35.2 46.1)", "2014-03-01", "190"),
    (5, None, None, "POINT(31.603 44.004)", "2014-04-11", "020"),
    (6, Some("UNITED KINGDOM"), Some("GBR"), "POINT(31.609 44.001)", "2012-11-30", "051"),
];

/// Creates the backing table and fills it with a handful of events when it
/// is empty. Returns the number of rows inserted.
pub fn seed_demo(connection: &Connection) -> Result<usize> {
    connection.execute_batch(
        "
        create table if not exists gdelt (
            GLOBALEVENTID integer not null primary key,
            Actor1Name text,
            Actor1Code text,
            geom text,
            SQLDATE text,
            EventCode text
        );
        ",
    )?;
    let existing: i64 = connection.query_row("select count(*) from gdelt", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }
    let mut insert = connection.prepare(
        "
        insert into gdelt (
            GLOBALEVENTID,
            Actor1Name,
            Actor1Code,
            geom,
            SQLDATE,
            EventCode
        ) values (?, ?, ?, ?, ?, ?)
        ",
    )?;
    for (id, actor, code, geom, date, event) in DEMO_ROWS {
        insert.execute(params![id, actor, code, geom, date, event])?;
    }
    info!(rows = DEMO_ROWS.len(), "seeded demo events");
    Ok(DEMO_ROWS.len())
}
