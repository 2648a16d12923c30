//! A [`FeatureSource`] over flat SQLite tables.
//!
//! Each feature type is described by a [`FeatureTypeMapping`] naming its
//! table, identifier column and how columns become properties. A column can
//! map straight onto a property, or several columns can be folded into a
//! [`ComplexAttribute`] with a simple-content child and nested children, which
//! is how a flat row turns into a nested feature.
//!
//! Scans read the table in pages of `page_size` rows (ordered by `rowid`) and
//! evaluate the predicate per row with [`Matcher`]. SQL NULLs become absent
//! properties. Values that cannot be read as their declared kind are kept as
//! text under that declared kind, so the result walker reports them as
//! malformed instead of the scan failing.

// used for persistence
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row, params};

// used for instants and geometries
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geo_types::Geometry;
use wkt::TryFromWkt;

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FeatureQueryError, Result};
use crate::evaluate::Matcher;
use crate::feature::{
    AttributeName, ComplexAttribute, Feature, FeatureValue, Primitive, Property, SIMPLE_CONTENT, ValueKind,
};
use crate::filter::Predicate;
use crate::source::{FeatureScan, FeatureSource, TypeHasher, lookup_type};

// ------------- Mapping -------------
#[derive(Clone, Debug)]
pub struct FeatureTypeMapping {
    pub type_name: AttributeName,
    pub table: String,
    pub id_column: String,
    pub attributes: Vec<AttributeMapping>,
}

#[derive(Clone, Debug)]
pub struct AttributeMapping {
    pub target: AttributeName,
    pub source: MappedValue,
}

#[derive(Clone, Debug)]
pub enum MappedValue {
    Column {
        column: String,
        kind: ValueKind,
    },
    Complex {
        simple_content: Option<(String, ValueKind)>,
        children: Vec<AttributeMapping>,
    },
}

impl AttributeMapping {
    pub fn column(target: AttributeName, column: &str, kind: ValueKind) -> Self {
        Self {
            target,
            source: MappedValue::Column {
                column: column.to_owned(),
                kind,
            },
        }
    }
    pub fn complex(
        target: AttributeName,
        simple_content: Option<(&str, ValueKind)>,
        children: Vec<AttributeMapping>,
    ) -> Self {
        Self {
            target,
            source: MappedValue::Complex {
                simple_content: simple_content.map(|(column, kind)| (column.to_owned(), kind)),
                children,
            },
        }
    }
    fn collect_columns<'m>(&'m self, columns: &mut Vec<&'m str>) {
        match &self.source {
            MappedValue::Column { column, .. } => columns.push(column),
            MappedValue::Complex {
                simple_content,
                children,
            } => {
                if let Some((column, _)) = simple_content {
                    columns.push(column);
                }
                for child in children {
                    child.collect_columns(columns);
                }
            }
        }
    }
    // consumes columns in the same order collect_columns listed them
    fn materialize(&self, row: &Row, index: &mut usize) -> rusqlite::Result<Option<Property>> {
        match &self.source {
            MappedValue::Column { kind, .. } => {
                let value = row.get_ref(*index)?;
                *index += 1;
                Ok(convert(value, *kind).map(|v| Property::declared(self.target.clone(), *kind, v)))
            }
            MappedValue::Complex {
                simple_content,
                children,
            } => {
                let mut complex = ComplexAttribute::new(self.target.clone());
                let mut present = false;
                if let Some((_, kind)) = simple_content {
                    let value = row.get_ref(*index)?;
                    *index += 1;
                    if let Some(v) = convert(value, *kind) {
                        complex.push(Property::declared(AttributeName::local(SIMPLE_CONTENT), *kind, v));
                        present = true;
                    }
                }
                for child in children {
                    if let Some(property) = child.materialize(row, index)? {
                        complex.push(property);
                        present = true;
                    }
                }
                Ok(present.then(|| Property::declared(self.target.clone(), ValueKind::Complex, complex)))
            }
        }
    }
}

impl FeatureTypeMapping {
    pub fn new(type_name: AttributeName, table: &str, id_column: &str) -> Self {
        Self {
            type_name,
            table: table.to_owned(),
            id_column: id_column.to_owned(),
            attributes: Vec::new(),
        }
    }
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }
    /// Selected columns: the identifier first, then the attributes depth first.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec![self.id_column.as_str()];
        for attribute in &self.attributes {
            attribute.collect_columns(&mut columns);
        }
        columns
    }
    fn select_page(&self) -> String {
        let columns: Vec<String> = self.columns().into_iter().map(quote).collect();
        format!(
            "
            select {}
                from {}
                order by rowid
                limit ?1 offset ?2
            ",
            columns.join(", "),
            quote(&self.table)
        )
    }
    fn materialize(&self, row: &Row) -> rusqlite::Result<Feature> {
        let identifier = match row.get_ref(0)? {
            ValueRef::Integer(i) => i.to_string(),
            ValueRef::Real(f) => f.to_string(),
            ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
            ValueRef::Null => String::new(),
        };
        let mut feature = Feature::new(identifier);
        let mut index = 1;
        for attribute in &self.attributes {
            if let Some(property) = attribute.materialize(row, &mut index)? {
                feature.push(property);
            }
        }
        Ok(feature)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn text_of(value: ValueRef) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Reads a column as `kind`. NULL is `None`; anything unreadable falls back to text.
fn convert(value: ValueRef, kind: ValueKind) -> Option<FeatureValue> {
    let converted = match (kind, value) {
        (_, ValueRef::Null) => return None,
        (ValueKind::Integer, ValueRef::Integer(i)) => Some(FeatureValue::from(i)),
        (ValueKind::Number, ValueRef::Real(f)) => Some(FeatureValue::from(f)),
        (ValueKind::Number, ValueRef::Integer(i)) => Some(FeatureValue::from(i as f64)),
        (ValueKind::Boolean, ValueRef::Integer(i)) => Some(FeatureValue::from(i != 0)),
        (ValueKind::Instant, ValueRef::Integer(secs)) => DateTime::from_timestamp(secs, 0).map(FeatureValue::from),
        (ValueKind::Instant, ValueRef::Text(t)) => std::str::from_utf8(t).ok().and_then(parse_instant).map(FeatureValue::from),
        (ValueKind::Geometry, ValueRef::Text(t)) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| Geometry::<f64>::try_from_wkt_str(s).ok())
            .map(FeatureValue::from),
        (ValueKind::Integer, ValueRef::Text(t)) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse::<i64>().ok()).map(FeatureValue::from),
        (ValueKind::Number, ValueRef::Text(t)) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse::<f64>().ok()).map(FeatureValue::from),
        (ValueKind::Boolean, ValueRef::Text(t)) => match std::str::from_utf8(t).map(str::trim) {
            Ok("true") => Some(FeatureValue::from(true)),
            Ok("false") => Some(FeatureValue::from(false)),
            _ => None,
        },
        _ => None,
    };
    converted.or_else(|| text_of(value).map(|t| FeatureValue::Primitive(Primitive::Text(t))))
}

// ------------- SqliteFeatureSource -------------
pub struct SqliteFeatureSource<'c> {
    connection: &'c Connection,
    mappings: HashMap<AttributeName, Arc<FeatureTypeMapping>, TypeHasher>,
    page_size: NonZeroUsize,
}

pub struct SqliteHandle {
    mapping: Arc<FeatureTypeMapping>,
    closed: Cell<bool>,
}

impl<'c> SqliteFeatureSource<'c> {
    pub fn new(connection: &'c Connection, page_size: usize) -> Self {
        Self {
            connection,
            mappings: HashMap::default(),
            page_size: NonZeroUsize::new(page_size).unwrap_or(NonZeroUsize::MIN),
        }
    }
    pub fn register(&mut self, mapping: FeatureTypeMapping) {
        self.mappings.insert(mapping.type_name.clone(), Arc::new(mapping));
    }
    pub fn with_mapping(mut self, mapping: FeatureTypeMapping) -> Self {
        self.register(mapping);
        self
    }
    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }
}

impl<'c> FeatureSource for SqliteFeatureSource<'c> {
    type Handle = SqliteHandle;
    type Scan = SqliteScan<'c>;

    fn open(&self, type_name: &AttributeName) -> Result<SqliteHandle> {
        let mapping = lookup_type(&self.mappings, type_name)
            .map(|(_, mapping)| Arc::clone(mapping))
            .ok_or_else(|| FeatureQueryError::TypeNotFound(type_name.to_string()))?;
        let tables: i64 = self.connection.query_row(
            "
            select count(*)
                from sqlite_master
                where type in ('table', 'view')
                and name = ?1
            ",
            params![mapping.table],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(FeatureQueryError::TypeNotFound(format!(
                "{} (no table {})",
                type_name, mapping.table
            )));
        }
        debug!(type_name = %mapping.type_name, table = %mapping.table, "opened");
        Ok(SqliteHandle {
            mapping,
            closed: Cell::new(false),
        })
    }

    fn query(
        &self,
        handle: &SqliteHandle,
        predicate: &Predicate,
        max_results: Option<NonZeroUsize>,
    ) -> Result<SqliteScan<'c>> {
        if handle.closed.get() {
            return Err(FeatureQueryError::source(format!("{} is closed", handle.mapping.type_name)));
        }
        let sql = handle.mapping.select_page();
        // fail on bad mappings now rather than on the first pull
        self.connection.prepare_cached(&sql)?;
        Ok(SqliteScan {
            connection: self.connection,
            mapping: Arc::clone(&handle.mapping),
            sql,
            matcher: Matcher::compile(predicate)?,
            page_size: self.page_size.get(),
            offset: 0,
            buffer: VecDeque::new(),
            drained: false,
            remaining: max_results.map(NonZeroUsize::get),
        })
    }

    fn close(&self, handle: &SqliteHandle) {
        if !handle.closed.replace(true) {
            debug!(type_name = %handle.mapping.type_name, "closed");
        }
    }
}

pub struct SqliteScan<'c> {
    connection: &'c Connection,
    mapping: Arc<FeatureTypeMapping>,
    sql: String,
    matcher: Matcher,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<Feature>,
    drained: bool,
    remaining: Option<usize>,
}

impl<'c> SqliteScan<'c> {
    fn fetch_page(&mut self) -> Result<()> {
        let connection = self.connection;
        let mut statement = connection.prepare_cached(&self.sql)?;
        let mut rows = statement.query(params![self.page_size as i64, self.offset as i64])?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            fetched += 1;
            let feature = self.mapping.materialize(row)?;
            if self.matcher.matches(&feature) {
                self.buffer.push_back(feature);
            }
        }
        debug!(
            table = %self.mapping.table,
            offset = self.offset,
            fetched,
            matched = self.buffer.len(),
            "page scanned"
        );
        self.offset += fetched;
        if fetched < self.page_size {
            self.drained = true;
        }
        Ok(())
    }
}

impl<'c> FeatureScan for SqliteScan<'c> {
    fn next_feature(&mut self) -> Option<Result<Feature>> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            if let Some(feature) = self.buffer.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(feature));
            }
            if self.drained {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.drained = true;
                return Some(Err(e));
            }
        }
    }
}
