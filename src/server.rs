use std::sync::Arc;
use axum::{routing::post, Router, Json};
use axum::extract::State;
use tower_http::cors::{CorsLayer, Any};
use serde::{Deserialize, Serialize};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{FeatureQueryError, Result};
use crate::feature::AttributeName;
use crate::filter::{Predicate, and, spatial_bbox, temporal_range, text_like};
use crate::gsml;
use crate::persist::SqliteFeatureSource;
use crate::query::build_query;
use crate::source::execute;
use crate::walker::{Lookup, ResultWalker};

#[derive(Clone, Debug)]
pub struct AppState {
    pub database: String,
    pub page_size: usize,
}

#[derive(Deserialize)]
pub struct QueryRequest {
    #[serde(default = "default_type")]
    pub type_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Clark notation, e.g. `{http://www.opengis.net/gml}name`.
    pub attributes: Vec<String>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default = "default_srs")]
    pub srs: String,
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

fn default_type() -> String {
    gsml::mapped_feature().local_part().to_owned()
}
fn default_srs() -> String {
    "EPSG:4326".to_owned()
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Identifier first, then one cell per column; absent attributes are null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<Option<String>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Outcome {
    columns: Vec<String>,
    filter: String,
    rows: Vec<Vec<Option<String>>>,
}

fn instant(text: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    text.as_deref()
        .map(|t| {
            DateTime::parse_from_rfc3339(t)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| FeatureQueryError::Config(format!("bad instant '{}': {}", t, e)))
        })
        .transpose()
}

/// Every filter in the request is optional; none at all selects everything.
fn filter_of(request: &QueryRequest) -> Result<Predicate> {
    let mut parts = Vec::with_capacity(3);
    match (instant(&request.start)?, instant(&request.end)?) {
        (Some(start), Some(end)) => parts.push(temporal_range(gsml::cal_date(), start, end)?),
        (None, None) => {}
        _ => return Err(FeatureQueryError::Config("start and end must be given together".to_owned())),
    }
    if let Some([min_x, min_y, max_x, max_y]) = request.bbox {
        parts.push(spatial_bbox(gsml::shape(), min_x, min_y, max_x, max_y, &request.srs)?);
    }
    if let Some(pattern) = &request.name_pattern {
        parts.push(text_like(gsml::name(), pattern.as_str())?);
    }
    Ok(and(parts))
}

fn run(state: &AppState, request: &QueryRequest) -> Result<Outcome> {
    let attributes = request
        .attributes
        .iter()
        .map(|a| AttributeName::parse(a).ok_or_else(|| FeatureQueryError::Config(format!("bad attribute name '{}'", a))))
        .collect::<Result<Vec<_>>>()?;
    let predicate = filter_of(request)?;
    let descriptor = build_query(
        &request.type_name,
        request.namespace.as_deref(),
        predicate,
        request.max_results,
    )?;

    let connection = Connection::open(&state.database)?;
    let source = SqliteFeatureSource::new(&connection, state.page_size).with_mapping(gsml::mapping());
    let mut collection = execute(&source, &descriptor)?;
    let walker = ResultWalker::new(attributes);
    let mut rows = Vec::new();
    for record in walker.walk(collection.features()?) {
        let record = record?;
        let mut row = Vec::with_capacity(record.fields.len() + 1);
        row.push(Some(record.identifier));
        row.extend(record.fields.into_iter().map(|f| match f.value {
            Lookup::Found(v) => Some(v),
            Lookup::Absent => None,
        }));
        rows.push(row);
    }
    Ok(Outcome {
        columns: walker.attributes().iter().map(|a| a.to_string()).collect(),
        filter: descriptor.predicate().to_string(),
        rows,
    })
}

fn status_of(e: &FeatureQueryError) -> StatusCode {
    match e {
        e if e.is_construction() => StatusCode::BAD_REQUEST,
        FeatureQueryError::Config(_) => StatusCode::BAD_REQUEST,
        FeatureQueryError::TypeNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/query", post(query))
        .layer(cors)
        .with_state(state)
}

async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> (StatusCode, Json<QueryResponse>) {
    // the store is synchronous, so the whole query runs on a blocking thread
    let started = std::time::Instant::now();
    let result = tokio::task::spawn_blocking(move || run(&state, &req))
        .await
        .unwrap_or_else(|e| Err(FeatureQueryError::source(e)));
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(outcome) => {
            info!(ms = elapsed_ms, rows = outcome.rows.len(), filter = %outcome.filter, "query complete");
            let body = QueryResponse {
                status: "ok".into(),
                elapsed_ms,
                row_count: Some(outcome.rows.len()),
                columns: Some(outcome.columns),
                filter: Some(outcome.filter),
                rows: Some(outcome.rows),
                error: None,
            };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let status = status_of(&e);
            let msg = format!("{e}");
            warn!(%msg, code = %status.as_u16(), "query error");
            let body = QueryResponse {
                status: "error".into(),
                elapsed_ms,
                columns: None,
                row_count: None,
                filter: None,
                rows: None,
                error: Some(msg),
            };
            (status, Json(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_of(&FeatureQueryError::InvalidLimit(0)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&FeatureQueryError::Config("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&FeatureQueryError::TypeNotFound("T".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(&FeatureQueryError::AlreadyConsumed), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn queries_a_seeded_file_database() {
        let dir = std::env::temp_dir().join(format!("featurewalk-server-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.db");
        let _ = std::fs::remove_file(&path);
        gsml::seed_demo(&Connection::open(&path).unwrap()).unwrap();

        let state = AppState {
            database: path.to_string_lossy().into_owned(),
            page_size: 2,
        };
        let request: QueryRequest = serde_json::from_str(
            r#"{
                "attributes": ["{http://www.opengis.net/gml}name", "{urn:cgi:xmlns:CGI:GeoSciML:2.0}observationMethod"],
                "bbox": [31.6, 44.0, 31.61, 44.01],
                "name_pattern": "UNITED%",
                "start": "2013-01-01T00:00:00Z",
                "end": "2014-04-30T23:00:00Z"
            }"#,
        )
        .unwrap();
        let outcome = run(&state, &request).unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0][1].as_deref(), Some("UNITED KINGDOM"));
        assert_eq!(outcome.rows[1][1].as_deref(), Some("UNITED NATIONS"));
        assert_eq!(outcome.rows[0][2].as_deref(), Some(crate::walker::NO_SIMPLE_VALUE));

        let unknown = QueryRequest {
            type_name: "River".to_owned(),
            ..request
        };
        let err = run(&state, &unknown).err().unwrap();
        assert_eq!(status_of(&err), StatusCode::NOT_FOUND);

        let everything: QueryRequest = serde_json::from_str(r#"{"attributes": ["{http://www.opengis.net/gml}name"]}"#).unwrap();
        assert_eq!(filter_of(&everything).unwrap(), Predicate::include());
        assert_eq!(run(&state, &everything).unwrap().rows.len(), 6);
        let _ = std::fs::remove_file(&path);
    }
}
