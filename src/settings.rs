//! Layered settings: built-in defaults, an optional TOML file, then
//! `FEATUREWALK__SECTION__KEY` environment variables.

use chrono::{DateTime, Utc};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{FeatureQueryError, Result};
use crate::feature::AttributeName;

pub const DEFAULT_FILE: &str = "featurewalk.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub query: QuerySettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub page_size: usize,
    pub seed_demo: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub max_results: Option<usize>,
    pub attributes: Vec<String>,
    pub bbox: [f64; 4],
    pub srs: String,
    pub name_pattern: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            query: QuerySettings::default(),
            server: ServerSettings::default(),
        }
    }
}
impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: ":memory:".to_owned(),
            page_size: 256,
            seed_demo: true,
        }
    }
}
impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_results: Some(10),
            attributes: vec![
                crate::gsml::name().to_string(),
                crate::gsml::shape().to_string(),
                crate::gsml::cal_date().to_string(),
            ],
            bbox: [31.6, 44.0, 31.61, 44.01],
            srs: "EPSG:4326".to_owned(),
            name_pattern: "UNITED%".to_owned(),
            start: None,
            end: None,
        }
    }
}
impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:8080".to_owned(),
        }
    }
}

impl Settings {
    /// Loads `path` (or [`DEFAULT_FILE`]) if it exists, then the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_FILE)).required(path.is_some()))
            .add_source(Environment::with_prefix("FEATUREWALK").separator("__"));
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
    /// Parses settings from a TOML string, without the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
    fn validate(&self) -> Result<()> {
        if self.database.page_size == 0 {
            return Err(FeatureQueryError::Config("database.page_size must be at least 1".to_owned()));
        }
        self.query.attribute_names()?;
        self.query.window()?;
        Ok(())
    }
}

impl QuerySettings {
    pub fn attribute_names(&self) -> Result<Vec<AttributeName>> {
        self.attributes
            .iter()
            .map(|a| {
                AttributeName::parse(a).ok_or_else(|| FeatureQueryError::Config(format!("bad attribute name '{}'", a)))
            })
            .collect()
    }
    /// The time window, present only when both ends are configured.
    pub fn window(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Ok(Some((parse_instant(start)?, parse_instant(end)?))),
            (None, None) => Ok(None),
            _ => Err(FeatureQueryError::Config(
                "query.start and query.end must be given together".to_owned(),
            )),
        }
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FeatureQueryError::Config(format!("bad instant '{}': {}", text, e)))
}
