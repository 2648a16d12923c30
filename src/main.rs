//! Runs the configured MappedFeature query against a SQLite database and
//! prints one line per feature, or serves `POST /v1/query` when the server is
//! enabled.
//!
//! Usage: `featurewalk [settings.toml]`. Settings can also be given through
//! `FEATUREWALK__SECTION__KEY` environment variables, e.g.
//! `FEATUREWALK__QUERY__MAX_RESULTS=5`.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{error, info};

use featurewalk::error::Result;
use featurewalk::gsml;
use featurewalk::persist::SqliteFeatureSource;
use featurewalk::query::build_query;
use featurewalk::server::{AppState, router};
use featurewalk::settings::Settings;
use featurewalk::source::execute;
use featurewalk::walker::ResultWalker;

fn run_query(settings: &Settings, connection: &Connection) -> Result<()> {
    let query = &settings.query;
    let predicate = gsml::base_filter(query.bbox, &query.srs, &query.name_pattern, query.window()?)?;
    let type_name = gsml::mapped_feature();
    let descriptor = build_query(
        type_name.local_part(),
        Some(type_name.namespace()),
        predicate,
        query.max_results,
    )?;
    let source = SqliteFeatureSource::new(connection, settings.database.page_size).with_mapping(gsml::mapping());
    let mut collection = execute(&source, &descriptor)?;
    let walker = ResultWalker::new(query.attribute_names()?);
    let mut walk = walker.walk(collection.features()?).enumerate().peekable();
    if walk.peek().is_none() {
        println!("No results");
        return Ok(());
    }
    println!("Results:");
    for (i, record) in walk {
        println!("{:>3}. {}", i + 1, record?);
    }
    Ok(())
}

fn serve(settings: &Settings) -> Result<()> {
    let state = Arc::new(AppState {
        database: settings.database.path.clone(),
        page_size: settings.database.page_size,
    });
    let listen = settings.server.listen.clone();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(featurewalk::FeatureQueryError::source)?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&listen)
            .await
            .map_err(featurewalk::FeatureQueryError::source)?;
        info!(address = %listen, "server listening");
        axum::serve(listener, router(state))
            .await
            .map_err(featurewalk::FeatureQueryError::source)
    })
}

fn start() -> Result<()> {
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;
    let connection = Connection::open(&settings.database.path)?;
    if settings.database.seed_demo {
        gsml::seed_demo(&connection)?;
    }
    if settings.server.enabled {
        if settings.database.path == ":memory:" {
            // every request opens its own connection
            return Err(featurewalk::FeatureQueryError::Config(
                "the server needs a file database, not :memory:".to_owned(),
            ));
        }
        drop(connection);
        serve(&settings)
    } else {
        run_query(&settings, &connection)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("featurewalk=info")),
        )
        .init();
    if let Err(e) = start() {
        error!(error = %e, "featurewalk failed");
        std::process::exit(1);
    }
}
