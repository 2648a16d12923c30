use chrono::{TimeZone, Utc};
use rusqlite::{Connection, params};

use featurewalk::error::FeatureQueryError;
use featurewalk::filter::Predicate;
use featurewalk::gsml;
use featurewalk::persist::SqliteFeatureSource;
use featurewalk::query::build_query;
use featurewalk::source::{FeatureSource, execute};
use featurewalk::walker::{Lookup, NO_SIMPLE_VALUE, ResultWalker, lookup_path};

fn seeded() -> Connection {
    let connection = Connection::open_in_memory().unwrap();
    gsml::seed_demo(&connection).unwrap();
    connection
}

fn window() -> Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)> {
    Some((
        Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2014, 4, 30, 23, 0, 0).unwrap(),
    ))
}

fn ids(source: &SqliteFeatureSource, predicate: Predicate, limit: Option<usize>) -> Vec<String> {
    let descriptor = build_query("MappedFeature", Some(gsml::GSML_NAMESPACE), predicate, limit).unwrap();
    let mut collection = execute(source, &descriptor).unwrap();
    collection
        .features()
        .unwrap()
        .map(|f| f.unwrap().identifier().to_owned())
        .collect()
}

#[test]
fn seeded_events_filter_across_pages() {
    let connection = seeded();
    for page_size in [1, 2, 4, 100] {
        let source = SqliteFeatureSource::new(&connection, page_size).with_mapping(gsml::mapping());
        let filter = gsml::base_filter([31.6, 44.0, 31.61, 44.01], "EPSG:4326", "UNITED%", window()).unwrap();
        assert_eq!(ids(&source, filter, None), ["1", "3"], "page size {}", page_size);
        let undated = gsml::base_filter([31.6, 44.0, 31.61, 44.01], "EPSG:4326", "UNITED%", None).unwrap();
        assert_eq!(ids(&source, undated, None), ["1", "3", "6"], "page size {}", page_size);
    }
}

#[test]
fn limit_stops_the_scan() {
    let connection = seeded();
    let source = SqliteFeatureSource::new(&connection, 2).with_mapping(gsml::mapping());
    assert_eq!(ids(&source, Predicate::include(), Some(4)), ["1", "2", "3", "4"]);
    assert_eq!(ids(&source, Predicate::include(), None).len(), 6);
}

#[test]
fn flat_columns_become_nested_attributes() {
    let connection = seeded();
    let source = SqliteFeatureSource::new(&connection, 3).with_mapping(gsml::mapping());
    let descriptor = build_query("MappedFeature", None, Predicate::include(), None).unwrap();
    let mut collection = execute(&source, &descriptor).unwrap();
    let features: Vec<_> = collection.features().unwrap().map(|f| f.unwrap()).collect();

    let first = &features[0];
    let code_space = lookup_path(first, &[gsml::name(), gsml::code_space()]).unwrap();
    assert_eq!(code_space.map(|r| r.render()), Lookup::Found("GBR".to_owned()));

    let walker = ResultWalker::new([gsml::name(), gsml::observation_method(), gsml::cal_date()]);
    let record = walker.record(first).unwrap();
    assert_eq!(record.get(&gsml::name()), Some(&Lookup::Found("UNITED KINGDOM".to_owned())));
    assert_eq!(
        record.get(&gsml::observation_method()),
        Some(&Lookup::Found(NO_SIMPLE_VALUE.to_owned()))
    );
    assert_eq!(
        record.get(&gsml::cal_date()),
        Some(&Lookup::Found("2013-03-14T00:00:00.000Z".to_owned()))
    );

    // row 5 has no actor at all
    let nameless = walker.record(&features[4]).unwrap();
    assert_eq!(nameless.get(&gsml::name()), Some(&Lookup::Absent));
}

#[test]
fn missing_table_is_type_not_found() {
    let connection = Connection::open_in_memory().unwrap();
    let source = SqliteFeatureSource::new(&connection, 10).with_mapping(gsml::mapping());
    let err = source.open(&gsml::mapped_feature()).err().unwrap();
    assert!(matches!(err, FeatureQueryError::TypeNotFound(_)));

    let descriptor = build_query("Borehole", None, Predicate::include(), None).unwrap();
    let err = execute(&source, &descriptor).err().unwrap();
    assert!(matches!(err, FeatureQueryError::TypeNotFound(_)));
}

#[test]
fn unreadable_date_is_reported_as_malformed() {
    let connection = seeded();
    connection
        .execute(
            "
            insert into gdelt (GLOBALEVENTID, Actor1Name, Actor1Code, geom, SQLDATE, EventCode)
                values (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![7, "UNITED KINGDOM", "GBR", "POINT(31.604 44.006)", "sometime in spring", "010"],
        )
        .unwrap();
    let source = SqliteFeatureSource::new(&connection, 2).with_mapping(gsml::mapping());
    let filter = gsml::base_filter([31.6, 44.0, 31.61, 44.01], "EPSG:4326", "UNITED%", None).unwrap();
    let descriptor = build_query("MappedFeature", Some(gsml::GSML_NAMESPACE), filter, None).unwrap();
    let mut collection = execute(&source, &descriptor).unwrap();
    let walker = ResultWalker::new([gsml::name(), gsml::cal_date()]);
    let results: Vec<_> = walker.walk(collection.features().unwrap()).collect();
    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(|r| r.is_ok()));
    assert!(matches!(
        &results[3],
        Err(FeatureQueryError::MalformedFeature { feature, .. }) if feature == "7"
    ));
}
