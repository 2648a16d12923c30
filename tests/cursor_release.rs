mod common;

use featurewalk::error::FeatureQueryError;
use featurewalk::filter::Predicate;
use featurewalk::query::build_query;
use featurewalk::source::{CursorState, execute};

use common::{GSML, ScriptedSource, named};

fn three() -> Vec<featurewalk::feature::Feature> {
    vec![
        named("1", "UNITED KINGDOM"),
        named("2", "FRANCE"),
        named("3", "UNITED NATIONS"),
    ]
}

fn query(limit: Option<usize>) -> featurewalk::query::QueryDescriptor {
    build_query("MappedFeature", Some(GSML), Predicate::include(), limit).unwrap()
}

#[test]
fn exhaustion_releases_once() {
    let source = ScriptedSource::new(three());
    let mut collection = execute(&source, &query(None)).unwrap();
    let mut cursor = collection.features().unwrap();
    assert_eq!(cursor.state(), CursorState::Open);
    assert!(cursor.next().is_some());
    assert_eq!(cursor.state(), CursorState::Iterating);
    assert_eq!(source.closes(), 0);
    assert_eq!(cursor.by_ref().count(), 2);
    assert_eq!(cursor.state(), CursorState::Exhausted);
    assert_eq!(source.closes(), 1);
    // fused, and no second release
    assert!(cursor.next().is_none());
    drop(cursor);
    assert_eq!(source.closes(), 1);
}

#[test]
fn empty_result_releases_once() {
    let source = ScriptedSource::new(Vec::new());
    let mut collection = execute(&source, &query(None)).unwrap();
    let mut cursor = collection.features().unwrap();
    assert!(cursor.next().is_none());
    assert_eq!(cursor.state(), CursorState::Exhausted);
    drop(cursor);
    assert_eq!(source.closes(), 1);
}

#[test]
fn abandoning_early_releases_once() {
    let source = ScriptedSource::new(three());
    let mut collection = execute(&source, &query(None)).unwrap();
    {
        let mut cursor = collection.features().unwrap();
        cursor.next();
    }
    assert_eq!(source.closes(), 1);
    assert_eq!(source.pulls(), 1);
}

#[test]
fn unread_collection_still_releases() {
    let source = ScriptedSource::new(three());
    drop(execute(&source, &query(None)).unwrap());
    assert_eq!(source.opens(), 1);
    assert_eq!(source.closes(), 1);
    assert_eq!(source.pulls(), 0);
}

#[test]
fn explicit_close_releases_once() {
    let source = ScriptedSource::new(three());
    let mut collection = execute(&source, &query(None)).unwrap();
    let mut cursor = collection.features().unwrap();
    cursor.next();
    cursor.close();
    assert_eq!(cursor.state(), CursorState::Closed);
    assert!(cursor.next().is_none());
    cursor.close();
    drop(cursor);
    assert_eq!(source.closes(), 1);
}

#[test]
fn store_error_surfaces_and_releases_once() {
    let source = ScriptedSource::new(three()).failing_at(1);
    let mut collection = execute(&source, &query(None)).unwrap();
    let mut cursor = collection.features().unwrap();
    assert_eq!(cursor.next().unwrap().unwrap().identifier(), "1");
    let err = cursor.next().unwrap().unwrap_err();
    assert!(matches!(err, FeatureQueryError::SourceExecution(_)));
    assert_eq!(cursor.state(), CursorState::Error);
    assert_eq!(source.closes(), 1);
    assert!(cursor.next().is_none());
    drop(cursor);
    assert_eq!(source.closes(), 1);
}

#[test]
fn features_can_be_taken_only_once() {
    let source = ScriptedSource::new(three());
    let mut collection = execute(&source, &query(None)).unwrap();
    let first = collection.features().unwrap();
    let err = collection.features().err().unwrap();
    assert!(matches!(err, FeatureQueryError::AlreadyConsumed));
    assert_eq!(first.count(), 3);
    assert!(matches!(collection.features(), Err(FeatureQueryError::AlreadyConsumed)));
    assert_eq!(source.closes(), 1);
}

#[test]
fn limit_stops_pulling_even_if_the_store_ignores_it() {
    let source = ScriptedSource::new(three()).ignoring_limit();
    let mut collection = execute(&source, &query(Some(2))).unwrap();
    let mut cursor = collection.features().unwrap();
    let ids: Vec<String> = cursor.by_ref().map(|f| f.unwrap().identifier().to_owned()).collect();
    assert_eq!(ids, ["1", "2"]);
    assert_eq!(cursor.delivered(), 2);
    assert_eq!(cursor.state(), CursorState::Exhausted);
    assert_eq!(source.pulls(), 2);
    assert_eq!(source.closes(), 1);
}

#[test]
fn limit_above_available_returns_everything() {
    let source = ScriptedSource::new(three());
    let mut collection = execute(&source, &query(Some(10))).unwrap();
    assert_eq!(collection.features().unwrap().count(), 3);
    assert_eq!(source.closes(), 1);
}
