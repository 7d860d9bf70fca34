mod common;

use std::sync::Arc;

use common::*;
use tunedb_db::tunedb_types::Value;
use tunedb_db::*;

fn seed(db: &Database) {
    for (title, year, rating) in [("b", 2001, "2.5"), ("C", 1999, "9.5"), ("a", 2010, "5.5")] {
        let mut track = add_track(db, title, "Band", year);
        track.set_parse("rating", rating).unwrap();
        track.store(None).unwrap();
    }
}

fn title(model: &Model<Track>) -> String {
    model.get("title").unwrap().to_string()
}

#[test]
fn second_traversal_returns_the_same_models() {
    let (_dir, db) = open_db();
    seed(&db);

    let mut results = db.all::<Track>().unwrap();
    let first: Vec<Arc<Model<Track>>> = results.iter().collect();
    let second: Vec<Arc<Model<Track>>> = results.iter().collect();

    assert_eq!(first.len(), 3);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert!(Arc::ptr_eq(a, b));
    }
}

#[test]
fn partial_traversal_resumes_from_cache() {
    let (_dir, db) = open_db();
    seed(&db);

    let mut results = db.all::<Track>().unwrap();
    let head = results.iter().next().unwrap();
    let all: Vec<_> = results.iter().collect();
    assert_eq!(all.len(), 3);
    assert!(Arc::ptr_eq(&head, &all[0]));
}

#[test]
fn len_does_not_materialize() {
    let (_dir, db) = open_db();
    seed(&db);

    let results = db.all::<Track>().unwrap();
    assert_eq!(results.len(), 3);
    assert!(!results.is_empty());
    assert!(format!("{results:?}").contains("materialized: 0"));
}

#[test]
fn indexed_access() {
    let (_dir, db) = open_db();
    seed(&db);

    let sort = sort_for_field::<Track>("year", true, false);
    let mut results = db.fetch::<Track>(None, Some(sort)).unwrap();
    assert_eq!(title(&results.get(2).unwrap()), "a");
    assert_eq!(title(&results.first().unwrap()), "C");
    assert!(results.get(3).is_none());
}

#[test]
fn fixed_sort_runs_in_sql() {
    let (_dir, db) = open_db();
    seed(&db);

    let sort = sort_for_field::<Track>("title", true, true);
    assert!(!sort.is_slow());
    let titles: Vec<String> =
        db.fetch::<Track>(None, Some(sort)).unwrap().into_iter().map(|t| title(&t)).collect();
    assert_eq!(titles, ["a", "b", "C"]);

    let sort = sort_for_field::<Track>("title", true, false);
    let titles: Vec<String> =
        db.fetch::<Track>(None, Some(sort)).unwrap().into_iter().map(|t| title(&t)).collect();
    assert_eq!(titles, ["C", "a", "b"]);
}

#[test]
fn slow_sort_materializes_and_sorts_in_memory() {
    let (_dir, db) = open_db();
    seed(&db);

    let sort = sort_for_field::<Track>("rating", false, false);
    assert!(sort.is_slow());
    let mut results = db.fetch::<Track>(None, Some(sort)).unwrap();

    let ratings: Vec<Value> = results.iter().map(|t| t.get("rating").unwrap()).collect();
    assert_eq!(ratings, [Value::Real(9.5), Value::Real(5.5), Value::Real(2.5)]);

    let again: Vec<String> = results.iter().map(|t| title(&t)).collect();
    assert_eq!(again, ["C", "a", "b"]);
    assert_eq!(title(&results.get(1).unwrap()), "a");
}

#[test]
fn slow_sort_on_computed_field() {
    let (_dir, db) = open_db();
    seed(&db);
    let album = add_album(&db, "Record", 2000);
    let mut on_album = db.fetch::<Track>(Some(&MatchQuery::new("title", "a")), None)
        .unwrap()
        .first()
        .unwrap()
        .as_ref()
        .clone();
    on_album.set("album_id", album.id().unwrap()).unwrap();
    on_album.store(None).unwrap();

    let sort = MultipleSort(vec![
        sort_for_field::<Track>("singleton", true, false),
        sort_for_field::<Track>("title", true, true),
    ]);
    assert!(sort.is_slow());
    let titles: Vec<String> = db
        .fetch::<Track>(None, Some(Box::new(sort)))
        .unwrap()
        .into_iter()
        .map(|t| title(&t))
        .collect();
    assert_eq!(titles, ["a", "b", "C"]);
}

#[test]
fn multiple_fixed_sorts_compile_to_sql() {
    let (_dir, db) = open_db();
    seed(&db);
    add_track(&db, "d", "Band", 2001);

    let sort = MultipleSort(vec![
        sort_for_field::<Track>("year", false, false),
        sort_for_field::<Track>("title", false, false),
    ]);
    assert!(!sort.is_slow());
    let titles: Vec<String> = db
        .fetch::<Track>(None, Some(Box::new(sort)))
        .unwrap()
        .into_iter()
        .map(|t| title(&t))
        .collect();
    assert_eq!(titles, ["a", "d", "b", "C"]);
}

#[test]
fn materialized_models_are_clean_and_stamped() {
    let (_dir, db) = open_db();
    seed(&db);

    let mut results = db.all::<Track>().unwrap();
    let models = results.materialized();
    assert_eq!(models.len(), 3);
    for model in models {
        assert!(!model.is_dirty());
        assert_eq!(model.revision(), Some(db.revision()));
        assert!(model.database().unwrap().same_as(&db));
    }
}

#[test]
fn empty_results() {
    let (_dir, db) = open_db();
    let mut results = db.all::<Track>().unwrap();
    assert!(results.is_empty());
    assert!(results.first().is_none());
    assert_eq!(results.iter().count(), 0);
}

#[test]
fn rows_keep_the_revision_they_were_read_at() {
    let (_dir, db) = open_db();
    let track = add_track(&db, "old", "Band", 2000);

    let mut results = db.all::<Track>().unwrap();
    let fetched_at = db.revision();

    let mut other = db.get::<Track>(track.id().unwrap()).unwrap().unwrap();
    other.set("title", "new").unwrap();
    other.store(None).unwrap();
    assert_eq!(db.revision(), fetched_at + 1);

    let mut stale = results.first().unwrap().as_ref().clone();
    assert_eq!(stale.revision(), Some(fetched_at));
    assert_eq!(title(&stale), "old");

    stale.load().unwrap();
    assert_eq!(title(&stale), "new");
    assert_eq!(stale.revision(), Some(db.revision()));
}
