mod common;

use common::*;
use rusqlite::Connection;
use tunedb_db::tunedb_types::Value;
use tunedb_db::*;

fn titles(db: &Database, query: &dyn Query) -> Vec<String> {
    let mut titles: Vec<String> = db
        .fetch::<Track>(Some(query), None)
        .unwrap()
        .into_iter()
        .map(|t| t.get("title").unwrap().to_string())
        .collect();
    titles.sort();
    titles
}

fn library() -> (tempfile::TempDir, Database) {
    let (dir, db) = open_db();
    let album = add_album(&db, "Kind of Blue", 1959);

    let mut so_what = add_track(&db, "So What", "Miles Davis", 1959);
    so_what.set("album_id", album.id().unwrap()).unwrap();
    so_what.set("rating", 4.5).unwrap();
    so_what.set("path", "/music/jazz/so what.flac").unwrap();
    so_what.store(None).unwrap();

    let mut blue = add_track(&db, "Blue in Green", "Miles Davis", 1959);
    blue.set("album_id", album.id().unwrap()).unwrap();
    blue.set("rating", 3.5).unwrap();
    blue.set("comp", true).unwrap();
    blue.store(None).unwrap();

    let mut cafe = add_track(&db, "Café Society", "Jürgen", 2004);
    cafe.set("path", "/music/Pop/cafe.mp3").unwrap();
    cafe.store(None).unwrap();

    (dir, db)
}

#[test]
fn match_on_fixed_and_flexible_fields() {
    let (_dir, db) = library();
    assert_eq!(titles(&db, &MatchQuery::new("artist", "Jürgen")), ["Café Society"]);
    assert_eq!(titles(&db, &MatchQuery::new("rating", 3.5)), ["Blue in Green"]);
    assert!(titles(&db, &MatchQuery::new("artist", "Nobody")).is_empty());
}

#[test]
fn true_and_false_queries() {
    let (_dir, db) = library();
    assert_eq!(titles(&db, &TrueQuery).len(), 3);
    assert!(titles(&db, &FalseQuery).is_empty());
    assert_eq!(db.all::<Track>().unwrap().len(), 3);
}

#[test]
fn substring_is_case_insensitive_and_escapes_wildcards() {
    let (_dir, db) = library();
    assert_eq!(titles(&db, &SubstringQuery::new("title", "BLUE")), ["Blue in Green"]);
    assert!(titles(&db, &SubstringQuery::new("title", "%")).is_empty());
    assert!(titles(&db, &SubstringQuery::new("title", "So_What")).is_empty());
}

#[test]
fn substring_can_fold_accents() {
    let (_dir, db) = library();
    assert!(titles(&db, &SubstringQuery::new("title", "cafe")).is_empty());
    assert_eq!(
        titles(&db, &SubstringQuery::new("title", "cafe").fold_accents(true)),
        ["Café Society"]
    );
    assert_eq!(
        titles(&db, &SubstringQuery::new("artist", "jurgen").fold_accents(true)),
        ["Café Society"]
    );
}

#[test]
fn regexp_matches_case_insensitively() {
    let (_dir, db) = library();
    let query = RegexpQuery::new("title", "^(so|blue) ").unwrap();
    assert_eq!(titles(&db, &query), ["Blue in Green", "So What"]);
    assert!(matches!(RegexpQuery::new("title", "("), Err(DbError::InvalidQuery(_))));
}

#[test]
fn numeric_ranges() {
    let (_dir, db) = library();
    let exact = NumericQuery::parse("year", "2004").unwrap();
    assert_eq!(titles(&db, &exact), ["Café Society"]);

    let range = NumericQuery::parse("year", "1950..1960").unwrap();
    assert_eq!(titles(&db, &range), ["Blue in Green", "So What"]);

    let open_low = NumericQuery::parse("year", "..1990").unwrap();
    assert_eq!(titles(&db, &open_low).len(), 2);

    let open_high = NumericQuery::parse("year", "2000..").unwrap();
    assert_eq!(titles(&db, &open_high), ["Café Society"]);

    assert!(NumericQuery::parse("year", "soon").is_err());
    assert!(NumericQuery::parse("year", "").is_err());
}

#[test]
fn numeric_query_on_flexible_field_compares_numbers() {
    let (_dir, db) = library();
    let query = NumericQuery::parse("rating", "4..").unwrap();
    assert_eq!(titles(&db, &query), ["So What"]);
}

#[test]
fn boolean_and_none_queries() {
    let (_dir, db) = library();
    assert_eq!(titles(&db, &BooleanQuery::new("comp", true)), ["Blue in Green"]);
    assert_eq!(titles(&db, &BooleanQuery::parse("comp", "no")).len(), 2);
    assert_eq!(titles(&db, &NoneQuery::new("album_id")), ["Café Society"]);
}

#[cfg(unix)]
#[test]
fn path_query_matches_files_and_directories() {
    let (_dir, db) = library();
    assert_eq!(
        titles(&db, &PathQuery::new("path", "/music/jazz/so what.flac", true)),
        ["So What"]
    );
    assert_eq!(titles(&db, &PathQuery::new("path", "/music/jazz", true)), ["So What"]);
    assert_eq!(titles(&db, &PathQuery::new("path", "/music/", true)).len(), 2);
    assert!(titles(&db, &PathQuery::new("path", "/music/ja", true)).is_empty());
    assert!(titles(&db, &PathQuery::new("path", "/music/pop", true)).is_empty());
    assert_eq!(titles(&db, &PathQuery::new("path", "/music/pop", false)), ["Café Society"]);
}

#[test]
fn combinators() {
    let (_dir, db) = library();
    let both = AndQuery(vec![
        Box::new(MatchQuery::new("artist", "Miles Davis")),
        Box::new(SubstringQuery::new("title", "what")),
    ]);
    assert_eq!(titles(&db, &both), ["So What"]);

    let either = OrQuery(vec![
        Box::new(MatchQuery::new("title", "So What")),
        Box::new(MatchQuery::new("artist", "Jürgen")),
    ]);
    assert_eq!(titles(&db, &either), ["Café Society", "So What"]);

    let not = NotQuery(Box::new(MatchQuery::new("artist", "Miles Davis")));
    assert_eq!(titles(&db, &not), ["Café Society"]);

    assert_eq!(titles(&db, &AndQuery::default()).len(), 3);
    assert!(titles(&db, &OrQuery::default()).is_empty());
}

#[test]
fn related_fields_join_the_owning_table() {
    let (_dir, db) = library();
    assert_eq!(
        titles(&db, &MatchQuery::new("album", "Kind of Blue")),
        ["Blue in Green", "So What"]
    );
}

#[test]
fn related_flexible_attributes_are_visible_and_own_values_win() {
    let (_dir, db) = library();
    let mut album = db.fetch::<Album>(None, None).unwrap().first().unwrap().as_ref().clone();
    album.set("label", "Columbia").unwrap();
    album.set("rating", 5.0).unwrap();
    album.store(None).unwrap();

    assert_eq!(titles(&db, &MatchQuery::new("label", "Columbia")), ["Blue in Green", "So What"]);
    // Each track carries its own rating, which shadows the album's.
    assert!(titles(&db, &MatchQuery::new("rating", 5.0)).is_empty());
    assert_eq!(titles(&db, &MatchQuery::new("rating", 4.5)), ["So What"]);
}

#[test]
fn sort_on_column_shared_with_related_table_is_not_ambiguous() {
    let (_dir, db) = library();
    let query = MatchQuery::new("album", "Kind of Blue");
    let sort = sort_for_field::<Track>("year", false, false);
    let results = db.fetch::<Track>(Some(&query), Some(sort)).unwrap();
    assert_eq!(results.len(), 2);

    let sort = MultipleSort(vec![
        sort_for_field::<Track>("added", true, false),
        sort_for_field::<Track>("title", true, true),
    ]);
    let results = db.fetch::<Track>(Some(&query), Some(Box::new(sort))).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn field_query_picks_predicate_by_type() {
    let (_dir, db) = library();
    let year = field_query::<Track>("year", "1959").unwrap();
    assert_eq!(titles(&db, year.as_ref()).len(), 2);

    let comp = field_query::<Track>("comp", "true").unwrap();
    assert_eq!(titles(&db, comp.as_ref()), ["Blue in Green"]);

    let title = field_query::<Track>("title", "green").unwrap();
    assert_eq!(titles(&db, title.as_ref()), ["Blue in Green"]);

    let album = field_query::<Track>("album", "blue").unwrap();
    assert_eq!(titles(&db, album.as_ref()).len(), 2);

    assert!(field_query::<Track>("year", "later").is_err());
}

#[test]
fn field_query_prefers_named_queries() {
    let (_dir, db) = library();
    let singles = field_query::<Track>("singleton", "true").unwrap();
    assert_eq!(titles(&db, singles.as_ref()), ["Café Society"]);
    let on_albums = field_query::<Track>("singleton", "false").unwrap();
    assert_eq!(titles(&db, on_albums.as_ref()).len(), 2);
}

#[test]
fn any_field_query_searches_every_search_field() {
    let (_dir, db) = library();
    assert_eq!(titles(&db, any_field_query::<Track>("miles").as_ref()).len(), 2);
    assert_eq!(titles(&db, any_field_query::<Track>("society").as_ref()), ["Café Society"]);
}

#[test]
fn get_fetches_by_id() {
    let (_dir, db) = library();
    let first = db.all::<Track>().unwrap().first().unwrap();
    let id = first.id().unwrap();
    let fetched = db.get::<Track>(id).unwrap().unwrap();
    assert_eq!(fetched.get("title").unwrap(), first.get("title").unwrap());
    assert!(db.get::<Track>(id + 100).unwrap().is_none());
}

// ── SQL functions ───────────────────────────────────────────────────────────

fn scalar(conn: &Connection, sql: &str) -> rusqlite::types::Value {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn registered_functions() {
    let conn = Connection::open_in_memory().unwrap();
    functions::register(&conn).unwrap();

    assert_eq!(scalar(&conn, "SELECT 'Hello World' REGEXP 'WORLD$'"), 1.into());
    assert_eq!(scalar(&conn, "SELECT NULL REGEXP 'x'"), 0.into());
    assert_eq!(
        scalar(&conn, "SELECT unidecode('Björk Guðmundsdóttir')"),
        rusqlite::types::Value::Text("Bjork Gudmundsdottir".into())
    );
    assert_eq!(
        scalar(&conn, "SELECT bytelower(CAST('/Music/A' AS BLOB))"),
        rusqlite::types::Value::Blob(b"/music/a".to_vec())
    );
}

#[test]
fn json_replacements_behave_like_builtins() {
    let conn = Connection::open_in_memory().unwrap();
    functions::register_json_compat(&conn).unwrap();
    conn.execute_batch(
        "CREATE TABLE attrs (entity_id INTEGER, key TEXT, value TEXT);
         INSERT INTO attrs VALUES (1, 'mood', 'calm'), (1, 'rating', '4'), (2, 'mood', 'loud');",
    )
    .unwrap();

    let grouped = scalar(
        &conn,
        "SELECT json_group_object(key, value) FROM attrs WHERE entity_id = 1",
    );
    let rusqlite::types::Value::Text(grouped) = grouped else {
        panic!("expected text, got {grouped:?}");
    };
    let parsed: serde_json::Value = serde_json::from_str(&grouped).unwrap();
    assert_eq!(parsed, serde_json::json!({"mood": "calm", "rating": "4"}));

    assert_eq!(
        scalar(&conn, r#"SELECT json_extract(json_patch('{"a": "1", "b": "2"}', '{"b": "3"}'), '$."b"')"#),
        rusqlite::types::Value::Text("3".into())
    );
    assert_eq!(
        scalar(&conn, r#"SELECT json_extract('{"a": 1}', '$.missing')"#),
        rusqlite::types::Value::Null
    );
}

#[test]
fn json_patch_merge_follows_merge_patch_rules() {
    let mut target = serde_json::json!({"a": "x", "b": {"c": 1, "d": 2}});
    functions::json_patch_merge(&mut target, serde_json::json!({"a": null, "b": {"c": 3}, "e": "new"}));
    assert_eq!(target, serde_json::json!({"b": {"c": 3, "d": 2}, "e": "new"}));

    let value = functions::json_extract_flat(r#"{"a b": "1"}"#, r#"$."a b""#).unwrap();
    assert_eq!(value, Some(serde_json::json!("1")));
    assert!(functions::json_extract_flat("{}", "a").is_err());
}

#[test]
fn matching_null_never_succeeds() {
    let (_dir, db) = library();
    let query = MatchQuery::new("title", Value::Null);
    assert!(titles(&db, &query).is_empty());
}
