#![allow(dead_code)]

use std::sync::LazyLock;

use tempfile::TempDir;
use tunedb_db::tunedb_types::*;
use tunedb_db::*;

#[derive(Debug)]
pub struct Track;

#[derive(Debug)]
pub struct Album;

static TRACK_FIELDS: LazyLock<FieldRegistry> = LazyLock::new(|| {
    FieldRegistry::builder()
        .field("id", Id::primary())
        .field("title", StringType)
        .field("artist", StringType)
        .field("track", PaddedInt::new(2))
        .field("length", DurationType::default())
        .field("year", PaddedInt::new(4))
        .field("added", DateType::default())
        .field("path", PathType::new())
        .field("album_id", Id::foreign())
        .field("genres", DelimitedString::new(MULTI_VALUE_DELIMITER))
        .field("initial_key", MusicalKey)
        .field("bitrate", ScaledInt::new(1000, "kbps"))
        .field("comp", Boolean)
        .always_dirty_field("mtime", DateType::default())
        .flex_type("rating", Float::new(1))
        .flex_type("singleton", Boolean)
        .build()
});

static ALBUM_FIELDS: LazyLock<FieldRegistry> = LazyLock::new(|| {
    FieldRegistry::builder()
        .field("id", Id::primary())
        .field("album", StringType)
        .field("albumartist", StringType)
        .field("year", PaddedInt::new(4))
        .field("added", DateType::default())
        .field("genre", StringType)
        .build()
});

impl Kind for Track {
    const TABLE: &'static str = "items";
    const FLEX_TABLE: &'static str = "item_attributes";

    fn registry() -> &'static FieldRegistry {
        &TRACK_FIELDS
    }

    fn search_fields() -> &'static [&'static str] {
        &["title", "artist"]
    }

    fn relation() -> Option<Relation> {
        Some(Relation::to::<Album>("items.album_id = albums.id"))
    }

    fn computed_fields() -> &'static [&'static str] {
        &["singleton"]
    }

    fn compute(model: &Model<Self>, key: &str) -> Option<Value> {
        match key {
            "singleton" => Some(Value::Bool(model.get_or("album_id", Value::Null).is_null())),
            _ => None,
        }
    }

    fn named_query(name: &str, pattern: &str) -> Option<Box<dyn Query>> {
        if name != "singleton" {
            return None;
        }
        let singles: Box<dyn Query> = Box::new(NoneQuery::new("album_id"));
        match Boolean.parse(pattern) {
            Value::Bool(true) => Some(singles),
            _ => Some(Box::new(NotQuery(singles))),
        }
    }
}

impl Kind for Album {
    const TABLE: &'static str = "albums";
    const FLEX_TABLE: &'static str = "album_attributes";

    fn registry() -> &'static FieldRegistry {
        &ALBUM_FIELDS
    }

    fn search_fields() -> &'static [&'static str] {
        &["album", "albumartist"]
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh library in its own temporary directory. Keep the `TempDir`
/// alive for as long as the database is used.
pub fn open_db() -> (TempDir, Database) {
    init_logging();
    let dir = TempDir::new().unwrap();
    let db = Database::builder(dir.path().join("library.db"))
        .register::<Track>()
        .register::<Album>()
        .open()
        .unwrap();
    (dir, db)
}

pub fn add_track(db: &Database, title: &str, artist: &str, year: i64) -> Model<Track> {
    let mut track = Model::<Track>::new();
    track.set("title", title).unwrap();
    track.set("artist", artist).unwrap();
    track.set("year", year).unwrap();
    track.add(Some(db)).unwrap();
    track
}

pub fn add_album(db: &Database, album: &str, year: i64) -> Model<Album> {
    let mut model = Model::<Album>::new();
    model.set("album", album).unwrap();
    model.set("year", year).unwrap();
    model.add(Some(db)).unwrap();
    model
}
