//! SQL functions registered on every connection.
//!
//! `regexp`, `unidecode` and `bytelower` are always installed. The JSON
//! functions the fetch statements rely on are built into SQLite since
//! 3.38.0; older libraries get replacements covering the subset used here.

use std::sync::Arc;

use deunicode::deunicode;
use regex::{Regex, RegexBuilder};
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Error};
use serde_json::{Map, Value as JsonValue};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// First SQLite version shipping the JSON functions by default.
const NATIVE_JSON_VERSION: i32 = 3_038_000;

fn deterministic() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC
}

/// Install the engine's SQL functions on `conn`.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("regexp", 2, deterministic(), regexp)?;
    conn.create_scalar_function("unidecode", 1, deterministic(), unidecode)?;
    conn.create_scalar_function("bytelower", 1, deterministic(), bytelower)?;
    if rusqlite::version_number() < NATIVE_JSON_VERSION {
        log::debug!("SQLite {} lacks JSON functions, registering replacements", rusqlite::version());
        register_json_compat(conn)?;
    }
    Ok(())
}

/// Text form of a SQL value for pattern matching, `None` for `NULL`.
fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(b) | ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// `regexp(pattern, value)`: case-insensitive search; the compiled
/// pattern is cached per statement.
fn regexp(ctx: &Context<'_>) -> rusqlite::Result<bool> {
    let re: Arc<Regex> = ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
        let pattern = pattern.as_str()?;
        Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
    })?;
    Ok(value_text(ctx.get_raw(1)).is_some_and(|text| re.is_match(&text)))
}

/// `unidecode(value)`: transliterate text to ASCII.
fn unidecode(ctx: &Context<'_>) -> rusqlite::Result<SqlValue> {
    Ok(match ctx.get_raw(0) {
        ValueRef::Text(b) | ValueRef::Blob(b) => {
            SqlValue::Text(deunicode(&String::from_utf8_lossy(b)))
        }
        other => SqlValue::from(other),
    })
}

/// `bytelower(value)`: lowercase text and blobs alike.
fn bytelower(ctx: &Context<'_>) -> rusqlite::Result<SqlValue> {
    Ok(match ctx.get_raw(0) {
        ValueRef::Text(b) => SqlValue::Text(String::from_utf8_lossy(b).to_lowercase()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_ascii_lowercase()),
        other => SqlValue::from(other),
    })
}

// ── JSON replacements ───────────────────────────────────────────────────────

/// Install `json_group_object`, `json_patch` and `json_extract`
/// implementations on `conn`, shadowing any built-in ones.
pub fn register_json_compat(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_aggregate_function("json_group_object", 2, deterministic(), JsonGroupObject)?;
    conn.create_scalar_function("json_patch", 2, deterministic(), |ctx| {
        let mut target = parse_json_arg(ctx, 0)?;
        let patch = parse_json_arg(ctx, 1)?;
        json_patch_merge(&mut target, patch);
        Ok(target.to_string())
    })?;
    conn.create_scalar_function("json_extract", 2, deterministic(), |ctx| {
        let Some(json) = value_text(ctx.get_raw(0)) else {
            return Ok(SqlValue::Null);
        };
        let path = ctx.get::<String>(1)?;
        let value = json_extract_flat(&json, &path)
            .map_err(|e| Error::UserFunctionError(e.into()))?;
        Ok(value.map(json_to_sql).unwrap_or(SqlValue::Null))
    })?;
    Ok(())
}

fn parse_json_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<JsonValue> {
    match value_text(ctx.get_raw(idx)) {
        Some(text) => {
            serde_json::from_str(&text).map_err(|e| Error::UserFunctionError(e.into()))
        }
        None => Ok(JsonValue::Null),
    }
}

struct JsonGroupObject;

impl Aggregate<Map<String, JsonValue>, String> for JsonGroupObject {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<Map<String, JsonValue>> {
        Ok(Map::new())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut Map<String, JsonValue>) -> rusqlite::Result<()> {
        let Some(key) = value_text(ctx.get_raw(0)) else {
            return Ok(());
        };
        let value = match ctx.get_raw(1) {
            ValueRef::Null => JsonValue::Null,
            ValueRef::Integer(i) => JsonValue::from(i),
            ValueRef::Real(f) => JsonValue::from(f),
            ValueRef::Text(b) | ValueRef::Blob(b) => {
                JsonValue::String(String::from_utf8_lossy(b).into_owned())
            }
        };
        acc.insert(key, value);
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        acc: Option<Map<String, JsonValue>>,
    ) -> rusqlite::Result<String> {
        Ok(JsonValue::Object(acc.unwrap_or_default()).to_string())
    }
}

/// Apply `patch` to `target` following RFC 7396 (JSON merge patch): object
/// members merge recursively, `null` members delete, anything else
/// replaces.
pub fn json_patch_merge(target: &mut JsonValue, patch: JsonValue) {
    let JsonValue::Object(patch) = patch else {
        *target = patch;
        return;
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = target {
        for (key, value) in patch {
            if value.is_null() {
                map.remove(&key);
            } else {
                json_patch_merge(map.entry(key).or_insert(JsonValue::Null), value);
            }
        }
    }
}

/// Look up one top-level member of a JSON object. Supports the path forms
/// `$` , `$.key` and `$."key"`.
pub fn json_extract_flat(json: &str, path: &str) -> Result<Option<JsonValue>, BoxError> {
    let document: JsonValue = serde_json::from_str(json)?;
    if path == "$" {
        return Ok(Some(document));
    }
    let key = path
        .strip_prefix("$.")
        .ok_or_else(|| format!("unsupported JSON path {path:?}"))?;
    let key = match key.strip_prefix('"').and_then(|k| k.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => key.to_string(),
    };
    Ok(document.get(&key).cloned())
}

fn json_to_sql(value: JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        JsonValue::String(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}
