//! Musical key notation (`C`, `Cm`, `C#`, `C#m`, ...).

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Affinity, Type};
use crate::value::Value;

/// Flat spellings rewritten to the equivalent sharp.
const ENHARMONIC: &[(&str, &str)] = &[
    ("db", "c#"),
    ("eb", "d#"),
    ("gb", "f#"),
    ("ab", "g#"),
    ("bb", "a#"),
];

static MINOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w#]+minor").expect("minor pattern is valid"));
static MAJOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w#]+major").expect("major pattern is valid"));

/// A musical key in canonical form: sharps instead of flats, `m` for minor,
/// no suffix for major, first letter capitalized.
#[derive(Debug, Clone, Copy)]
pub struct MusicalKey;

impl Type for MusicalKey {
    fn affinity(&self) -> Affinity {
        Affinity::Text
    }

    fn null(&self) -> Value {
        Value::Null
    }

    fn normalize(&self, value: Value) -> Value {
        match value.to_text() {
            Some(text) => self.parse(&text),
            None => Value::Null,
        }
    }

    fn parse(&self, text: &str) -> Value {
        let mut key = text.trim().to_lowercase();
        if key.is_empty() {
            return self.null();
        }
        for (flat, sharp) in ENHARMONIC {
            key = key.replace(flat, sharp);
        }
        let key = MINOR.replace_all(&key, "m");
        let key = MAJOR.replace_all(&key, "");
        Value::Text(capitalize(&key))
    }
}

/// Uppercase the first character and lowercase the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
