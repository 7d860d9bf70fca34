//! Filesystem path fields, stored as raw bytes.

use std::path::{Component, Path, PathBuf};

use crate::types::{Affinity, QueryKind, Type};
use crate::value::{SqlValue, Value};

/// A filesystem path kept as the exact bytes the filesystem uses, so that
/// names that are not valid UTF-8 survive a round trip through storage.
#[derive(Debug, Clone, Copy)]
pub struct PathType {
    nullable: bool,
}

impl PathType {
    /// Absent paths read as empty bytes.
    pub const fn new() -> Self {
        Self { nullable: false }
    }

    /// Absent paths read as `Null`.
    pub const fn nullable() -> Self {
        Self { nullable: true }
    }
}

impl Type for PathType {
    fn affinity(&self) -> Affinity {
        Affinity::Blob
    }

    fn null(&self) -> Value {
        if self.nullable { Value::Null } else { Value::Bytes(Vec::new()) }
    }

    fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Bytes(_) => value,
            Value::Text(s) => Value::Bytes(s.into_bytes()),
            Value::Null => self.null(),
            other => other
                .to_text()
                .map(|s| Value::Bytes(s.into_bytes()))
                .unwrap_or_else(|| self.null()),
        }
    }

    /// Expands `~`, makes the path absolute against the current directory
    /// and removes `.`/`..` components.
    fn parse(&self, text: &str) -> Value {
        if text.trim().is_empty() {
            return self.null();
        }
        Value::Bytes(path_bytes(&normpath(Path::new(text))))
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Null => String::new(),
            other => other.to_text().unwrap_or_default(),
        }
    }

    fn to_sql(&self, value: &Value) -> SqlValue {
        match self.normalize(value.clone()) {
            Value::Bytes(b) => SqlValue::Blob(b),
            _ => SqlValue::Null,
        }
    }

    fn from_sql(&self, value: SqlValue) -> Value {
        self.normalize(Value::from(value))
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Path
    }
}

/// Lexically normalize a path: expand a leading `~`, anchor relative paths
/// at the current directory and fold `.` and `..` components.
pub fn normpath(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().unwrap_or_default().join(expanded)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}
