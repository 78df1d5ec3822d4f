//! Helpers over the generic JSON tree.
//!
//! Config and content metadata are JSON; the pipeline treats them as
//! generic [`serde_json::Value`] trees. File references appear as strings
//! carrying a `config://` or `content://` scheme. A "command file" is a
//! root array of command arrays, each headed by a `$`-operator string;
//! variations append commands to these.

use sar_schema::FilePath;
use serde_json::{Map, Value};

use crate::error::{CookError, Result};

/// Magic prefixed to cooked (binary) JSON bodies.
pub const COOKED_JSON_MAGIC: [u8; 4] = *b"SJC1";

/// Parse JSON bytes, reporting the owning path on failure.
pub fn parse_json(bytes: &[u8], path: &FilePath) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| CookError::Parse {
        path: path.to_string(),
        source: e,
    })
}

/// Interpret a string node as a file reference, if it carries a scheme.
pub fn string_as_file_path(s: &str) -> Option<FilePath> {
    FilePath::from_reference(s)
}

/// Whether a tree is a JSON command file: a root array whose first
/// element is itself an array headed by a `$`-operator string.
pub fn is_command_file(value: &Value) -> bool {
    let Value::Array(commands) = value else {
        return false;
    };
    let Some(Value::Array(first)) = commands.first() else {
        return false;
    };
    matches!(first.first(), Some(Value::String(op)) if op.starts_with('$'))
}

/// Compact (minified) serialization of a tree.
pub fn to_compact_string(value: &Value) -> String {
    // A Value never fails to serialize.
    serde_json::to_string(value).unwrap_or_default()
}

/// Cooked binary form of a tree: magic header plus a zstd-compressed
/// compact serialization.
pub fn cook_json(value: &Value, level: i32, path: &FilePath) -> Result<Vec<u8>> {
    let compact = to_compact_string(value);
    let compressed =
        zstd::bulk::compress(compact.as_bytes(), level).map_err(|e| CookError::Compression {
            path: path.to_string(),
            source: e,
        })?;
    let mut out = Vec::with_capacity(COOKED_JSON_MAGIC.len() + compressed.len());
    out.extend_from_slice(&COOKED_JSON_MAGIC);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Structural diff of `target` against `base`.
///
/// Only changed keys appear in the result; keys present in `base` but
/// absent from `target` are emitted as explicit `null` so readers can
/// distinguish "unchanged" from "deleted". Non-object values diff to the
/// target value when they differ.
pub fn compute_diff(base: &Value, target: &Value) -> Value {
    match (base, target) {
        (Value::Object(b), Value::Object(t)) => {
            let mut out = Map::new();
            for (key, target_value) in t {
                match b.get(key) {
                    Some(base_value) if base_value == target_value => {}
                    Some(base_value) => {
                        out.insert(key.clone(), compute_diff(base_value, target_value));
                    }
                    None => {
                        out.insert(key.clone(), target_value.clone());
                    }
                }
            }
            for key in b.keys() {
                if !t.contains_key(key) {
                    out.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(out)
        }
        _ => target.clone(),
    }
}

/// Apply a command file to a plain (non-command) tree in place.
///
/// Each command is `["$op", segment..., value?]` addressing a nested key
/// path: `$set` writes the trailing value, `$erase` removes the key,
/// `$append` pushes the trailing value onto an array.
pub fn resolve_command_file_in_place(commands: &Value, target: &mut Value) -> Result<(), String> {
    let Value::Array(commands) = commands else {
        return Err("command payload is not an array".to_string());
    };
    for (index, command) in commands.iter().enumerate() {
        let Value::Array(parts) = command else {
            return Err(format!("command {index} is not an array"));
        };
        let Some(Value::String(op)) = parts.first() else {
            return Err(format!("command {index} has no operator"));
        };
        match op.as_str() {
            "$set" => {
                let (path, value) = split_path_and_value(&parts[1..], index)?;
                let slot = descend(target, path, true, index)?;
                *slot = value.clone();
            }
            "$erase" => {
                let path = string_segments(&parts[1..], index)?;
                let Some((last, prefix)) = path.split_last() else {
                    return Err(format!("command {index}: $erase needs a key path"));
                };
                let parent = descend_keys(target, prefix, false, index)?;
                if let Value::Object(map) = parent {
                    map.remove(*last);
                }
            }
            "$append" => {
                let (path, value) = split_path_and_value(&parts[1..], index)?;
                let slot = descend(target, path, true, index)?;
                match slot {
                    Value::Array(items) => items.push(value.clone()),
                    Value::Null => *slot = Value::Array(vec![value.clone()]),
                    _ => {
                        return Err(format!("command {index}: $append target is not an array"));
                    }
                }
            }
            other => return Err(format!("command {index}: unknown operator \"{other}\"")),
        }
    }
    Ok(())
}

fn split_path_and_value<'a>(
    parts: &'a [Value],
    index: usize,
) -> Result<(&'a [Value], &'a Value), String> {
    match parts.split_last() {
        Some((value, path)) if !path.is_empty() => Ok((path, value)),
        _ => Err(format!("command {index}: needs a key path and a value")),
    }
}

fn string_segments<'a>(parts: &'a [Value], index: usize) -> Result<Vec<&'a str>, String> {
    parts
        .iter()
        .map(|p| match p {
            Value::String(s) => Ok(s.as_str()),
            _ => Err(format!("command {index}: key segments must be strings")),
        })
        .collect()
}

fn descend<'a>(
    target: &'a mut Value,
    path: &[Value],
    create: bool,
    index: usize,
) -> Result<&'a mut Value, String> {
    let keys = string_segments(path, index)?;
    descend_keys(target, &keys, create, index)
}

fn descend_keys<'a>(
    target: &'a mut Value,
    keys: &[&str],
    create: bool,
    index: usize,
) -> Result<&'a mut Value, String> {
    let mut current = target;
    for key in keys {
        if current.is_null() && create {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(format!("command {index}: key \"{key}\" addresses a non-object"));
        };
        if create {
            current = map.entry((*key).to_string()).or_insert(Value::Null);
        } else {
            current = map
                .get_mut(*key)
                .ok_or_else(|| format!("command {index}: key \"{key}\" not found"))?;
        }
    }
    Ok(current)
}
