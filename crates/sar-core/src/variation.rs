//! Package variations.
//!
//! A variation source is a text file of `@@append_to "<reference>"`
//! directives, each followed by a JSON array of commands to apply to the
//! named config file. Every variation source yields one extra archive
//! next to the base: entries it touches are re-cooked with the commands
//! applied, everything else is copied byte-for-byte from the base
//! archive.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sar_schema::{FilePath, GameDirectory};
use serde_json::Value;

use crate::config::PackageConfig;
use crate::context::CookContext;
use crate::datastore::{is_command_file, resolve_command_file_in_place};
use crate::error::{CookError, Result};

/// One parsed variation source.
#[derive(Debug)]
pub struct Variation {
    /// 1-based id, stamped into the archive header and output filename.
    pub id: u16,
    /// The source file this variation was parsed from.
    pub source: String,
    /// Commands per touched config file. Repeated `@@append_to` blocks
    /// for one target accumulate in order.
    pub appends: HashMap<FilePath, Vec<Value>>,
}

impl Variation {
    /// Commands for one target, when the variation touches it.
    pub fn commands_for(&self, target: &FilePath) -> Option<&[Value]> {
        self.appends.get(target).map(Vec::as_slice)
    }
}

/// Output path of a variation archive: `<stem>_Variation_<id><ext>`.
pub fn variation_archive_path(base: &Path, id: u16) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let ext = base
        .extension()
        .and_then(|s| s.to_str())
        .map_or(String::new(), |e| format!(".{e}"));
    base.with_file_name(format!("{stem}_Variation_{id}{ext}"))
}

/// Parse every variation source a package configures, in order.
pub fn gather_variations(ctx: &dyn CookContext, pkg: &PackageConfig) -> Result<Vec<Variation>> {
    let mut variations = Vec::with_capacity(pkg.variations.len());
    for (index, source) in pkg.variations.iter().enumerate() {
        let id = (index + 1) as u16;
        variations.push(parse_variation(ctx, pkg, source, id)?);
    }
    Ok(variations)
}

fn variation_error(file: &str, line: u32, reason: impl Into<String>) -> CookError {
    CookError::Variation {
        file: file.to_string(),
        line,
        reason: reason.into(),
    }
}

/// Variation sources carry arbitrary extensions (`.txt`), so they are
/// resolved by literal filename rather than through [`FilePath`].
fn read_variation_source(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    source: &str,
) -> Result<Vec<u8>> {
    let (directory, relative) = if let Some((scheme, rest)) = source.split_once("://") {
        match scheme.to_ascii_lowercase().as_str() {
            "config" => (GameDirectory::Config, rest),
            "content" => (GameDirectory::Content, rest),
            other => {
                return Err(variation_error(
                    source,
                    0,
                    format!("unknown scheme \"{other}\""),
                ));
            }
        }
    } else {
        (pkg.game_directory_type, source)
    };
    let absolute = ctx.env().root_dir(directory).join(relative);
    fs::read(&absolute).map_err(|e| CookError::io(absolute, e))
}

fn parse_variation(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    source: &str,
    id: u16,
) -> Result<Variation> {
    let bytes = read_variation_source(ctx, pkg, source)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| variation_error(source, 0, "variation source is not UTF-8"))?;

    let mut appends: HashMap<FilePath, Vec<Value>> = HashMap::new();
    let mut current: Option<(FilePath, u32, String)> = None;

    let flush = |current: &mut Option<(FilePath, u32, String)>,
                     appends: &mut HashMap<FilePath, Vec<Value>>|
     -> Result<()> {
        let Some((target, start_line, body)) = current.take() else {
            return Ok(());
        };
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            variation_error(source, start_line, format!("append body is not JSON: {e}"))
        })?;
        let Value::Array(commands) = parsed else {
            return Err(variation_error(
                source,
                start_line,
                "append body must be a JSON array of commands",
            ));
        };
        appends.entry(target).or_default().extend(commands);
        Ok(())
    };

    for (number, line) in text.lines().enumerate() {
        let number = (number + 1) as u32;
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("@@append_to") {
            flush(&mut current, &mut appends)?;
            let reference = rest
                .trim()
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| {
                    variation_error(source, number, "expected @@append_to \"<reference>\"")
                })?;
            let target = FilePath::from_reference(reference).ok_or_else(|| {
                variation_error(source, number, format!("bad target reference \"{reference}\""))
            })?;
            if !ctx.env().exists(&target) {
                return Err(variation_error(
                    source,
                    number,
                    format!("append target {target} does not exist"),
                ));
            }
            current = Some((target, number, String::new()));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        } else if !trimmed.is_empty() {
            return Err(variation_error(
                source,
                number,
                "content before the first @@append_to directive",
            ));
        }
    }
    flush(&mut current, &mut appends)?;

    Ok(Variation {
        id,
        source: source.to_string(),
        appends,
    })
}

/// Apply a variation's commands to one config tree.
///
/// A command file grows by appending the commands to its root array; a
/// plain tree has them resolved in place.
pub fn varied_tree(target: &FilePath, base: &Value, commands: &[Value]) -> Result<Value> {
    if is_command_file(base) {
        let mut all = base.as_array().cloned().unwrap_or_default();
        all.extend(commands.iter().cloned());
        Ok(Value::Array(all))
    } else {
        let mut out = base.clone();
        resolve_command_file_in_place(&Value::Array(commands.to_vec()), &mut out)
            .map_err(|reason| variation_error(&target.to_string(), 0, reason))?;
        Ok(out)
    }
}
