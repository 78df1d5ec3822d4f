//! Candidate file list for one package.
//!
//! The list union is: explicit additional includes, the traced
//! dependency closure (when the package opts in), and directory
//! search-pattern matches under the package root. The latter two
//! sources pass the package filter chain and the stale-content cull;
//! additional includes are taken as-is but must exist.

use std::cmp::Ordering;
use std::collections::HashSet;

use sar_schema::{FilePath, FileType, GameDirectory};
use tracing::info;

use crate::config::{FileClass, PackageConfig};
use crate::context::CookContext;
use crate::error::{CookError, Result};
use crate::sar::SarArchive;

/// One candidate entry with the metadata sorting and overflow need.
#[derive(Debug, Clone)]
pub struct FileListEntry {
    /// Content identity.
    pub path: FilePath,
    /// Modification time recorded in the file table. For locale entries
    /// this is substituted (see [`build_file_list`]).
    pub modified_time: u64,
    /// Size of the entry body before compression.
    pub uncompressed_size: u64,
    sort_key: String,
}

impl FileListEntry {
    /// Build an entry; the sort key is the lowercase relative filename.
    pub fn new(path: FilePath, modified_time: u64, uncompressed_size: u64) -> Self {
        let sort_key = path.relative_filename();
        Self {
            path,
            modified_time,
            uncompressed_size,
            sort_key,
        }
    }
}

/// Extension restriction of a directory search pattern. `*.*` lists
/// everything; `*<ext>` lists that extension.
fn pattern_extension(pattern: &str) -> Option<String> {
    if pattern == "*.*" {
        return None;
    }
    match pattern.strip_prefix('*') {
        Some(rest) => Some(rest.to_string()),
        None => Some(pattern.to_string()),
    }
}

/// Types whose cooked file is produced one-to-one from a single authored
/// source. The cooker no longer generates metadata JSON for these, so
/// any found on disk is stale.
fn is_one_to_one(file_type: FileType) -> bool {
    !matches!(file_type, FileType::SoundProject | FileType::UiMovie)
}

/// Stale-content cull for the content root. Sound banks are generated
/// without a same-stem authored source and always survive; content JSON
/// is metadata for the asset named by its stem and is judged by that
/// base asset instead of itself.
fn survives_source_cull(ctx: &dyn CookContext, path: &FilePath) -> bool {
    if path.directory() != GameDirectory::Content {
        return true;
    }
    match path.file_type() {
        FileType::SoundBank => true,
        FileType::Json => {
            let base = FilePath::content(path.relative_without_extension());
            if is_one_to_one(base.file_type()) {
                return false;
            }
            ctx.env().exists_in_source(&base)
        }
        _ => ctx.env().exists_in_source(path),
    }
}

/// Assemble, filter, and sort the package's file list.
///
/// Locale entries get substituted metadata: a locale base entry carries
/// the modification time stored in the base archive (its body will be
/// copied from there too), and a locale patch entry carries the on-disk
/// time of the base file it diffs against, so patch consumers can pair
/// the two.
pub fn build_file_list(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    dependencies: &[FilePath],
    locale_base: Option<&SarArchive>,
) -> Result<Vec<FileListEntry>> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let push = |seen: &mut HashSet<FilePath>, out: &mut Vec<FilePath>, path: FilePath| {
        if seen.insert(path.clone()) {
            out.push(path);
        }
    };

    // Explicit includes come first: they bypass the filter chain and the
    // stale-content cull, but must exist.
    let mut pinned = HashSet::new();
    for include in &pkg.additional_includes {
        let path = FilePath::from_reference(include)
            .unwrap_or_else(|| FilePath::new(pkg.game_directory_type, include));
        if !ctx.env().exists(&path) {
            return Err(CookError::MissingFile(format!(
                "{}: additional include {path}",
                pkg.name
            )));
        }
        pinned.insert(path.clone());
        push(&mut seen, &mut candidates, path);
    }

    if pkg.populate_from_dependencies {
        for dep in dependencies {
            if dep.directory() != pkg.game_directory_type {
                continue;
            }
            if !pkg.should_include_file(dep) {
                continue;
            }
            push(&mut seen, &mut candidates, dep.clone());
        }
    }

    for pattern in &pkg.non_dependency_search_patterns {
        let extension = pattern_extension(pattern);
        let listed =
            ctx.env()
                .list_files(pkg.game_directory_type, &pkg.root, extension.as_deref())?;
        for path in listed {
            if !pkg.should_include_file(&path) {
                continue;
            }
            push(&mut seen, &mut candidates, path);
        }
    }

    let mut culled = 0usize;
    candidates.retain(|path| {
        if pinned.contains(path) || survives_source_cull(ctx, path) {
            true
        } else {
            culled += 1;
            false
        }
    });
    if culled > 0 {
        info!(package = %pkg.name, culled, "skipped cooked files with no authored source");
    }

    let mut list = Vec::with_capacity(candidates.len());
    for path in candidates {
        let entry = match pkg.file_class(&path) {
            FileClass::LocaleBase => {
                let from_archive = locale_base.and_then(|archive| archive.entry(&path));
                match from_archive {
                    Some(base) => {
                        FileListEntry::new(path, base.modified_time, base.uncompressed_size)
                    }
                    None => disk_entry(ctx, path),
                }
            }
            FileClass::LocalePatch => {
                let base = pkg.locale_base_for(&path);
                let base_time = ctx.env().modified_time(&base).ok_or_else(|| {
                    CookError::MissingFile(format!(
                        "{}: locale base {base} for patch {path}",
                        pkg.name
                    ))
                })?;
                let size = ctx.env().file_size(&path);
                FileListEntry::new(path, base_time, size)
            }
            FileClass::Normal => disk_entry(ctx, path),
        };
        list.push(entry);
    }

    apply_package_order(pkg, &mut list);
    Ok(list)
}

fn disk_entry(ctx: &dyn CookContext, path: FilePath) -> FileListEntry {
    let time = ctx.env().modified_time(&path).unwrap_or_default();
    let size = ctx.env().file_size(&path);
    FileListEntry::new(path, time, size)
}

/// Sort the list the way the package specifies. Re-applied after
/// overflow partitioning so both halves keep the package ordering.
pub fn apply_package_order(pkg: &PackageConfig, list: &mut [FileListEntry]) {
    if pkg.sort_by_modified_time {
        list.sort_by(modified_time_order);
    } else {
        list.sort_by(default_order);
    }
}

/// Default order: non-textures first in insertion order, then textures
/// grouped by descending type so the smallest mip levels cluster at the
/// end of the archive.
fn default_order(a: &FileListEntry, b: &FileListEntry) -> Ordering {
    let at = a.path.file_type();
    let bt = b.path.file_type();
    match (at.is_texture(), bt.is_texture()) {
        (false, false) => Ordering::Equal,
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => bt.cmp(&at),
    }
}

/// Patch-friendly order: oldest first, ties broken by descending type
/// then path, so appended content stays clustered at the tail across
/// rebuilds.
fn modified_time_order(a: &FileListEntry, b: &FileListEntry) -> Ordering {
    a.modified_time
        .cmp(&b.modified_time)
        .then_with(|| b.path.file_type().cmp(&a.path.file_type()))
        .then_with(|| a.sort_key.cmp(&b.sort_key))
}
