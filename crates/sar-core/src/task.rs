//! The package cook task: orchestrates one full cook pass.
//!
//! For every configured package: assemble the file list (from the traced
//! dependency closure, directory patterns, and explicit includes),
//! partition against the overflow budget, then serialize the base
//! archive, the overflow archive, any variation archives, and the
//! optional manifest. Archives are written to a temp file in the output
//! directory and promoted atomically, bracketed by source-control
//! check-out/check-in when the package opts in.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use sar_schema::{
    FilePath, FileType, PackageFileHeader, SAR_HEADER_SIZE, crc32, generate_key, obfuscate,
};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{FileClass, PackageConfig};
use crate::context::{CookContext, ProgressKind};
use crate::datastore::{cook_json, parse_json, to_compact_string};
use crate::dict::{dict_file_path, resolve_dictionary};
use crate::error::{CookError, Result};
use crate::filelist::{FileListEntry, build_file_list};
use crate::gather::DependencyGatherer;
use crate::overflow::resolve_overflow;
use crate::sar::{ArchiveBuilder, DeltaKey, HeaderSeed, SarArchive};
use crate::variation::{Variation, gather_variations, varied_tree, variation_archive_path};
use crate::zip_archive::write_zip_archive;

/// Contract the external cook scheduler drives tasks through.
pub trait CookTask {
    /// Scheduling priority; higher runs earlier.
    fn priority(&self) -> i32;
    /// Check the environment matches what the configuration targets.
    fn validate_content_environment(&self, ctx: &dyn CookContext) -> Result<()>;
    /// Cook everything the configuration names.
    fn cook_all_out_of_date_content(&self, ctx: &dyn CookContext) -> Result<()>;
}

/// The packaging task.
#[derive(Debug, Default)]
pub struct PackageCookTask;

impl PackageCookTask {
    /// Create the task.
    pub fn new() -> Self {
        Self
    }
}

impl CookTask for PackageCookTask {
    fn priority(&self) -> i32 {
        // Packaging runs after every per-asset cooker.
        100
    }

    fn validate_content_environment(&self, ctx: &dyn CookContext) -> Result<()> {
        let configured = ctx.config().platform;
        let actual = ctx.env().platform();
        if configured == actual {
            Ok(())
        } else {
            Err(CookError::Config(format!(
                "configuration targets {configured} but the environment is {actual}"
            )))
        }
    }

    fn cook_all_out_of_date_content(&self, ctx: &dyn CookContext) -> Result<()> {
        let started = Instant::now();
        let outcome = cook_all(ctx, started);
        ctx.complete_progress(
            ProgressKind::Package,
            started.elapsed().as_secs_f32(),
            outcome.is_ok(),
        );
        outcome
    }
}

fn cook_all(ctx: &dyn CookContext, started: Instant) -> Result<()> {
    let mut gatherer = DependencyGatherer::new(ctx);
    gatherer.gather_config_roots()?;
    gatherer.gather_all()?;

    let total = ctx.config().packages.len();
    for (index, pkg) in ctx.config().packages.iter().enumerate() {
        ctx.advance_progress(
            ProgressKind::Package,
            started.elapsed().as_secs_f32(),
            index as f32 / total.max(1) as f32,
            1,
            (total - index) as u32,
        );
        if pkg.exclude_from_local {
            info!(package = %pkg.name, "skipped by ExcludeFromLocal");
            continue;
        }
        cook_package(ctx, pkg, &gatherer)?;
    }
    Ok(())
}

fn cook_package(ctx: &dyn CookContext, pkg: &PackageConfig, gatherer: &DependencyGatherer) -> Result<()> {
    let started = Instant::now();
    let output = ctx
        .config()
        .output_dir()
        .join(format!("{}{}", pkg.name, pkg.archive_extension()));
    info!(package = %pkg.name, output = %output.display(), "cooking package");

    if pkg.zip_archive {
        cook_zip_package(ctx, pkg, gatherer, &output)?;
    } else {
        cook_sar_package(ctx, pkg, gatherer, &output)?;
    }

    info!(
        package = %pkg.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "package complete"
    );
    Ok(())
}

fn cook_zip_package(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    gatherer: &DependencyGatherer,
    output: &Path,
) -> Result<()> {
    if !pkg.overflow.is_empty() {
        return Err(CookError::Config(format!(
            "{}: overflow archives are not supported for zip packages",
            pkg.name
        )));
    }

    let mut locale_base = open_locale_base(ctx, pkg)?;
    let list = build_file_list(ctx, pkg, gatherer.dependencies(), locale_base.as_ref())?;

    let mut entries = Vec::with_capacity(list.len());
    for item in &list {
        let body = read_file_data(
            ctx,
            pkg,
            &item.path,
            locale_base.as_mut(),
            gatherer.resolved_settings(),
            None,
        )?;
        entries.push((item.path.relative_filename(), body));
    }

    let mut temp = temp_in_output_dir(ctx, output)?;
    write_zip_archive(&mut temp, pkg, &entries, output)?;
    publish_temp(ctx, output, temp, pkg.include_in_source_control)
}

fn cook_sar_package(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    gatherer: &DependencyGatherer,
    output: &Path,
) -> Result<()> {
    let mut locale_base = open_locale_base(ctx, pkg)?;
    let list = build_file_list(ctx, pkg, gatherer.dependencies(), locale_base.as_ref())?;
    let partition = resolve_overflow(ctx, pkg, list)?;
    let delta = build_delta_set(ctx, pkg)?;
    let dict = resolve_dictionary(ctx, pkg, &partition.base, false)?;
    let dict_path = dict_file_path(pkg.game_directory_type, ctx.platform());

    // The dictionary ships inside the archive as its first entry so
    // readers can decompress without side-band data.
    let mut base_list = partition.base;
    if let Some(bytes) = &dict {
        let time = ctx.env().modified_time(&dict_path).unwrap_or_default();
        base_list.insert(
            0,
            FileListEntry::new(dict_path.clone(), time, bytes.len() as u64),
        );
    }

    let job = ArchiveJob {
        pkg,
        dict: dict.as_deref(),
        dict_path: &dict_path,
        delta: &delta,
        resolved: gatherer.resolved_settings(),
    };
    write_sar_archive(ctx, &job, &base_list, 0, &mut locale_base, output)?;

    // The overflow archive is written whenever one is configured, even
    // when nothing spilled, so downstream packaging sees a stable set.
    if !pkg.overflow.is_empty() {
        let overflow_output = ctx.config().archive_path(&pkg.overflow);
        write_sar_archive(
            ctx,
            &job,
            &partition.overflow,
            0,
            &mut locale_base,
            &overflow_output,
        )?;
    }

    if !pkg.variations.is_empty() {
        let variations = gather_variations(ctx, pkg)?;
        let empty_delta = HashSet::new();
        let variation_job = ArchiveJob {
            delta: &empty_delta,
            ..job
        };
        let mut base_archive = SarArchive::open(output)?;
        for variation in &variations {
            let variation_output = variation_archive_path(output, variation.id);
            write_variation_archive(
                ctx,
                &variation_job,
                &base_list,
                variation,
                &mut base_archive,
                &mut locale_base,
                &variation_output,
            )?;
        }
    }

    if pkg.manifest {
        write_manifest(ctx, pkg, output, dict.as_deref())?;
    }
    Ok(())
}

fn open_locale_base(ctx: &dyn CookContext, pkg: &PackageConfig) -> Result<Option<SarArchive>> {
    if pkg.locale_base_archive.is_empty() {
        return Ok(None);
    }
    let path = ctx.config().archive_path(&pkg.locale_base_archive);
    SarArchive::open(&path).map(Some)
}

/// Union of every delta archive's `(path, stored size, pre-CRC)` tuples.
/// The same tuple appearing twice means the delta archives overlap,
/// which would make skip decisions ambiguous.
fn build_delta_set(ctx: &dyn CookContext, pkg: &PackageConfig) -> Result<HashSet<DeltaKey>> {
    let mut set = HashSet::new();
    for name in &pkg.delta_archives {
        let path = ctx.config().archive_path(name);
        let archive = SarArchive::open(&path)?;
        for (file_path, entry) in archive.entries() {
            let key = DeltaKey {
                path: file_path.clone(),
                compressed_size: entry.compressed_size,
                crc32_pre: entry.crc32_pre,
            };
            if !set.insert(key) {
                return Err(CookError::Archive {
                    path: path.clone(),
                    reason: format!("duplicate delta entry {file_path}"),
                });
            }
        }
    }
    Ok(set)
}

/// Shared inputs for one archive write.
#[derive(Clone, Copy)]
struct ArchiveJob<'a> {
    pkg: &'a PackageConfig,
    dict: Option<&'a [u8]>,
    dict_path: &'a FilePath,
    delta: &'a HashSet<DeltaKey>,
    resolved: &'a HashMap<FilePath, Value>,
}

fn header_seed(ctx: &dyn CookContext, pkg: &PackageConfig, variation: u16) -> HeaderSeed {
    let (major, changelist) = ctx.build_version();
    HeaderSeed {
        game_directory: pkg.game_directory_type,
        variation,
        build_version_major: major,
        build_changelist: changelist,
        supports_directory_queries: pkg.support_directory_queries,
        obfuscated: pkg.obfuscate,
        platform: ctx.platform(),
    }
}

fn write_sar_archive(
    ctx: &dyn CookContext,
    job: &ArchiveJob<'_>,
    list: &[FileListEntry],
    variation: u16,
    locale_base: &mut Option<SarArchive>,
    output: &Path,
) -> Result<()> {
    let mut temp = temp_in_output_dir(ctx, output)?;
    {
        let seed = header_seed(ctx, job.pkg, variation);
        let mut builder = ArchiveBuilder::new(&mut temp, seed, output.to_path_buf())?;
        let mut skipped: u64 = 0;
        for item in list {
            let body = read_file_data(
                ctx,
                job.pkg,
                &item.path,
                locale_base.as_mut(),
                job.resolved,
                None,
            )?;
            if append_cooked(&mut builder, job, item, &body)? {
                skipped += 1;
            }
        }
        if skipped > 0 {
            debug!(output = %output.display(), skipped, "entries skipped by delta archives");
        }
        builder.finish(job.pkg.compression_level())?;
    }
    publish_temp(ctx, output, temp, job.pkg.include_in_source_control)
}

/// Transform one body (compress, obfuscate), apply the delta skip, and
/// append. Returns whether the entry was skipped.
fn append_cooked<W: std::io::Write + std::io::Seek>(
    builder: &mut ArchiveBuilder<W>,
    job: &ArchiveJob<'_>,
    item: &FileListEntry,
    body: &[u8],
) -> Result<bool> {
    let pkg = job.pkg;
    let filename = item.path.relative_filename();
    let crc_pre = crc32(body);
    let uncompressed = body.len() as u64;

    let mut stored = body.to_vec();
    if pkg.compress_files {
        // The dictionary entry itself compresses without the dictionary,
        // or readers could never bootstrap it.
        let with_dict = job.dict.filter(|_| item.path != *job.dict_path);
        let compressed = compress_body(&stored, pkg.compression_level(), with_dict)
            .map_err(|e| CookError::Compression {
                path: item.path.to_string(),
                source: e,
            })?;
        if compressed.len() < stored.len() {
            stored = compressed;
        }
    }

    // Unchanged relative to a delta archive: identity is checked after
    // compression but before obfuscation.
    let key = DeltaKey {
        path: item.path.clone(),
        compressed_size: stored.len() as u64,
        crc32_pre: crc_pre,
    };
    if job.delta.contains(&key) {
        return Ok(true);
    }

    if pkg.obfuscate {
        obfuscate(generate_key(&filename), &mut stored);
    }
    let crc_post = crc32(&stored);

    builder.append(
        filename,
        &stored,
        uncompressed,
        item.modified_time,
        crc_pre,
        crc_post,
    )?;
    Ok(false)
}

fn compress_body(body: &[u8], level: i32, dict: Option<&[u8]>) -> std::io::Result<Vec<u8>> {
    match dict {
        Some(dict) => {
            let mut compressor = zstd::bulk::Compressor::with_dictionary(level, dict)?;
            compressor.compress(body)
        }
        None => zstd::bulk::compress(body, level),
    }
}

/// A variation archive: untouched entries copy byte-for-byte (stored
/// form, sizes, CRCs) from the base archive, touched entries re-cook
/// with the variation's commands applied.
fn write_variation_archive(
    ctx: &dyn CookContext,
    job: &ArchiveJob<'_>,
    list: &[FileListEntry],
    variation: &Variation,
    base_archive: &mut SarArchive,
    locale_base: &mut Option<SarArchive>,
    output: &Path,
) -> Result<()> {
    let mut temp = temp_in_output_dir(ctx, output)?;
    {
        let seed = header_seed(ctx, job.pkg, variation.id);
        let mut builder = ArchiveBuilder::new(&mut temp, seed, output.to_path_buf())?;
        for item in list {
            match variation.commands_for(&item.path) {
                Some(commands) => {
                    let body = read_file_data(
                        ctx,
                        job.pkg,
                        &item.path,
                        locale_base.as_mut(),
                        job.resolved,
                        Some(commands),
                    )?;
                    append_cooked(&mut builder, job, item, &body)?;
                }
                None => {
                    // Entries the base cook delta-skipped have no source
                    // to copy and stay skipped here.
                    let Some(entry) = base_archive.entry(&item.path).cloned() else {
                        continue;
                    };
                    let raw = base_archive.read_raw(entry.offset, entry.compressed_size)?;
                    builder.append(
                        entry.filename.clone(),
                        &raw,
                        entry.uncompressed_size,
                        entry.modified_time,
                        entry.crc32_pre,
                        entry.crc32_post,
                    )?;
                }
            }
        }
        builder.finish(job.pkg.compression_level())?;
    }
    publish_temp(ctx, output, temp, job.pkg.include_in_source_control)
}

/// Produce one entry's pre-transform body.
///
/// Locale base entries come out of the locale base archive; locale patch
/// entries serialize as a diff of the on-disk base file against that
/// archived base. JSON entries honor the package's cook/minify flags and
/// any variation commands. Everything else reads straight from disk.
fn read_file_data(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    path: &FilePath,
    locale_base: Option<&mut SarArchive>,
    resolved: &HashMap<FilePath, Value>,
    commands: Option<&[Value]>,
) -> Result<Vec<u8>> {
    match pkg.file_class(path) {
        FileClass::LocaleBase => {
            let archive = locale_base.ok_or_else(|| {
                CookError::Config(format!(
                    "{}: locale base entry {path} without a LocaleBaseArchive",
                    pkg.name
                ))
            })?;
            let bytes = archive.read_all(path, None)?;
            if pkg.cook_json || pkg.minify_json {
                let value = parse_json(&bytes, path)?;
                serialize_json(pkg, path, &value)
            } else {
                Ok(bytes)
            }
        }
        FileClass::LocalePatch => {
            let archive = locale_base.ok_or_else(|| {
                CookError::Config(format!(
                    "{}: locale patch entry {path} without a LocaleBaseArchive",
                    pkg.name
                ))
            })?;
            // Both sides of the diff come from the base filename: the
            // archived copy is the shipped baseline, the on-disk copy is
            // the updated translation. The patch file itself is a stub.
            let base_path = pkg.locale_base_for(path);
            let base_bytes = archive.read_all(&base_path, None)?;
            let base = parse_json(&base_bytes, &base_path)?;
            let target_bytes = ctx.env().read_all(&base_path)?;
            let target = parse_json(&target_bytes, &base_path)?;
            let diff = crate::datastore::compute_diff(&base, &target);
            serialize_json(pkg, path, &diff)
        }
        FileClass::Normal => {
            let needs_tree = commands.is_some() || pkg.cook_json || pkg.minify_json;
            if path.file_type() == FileType::Json && needs_tree {
                let mut value = match resolved.get(path) {
                    Some(value) => value.clone(),
                    None => parse_json(&ctx.env().read_all(path)?, path)?,
                };
                if let Some(commands) = commands {
                    value = varied_tree(path, &value, commands)?;
                }
                serialize_json(pkg, path, &value)
            } else {
                ctx.env().read_all(path)
            }
        }
    }
}

/// Serialize a JSON tree the way the package ships it: cooked binary,
/// minified text, or pretty text.
fn serialize_json(pkg: &PackageConfig, path: &FilePath, value: &Value) -> Result<Vec<u8>> {
    if pkg.cook_json {
        cook_json(value, pkg.compression_level(), path)
    } else if pkg.minify_json {
        Ok(to_compact_string(value).into_bytes())
    } else {
        serde_json::to_vec_pretty(value).map_err(|e| CookError::Parse {
            path: path.to_string(),
            source: e,
        })
    }
}

/// Manifest variant of the base archive: header + file table + the
/// dictionary blob, no bodies. The header is rewritten so the table
/// immediately follows it and sizes describe the manifest file itself.
fn write_manifest(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    base_output: &Path,
    dict: Option<&[u8]>,
) -> Result<()> {
    let bytes = fs::read(base_output).map_err(|e| CookError::io(base_output, e))?;
    let mut header = PackageFileHeader::decode(&mut &bytes[..])?;

    let table_start = header.table_offset as usize;
    let table_end = table_start + header.table_size as usize;
    let table = bytes.get(table_start..table_end).ok_or_else(|| CookError::Archive {
        path: base_output.to_path_buf(),
        reason: "file table range exceeds archive size".to_string(),
    })?;

    let dict = dict.unwrap_or_default();
    header.table_offset = SAR_HEADER_SIZE;
    header.total_size = SAR_HEADER_SIZE + (table.len() + dict.len()) as u64;

    let mut out = Vec::with_capacity(header.total_size as usize);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(table);
    out.extend_from_slice(dict);

    let stem = base_output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let extension = base_output
        .extension()
        .and_then(|s| s.to_str())
        .map_or(String::new(), |e| format!(".{e}"));
    let path = base_output.with_file_name(format!("{stem}.manifest{extension}"));
    publish_output(ctx, &path, &out, pkg.include_in_source_control)
}

fn temp_in_output_dir(ctx: &dyn CookContext, output: &Path) -> Result<NamedTempFile> {
    let dir = output
        .parent()
        .map_or_else(|| ctx.config().output_dir().to_path_buf(), Path::to_path_buf);
    fs::create_dir_all(&dir).map_err(|e| CookError::io(&dir, e))?;
    NamedTempFile::new_in(&dir).map_err(|e| CookError::io(&dir, e))
}

/// Promote a finished temp file to its final name, bracketed by
/// source-control edit/add/revert-unchanged when requested.
fn publish_temp(
    ctx: &dyn CookContext,
    path: &Path,
    temp: NamedTempFile,
    source_control: bool,
) -> Result<()> {
    if source_control {
        ctx.source_control()
            .open_for_edit(&[path])
            .map_err(CookError::SourceControl)?;
    }
    temp.persist(path)
        .map_err(|e| CookError::io(path, e.error))?;
    if source_control {
        ctx.source_control()
            .open_for_add(&[path])
            .map_err(CookError::SourceControl)?;
        ctx.source_control()
            .revert_unchanged(&[path])
            .map_err(CookError::SourceControl)?;
    }
    Ok(())
}

/// Atomic write of generated bytes (dictionaries, manifests) with the
/// same source-control bracket as archives.
pub(crate) fn publish_output(
    ctx: &dyn CookContext,
    path: &Path,
    bytes: &[u8],
    source_control: bool,
) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CookError::io(dir, e))?;
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| CookError::io(dir, e))?;
    temp.write_all(bytes).map_err(|e| CookError::io(path, e))?;
    publish_temp(ctx, path, temp, source_control)
}
