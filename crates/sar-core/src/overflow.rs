//! Size-budget overflow partitioning.
//!
//! When a package configures an overflow archive and a byte budget, the
//! file list is split so the base archive (plus any peer archives named
//! by `OverflowConsider`) fits the budget; evicted entries go into the
//! overflow archive instead. Only high-resolution texture mips and sound
//! banks are eligible, and entries named by the training-data file are
//! pinned to the base archive.

use std::collections::{HashMap, HashSet};
use std::fs;

use sar_schema::{FilePath, FileType, GameDirectory};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PackageConfig;
use crate::context::CookContext;
use crate::error::{CookError, Result};
use crate::filelist::{FileListEntry, apply_package_order};

/// The file list split into its base and overflow halves, both in the
/// package's configured order.
#[derive(Debug, Default)]
pub struct OverflowOutcome {
    /// Entries the base archive keeps.
    pub base: Vec<FileListEntry>,
    /// Entries evicted to the overflow archive.
    pub overflow: Vec<FileListEntry>,
}

fn is_eligible(file_type: FileType) -> bool {
    matches!(
        file_type,
        FileType::Texture0
            | FileType::Texture1
            | FileType::Texture2
            | FileType::Texture3
            | FileType::SoundBank
    )
}

/// Pinning compares with texture mips collapsed, so a training entry
/// naming any mip level pins the whole group.
fn pin_key(path: &FilePath) -> FilePath {
    if path.file_type().is_texture() {
        path.with_type(FileType::Texture0)
    } else {
        path.clone()
    }
}

/// Load the training-data exclusion set: every file reference anywhere
/// in the JSON tree.
fn load_exclusion_set(ctx: &dyn CookContext, pkg: &PackageConfig) -> Result<HashSet<FilePath>> {
    if pkg.overflow_training_data.is_empty() {
        return Ok(HashSet::new());
    }
    let path = FilePath::from_reference(&pkg.overflow_training_data)
        .unwrap_or_else(|| FilePath::new(GameDirectory::Config, &pkg.overflow_training_data));
    let bytes = ctx.env().read_all(&path)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| CookError::Parse {
        path: path.to_string(),
        source: e,
    })?;

    let mut set = HashSet::new();
    collect_references(&value, &mut set);
    Ok(set)
}

fn collect_references(value: &Value, out: &mut HashSet<FilePath>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, out);
            }
        }
        Value::String(s) => {
            if let Some(path) = FilePath::from_reference(s) {
                out.insert(pin_key(&path));
            }
        }
        _ => {}
    }
}

/// Partition `list` against the package's overflow budget.
///
/// With no overflow configured, or when the total already fits, the list
/// passes through untouched. Candidates are ranked mid-resolution mips
/// first, then by descending size, and evicted until the base fits; if
/// every eligible byte is reclaimed and the base still exceeds the
/// budget, the cook fails rather than shipping an oversized archive.
pub fn resolve_overflow(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    list: Vec<FileListEntry>,
) -> Result<OverflowOutcome> {
    if pkg.overflow.is_empty() {
        return Ok(OverflowOutcome {
            base: list,
            overflow: Vec::new(),
        });
    }
    if pkg.overflow_target_bytes == 0 {
        return Err(CookError::Config(format!(
            "{}: overflow archive \"{}\" configured without OverflowTargetBytes",
            pkg.name, pkg.overflow
        )));
    }

    // Peer archives named by OverflowConsider count toward the budget
    // and must already exist on disk.
    let mut considered: u64 = 0;
    for name in &pkg.overflow_consider {
        let archive = ctx.config().archive_path(name);
        let meta = fs::metadata(&archive)
            .map_err(|_| CookError::MissingFile(archive.display().to_string()))?;
        considered += meta.len();
    }

    let total: u64 = considered + list.iter().map(|e| e.uncompressed_size).sum::<u64>();
    if total <= pkg.overflow_target_bytes {
        debug!(
            package = %pkg.name,
            total,
            target = pkg.overflow_target_bytes,
            "base archive fits its overflow budget"
        );
        return Ok(OverflowOutcome {
            base: list,
            overflow: Vec::new(),
        });
    }

    let pinned = load_exclusion_set(ctx, pkg)?;
    let required = total - pkg.overflow_target_bytes;

    let mut skipped_pinned = (0u64, 0u64);
    let mut skipped_empty: u64 = 0;
    let mut candidates: Vec<(usize, u64)> = Vec::new();
    for (index, entry) in list.iter().enumerate() {
        if !is_eligible(entry.path.file_type()) {
            continue;
        }
        if entry.uncompressed_size == 0 {
            skipped_empty += 1;
            continue;
        }
        if pinned.contains(&pin_key(&entry.path)) {
            skipped_pinned.0 += 1;
            skipped_pinned.1 += entry.uncompressed_size;
            continue;
        }
        candidates.push((index, entry.uncompressed_size));
    }
    if skipped_pinned.0 > 0 || skipped_empty > 0 {
        debug!(
            package = %pkg.name,
            pinned = skipped_pinned.0,
            pinned_bytes = skipped_pinned.1,
            empty = skipped_empty,
            "overflow candidates skipped"
        );
    }

    let available: u64 = candidates.iter().map(|&(_, cost)| cost).sum();
    if available < required {
        return Err(CookError::OverflowUnreachable {
            package: pkg.name.clone(),
            overflow: pkg.overflow.clone(),
            available,
            required,
            target: pkg.overflow_target_bytes,
        });
    }

    // Mid-resolution mips go first so the archive keeps the full-size
    // art longest; within a tier, biggest savings first.
    candidates.sort_by_key(|&(index, cost)| {
        let tier = u8::from(list[index].path.file_type() != FileType::Texture1);
        (tier, std::cmp::Reverse(cost))
    });

    let mut reclaimed: u64 = 0;
    let mut selected: Vec<usize> = Vec::new();
    for (index, cost) in candidates {
        if reclaimed >= required {
            break;
        }
        reclaimed += cost;
        selected.push(index);
    }
    selected.sort_unstable();

    let mut base = Vec::with_capacity(list.len() - selected.len());
    let mut overflow = Vec::with_capacity(selected.len());
    let mut next = selected.into_iter().peekable();
    for (index, entry) in list.into_iter().enumerate() {
        if next.peek() == Some(&index) {
            next.next();
            overflow.push(entry);
        } else {
            base.push(entry);
        }
    }

    let mut by_type: HashMap<FileType, (u64, u64)> = HashMap::new();
    for entry in &overflow {
        let slot = by_type.entry(entry.path.file_type()).or_default();
        slot.0 += 1;
        slot.1 += entry.uncompressed_size;
    }
    for (file_type, (count, bytes)) in &by_type {
        info!(
            package = %pkg.name,
            overflow = %pkg.overflow,
            ?file_type,
            count,
            bytes,
            "entries moved to overflow archive"
        );
    }
    info!(
        package = %pkg.name,
        reclaimed,
        required,
        target = pkg.overflow_target_bytes,
        "overflow partition complete"
    );

    apply_package_order(pkg, &mut base);
    apply_package_order(pkg, &mut overflow);
    Ok(OverflowOutcome { base, overflow })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use sar_schema::Platform;

    use super::*;
    use crate::config::PackageCookConfig;
    use crate::context::DiskCookContext;
    use crate::env::ContentEnv;

    fn pkg(target: u64) -> PackageConfig {
        let mut p = PackageConfig {
            name: "Textures".to_string(),
            overflow: "TexturesOverflow".to_string(),
            overflow_target_bytes: target,
            ..PackageConfig::default()
        };
        p.post_load(false).unwrap();
        p
    }

    fn context(dir: &std::path::Path) -> DiskCookContext {
        let env = ContentEnv::new(
            dir.join("Config"),
            dir.join("Content"),
            dir.join("Source"),
            Platform::Pc,
        );
        let config = PackageCookConfig::for_tests(dir.join("pkg.json"), Platform::Pc, Vec::new());
        DiskCookContext::new(config, env)
    }

    fn entry(rel: &str, size: u64) -> FileListEntry {
        FileListEntry::new(FilePath::content(rel), 0, size)
    }

    #[test]
    fn test_no_overflow_configured_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let p = PackageConfig::default();
        let list = vec![entry("a/x.sif0", 100)];
        let out = resolve_overflow(&ctx, &p, list).unwrap();
        assert_eq!(out.base.len(), 1);
        assert!(out.overflow.is_empty());
    }

    #[test]
    fn test_missing_target_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let p = pkg(0);
        let result = resolve_overflow(&ctx, &p, vec![entry("a/x.sif0", 100)]);
        assert!(matches!(result, Err(CookError::Config(_))));
    }

    #[test]
    fn test_under_budget_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let p = pkg(1000);
        let out = resolve_overflow(&ctx, &p, vec![entry("a/x.sif0", 100)]).unwrap();
        assert!(out.overflow.is_empty());
    }

    #[test]
    fn test_partition_prefers_mid_mips_then_size() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let p = pkg(250);
        let list = vec![
            entry("a/big.sif0", 200),
            entry("a/mid.sif1", 50),
            entry("audio/music.bank", 100),
            entry("chat.fcn", 50), // ineligible type
        ];
        // Total 400, target 250: evict mid.sif1 (tier first) then the
        // largest remaining candidate.
        let out = resolve_overflow(&ctx, &p, list).unwrap();
        let moved: Vec<String> = out.overflow.iter().map(|e| e.path.to_string()).collect();
        assert!(moved.iter().any(|m| m.contains("mid.sif1")));
        assert!(moved.iter().any(|m| m.contains("big.sif0")));
        assert_eq!(out.overflow.len(), 2);
        assert_eq!(out.base.len(), 2);
    }

    #[test]
    fn test_unreachable_budget_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let p = pkg(10);
        // Only 100 eligible bytes, but 190 must go.
        let list = vec![entry("a/x.sif0", 100), entry("chat.fcn", 100)];
        let result = resolve_overflow(&ctx, &p, list);
        match result {
            Err(CookError::OverflowUnreachable {
                available,
                required,
                ..
            }) => {
                assert_eq!(available, 100);
                assert_eq!(required, 190);
            }
            other => panic!("expected OverflowUnreachable, got {other:?}"),
        }
    }

    #[test]
    fn test_training_data_pins_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Config")).unwrap();
        fs::write(
            dir.path().join("Config/overflow_training.json"),
            br#"["content://a/pinned.sif0"]"#,
        )
        .unwrap();
        let ctx = context(dir.path());
        let mut p = pkg(400);
        p.overflow_training_data = "config://overflow_training.json".to_string();

        // Pinned entry would otherwise be first choice by size.
        let list = vec![entry("a/pinned.sif2", 300), entry("a/other.sif0", 300)];
        let out = resolve_overflow(&ctx, &p, list).unwrap();
        assert_eq!(out.overflow.len(), 1);
        assert!(out.overflow[0].path.to_string().contains("other"));
    }

    #[test]
    fn test_consider_archives_count_toward_budget() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Peer.sar"), vec![0u8; 90]).unwrap();
        let ctx = context(dir.path());
        let mut p = pkg(100);
        p.overflow_consider = vec!["Peer".to_string()];

        // 90 peer + 50 list = 140 > 100, so 40 must move.
        let out = resolve_overflow(&ctx, &p, vec![entry("a/x.sif0", 50)]).unwrap();
        assert_eq!(out.overflow.len(), 1);

        // Missing peer archive is an error.
        let mut p2 = pkg(100);
        p2.overflow_consider = vec!["Ghost".to_string()];
        let result = resolve_overflow(&ctx, &p2, vec![entry("a/x.sif0", 50)]);
        assert!(matches!(result, Err(CookError::MissingFile(_))));
    }
}
