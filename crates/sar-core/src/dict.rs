//! Shared compression dictionary handling.
//!
//! Packages that compress many small, similar files train a zstd
//! dictionary over their file list and ship it inside the archive as an
//! ordinary entry (`pkgcdict_<platform>.dat`), so runtime readers can
//! decompress without side-band data. Variation cooks never retrain;
//! they reuse the dictionary the base cook published.

use sar_schema::{FilePath, GameDirectory, Platform};
use tracing::info;

use crate::config::PackageConfig;
use crate::context::CookContext;
use crate::error::{CookError, Result};
use crate::filelist::FileListEntry;
use crate::task::publish_output;

/// Canonical dictionary path for a game directory and platform.
pub fn dict_file_path(directory: GameDirectory, platform: Platform) -> FilePath {
    FilePath::new(directory, &format!("pkgcdict_{}.dat", platform.name()))
}

/// Resolve the dictionary a package cook should compress with.
///
/// Returns `None` when the package does not use one. Otherwise the
/// dictionary is trained from the file list and published to the content
/// tree (when absent or when regeneration is forced), or read back from
/// disk.
pub fn resolve_dictionary(
    ctx: &dyn CookContext,
    pkg: &PackageConfig,
    list: &[FileListEntry],
    variation: bool,
) -> Result<Option<Vec<u8>>> {
    if !pkg.compress_files || !pkg.use_compression_dictionary {
        return Ok(None);
    }

    let dict_path = dict_file_path(pkg.game_directory_type, ctx.platform());
    let exists = ctx.env().exists(&dict_path);

    if variation {
        // The base cook must have published it already.
        if !exists {
            return Err(CookError::MissingFile(format!(
                "{}: compression dictionary {dict_path}",
                pkg.name
            )));
        }
        return ctx.env().read_all(&dict_path).map(Some);
    }

    let train = pkg.compression_dictionary_size > 0
        && (ctx.force_dict_generation() || !exists);
    if !train {
        return ctx.env().read_all(&dict_path).map(Some);
    }

    let mut samples = Vec::new();
    let mut sizes = Vec::new();
    for entry in list {
        if entry.path == dict_path || !ctx.env().exists(&entry.path) {
            continue;
        }
        let body = ctx.env().read_all(&entry.path)?;
        sizes.push(body.len());
        samples.extend_from_slice(&body);
    }
    if samples.is_empty() {
        return Ok(None);
    }

    let dict = zstd::dict::from_continuous(&samples, &sizes, pkg.compression_dictionary_size)
        .map_err(|e| CookError::Compression {
            path: dict_path.to_string(),
            source: e,
        })?;
    info!(
        package = %pkg.name,
        dictionary = %dict_path,
        samples = sizes.len(),
        bytes = dict.len(),
        "trained compression dictionary"
    );

    let absolute = ctx.env().absolute_path(&dict_path);
    publish_output(ctx, &absolute, &dict, pkg.include_in_source_control)?;
    Ok(Some(dict))
}
