//! Content tree layout and filesystem queries.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sar_schema::{FilePath, FileType, GameDirectory, Platform};
use walkdir::WalkDir;

use crate::error::{CookError, Result};

/// Resolved roots of the cooked content tree plus the authored source
/// tree, for one platform.
///
/// Cooked files live under the config/content roots and are what the
/// archives package; the source root holds the authored originals and is
/// consulted only for stale-content culling ([`ContentEnv::exists_in_source`]).
#[derive(Debug, Clone)]
pub struct ContentEnv {
    config_dir: PathBuf,
    content_dir: PathBuf,
    source_dir: PathBuf,
    platform: Platform,
}

impl ContentEnv {
    /// Build an environment from explicit roots.
    pub fn new(
        config_dir: impl Into<PathBuf>,
        content_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        platform: Platform,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            content_dir: content_dir.into(),
            source_dir: source_dir.into(),
            platform,
        }
    }

    /// Platform this environment cooks for.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Root directory for a game directory enum.
    pub fn root_dir(&self, directory: GameDirectory) -> &Path {
        match directory {
            GameDirectory::Config => &self.config_dir,
            // Unknown has no root of its own; resolve against content so
            // diagnostics still show a usable path.
            GameDirectory::Content | GameDirectory::Unknown => &self.content_dir,
        }
    }

    /// Absolute filesystem path of a content path.
    pub fn absolute_path(&self, path: &FilePath) -> PathBuf {
        self.root_dir(path.directory()).join(path.relative_filename())
    }

    /// Whether the cooked file exists on disk.
    pub fn exists(&self, path: &FilePath) -> bool {
        self.absolute_path(path).is_file()
    }

    /// Modification time in seconds since the Unix epoch, or `None` when
    /// the file does not exist.
    pub fn modified_time(&self, path: &FilePath) -> Option<u64> {
        let meta = fs::metadata(self.absolute_path(path)).ok()?;
        let modified = meta.modified().ok()?;
        Some(
            modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        )
    }

    /// File size in bytes, or 0 when the file does not exist.
    pub fn file_size(&self, path: &FilePath) -> u64 {
        fs::metadata(self.absolute_path(path))
            .map(|m| m.len())
            .unwrap_or_default()
    }

    /// Read the whole cooked file.
    pub fn read_all(&self, path: &FilePath) -> Result<Vec<u8>> {
        let abs = self.absolute_path(path);
        fs::read(&abs).map_err(|e| CookError::io(abs, e))
    }

    /// Whether any authored source file with this path's stem still
    /// exists. Used to cull cooked files whose source was deleted.
    pub fn exists_in_source(&self, path: &FilePath) -> bool {
        let relative = path.relative_without_extension();
        let (dir, stem) = relative
            .rsplit_once('/')
            .map_or(("", relative), |(d, s)| (d, s));
        let source_dir = self.source_dir.join(dir);
        let Ok(listing) = fs::read_dir(&source_dir) else {
            return false;
        };
        for entry in listing.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let candidate_stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
            if candidate_stem.eq_ignore_ascii_case(stem) {
                return true;
            }
        }
        false
    }

    /// Absolute directory of a path's authored source.
    pub fn source_dir_of(&self, path: &FilePath) -> PathBuf {
        let relative = path.relative_without_extension();
        let dir = relative.rsplit_once('/').map_or("", |(d, _)| d);
        self.source_dir.join(dir)
    }

    /// Recursively list cooked files under `root` (relative to the game
    /// directory), optionally restricted to one extension (with leading
    /// dot). Results come back as normalized [`FilePath`]s in sorted
    /// order so cooks are deterministic across filesystems.
    pub fn list_files(
        &self,
        directory: GameDirectory,
        root: &str,
        extension: Option<&str>,
    ) -> Result<Vec<FilePath>> {
        let base = self.root_dir(directory).to_path_buf();
        let search = if root.is_empty() {
            base.clone()
        } else {
            base.join(root)
        };
        if !search.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&search).sort_by_file_name() {
            let entry = entry.map_err(|e| CookError::Archive {
                path: search.clone(),
                reason: format!("directory listing failed: {e}"),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let Some(relative) = relative.to_str() else {
                continue;
            };
            if let Some(ext) = extension {
                let matches = relative
                    .rsplit_once('.')
                    .is_some_and(|(_, e)| format!(".{e}").eq_ignore_ascii_case(ext));
                if !matches {
                    continue;
                }
            }
            out.push(FilePath::new(directory, relative));
        }
        Ok(out)
    }

    /// List every config-root JSON file, the roots of the dependency trace.
    pub fn list_config_json(&self) -> Result<Vec<FilePath>> {
        self.list_files(
            GameDirectory::Config,
            "",
            Some(FileType::Json.cooked_extension()),
        )
    }
}
