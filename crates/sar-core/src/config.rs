//! Package configuration schema and filtering.
//!
//! Deserialized from the package JSON with PascalCase field names, then
//! normalized once in [`PackageConfig::post_load`] (wildcard compilation,
//! extension-set build, local-build overrides). Immutable afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use sar_schema::{FilePath, FileType, GameDirectory, Platform};
use serde::Deserialize;

use crate::error::{CookError, Result};

/// zstd level for fast/local builds.
pub const COMPRESSION_LEVEL_FAST: i32 = 1;
/// zstd level for shipping builds.
pub const COMPRESSION_LEVEL_BEST: i32 = 19;

/// Outcome of testing a path against a package's filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Not matched by the include list (or wrong extension).
    NotIncluded,
    /// Matched an include pattern but explicitly excluded.
    IncludedButExcluded,
    /// Included, no exclusion applies.
    Pass,
    /// Excluded, then re-admitted by an exemption pattern.
    PassWithExemption,
}

impl FilterResult {
    /// Whether the result counts as inclusion.
    pub fn is_included(self) -> bool {
        matches!(self, Self::Pass | Self::PassWithExemption)
    }
}

/// Special handling classes for entries, derived from their filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Ordinary entry, read from disk.
    Normal,
    /// Localization base: read verbatim from the locale base archive.
    LocaleBase,
    /// Localization patch: serialized as a diff against the base archive.
    LocalePatch,
}

/// Per-package policy, built once from the deserialized JSON.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct PackageConfig {
    /// Package (and output archive) name.
    pub name: String,
    /// Relative root under the game directory for search patterns.
    pub root: String,
    /// Paths always included, bypassing every filter.
    pub additional_includes: Vec<String>,
    /// Whether to zstd-compress file bodies.
    pub compress_files: bool,
    /// Whether to re-serialize JSON entries into cooked binary form.
    pub cook_json: bool,
    /// Whether to minify JSON entries (compact serialization).
    pub minify_json: bool,
    /// Override for the output extension; empty means `.sar`/`.zip`.
    pub custom_sar_extension: String,
    /// Archives whose unchanged entries this package skips (delta cook).
    pub delta_archives: Vec<String>,
    /// Wildcards that re-admit explicitly excluded files.
    pub exclude_exemptions: Vec<String>,
    /// Exclusion wildcards.
    pub exclude_files: Vec<String>,
    /// Allowed extensions (with leading dot); maps to a `FileType` set.
    pub extensions: Vec<String>,
    /// Directory root of every entry in this package.
    pub game_directory_type: GameDirectory,
    /// Inclusion wildcards; empty means include everything.
    pub include_files: Vec<String>,
    /// Archive holding the authoritative localization base files.
    pub locale_base_archive: String,
    /// Filename of locale base files (e.g. `locale.json`).
    pub locale_base_filename: String,
    /// Filename of locale patch files (e.g. `locale_patch.json`).
    pub locale_patch_filename: String,
    /// Directory search patterns (`*.*` or `*.ext`) for non-dependency files.
    pub non_dependency_search_patterns: Vec<String>,
    /// Whether file bodies are XOR-obfuscated.
    pub obfuscate: bool,
    /// Whether the gathered dependency closure populates this package.
    pub populate_from_dependencies: bool,
    /// Whether the archive supports runtime directory queries.
    pub support_directory_queries: bool,
    /// Write a `.zip` container instead of `.sar`.
    pub zip_archive: bool,
    /// Sort entries by modified time instead of the default type order.
    pub sort_by_modified_time: bool,
    /// Whether outputs are checked in/out of source control.
    pub include_in_source_control: bool,
    /// Trained dictionary size in bytes; 0 disables training.
    pub compression_dictionary_size: usize,
    /// Whether compression uses a shared trained dictionary.
    pub use_compression_dictionary: bool,
    /// Overflow archive name; empty disables overflow processing.
    pub overflow: String,
    /// Byte budget the base archive must fit within.
    pub overflow_target_bytes: u64,
    /// JSON file of path references that must never overflow.
    pub overflow_training_data: String,
    /// Peer archives whose on-disk sizes count toward the budget.
    pub overflow_consider: Vec<String>,
    /// Variation source files applied over the base archive.
    pub variations: Vec<String>,
    /// Skip this package entirely in local builds.
    pub exclude_from_local: bool,
    /// Also emit a header+table manifest archive for remote inspection.
    pub manifest: bool,

    // Derived in post_load.
    #[serde(skip)]
    pub(crate) include_wildcards: Vec<Pattern>,
    #[serde(skip)]
    pub(crate) exclude_wildcards: Vec<Pattern>,
    #[serde(skip)]
    pub(crate) exemption_wildcards: Vec<Pattern>,
    #[serde(skip)]
    pub(crate) file_type_set: HashSet<FileType>,
    #[serde(skip)]
    pub(crate) locale_base_stem: String,
    #[serde(skip)]
    pub(crate) locale_patch_stem: String,
    #[serde(skip)]
    pub(crate) compression_level: i32,
}

fn compile_wildcards(patterns: &[String], package: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|s| {
            Pattern::new(&s.to_ascii_lowercase().replace('\\', "/")).map_err(|e| {
                CookError::Config(format!("{package}: invalid wildcard \"{s}\": {e}"))
            })
        })
        .collect()
}

fn matches_any(wildcards: &[Pattern], path: &FilePath) -> bool {
    let name = path.relative_filename();
    wildcards.iter().any(|w| w.matches(&name))
}

/// Strip the extension from a configured locale filename.
fn stem_of(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    lower.rsplit_once('.').map_or(lower.clone(), |(s, _)| s.to_string())
}

impl PackageConfig {
    /// One-time normalization after deserialization. `local` selects the
    /// fast build profile: fastest compression, no dictionary.
    pub fn post_load(&mut self, local: bool) -> Result<()> {
        if local {
            self.use_compression_dictionary = false;
            self.compression_dictionary_size = 0;
            self.compression_level = COMPRESSION_LEVEL_FAST;
        } else {
            self.compression_level = COMPRESSION_LEVEL_BEST;
        }

        // ExcludeFromLocal is an opt-in; outside local builds it never
        // applies, so resolve it to a plain runtime determiner here.
        if self.exclude_from_local && !local {
            self.exclude_from_local = false;
        }

        self.file_type_set = self
            .extensions
            .iter()
            .map(|s| FileType::from_extension(s.trim_start_matches('.')))
            .collect();

        self.locale_base_stem = if self.locale_base_filename.is_empty() {
            String::new()
        } else {
            stem_of(&self.locale_base_filename)
        };
        self.locale_patch_stem = if self.locale_patch_filename.is_empty() {
            String::new()
        } else {
            stem_of(&self.locale_patch_filename)
        };

        self.include_wildcards = compile_wildcards(&self.include_files, &self.name)?;
        self.exclude_wildcards = compile_wildcards(&self.exclude_files, &self.name)?;
        self.exemption_wildcards = compile_wildcards(&self.exclude_exemptions, &self.name)?;
        Ok(())
    }

    /// zstd level selected by `post_load`.
    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    /// Output extension for this package's archives.
    pub fn archive_extension(&self) -> &str {
        if self.custom_sar_extension.is_empty() {
            if self.zip_archive { ".zip" } else { ".sar" }
        } else {
            &self.custom_sar_extension
        }
    }

    /// Test a path against the include/exclude/exemption chain. The
    /// extension allow-list is checked first; a type outside the set is
    /// never included.
    pub fn test_filters(&self, path: &FilePath) -> FilterResult {
        if !self.file_type_set.is_empty() && !self.file_type_set.contains(&path.file_type()) {
            return FilterResult::NotIncluded;
        }
        if self.include_wildcards.is_empty() || matches_any(&self.include_wildcards, path) {
            if self.exclude_wildcards.is_empty() || !matches_any(&self.exclude_wildcards, path) {
                FilterResult::Pass
            } else if matches_any(&self.exemption_wildcards, path) {
                FilterResult::PassWithExemption
            } else {
                FilterResult::IncludedButExcluded
            }
        } else {
            FilterResult::NotIncluded
        }
    }

    /// Whether the package includes this path.
    pub fn should_include_file(&self, path: &FilePath) -> bool {
        self.test_filters(path).is_included()
    }

    /// Classify an entry by its locale naming convention. Only JSON
    /// files participate.
    pub fn file_class(&self, path: &FilePath) -> FileClass {
        if path.file_type() != FileType::Json {
            return FileClass::Normal;
        }
        if self.locale_base_stem.is_empty() && self.locale_patch_stem.is_empty() {
            return FileClass::Normal;
        }
        let stem = path.relative_without_extension();
        if !self.locale_base_stem.is_empty() && stem.ends_with(&self.locale_base_stem) {
            return FileClass::LocaleBase;
        }
        if !self.locale_patch_stem.is_empty() && stem.ends_with(&self.locale_patch_stem) {
            return FileClass::LocalePatch;
        }
        FileClass::Normal
    }

    /// The locale base path anchoring a patch entry: the base filename in
    /// the patch entry's directory.
    pub fn locale_base_for(&self, patch: &FilePath) -> FilePath {
        let stem = patch.relative_without_extension();
        let dir = stem.rsplit_once('/').map_or("", |(d, _)| d);
        let name = if dir.is_empty() {
            self.locale_base_filename.clone()
        } else {
            format!("{dir}/{}", self.locale_base_filename)
        };
        FilePath::config(&name)
    }
}

/// Top-level cook configuration: platform, config-root exclusions, and
/// the ordered package list. One instance per cook invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PackageCookConfig {
    /// Platform this configuration targets.
    pub platform: Platform,
    /// Wildcards of config files skipped by the dependency trace.
    #[serde(default)]
    pub config_directory_excludes: Vec<String>,
    /// Packages in cook order.
    #[serde(default)]
    pub packages: Vec<PackageConfig>,

    #[serde(skip)]
    config_exclude_wildcards: Vec<Pattern>,
    #[serde(skip)]
    config_path: PathBuf,
}

impl PackageCookConfig {
    /// Load and normalize a cook configuration from disk.
    pub fn load(path: &Path, local: bool) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| CookError::io(path, e))?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|e| CookError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.config_path = path.to_path_buf();
        config.config_exclude_wildcards =
            compile_wildcards(&config.config_directory_excludes, "PackageCookConfig")?;
        for pkg in &mut config.packages {
            pkg.post_load(local)?;
        }
        Ok(config)
    }

    /// Directory archives are written into (the config file's directory).
    pub fn output_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Whether the dependency trace skips this config file.
    pub fn is_excluded_from_configs(&self, path: &FilePath) -> bool {
        matches_any(&self.config_exclude_wildcards, path)
    }

    /// Absolute path of a peer archive named by delta/overflow settings.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        let file = if name.to_ascii_lowercase().ends_with(".sar") {
            name.to_string()
        } else {
            format!("{name}.sar")
        };
        self.output_dir().join(file)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(path: PathBuf, platform: Platform, packages: Vec<PackageConfig>) -> Self {
        Self {
            platform,
            config_directory_excludes: Vec::new(),
            packages,
            config_exclude_wildcards: Vec::new(),
            config_path: path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(include: &[&str], exclude: &[&str], exempt: &[&str], ext: &[&str]) -> PackageConfig {
        let mut p = PackageConfig {
            name: "Test".to_string(),
            include_files: include.iter().map(ToString::to_string).collect(),
            exclude_files: exclude.iter().map(ToString::to_string).collect(),
            exclude_exemptions: exempt.iter().map(ToString::to_string).collect(),
            extensions: ext.iter().map(ToString::to_string).collect(),
            ..PackageConfig::default()
        };
        p.post_load(false).unwrap();
        p
    }

    #[test]
    fn test_filter_states() {
        let p = pkg(&["authored/*"], &["authored/debug/*"], &["authored/debug/keep*"], &[]);
        assert_eq!(
            p.test_filters(&FilePath::content("authored/ui/a.sif0")),
            FilterResult::Pass
        );
        assert_eq!(
            p.test_filters(&FilePath::content("authored/debug/a.sif0")),
            FilterResult::IncludedButExcluded
        );
        assert_eq!(
            p.test_filters(&FilePath::content("authored/debug/keep_a.sif0")),
            FilterResult::PassWithExemption
        );
        assert_eq!(
            p.test_filters(&FilePath::content("other/a.sif0")),
            FilterResult::NotIncluded
        );
    }

    #[test]
    fn test_extension_allow_list() {
        let p = pkg(&[], &[], &[], &[".json", ".bank"]);
        assert!(p.should_include_file(&FilePath::config("chat.json")));
        assert!(p.should_include_file(&FilePath::content("audio/music.bank")));
        assert!(!p.should_include_file(&FilePath::content("a/b.sif0")));
    }

    #[test]
    fn test_empty_include_list_passes_everything() {
        let p = pkg(&[], &[], &[], &[]);
        assert!(p.should_include_file(&FilePath::content("anything/x.fcn")));
    }

    #[test]
    fn test_local_build_profile() {
        let mut p = PackageConfig {
            use_compression_dictionary: true,
            compression_dictionary_size: 65536,
            ..PackageConfig::default()
        };
        p.post_load(true).unwrap();
        assert!(!p.use_compression_dictionary);
        assert_eq!(p.compression_dictionary_size, 0);
        assert_eq!(p.compression_level(), COMPRESSION_LEVEL_FAST);

        let mut p = PackageConfig::default();
        p.post_load(false).unwrap();
        assert_eq!(p.compression_level(), COMPRESSION_LEVEL_BEST);
    }

    #[test]
    fn test_locale_file_class() {
        let mut p = PackageConfig {
            locale_base_filename: "locale.json".to_string(),
            locale_patch_filename: "locale_patch.json".to_string(),
            ..PackageConfig::default()
        };
        p.post_load(false).unwrap();
        assert_eq!(
            p.file_class(&FilePath::config("loc/en/locale.json")),
            FileClass::LocaleBase
        );
        assert_eq!(
            p.file_class(&FilePath::config("loc/en/locale_patch.json")),
            FileClass::LocalePatch
        );
        assert_eq!(
            p.file_class(&FilePath::config("loc/en/other.json")),
            FileClass::Normal
        );
        // Only JSON participates.
        assert_eq!(
            p.file_class(&FilePath::content("loc/en/locale.bank")),
            FileClass::Normal
        );
        assert_eq!(
            p.locale_base_for(&FilePath::config("loc/en/locale_patch.json")),
            FilePath::config("loc/en/locale.json")
        );
    }

    #[test]
    fn test_config_deserializes_pascal_case() {
        let json = r#"{
            "Platform": "PC",
            "ConfigDirectoryExcludes": ["debug/*"],
            "Packages": [{
                "Name": "Config",
                "GameDirectoryType": "Config",
                "Extensions": [".json"],
                "CompressFiles": true,
                "Obfuscate": true,
                "PopulateFromDependencies": true
            }]
        }"#;
        let config: PackageCookConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.platform, Platform::Pc);
        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.packages[0].game_directory_type, GameDirectory::Config);
        assert!(config.packages[0].compress_files);
    }
}
