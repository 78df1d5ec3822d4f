//! Pipeline error type.

use std::path::PathBuf;

use sar_schema::{FilePath, wire::WireError};

/// Errors produced by the cooking pipeline.
///
/// Failures are terminal for the whole batch: the task aborts remaining
/// packages rather than attempting partial recovery. Every failure path
/// logs the offending path before the error propagates.
#[derive(Debug, thiserror::Error)]
pub enum CookError {
    /// Read/write/seek failure against a named filesystem path.
    #[error("io failure on {path}: {source}")]
    Io {
        /// Filesystem path of the failing operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed config or content JSON.
    #[error("failed parsing {path}: {source}")]
    Parse {
        /// Offending file, as a content reference.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Malformed binary asset encountered during a dependency scan.
    #[error("dependency scan of {path}: {reason}")]
    AssetScan {
        /// Offending asset.
        path: FilePath,
        /// What went wrong.
        reason: String,
    },

    /// One or more referenced files do not exist. Aggregated across the
    /// whole traversal so a single run reports every miss.
    #[error("{0} missing dependencies (see log for the full set)")]
    MissingDependencies(usize),

    /// Compression or decompression failure.
    #[error("compression failure on {path}: {source}")]
    Compression {
        /// Offending file.
        path: String,
        /// Underlying zstd error.
        #[source]
        source: std::io::Error,
    },

    /// The overflow budget cannot be met with the eligible candidates.
    #[error(
        "{package}: overflow archive \"{overflow}\" has only {available} bytes available, \
         need at least {required} bytes to achieve target base size of {target} bytes"
    )]
    OverflowUnreachable {
        /// Package name.
        package: String,
        /// Overflow archive name.
        overflow: String,
        /// Bytes reclaimable from eligible, non-excluded candidates.
        available: u64,
        /// Bytes that had to be reclaimed.
        required: u64,
        /// Configured byte budget.
        target: u64,
    },

    /// Malformed variation file or unresolvable append target.
    #[error("variation {file} (line {line}): {reason}")]
    Variation {
        /// Variation source file.
        file: String,
        /// 1-based line number, 0 when the error is not line-specific.
        line: u32,
        /// What went wrong.
        reason: String,
    },

    /// Invalid or inconsistent package configuration.
    #[error("config: {0}")]
    Config(String),

    /// A required input file does not exist.
    #[error("{0} does not exist")]
    MissingFile(String),

    /// Corrupt or incompatible `.sar` structure.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Failure in an archive body check.
    #[error("{path}: {reason}")]
    Archive {
        /// Archive file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Source-control client failure while finalizing an output.
    #[error("source control: {0}")]
    SourceControl(#[source] anyhow::Error),
}

impl CookError {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the pipeline.
pub type Result<T, E = CookError> = std::result::Result<T, E>;
