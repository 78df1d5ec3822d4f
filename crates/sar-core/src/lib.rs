//! Asset cooking pipeline.
//!
//! Turns a tree of source content (JSON configuration, textures, audio
//! banks, animation and UI assets) into versioned `.sar` archives, with
//! delta/patch generation, size-budget overflow partitioning, package
//! variations, and an alternate `.zip` container.
//!
//! Data flows strictly downward: configuration → dependency set → file
//! list → (base, overflow) → serialized archive(s). See [`task`] for the
//! orchestrator that drives the stages in order.

pub mod config;
pub mod context;
pub mod datastore;
pub mod dict;
pub mod env;
pub mod error;
pub mod filelist;
pub mod gather;
pub mod overflow;
pub mod sar;
pub mod task;
pub mod variation;
pub mod zip_archive;

pub use config::{FilterResult, PackageConfig, PackageCookConfig};
pub use context::{CookContext, DiskCookContext, NullSourceControl, SourceControlClient};
pub use env::ContentEnv;
pub use error::CookError;
pub use task::{CookTask, PackageCookTask};
