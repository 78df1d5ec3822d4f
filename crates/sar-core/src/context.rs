//! Caller-provided context for a cook invocation.

use std::path::Path;

use sar_schema::Platform;

use crate::config::PackageCookConfig;
use crate::env::ContentEnv;

/// Client coordinating check-out/check-in of generated outputs.
///
/// Archive and dictionary writes go through edit → write → add →
/// revert-unchanged so a crash mid-write never corrupts a previously
/// published file.
pub trait SourceControlClient: std::fmt::Debug {
    /// Open existing files for edit.
    fn open_for_edit(&self, paths: &[&Path]) -> anyhow::Result<()>;
    /// Mark files for add.
    fn open_for_add(&self, paths: &[&Path]) -> anyhow::Result<()>;
    /// Revert files whose content did not change.
    fn revert_unchanged(&self, paths: &[&Path]) -> anyhow::Result<()>;
}

/// No-op client for local cooks with no source control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSourceControl;

impl SourceControlClient for NullSourceControl {
    fn open_for_edit(&self, _paths: &[&Path]) -> anyhow::Result<()> {
        Ok(())
    }
    fn open_for_add(&self, _paths: &[&Path]) -> anyhow::Result<()> {
        Ok(())
    }
    fn revert_unchanged(&self, _paths: &[&Path]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Stage identifiers reported through the progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Package cooking progress.
    Package,
}

/// Everything a cook task needs from its caller.
pub trait CookContext {
    /// The loaded package configuration.
    fn config(&self) -> &PackageCookConfig;
    /// Content tree roots and filesystem queries.
    fn env(&self) -> &ContentEnv;
    /// Platform of the cook pass.
    fn platform(&self) -> Platform {
        self.env().platform()
    }
    /// Source-control collaborator for output finalization.
    fn source_control(&self) -> &dyn SourceControlClient;
    /// Force regeneration of compression dictionaries even when one
    /// exists on disk.
    fn force_dict_generation(&self) -> bool {
        false
    }
    /// Build version major and changelist baked into archive headers.
    /// Both are clamped to at least 1 at write time.
    fn build_version(&self) -> (u16, u32) {
        (1, 1)
    }
    /// Progress report: elapsed seconds, completed fraction, active and
    /// remaining counts.
    fn advance_progress(
        &self,
        kind: ProgressKind,
        elapsed_secs: f32,
        fraction: f32,
        active: u32,
        remaining: u32,
    ) {
        let _ = (kind, elapsed_secs, fraction, active, remaining);
    }
    /// Final progress report for a stage.
    fn complete_progress(&self, kind: ProgressKind, elapsed_secs: f32, success: bool) {
        let _ = (kind, elapsed_secs, success);
    }
}

/// Disk-backed context used by the CLI: real filesystem, no source
/// control.
#[derive(Debug)]
pub struct DiskCookContext {
    config: PackageCookConfig,
    env: ContentEnv,
    source_control: NullSourceControl,
    force_dict: bool,
    build_version: (u16, u32),
}

impl DiskCookContext {
    /// Build a context from a loaded config and environment.
    pub fn new(config: PackageCookConfig, env: ContentEnv) -> Self {
        Self {
            config,
            env,
            source_control: NullSourceControl,
            force_dict: false,
            build_version: (1, 1),
        }
    }

    /// Force dictionary regeneration.
    #[must_use]
    pub fn with_force_dict(mut self, force: bool) -> Self {
        self.force_dict = force;
        self
    }

    /// Set the build version stamped into archive headers.
    #[must_use]
    pub fn with_build_version(mut self, major: u16, changelist: u32) -> Self {
        self.build_version = (major, changelist);
        self
    }
}

impl CookContext for DiskCookContext {
    fn config(&self) -> &PackageCookConfig {
        &self.config
    }
    fn env(&self) -> &ContentEnv {
        &self.env
    }
    fn source_control(&self) -> &dyn SourceControlClient {
        &self.source_control
    }
    fn force_dict_generation(&self) -> bool {
        self.force_dict
    }
    fn build_version(&self) -> (u16, u32) {
        self.build_version
    }
}
