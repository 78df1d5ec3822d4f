//! sarcook - cook a content tree into versioned `.sar` archives.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sar_core::{ContentEnv, CookTask, DiskCookContext, PackageCookConfig, PackageCookTask};
use sar_schema::Platform;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "sarcook", version, about = "Cook a content tree into .sar archives")]
struct Cli {
    /// Package cook configuration (JSON). Archives are written next to it.
    config: PathBuf,

    /// Environment platform; defaults to the configuration's target.
    #[arg(long, value_parser = parse_platform)]
    platform: Option<Platform>,

    /// Local build profile: fastest compression, no dictionaries,
    /// ExcludeFromLocal packages skipped.
    #[arg(long)]
    local: bool,

    /// Regenerate compression dictionaries even when one exists.
    #[arg(long)]
    force_dict: bool,

    /// Cooked config root; defaults to Data/Config beside the configuration.
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Cooked content root; defaults to Data/Content beside the configuration.
    #[arg(long)]
    content_dir: Option<PathBuf>,

    /// Authored source root; defaults to Source beside the configuration.
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Build version major stamped into archive headers.
    #[arg(long, default_value_t = 1)]
    build_version: u16,

    /// Build changelist stamped into archive headers.
    #[arg(long, default_value_t = 1)]
    changelist: u32,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    match s.to_ascii_lowercase().as_str() {
        "pc" => Ok(Platform::Pc),
        "ios" => Ok(Platform::Ios),
        "android" => Ok(Platform::Android),
        "linux" => Ok(Platform::Linux),
        other => Err(format!(
            "unknown platform \"{other}\" (expected pc, ios, android, or linux)"
        )),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = PackageCookConfig::load(&cli.config, cli.local)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let base = cli
        .config
        .parent()
        .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);
    let config_dir = cli
        .config_dir
        .unwrap_or_else(|| base.join("Data").join("Config"));
    let content_dir = cli
        .content_dir
        .unwrap_or_else(|| base.join("Data").join("Content"));
    let source_dir = cli.source_dir.unwrap_or_else(|| base.join("Source"));

    let platform = cli.platform.unwrap_or(config.platform);
    let env = ContentEnv::new(config_dir, content_dir, source_dir, platform);
    let ctx = DiskCookContext::new(config, env)
        .with_force_dict(cli.force_dict)
        .with_build_version(cli.build_version, cli.changelist);

    let task = PackageCookTask::new();
    task.validate_content_environment(&ctx)?;
    task.cook_all_out_of_date_content(&ctx)
        .context("cook failed")?;
    Ok(())
}
