//! # Apply Command Implementation
//!
//! Compiles the fragment directory and synchronizes the repository working
//! tree to the result. With `--dry-run` the change report is printed and
//! nothing is written.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repo_control::defaults;
use repo_control::generate::GeneratorPipeline;
use repo_control::loader::Loader;
use repo_control::pipeline::Pipeline;
use repo_control::sync::MirrorSet;
use repo_control::vcs::GitFetcher;

/// Apply the compiled configuration to the repository
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Repository root the artifacts are written under.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo_root: PathBuf,

    /// Fragment directory, relative to the repository root.
    #[arg(long, value_name = "DIR", default_value = defaults::FRAGMENT_DIR)]
    pub fragments: PathBuf,

    /// Schema directory, relative to the repository root.
    #[arg(long, value_name = "DIR", default_value = defaults::SCHEMA_DIR)]
    pub schemas: PathBuf,

    /// The root directory for the extension cache.
    ///
    /// Defaults to the system cache directory (`~/.cache/repo-control` on
    /// Linux). Can also be set with the `REPO_CONTROL_CACHE` environment
    /// variable.
    #[arg(long, value_name = "DIR", env = "REPO_CONTROL_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Compute and print the change report without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the `apply` command.
pub fn execute(args: ApplyArgs) -> Result<()> {
    let cache_root = args.cache_root.unwrap_or_else(defaults::default_cache_root);
    let fetcher = GitFetcher::new(cache_root.join("checkouts"));
    let loader = Loader::new(&fetcher).with_cache(
        cache_root.join("extensions"),
        defaults::CACHE_RETENTION_SECS,
    );

    let fragment_dir = args.repo_root.join(&args.fragments);
    let tree = loader
        .load(&fragment_dir)
        .with_context(|| format!("loading fragments from '{}'", fragment_dir.display()))?;

    let registry = super::load_registry(&args.repo_root.join(&args.schemas))?;
    let pipeline = Pipeline::new(&registry, GeneratorPipeline::empty(), &args.repo_root);

    // The report is printed before the apply stage so it is available even
    // when a filesystem transition fails partway through.
    let plan = pipeline.plan(tree)?;
    print!("{}", plan.report);
    if args.dry_run {
        println!("Dry run, no changes applied.");
        return Ok(());
    }
    if pipeline.apply_plan(&plan, &MirrorSet::default())? {
        println!("Repository synchronized.");
    } else {
        println!("Repository already up to date.");
    }
    Ok(())
}
