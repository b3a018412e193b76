//! # Check Command Implementation
//!
//! Compiles the fragment directory through validation and template
//! resolution without touching the filesystem. A safe, read-only operation:
//! exit status reports whether the configuration is internally consistent.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use repo_control::defaults;
use repo_control::generate::GeneratorPipeline;
use repo_control::loader::Loader;
use repo_control::pipeline::Pipeline;
use repo_control::vcs::GitFetcher;

/// Validate the configuration and resolve all templates
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Repository root.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo_root: PathBuf,

    /// Fragment directory, relative to the repository root.
    #[arg(long, value_name = "DIR", default_value = defaults::FRAGMENT_DIR)]
    pub fragments: PathBuf,

    /// Schema directory, relative to the repository root.
    #[arg(long, value_name = "DIR", default_value = defaults::SCHEMA_DIR)]
    pub schemas: PathBuf,

    /// The root directory for the extension cache.
    #[arg(long, value_name = "DIR", env = "REPO_CONTROL_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Print the fully resolved tree as YAML.
    #[arg(long)]
    pub show_tree: bool,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs) -> Result<()> {
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
    let (tree, _) = pipeline.compile(tree)?;

    if args.show_tree {
        print!("{}", serde_yaml::to_string(tree.root())?);
    } else {
        let sections: Vec<_> = registry.sections().collect();
        if sections.is_empty() {
            println!("Configuration resolves cleanly (no schemas registered).");
        } else {
            println!(
                "Configuration valid against {} schema(s): {}",
                sections.len(),
                sections.join(", ")
            );
        }
    }
    Ok(())
}
