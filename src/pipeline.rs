//! # Compilation pipeline
//!
//! The fixed control flow of one run: load fragments, validate relaxed,
//! resolve templates, validate strict, run the generators, validate the
//! derived values they wrote, classify every candidate against the previous
//! snapshot, and (unless dry-running) apply the transitions and persist a
//! new snapshot.
//!
//! The snapshot at `.repo-control/state.json` is the source of "previous"
//! state. It records the compiled tree plus every artifact the last run left
//! on disk; candidates are matched to it by `(kind, subkind)`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{classify_dir, classify_file, ChangeKind};
use crate::error::Result;
use crate::generate::{DynamicDir, GeneratedFile, GeneratorOutput, GeneratorPipeline};
use crate::report::ChangeReport;
use crate::schema::{SchemaRegistry, ValidationMode};
use crate::sync::{MirrorSet, SyncEngine};
use crate::tree::ConfigTree;

/// Snapshot location relative to the repository root.
pub const SNAPSHOT_PATH: &str = ".repo-control/state.json";

/// Persistent record of the last applied run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// The fully compiled tree of the last run.
    pub tree: Value,
    /// Directories managed by the last run.
    #[serde(default)]
    pub dirs: Vec<DynamicDir>,
    /// Files managed by the last run.
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    /// Mirror destinations written by the last run; cleared before the next
    /// run's copies land.
    #[serde(default)]
    pub mirrors: Vec<PathBuf>,
}

impl Snapshot {
    /// Load the snapshot for `repo_root`, or an empty one on first run.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(SNAPSHOT_PATH);
        if !path.is_file() {
            debug!("no snapshot at '{}', treating as first run", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist to `repo_root`, creating the state directory if needed.
    pub fn save(&self, repo_root: &Path) -> Result<()> {
        let path = repo_root.join(SNAPSHOT_PATH);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        fs::write(&path, rendered)?;
        Ok(())
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The fully compiled tree.
    pub tree: ConfigTree,
    /// Per-artifact classification.
    pub report: ChangeReport,
    /// Whether anything was written, the snapshot included. False for dry
    /// runs and for runs where the tree and artifacts already match.
    pub applied: bool,
}

/// Everything computed before any filesystem write: the compiled tree and
/// the classified candidates. Holding a plan means the change report
/// survives even if the apply stage later fails.
#[derive(Debug)]
pub struct RunPlan {
    /// The fully compiled tree.
    pub tree: ConfigTree,
    /// Per-artifact classification.
    pub report: ChangeReport,
    dirs: Vec<(DynamicDir, ChangeKind)>,
    files: Vec<(GeneratedFile, ChangeKind)>,
    output: GeneratorOutput,
    snapshot: Snapshot,
}

/// The compiler core: validation, resolution, generation, classification,
/// and synchronization in a fixed order.
pub struct Pipeline<'a> {
    registry: &'a SchemaRegistry,
    generators: GeneratorPipeline,
    repo_root: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        generators: GeneratorPipeline,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            generators,
            repo_root: repo_root.into(),
        }
    }

    /// Compile the raw tree through validation, template resolution, and
    /// generation. No filesystem writes happen here.
    ///
    /// Validation runs three times: relaxed on the raw tree (markers still
    /// present), strict once every marker is resolved, and strict again
    /// after the generators so derived values they wrote are held to the
    /// same schemas.
    pub fn compile(&self, mut tree: ConfigTree) -> Result<(ConfigTree, GeneratorOutput)> {
        self.registry
            .validate_tree(&mut tree, ValidationMode::Relaxed, "local configuration")?;
        tree.fill()?;
        self.registry
            .validate_tree(&mut tree, ValidationMode::Strict, "resolved configuration")?;
        let output = self.generators.run(&mut tree)?;
        self.registry
            .validate_tree(&mut tree, ValidationMode::Strict, "derived configuration")?;
        Ok((tree, output))
    }

    /// Compile and classify without writing: the read-only half of a run.
    pub fn plan(&self, tree: ConfigTree) -> Result<RunPlan> {
        let (tree, mut output) = self.compile(tree)?;
        let snapshot = Snapshot::load(&self.repo_root)?;
        attach_previous(&mut output, &snapshot);

        let mut report = ChangeReport::new();
        let mut dirs: Vec<(DynamicDir, ChangeKind)> = Vec::with_capacity(output.dirs.len());
        for dir in &output.dirs {
            let kind = classify_dir(&self.repo_root, dir)?;
            report.record_dir(dir, kind);
            dirs.push((dir.clone(), kind));
        }
        let mut files: Vec<(GeneratedFile, ChangeKind)> = Vec::with_capacity(output.files.len());
        for file in &output.files {
            let kind = classify_file(&self.repo_root, file)?;
            report.record_file(file, kind);
            files.push((file.clone(), kind));
        }

        Ok(RunPlan {
            tree,
            report,
            dirs,
            files,
            output,
            snapshot,
        })
    }

    /// Apply a plan's transitions and persist the snapshot. Returns whether
    /// anything was written; a tree that already matches is left alone.
    ///
    /// Mirror destinations recorded by the previous run are cleared even
    /// when the caller supplies none, so a renamed destination never leaves
    /// a stale copy behind. A run that changed only tree values still
    /// refreshes the snapshot.
    pub fn apply_plan(&self, plan: &RunPlan, mirrors: &MirrorSet) -> Result<bool> {
        let sync_needed = !plan.report.is_clean()
            || !mirrors.copies.is_empty()
            || !plan.snapshot.mirrors.is_empty();
        let tree_changed = plan.snapshot.tree != *plan.tree.root();
        if !sync_needed && !tree_changed {
            debug!("working tree already matches, nothing to apply");
            return Ok(false);
        }
        if sync_needed {
            let effective = MirrorSet {
                previous_destinations: plan
                    .snapshot
                    .mirrors
                    .iter()
                    .chain(mirrors.previous_destinations.iter())
                    .cloned()
                    .collect(),
                copies: mirrors.copies.clone(),
            };
            SyncEngine::new(&self.repo_root).apply(&plan.dirs, &plan.files, &effective)?;
        }
        next_snapshot(&plan.tree, &plan.output, mirrors).save(&self.repo_root)?;
        Ok(true)
    }

    /// Run the whole pipeline. With `dry_run` the report is computed but
    /// nothing is written and the snapshot is left untouched.
    pub fn run(&self, tree: ConfigTree, mirrors: MirrorSet, dry_run: bool) -> Result<RunOutcome> {
        let plan = self.plan(tree)?;
        if dry_run {
            info!("dry run, no changes applied");
            return Ok(RunOutcome {
                tree: plan.tree,
                report: plan.report,
                applied: false,
            });
        }
        let applied = self.apply_plan(&plan, &mirrors)?;
        Ok(RunOutcome {
            tree: plan.tree,
            report: plan.report,
            applied,
        })
    }
}

/// Fill each candidate's `previous_path` from the snapshot, matching on
/// `(kind, subkind)`. Every snapshot entry is consumed at most once:
/// candidates first claim the entry at their own target path, then any
/// remaining entry of the same kind, so siblings sharing a kind never
/// classify against each other's previous state.
fn attach_previous(output: &mut GeneratorOutput, snapshot: &Snapshot) {
    let mut used = vec![false; snapshot.dirs.len()];
    for exact in [true, false] {
        for dir in &mut output.dirs {
            if dir.previous_path.is_some() {
                continue;
            }
            let slot = snapshot.dirs.iter().enumerate().find(|(i, d)| {
                !used[*i]
                    && d.kind == dir.kind
                    && d.subkind == dir.subkind
                    && (!exact || d.target_path == dir.target_path)
            });
            if let Some((i, previous)) = slot {
                used[i] = true;
                dir.previous_path = previous.target_path.clone();
            }
        }
    }
    let mut used = vec![false; snapshot.files.len()];
    for exact in [true, false] {
        for file in &mut output.files {
            if file.previous_path.is_some() {
                continue;
            }
            let slot = snapshot.files.iter().enumerate().find(|(i, f)| {
                !used[*i]
                    && f.kind == file.kind
                    && f.subkind == file.subkind
                    && (!exact || f.target_path == file.target_path)
            });
            if let Some((i, previous)) = slot {
                used[i] = true;
                file.previous_path = previous.target_path.clone();
            }
        }
    }
}

/// The snapshot describing the state just applied: candidates that still
/// exist on disk, with content omitted for compactness, plus the mirror
/// destinations written this run.
fn next_snapshot(tree: &ConfigTree, output: &GeneratorOutput, mirrors: &MirrorSet) -> Snapshot {
    Snapshot {
        tree: tree.root().clone(),
        dirs: output
            .dirs
            .iter()
            .filter(|d| d.target_path.is_some())
            .cloned()
            .collect(),
        files: output
            .files
            .iter()
            .filter(|f| f.content.is_some() && f.target_path.is_some())
            .map(|f| GeneratedFile {
                content: None,
                previous_path: None,
                ..f.clone()
            })
            .collect(),
        mirrors: mirrors
            .copies
            .iter()
            .flat_map(|c| c.destinations.iter().cloned())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{ArtifactKind, Generate};
    use crate::path::TreePath;
    use serde_json::json;
    use tempfile::TempDir;

    struct ReadmeGenerator;
    impl Generate for ReadmeGenerator {
        fn id(&self) -> &'static str {
            "readme"
        }
        fn generate(&self, tree: &mut ConfigTree) -> Result<GeneratorOutput> {
            let name = tree
                .get(&TreePath::parse("project.name").unwrap())
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            Ok(GeneratorOutput {
                dirs: Vec::new(),
                files: vec![GeneratedFile {
                    kind: ArtifactKind::Document,
                    subkind: Some("readme".into()),
                    content: Some(format!("# {}\n", name)),
                    target_path: Some("README.md".into()),
                    previous_path: None,
                }],
            })
        }
    }

    fn project_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                "project",
                json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string", "default": "A project."}
                    }
                }),
            )
            .unwrap();
        registry
    }

    fn project_tree(name: &str) -> ConfigTree {
        ConfigTree::from_value(json!({"project": {"name": name}})).unwrap()
    }

    #[test]
    fn test_compile_fills_defaults_and_resolves() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(&registry, GeneratorPipeline::empty(), root.path());
        let tree = ConfigTree::from_value(json!({
            "project": {"name": "widget", "description": "Just ${{ project.name }}."}
        }))
        .unwrap();
        let (tree, _) = pipeline.compile(tree).unwrap();
        assert_eq!(
            tree.root()["project"]["description"],
            json!("Just widget.")
        );
    }

    #[test]
    fn test_run_creates_and_snapshots() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );

        let outcome = pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Created), 1);
        assert_eq!(
            fs::read_to_string(root.path().join("README.md")).unwrap(),
            "# widget\n"
        );
        let snapshot = Snapshot::load(root.path()).unwrap();
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.tree["project"]["name"], json!("widget"));
    }

    #[test]
    fn test_rerun_is_unchanged_and_skips_apply() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        let outcome = pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Unchanged), 1);
    }

    #[test]
    fn test_rerun_with_changed_content_is_modified() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        let outcome = pipeline
            .run(project_tree("gadget"), MirrorSet::default(), false)
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Modified), 1);
        assert_eq!(
            fs::read_to_string(root.path().join("README.md")).unwrap(),
            "# gadget\n"
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        let outcome = pipeline
            .run(project_tree("widget"), MirrorSet::default(), true)
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Created), 1);
        assert!(!root.path().join("README.md").exists());
        assert!(!root.path().join(SNAPSHOT_PATH).exists());
    }

    #[test]
    fn test_strict_validation_rejects_unresolved_tree() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(&registry, GeneratorPipeline::empty(), root.path());
        // Marker points at a missing path, resolution fails before strict
        let tree = ConfigTree::from_value(json!({
            "project": {"name": "${{ missing.path }}"}
        }))
        .unwrap();
        assert!(pipeline.compile(tree).is_err());
    }

    #[test]
    fn test_plan_report_survives_failed_apply() {
        use crate::sync::MirrorCopy;

        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        let plan = pipeline.plan(project_tree("widget")).unwrap();
        // A mirror whose source does not exist makes the apply stage fail
        let mirrors = MirrorSet {
            previous_destinations: Vec::new(),
            copies: vec![MirrorCopy {
                source: "missing-source".into(),
                destinations: vec!["copy".into()],
            }],
        };
        assert!(pipeline.apply_plan(&plan, &mirrors).is_err());
        // The classification computed before the failure is still available
        assert_eq!(plan.report.count(ChangeKind::Created), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let root = TempDir::new().unwrap();
        let snapshot = Snapshot {
            tree: json!({"project": {"name": "x"}}),
            dirs: Vec::new(),
            files: vec![GeneratedFile {
                kind: ArtifactKind::License,
                subkind: None,
                content: None,
                target_path: Some("LICENSE".into()),
                previous_path: None,
            }],
            mirrors: vec![PathBuf::from("docs/LICENSE")],
        };
        snapshot.save(root.path()).unwrap();
        let loaded = Snapshot::load(root.path()).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.tree, snapshot.tree);
        assert_eq!(loaded.mirrors, snapshot.mirrors);
    }

    struct PairGenerator;
    impl Generate for PairGenerator {
        fn id(&self) -> &'static str {
            "pair"
        }
        fn generate(&self, _tree: &mut ConfigTree) -> Result<GeneratorOutput> {
            let doc = |name: &str, body: &str| GeneratedFile {
                kind: ArtifactKind::Document,
                subkind: None,
                content: Some(body.to_string()),
                target_path: Some(name.into()),
                previous_path: None,
            };
            Ok(GeneratorOutput {
                dirs: Vec::new(),
                files: vec![doc("a.md", "A\n"), doc("b.md", "B\n")],
            })
        }
    }

    #[test]
    fn test_sibling_artifacts_survive_identical_rerun() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(PairGenerator)]),
            root.path(),
        );
        pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        // Two files of the same kind: each must pair with its own previous
        // state, not the first entry of that kind
        let outcome = pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Unchanged), 2);
        assert_eq!(fs::read_to_string(root.path().join("a.md")).unwrap(), "A\n");
        assert_eq!(fs::read_to_string(root.path().join("b.md")).unwrap(), "B\n");
    }

    #[test]
    fn test_mirror_destinations_recorded_and_cleared_across_runs() {
        use crate::sync::MirrorCopy;

        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        let mirror_to = |dest: &str| MirrorSet {
            previous_destinations: Vec::new(),
            copies: vec![MirrorCopy {
                source: "README.md".into(),
                destinations: vec![dest.into()],
            }],
        };
        pipeline
            .run(project_tree("widget"), mirror_to("docs/copy.md"), false)
            .unwrap();
        assert!(root.path().join("docs/copy.md").is_file());
        let snapshot = Snapshot::load(root.path()).unwrap();
        assert_eq!(snapshot.mirrors, vec![PathBuf::from("docs/copy.md")]);

        // Renamed destination, no previous destinations supplied: the
        // snapshot remembers the old copy and it is cleared
        pipeline
            .run(project_tree("widget"), mirror_to("docs/renamed.md"), false)
            .unwrap();
        assert!(!root.path().join("docs/copy.md").exists());
        assert!(root.path().join("docs/renamed.md").is_file());
    }

    #[test]
    fn test_value_only_change_refreshes_snapshot() {
        let registry = project_registry();
        let root = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &registry,
            GeneratorPipeline::new(vec![Box::new(ReadmeGenerator)]),
            root.path(),
        );
        pipeline
            .run(project_tree("widget"), MirrorSet::default(), false)
            .unwrap();
        // Same artifacts, different tree values: the snapshot tree must not
        // go stale for cross-branch metadata readers
        let tree = ConfigTree::from_value(json!({
            "project": {"name": "widget", "description": "Updated."}
        }))
        .unwrap();
        let outcome = pipeline.run(tree, MirrorSet::default(), false).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.report.count(ChangeKind::Unchanged), 1);
        let snapshot = Snapshot::load(root.path()).unwrap();
        assert_eq!(snapshot.tree["project"]["description"], json!("Updated."));
    }
}
