//! Generator pipeline contract
//!
//! Content generators (README layout, build manifests, issue forms, license
//! files) are external collaborators; the core defines only their contract
//! and the candidate-artifact data model they produce.
//!
//! A generator implements [`Generate`] and is composed into a
//! [`GeneratorPipeline`]: an ordered, fixed sequence run strictly
//! sequentially. Generators receive the tree mutably because a later
//! generator may read derived values an earlier one just wrote; the pipeline
//! never reorders or parallelizes them.

use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::ConfigTree;

/// Artifact family of a generated file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Build manifest (package metadata, tool configuration).
    Manifest,
    /// CI workflow configuration.
    Workflow,
    /// Issue or PR form.
    Form,
    /// License file.
    License,
    /// README or other top-level document.
    Document,
    /// Health file (contributing guide, code of conduct, funding).
    Health,
    /// A dynamically-managed directory.
    Directory,
}

/// A candidate output file produced by a generator, prior to diffing against
/// previously recorded state.
///
/// `content == None` means the file is intentionally absent in the new state;
/// `target_path == None` means the artifact type is disabled in
/// configuration. A file with both present is a candidate for writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkind: Option<String>,
    pub content: Option<String>,
    pub target_path: Option<PathBuf>,
    /// Path recorded for this artifact by the previous run, if any.
    pub previous_path: Option<PathBuf>,
}

/// A candidate directory. Only existence and path matter; there is no
/// content dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicDir {
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkind: Option<String>,
    pub target_path: Option<PathBuf>,
    pub previous_path: Option<PathBuf>,
}

/// Everything one generator (or the whole pipeline) produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorOutput {
    pub dirs: Vec<DynamicDir>,
    pub files: Vec<GeneratedFile>,
}

impl GeneratorOutput {
    /// Append another output, preserving order.
    pub fn extend(&mut self, other: GeneratorOutput) {
        self.dirs.extend(other.dirs);
        self.files.extend(other.files);
    }
}

/// The single capability a generator implements.
pub trait Generate {
    /// Stable identifier, used for logging and error attribution.
    fn id(&self) -> &'static str;

    /// Produce candidate artifacts from the tree. May write derived values
    /// back into the tree for later generators to read.
    fn generate(&self, tree: &mut ConfigTree) -> Result<GeneratorOutput>;
}

/// An ordered, fixed sequence of generators.
///
/// Construction order is execution order; there is no registry and no
/// by-name dispatch. Adding a generator means adding an implementation and
/// inserting it at a fixed position.
pub struct GeneratorPipeline {
    generators: Vec<Box<dyn Generate>>,
}

impl GeneratorPipeline {
    /// Build a pipeline from generators in execution order.
    pub fn new(generators: Vec<Box<dyn Generate>>) -> Self {
        Self { generators }
    }

    /// An empty pipeline (useful for dry compilation of the data stages).
    pub fn empty() -> Self {
        Self {
            generators: Vec::new(),
        }
    }

    /// Number of generators.
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// True when the pipeline has no generators.
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Run every generator in order, aggregating their outputs.
    pub fn run(&self, tree: &mut ConfigTree) -> Result<GeneratorOutput> {
        let mut output = GeneratorOutput::default();
        for generator in &self.generators {
            debug!("running generator '{}'", generator.id());
            output.extend(generator.generate(tree)?);
        }
        Ok(output)
    }
}
