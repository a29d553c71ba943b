//! Checkpoint artifact locations

use super::KeyMapping;
use std::fmt;
use std::path::{Path, PathBuf};

/// One file of a full checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Model,
    Optimizer,
    Scheduler,
    StepsParams,
}

impl Artifact {
    pub const ALL: [Artifact; 4] =
        [Artifact::Model, Artifact::Optimizer, Artifact::Scheduler, Artifact::StepsParams];

    /// File name used under `save_dir`
    pub fn default_file_name(self) -> &'static str {
        match self {
            Artifact::Model => "model.safetensors",
            Artifact::Optimizer => "optimizer.json",
            Artifact::Scheduler => "scheduler.json",
            Artifact::StepsParams => "steps_params.json",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Artifact::Model => "model",
            Artifact::Optimizer => "optimizer",
            Artifact::Scheduler => "scheduler",
            Artifact::StepsParams => "steps_params",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved artifact location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    pub path: PathBuf,
    /// Given explicitly rather than derived from `save_dir`
    pub explicit: bool,
}

/// What to save or resume, and where.
///
/// An explicit per-artifact path wins over `save_dir`; an artifact with
/// neither is not touched.
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    pub save_dir: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub optimizer_path: Option<PathBuf>,
    pub scheduler_path: Option<PathBuf>,
    pub steps_params_path: Option<PathBuf>,
    pub mapping: Option<KeyMapping>,
    pub trainable_only: bool,
    pub strict: bool,
    /// Engine-specific checkpoint tag
    pub tag: Option<String>,
}

impl Default for CheckpointRequest {
    fn default() -> Self {
        Self {
            save_dir: None,
            model_path: None,
            optimizer_path: None,
            scheduler_path: None,
            steps_params_path: None,
            mapping: None,
            trainable_only: false,
            strict: true,
            tag: None,
        }
    }
}

impl CheckpointRequest {
    /// All four artifacts under `dir`
    pub fn dir(dir: impl Into<PathBuf>) -> Self {
        Self { save_dir: Some(dir.into()), ..Default::default() }
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_optimizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.optimizer_path = Some(path.into());
        self
    }

    pub fn with_scheduler_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scheduler_path = Some(path.into());
        self
    }

    pub fn with_steps_params_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps_params_path = Some(path.into());
        self
    }

    pub fn with_mapping(mut self, mapping: KeyMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn trainable_only(mut self, trainable_only: bool) -> Self {
        self.trainable_only = trainable_only;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn explicit(&self, artifact: Artifact) -> Option<&Path> {
        match artifact {
            Artifact::Model => self.model_path.as_deref(),
            Artifact::Optimizer => self.optimizer_path.as_deref(),
            Artifact::Scheduler => self.scheduler_path.as_deref(),
            Artifact::StepsParams => self.steps_params_path.as_deref(),
        }
    }

    /// Location of `artifact`, if this request covers it
    pub fn resolve(&self, artifact: Artifact) -> Option<ArtifactPath> {
        if let Some(path) = self.explicit(artifact) {
            return Some(ArtifactPath { path: path.to_path_buf(), explicit: true });
        }
        self.save_dir.as_ref().map(|dir| ArtifactPath {
            path: dir.join(artifact.default_file_name()),
            explicit: false,
        })
    }
}
