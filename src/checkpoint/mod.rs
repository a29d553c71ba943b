//! Full checkpoints: model weights, optimizer state, scheduler states and
//! the resume point.
//!
//! Saving attempts every covered artifact and reports all failures
//! together. Resuming skips default-path artifacts that are missing, but an
//! explicitly requested file that is missing is an error.

mod request;
mod steps;
mod weights;

pub use request::{Artifact, ArtifactPath, CheckpointRequest};
pub use steps::StepsRecord;
pub use weights::{export_state, load_weights, save_weights, KeyMapping, WeightPaths};

use crate::engine::Module;
use crate::train::{RunState, StepEngine};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write every artifact `request` covers; returns the files written.
///
/// The optimizer and scheduler artifacts are skipped when the engine has
/// no optimizer or no schedulers.
pub fn save_checkpoint<M: Module + ?Sized>(
    module: &M,
    engine: Option<&StepEngine>,
    state: &RunState,
    request: &CheckpointRequest,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut failures = Vec::new();

    for artifact in Artifact::ALL {
        let Some(target) = request.resolve(artifact) else {
            continue;
        };
        let outcome = match artifact {
            Artifact::Model => save_weights(
                module,
                &target.path,
                request.mapping.as_ref(),
                request.trainable_only,
            )
            .map(|()| true),
            Artifact::Optimizer => match engine.and_then(|e| e.optimizer()) {
                Some(optimizer) => write_json(&target.path, &optimizer.state_dict()).map(|()| true),
                None => Ok(false),
            },
            Artifact::Scheduler => match engine {
                Some(engine) if !engine.schedulers().is_empty() => {
                    write_json(&target.path, &engine.scheduler_states()).map(|()| true)
                }
                _ => Ok(false),
            },
            Artifact::StepsParams => {
                write_json(&target.path, &StepsRecord::from_state(state)).map(|()| true)
            }
        };
        match outcome {
            Ok(true) => {
                info!("{artifact} saved to {}", target.path.display());
                written.push(target.path);
            }
            Ok(false) => debug!("{artifact} not saved: nothing to save"),
            Err(e) => failures.push((artifact.to_string(), e.to_string())),
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(Error::Checkpoint(failures))
    }
}

/// Restore every artifact `request` covers and set the resume counters
pub fn resume_checkpoint<M: Module + ?Sized>(
    module: &mut M,
    mut engine: Option<&mut StepEngine>,
    state: &mut RunState,
    request: &CheckpointRequest,
) -> Result<()> {
    for artifact in Artifact::ALL {
        let Some(target) = request.resolve(artifact) else {
            continue;
        };
        if !target.path.exists() {
            if target.explicit {
                return Err(Error::ArtifactNotFound { path: target.path });
            }
            warn!("{artifact} not found at {}, skipped", target.path.display());
            continue;
        }

        match artifact {
            Artifact::Model => {
                let paths = WeightPaths::Single(target.path.clone());
                load_weights(module, &paths, request.strict, request.mapping.as_ref())?;
            }
            Artifact::Optimizer => {
                match engine.as_deref_mut().and_then(|e| e.optimizer_mut()) {
                    Some(optimizer) => optimizer.load_state_dict(&read_json(&target.path)?)?,
                    None => {
                        debug!("no optimizer to restore, {} ignored", target.path.display());
                        continue;
                    }
                }
            }
            Artifact::Scheduler => match engine.as_deref_mut() {
                Some(engine) if !engine.schedulers().is_empty() => {
                    let states: Vec<serde_json::Value> = read_json(&target.path)?;
                    engine.load_scheduler_states(&states)?;
                }
                _ => {
                    debug!("no scheduler to restore, {} ignored", target.path.display());
                    continue;
                }
            },
            Artifact::StepsParams => {
                let record: StepsRecord = read_json(&target.path)?;
                record.apply_to(state);
            }
        }
        info!("{artifact} resumed from {}", target.path.display());
    }
    Ok(())
}
