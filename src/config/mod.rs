//! Typed trainer configuration
//!
//! Replaces free-form keyword arguments with named fields and an explicit
//! override merge. Loadable from YAML or JSON.

mod trainer;
mod validate;

pub use trainer::{
    ConfigOverrides, FaultConfig, ProgbarKind, ProgressConfig, SmoothingConfig, TrainerConfig,
};
pub use validate::{validate_config, ValidationError};
