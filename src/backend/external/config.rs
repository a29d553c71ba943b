//! Reconciliation of an external engine's JSON config with trainer settings.
//!
//! Engine configs may carry `"auto"` placeholders. Resolution fills every
//! placeholder from [`EngineArgs`] and records (without failing) every
//! explicit value that disagrees with the trainer's own setting.

use crate::config::TrainerConfig;
use crate::precision::Precision;
use crate::{Error, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

const AUTO: &str = "auto";

/// Trainer-side values an engine config is reconciled against.
///
/// Unset fields take the defaults below; [`EngineArgs::from_config`] reads
/// overrides from the config's top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineArgs {
    pub world_size: usize,
    pub per_device_train_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub max_grad_norm: f64,
    pub learning_rate: f64,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_epsilon: f64,
    pub weight_decay: f64,
    pub fp16: bool,
    pub fp16_full_eval: bool,
    pub fp16_opt_level: String,
    pub fp16_backend: String,
    pub bf16: bool,
    pub bf16_full_eval: bool,
    pub warmup_steps: usize,
    pub warmup_ratio: f64,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            world_size: 1,
            per_device_train_batch_size: 8,
            gradient_accumulation_steps: 1,
            max_grad_norm: 1.0,
            learning_rate: 5e-5,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_epsilon: 1e-8,
            weight_decay: 0.0,
            fp16: false,
            fp16_full_eval: false,
            fp16_opt_level: "O1".to_string(),
            fp16_backend: AUTO.to_string(),
            bf16: false,
            bf16_full_eval: false,
            warmup_steps: 0,
            warmup_ratio: 0.0,
        }
    }
}

impl EngineArgs {
    /// Defaults overridden by matching top-level keys of `config`
    pub fn from_config(config: &Value, world_size: usize) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if let (Some(target), Some(source)) = (merged.as_object_mut(), config.as_object()) {
            for (key, value) in source {
                let compatible = target.get(key).is_some_and(|current| same_kind(current, value));
                if compatible && !is_auto(value) {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        let mut args: Self = serde_json::from_value(merged)
            .map_err(|e| Error::config(format!("engine config: {e}")))?;
        args.world_size = world_size.max(1);
        Ok(args)
    }

    /// Top-level overrides from `config`, then the trainer's own
    /// accumulation, clipping, precision and data batch size
    pub fn from_trainer(
        config: &Value,
        trainer: &TrainerConfig,
        world_size: usize,
        batch_size: Option<usize>,
    ) -> Result<Self> {
        let mut args = Self::from_config(config, world_size)?;
        args.gradient_accumulation_steps = trainer.grad_accumulation_steps;
        args.max_grad_norm = trainer.clip_grad_norm.map_or(0.0, f64::from);
        args.fp16 = trainer.precision == Precision::Fp16;
        args.bf16 = trainer.precision == Precision::Bf16;
        if let Some(size) = batch_size {
            args.per_device_train_batch_size = size;
        }
        Ok(args)
    }

    pub fn train_batch_size(&self) -> usize {
        self.world_size * self.per_device_train_batch_size * self.gradient_accumulation_steps
    }

    fn half_precision_backend(&self) -> Option<&'static str> {
        if !(self.fp16 || self.fp16_full_eval) {
            return None;
        }
        Some(if self.fp16_backend == "apex" { "apex" } else { "amp" })
    }
}

/// An explicit config value that differs from the trainer's setting
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub config: Value,
    pub trainer: Value,
}

/// Engine config tree plus the mismatches found while resolving it.
///
/// The tree as loaded is kept, so every [`EngineConfig::resolve`] starts
/// again from the original placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    original: Value,
    tree: Value,
    mismatches: Vec<Mismatch>,
}

fn is_auto(value: &Value) -> bool {
    value.as_str() == Some(AUTO)
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}

fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_match(x, y))
        }
        _ => a == b,
    }
}

impl EngineConfig {
    pub fn new(mut tree: Value) -> Self {
        if let Some(root) = tree.as_object_mut() {
            root.entry("steps_per_print").or_insert(json!(1_000_000_000u64));
        }
        Self { original: tree.clone(), tree, mismatches: Vec::new() }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// The tree as loaded, placeholders included
    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// Value at a dotted path such as `optimizer.params.lr`
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.tree, |node, key| node.get(key))
    }

    pub fn is_auto(&self, path: &str) -> bool {
        self.get(path).is_some_and(is_auto)
    }

    fn parent_mut(&mut self, path: &str) -> Option<(&mut Map<String, Value>, String)> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop()?.to_string();
        let mut node = &mut self.tree;
        for key in segments {
            node = node.get_mut(key)?;
        }
        Some((node.as_object_mut()?, leaf))
    }

    /// Replace an `"auto"` value at `path`; otherwise, when `must_match`,
    /// record a mismatch if the explicit value differs. Absent paths are
    /// left alone.
    pub fn fill_match(&mut self, path: &str, value: impl Into<Value>, must_match: bool) {
        let value = value.into();
        let Some((parent, leaf)) = self.parent_mut(path) else {
            return;
        };
        let Some(current) = parent.get(&leaf) else {
            return;
        };
        if is_auto(current) {
            parent.insert(leaf, value);
        } else if must_match && !values_match(current, &value) {
            let mismatch = Mismatch { path: path.to_string(), config: current.clone(), trainer: value };
            self.mismatches.push(mismatch);
        }
    }

    fn fill_if_present(&mut self, path: &str, value: impl Into<Value>) {
        self.fill_match(path, value, true);
    }

    /// Fill placeholders from `args`.
    ///
    /// `hidden_size` sizes the communication buckets; it is required only
    /// when a bucket key is `"auto"`. `total_steps` fills the scheduler's
    /// step counts when known.
    pub fn resolve(&mut self, args: &EngineArgs, hidden_size: Option<usize>, total_steps: Option<usize>) -> Result<()> {
        self.tree = self.original.clone();
        self.mismatches.clear();
        self.fill_if_present("train_micro_batch_size_per_gpu", args.per_device_train_batch_size);
        self.fill_if_present("gradient_accumulation_steps", args.gradient_accumulation_steps);
        self.fill_if_present("train_batch_size", args.train_batch_size());
        self.fill_if_present("gradient_clipping", args.max_grad_norm);

        self.fill_if_present("optimizer.params.lr", args.learning_rate);
        self.fill_if_present("optimizer.params.betas", json!([args.adam_beta1, args.adam_beta2]));
        self.fill_if_present("optimizer.params.eps", args.adam_epsilon);
        self.fill_if_present("optimizer.params.weight_decay", args.weight_decay);

        self.fill_match("scheduler.params.warmup_min_lr", 0, false);
        self.fill_if_present("scheduler.params.warmup_max_lr", args.learning_rate);

        let backend = args.half_precision_backend();
        self.fill_if_present("fp16.enabled", backend == Some("amp"));
        self.fill_if_present("amp.enabled", backend == Some("apex"));
        self.fill_if_present("amp.opt_level", args.fp16_opt_level.clone());
        self.fill_if_present("bf16.enabled", args.bf16 || args.bf16_full_eval);

        self.resolve_buckets(hidden_size)?;

        if let Some(total) = total_steps {
            self.fill_if_present("scheduler.params.total_num_steps", total);
            let warmup = if args.warmup_steps > 0 {
                args.warmup_steps
            } else {
                (total as f64 * args.warmup_ratio).ceil() as usize
            };
            self.fill_if_present("scheduler.params.warmup_num_steps", warmup);
        }

        for m in &self.mismatches {
            warn!("engine config {}={} but trainer uses {}", m.path, m.config, m.trainer);
        }
        Ok(())
    }

    fn resolve_buckets(&mut self, hidden_size: Option<usize>) -> Result<()> {
        let stage3 = self.zero_stage() == Some(3);
        let mut keys = vec!["zero_optimization.reduce_bucket_size"];
        if stage3 {
            keys.push("zero_optimization.stage3_prefetch_bucket_size");
            keys.push("zero_optimization.stage3_param_persistence_threshold");
        }
        if !keys.iter().any(|k| self.is_auto(k)) {
            return Ok(());
        }
        let h = hidden_size.ok_or_else(|| {
            Error::config(format!("hidden size required to fill {}", keys.join(", ")))
        })? as u64;

        self.fill_match("zero_optimization.reduce_bucket_size", h * h, false);
        if stage3 {
            self.fill_match("zero_optimization.stage3_prefetch_bucket_size", 0.9 * (h * h) as f64, false);
            self.fill_match("zero_optimization.stage3_param_persistence_threshold", 10 * h, false);
        }
        Ok(())
    }

    pub fn zero_stage(&self) -> Option<u64> {
        self.get("zero_optimization.stage").and_then(Value::as_u64)
    }

    /// True when optimizer state lives on the host; a trainer-supplied
    /// optimizer cannot be used then
    pub fn offloads_optimizer(&self) -> bool {
        self.get("zero_optimization.offload_optimizer.device").and_then(Value::as_str) == Some("cpu")
    }

    pub fn micro_batch_size(&self) -> Option<usize> {
        self.get("train_micro_batch_size_per_gpu").and_then(Value::as_u64).map(|v| v as usize)
    }
}
