//! Model weight files with optional key renaming

use crate::engine::{LoadReport, Module, StateDict};
use crate::Result;
use log::info;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Renames state-dict keys on save (module key to file key) and on load
/// (file key to module key)
#[derive(Clone)]
pub enum KeyMapping {
    /// Keys present in the table are renamed, others kept
    Table(HashMap<String, String>),
    /// Every key goes through the function
    Fn(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl KeyMapping {
    pub fn table<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        KeyMapping::Table(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn func(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        KeyMapping::Fn(Arc::new(f))
    }

    pub fn apply(&self, key: &str) -> String {
        match self {
            KeyMapping::Table(table) => table.get(key).cloned().unwrap_or_else(|| key.to_string()),
            KeyMapping::Fn(f) => f(key),
        }
    }
}

impl fmt::Debug for KeyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMapping::Table(table) => f.debug_tuple("Table").field(table).finish(),
            KeyMapping::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// Weight file(s) to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightPaths {
    Single(PathBuf),
    /// Shards; always loaded non-strictly
    List(Vec<PathBuf>),
}

impl From<&str> for WeightPaths {
    fn from(path: &str) -> Self {
        WeightPaths::Single(PathBuf::from(path))
    }
}

impl From<PathBuf> for WeightPaths {
    fn from(path: PathBuf) -> Self {
        WeightPaths::Single(path)
    }
}

impl From<&Path> for WeightPaths {
    fn from(path: &Path) -> Self {
        WeightPaths::Single(path.to_path_buf())
    }
}

impl From<Vec<PathBuf>> for WeightPaths {
    fn from(paths: Vec<PathBuf>) -> Self {
        WeightPaths::List(paths)
    }
}

/// Build the state dict that [`save_weights`] writes
pub fn export_state<M: Module + ?Sized>(
    module: &M,
    mapping: Option<&KeyMapping>,
    trainable_only: bool,
) -> StateDict {
    let mut state = module.state_dict();
    if trainable_only {
        let trainable: Vec<String> = module
            .parameters()
            .into_iter()
            .filter(|p| p.requires_grad())
            .map(|p| p.name().to_string())
            .collect();
        state.retain(|key| trainable.iter().any(|t| t == key));
    }
    match mapping {
        Some(mapping) => state.rename_keys(|key| mapping.apply(key)),
        None => state,
    }
}

/// Write module weights as safetensors.
///
/// With `trainable_only`, parameters that do not require gradients are
/// left out.
pub fn save_weights<M: Module + ?Sized>(
    module: &M,
    path: &Path,
    mapping: Option<&KeyMapping>,
    trainable_only: bool,
) -> Result<()> {
    let state = export_state(module, mapping, trainable_only);
    state.save(path)?;
    if trainable_only {
        let params = module.parameters();
        let total: usize = params.iter().map(|p| p.numel()).sum();
        let trainable: usize =
            params.iter().filter(|p| p.requires_grad()).map(|p| p.numel()).sum();
        let ratio = if total == 0 { 0.0 } else { trainable as f64 / total as f64 * 100.0 };
        info!("Only trainable parameters saved: {trainable}/{total}={ratio:.2}%");
    }
    Ok(())
}

/// Load one or more weight files into `module`.
///
/// A [`WeightPaths::List`] forces non-strict loading. Returns one report per
/// file.
pub fn load_weights<M: Module + ?Sized>(
    module: &mut M,
    paths: &WeightPaths,
    strict: bool,
    mapping: Option<&KeyMapping>,
) -> Result<Vec<LoadReport>> {
    let (paths, strict) = match paths {
        WeightPaths::Single(path) => (std::slice::from_ref(path), strict),
        WeightPaths::List(paths) => (paths.as_slice(), false),
    };
    paths
        .iter()
        .map(|path| {
            let mut state = StateDict::load(path)?;
            if let Some(mapping) = mapping {
                state = state.rename_keys(|key| mapping.apply(key));
            }
            module.load_state_dict(&state, strict)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Param, Parameter};

    struct TwoLayer {
        params: Vec<Param>,
    }

    impl TwoLayer {
        fn new(w: f32, b: f32) -> Self {
            Self {
                params: vec![
                    Param::new("dense.weight", vec![w, w]),
                    Param::new("dense.bias", vec![b]).requires_grad_(false),
                ],
            }
        }
    }

    impl Module for TwoLayer {
        type Input = f32;
        type Output = f32;

        fn forward(&mut self, input: &f32) -> Result<f32> {
            Ok(*input)
        }

        fn parameters(&self) -> Vec<&dyn Parameter> {
            self.params.iter().map(|p| p as &dyn Parameter).collect()
        }

        fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> {
            self.params.iter_mut().map(|p| p as &mut dyn Parameter).collect()
        }

        fn set_training(&mut self, _training: bool) {}

        fn is_training(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_trainable_only_drops_frozen() {
        let model = TwoLayer::new(1.0, 2.0);
        let state = export_state(&model, None, true);
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["dense.weight"]);
    }

    #[test]
    fn test_mapping_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("w.safetensors");
        let to_file = KeyMapping::func(|k| k.replace("dense.", "fc."));
        save_weights(&TwoLayer::new(3.0, 4.0), &path, Some(&to_file), false).unwrap();

        let saved = StateDict::load(&path).unwrap();
        assert!(saved.get("fc.weight").is_some());

        let mut model = TwoLayer::new(0.0, 0.0);
        let back = KeyMapping::table([("fc.weight", "dense.weight"), ("fc.bias", "dense.bias")]);
        let reports = load_weights(&mut model, &WeightPaths::from(path.as_path()), true, Some(&back)).unwrap();
        assert!(reports[0].is_clean());
        assert_eq!(model.params[0].data(), &[3.0, 3.0]);
        assert_eq!(model.params[1].data(), &[4.0]);
    }

    #[test]
    fn test_unmapped_strict_load_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("w.safetensors");
        let to_file = KeyMapping::table([("dense.weight", "other.weight")]);
        save_weights(&TwoLayer::new(3.0, 4.0), &path, Some(&to_file), false).unwrap();

        let mut model = TwoLayer::new(0.0, 0.0);
        assert!(load_weights(&mut model, &WeightPaths::from(path.as_path()), true, None).is_err());
    }

    #[test]
    fn test_shard_list_is_non_strict() {
        let tmp = tempfile::TempDir::new().unwrap();
        let weight = tmp.path().join("a.safetensors");
        let bias = tmp.path().join("b.safetensors");
        let source = TwoLayer::new(5.0, 6.0);
        let mut first = source.state_dict();
        first.retain(|k| k == "dense.weight");
        first.save(&weight).unwrap();
        let mut second = source.state_dict();
        second.retain(|k| k == "dense.bias");
        second.save(&bias).unwrap();

        let mut model = TwoLayer::new(0.0, 0.0);
        let reports = load_weights(&mut model, &WeightPaths::List(vec![weight, bias]), true, None).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].missing, vec!["dense.bias".to_string()]);
        assert_eq!(model.params[0].data(), &[5.0, 5.0]);
        assert_eq!(model.params[1].data(), &[6.0]);
    }
}
