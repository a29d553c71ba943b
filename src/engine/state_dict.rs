//! Named tensor snapshots and their SafeTensors encoding

use super::Parameter;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A flat `f32` tensor with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Outcome of a non-strict state dict load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Module parameters absent from the state dict
    pub missing: Vec<String>,
    /// State dict entries with no matching parameter
    pub unexpected: Vec<String>,
}

impl LoadReport {
    /// True when every key matched
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Ordered name → tensor map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorData>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot parameter values
    pub fn from_parameters<'a>(params: impl IntoIterator<Item = &'a dyn Parameter>) -> Self {
        let tensors = params
            .into_iter()
            .map(|p| {
                let tensor = TensorData { shape: p.shape().to_vec(), data: p.data().to_vec() };
                (p.name().to_string(), tensor)
            })
            .collect();
        Self { tensors }
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<TensorData> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorData)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the entries whose key satisfies `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.tensors.retain(|k, _| keep(k));
    }

    /// Rename every key through `rename`
    pub fn rename_keys(self, mut rename: impl FnMut(&str) -> String) -> Self {
        let tensors = self.tensors.into_iter().map(|(k, v)| (rename(&k), v)).collect();
        Self { tensors }
    }

    /// Merge `other` into `self`, later entries winning
    pub fn extend(&mut self, other: StateDict) {
        self.tensors.extend(other.tensors);
    }

    /// Copy matching entries into `params`
    pub fn apply_to(&self, params: &mut [&mut dyn Parameter], strict: bool) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut seen = Vec::with_capacity(params.len());

        for param in params.iter_mut() {
            let name = param.name().to_string();
            match self.tensors.get(&name) {
                Some(tensor) => {
                    if tensor.data.len() != param.numel() {
                        return Err(Error::StateDict(format!(
                            "shape mismatch for '{name}': checkpoint {:?}, module {:?}",
                            tensor.shape,
                            param.shape()
                        )));
                    }
                    param.data_mut().copy_from_slice(&tensor.data);
                    seen.push(name);
                }
                None => report.missing.push(name),
            }
        }

        report.unexpected =
            self.tensors.keys().filter(|k| !seen.contains(k)).cloned().collect();

        if strict && !report.is_clean() {
            return Err(Error::StateDict(format!(
                "missing keys {:?}, unexpected keys {:?}",
                report.missing, report.unexpected
            )));
        }
        Ok(report)
    }

    /// Encode as SafeTensors bytes
    pub fn to_safetensors(&self, metadata: Option<HashMap<String, String>>) -> Result<Vec<u8>> {
        let buffers: Vec<(&str, Vec<usize>, Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, t)| {
                let bytes = t.data.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.as_str(), t.shape.clone(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(buffers.len());
        for (name, shape, bytes) in &buffers {
            views.push((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?));
        }
        Ok(safetensors::serialize(views, metadata)?)
    }

    /// Decode SafeTensors bytes (F32 tensors only)
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)?;
        let mut state = Self::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(Error::StateDict(format!(
                    "tensor '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            let data = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            state.insert(name, TensorData { shape: view.shape().to_vec(), data });
        }
        Ok(state)
    }

    /// Write to a `.safetensors` file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), "ajustar".to_string());
        std::fs::write(path, self.to_safetensors(Some(metadata))?)?;
        Ok(())
    }

    /// Read from a `.safetensors` file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_safetensors(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Param;

    #[test]
    fn test_safetensors_file_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("model.safetensors");

        let mut state = StateDict::new();
        state.insert("layer.weight", TensorData { shape: vec![2, 2], data: vec![1.0, -2.0, 3.5, 0.0] });
        state.insert("layer.bias", TensorData { shape: vec![2], data: vec![0.25, 0.5] });
        state.save(&path).unwrap();

        let loaded = StateDict::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_apply_strict_rejects_missing_keys() {
        let mut w = Param::new("w", vec![0.0]);
        let mut b = Param::new("b", vec![0.0]);
        let mut state = StateDict::new();
        state.insert("w", TensorData { shape: vec![1], data: vec![4.0] });

        let err = state.apply_to(&mut [&mut w, &mut b], true).unwrap_err();
        assert!(matches!(err, Error::StateDict(_)));
    }

    #[test]
    fn test_apply_non_strict_reports_keys() {
        let mut w = Param::new("w", vec![0.0]);
        let mut b = Param::new("b", vec![0.0]);
        let mut state = StateDict::new();
        state.insert("w", TensorData { shape: vec![1], data: vec![4.0] });
        state.insert("extra", TensorData { shape: vec![1], data: vec![1.0] });

        let report = state.apply_to(&mut [&mut w, &mut b], false).unwrap();
        assert_eq!(report.missing, vec!["b".to_string()]);
        assert_eq!(report.unexpected, vec!["extra".to_string()]);
        assert_eq!(w.data(), &[4.0]);
    }

    #[test]
    fn test_shape_mismatch_is_always_an_error() {
        let mut w = Param::new("w", vec![0.0, 0.0]);
        let mut state = StateDict::new();
        state.insert("w", TensorData { shape: vec![1], data: vec![4.0] });
        assert!(state.apply_to(&mut [&mut w], false).is_err());
    }

    #[test]
    fn test_rename_keys() {
        let mut state = StateDict::new();
        state.insert("module.w", TensorData { shape: vec![1], data: vec![1.0] });
        let renamed = state.rename_keys(|k| k.trim_start_matches("module.").to_string());
        assert!(renamed.get("w").is_some());
    }
}
