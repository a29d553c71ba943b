//! Per-step log record

use serde::{Deserialize, Serialize};

/// Ordered metric name → value map, rebuilt every step.
///
/// Insertion order is kept so progress columns stay stable; re-inserting an
/// existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    entries: Vec<(String, f32)>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: f32) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert every pair in order
    pub fn extend<K: Into<String>>(&mut self, values: impl IntoIterator<Item = (K, f32)>) {
        for (k, v) in values {
            self.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<f32> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut f32)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `key: value` pairs joined for log lines
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}: {}", format_value(*v)))
            .collect::<Vec<_>>()
            .join(" - ")
    }
}

fn format_value(v: f32) -> String {
    if v != 0.0 && v.abs() < 1e-3 {
        format!("{v:.4e}")
    } else {
        format!("{v:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_position() {
        let mut logs = LogRecord::new();
        logs.insert("lr", 0.1);
        logs.insert("loss", 2.0);
        logs.insert("lr", 0.05);
        assert_eq!(logs.keys().collect::<Vec<_>>(), vec!["lr", "loss"]);
        assert_eq!(logs.get("lr"), Some(0.05));
    }

    #[test]
    fn test_remove_and_contains() {
        let mut logs = LogRecord::new();
        logs.extend([("a", 1.0), ("b", 2.0)]);
        assert_eq!(logs.remove("a"), Some(1.0));
        assert!(!logs.contains("a"));
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_summary_formatting() {
        let mut logs = LogRecord::new();
        logs.insert("lr", 2e-5);
        logs.insert("loss", 0.5);
        assert_eq!(logs.summary(), "lr: 2.0000e-5 - loss: 0.5000");
    }
}
