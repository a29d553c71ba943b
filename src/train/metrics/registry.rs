//! Ordered metric registry

use super::Metric;
use crate::train::LogRecord;
use crate::{Error, Result};

/// Metric returning one value under a fixed key
pub type MetricFn<O, Y> = Box<dyn Fn(&O, &Y) -> Option<f32>>;

/// Metric returning any number of named values
pub type MultiMetricFn<O, Y> = Box<dyn Fn(&O, &Y) -> Vec<(String, f32)>>;

/// Metric registration passed to `compile`
pub enum MetricSpec<O, Y> {
    /// Bare name; only `"loss"` is computed internally
    Name(String),
    /// Function logged under `name`
    Keyed(String, MetricFn<O, Y>),
    /// Function that chooses its own keys
    Unkeyed(MultiMetricFn<O, Y>),
}

impl<O, Y> MetricSpec<O, Y> {
    pub fn name(name: impl Into<String>) -> Self {
        MetricSpec::Name(name.into())
    }

    pub fn keyed(name: impl Into<String>, f: impl Fn(&O, &Y) -> Option<f32> + 'static) -> Self {
        MetricSpec::Keyed(name.into(), Box::new(f))
    }

    pub fn unkeyed(f: impl Fn(&O, &Y) -> Vec<(String, f32)> + 'static) -> Self {
        MetricSpec::Unkeyed(Box::new(f))
    }

    /// Register a typed [`Metric`] under its own name
    pub fn metric(metric: impl Metric<O, Y> + 'static) -> Self {
        let name = metric.name().to_string();
        MetricSpec::Keyed(name, Box::new(move |o, y| metric.compute(o, y)))
    }
}

enum Entry<O, Y> {
    Loss,
    Keyed(String, MetricFn<O, Y>),
    Unkeyed(MultiMetricFn<O, Y>),
}

/// Registered metrics in first-registration order.
///
/// `loss` is always the first entry and is filled by the trainer, not
/// computed here.
pub struct Metrics<O, Y> {
    entries: Vec<Entry<O, Y>>,
}

impl<O, Y> Default for Metrics<O, Y> {
    fn default() -> Self {
        Self { entries: vec![Entry::Loss] }
    }
}

impl<O, Y> Metrics<O, Y> {
    /// Build a registry, rejecting bare names other than `loss`
    pub fn from_specs(specs: impl IntoIterator<Item = MetricSpec<O, Y>>) -> Result<Self> {
        let mut metrics = Self::default();
        for spec in specs {
            metrics.register(spec)?;
        }
        Ok(metrics)
    }

    pub fn register(&mut self, spec: MetricSpec<O, Y>) -> Result<()> {
        match spec {
            MetricSpec::Name(name) if name == "loss" => {}
            MetricSpec::Name(name) => {
                return Err(Error::config(format!(
                    "unsupported metric '{name}': register it with a compute function"
                )));
            }
            MetricSpec::Keyed(name, _) if self.names().any(|n| n == name) => {
                return Err(Error::config(format!("metric '{name}' registered twice")));
            }
            MetricSpec::Keyed(name, f) => self.entries.push(Entry::Keyed(name, f)),
            MetricSpec::Unkeyed(f) => self.entries.push(Entry::Unkeyed(f)),
        }
        Ok(())
    }

    /// Names of `loss` and keyed metrics, in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Loss => Some("loss"),
            Entry::Keyed(name, _) => Some(name.as_str()),
            Entry::Unkeyed(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute every registered metric into `logs`.
    ///
    /// Returns the keys produced by unkeyed metrics, for column discovery.
    pub fn compute_into(&self, output: &O, target: &Y, logs: &mut LogRecord) -> Vec<String> {
        let mut discovered = Vec::new();
        for entry in &self.entries {
            match entry {
                Entry::Loss => {}
                Entry::Keyed(name, f) => {
                    if let Some(value) = f(output, target) {
                        logs.insert(name.clone(), value);
                    }
                }
                Entry::Unkeyed(f) => {
                    for (key, value) in f(output, target) {
                        logs.insert(key.clone(), value);
                        discovered.push(key);
                    }
                }
            }
        }
        discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::metrics::MAE;

    type M = Metrics<Vec<f32>, Vec<f32>>;

    #[test]
    fn test_loss_always_first() {
        let metrics = M::from_specs(vec![
            MetricSpec::metric(MAE),
            MetricSpec::name("loss"),
            MetricSpec::keyed("first", |o: &Vec<f32>, _: &Vec<f32>| o.first().copied()),
        ])
        .unwrap();
        assert_eq!(metrics.names().collect::<Vec<_>>(), vec!["loss", "mae", "first"]);
    }

    #[test]
    fn test_bare_unknown_name_is_config_error() {
        let err = M::from_specs(vec![MetricSpec::name("f1")]).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = M::from_specs(vec![MetricSpec::metric(MAE), MetricSpec::metric(MAE)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_into_reports_unkeyed_columns() {
        let metrics = M::from_specs(vec![
            MetricSpec::metric(MAE),
            MetricSpec::unkeyed(|o: &Vec<f32>, _: &Vec<f32>| {
                vec![("max".to_string(), o.iter().copied().fold(f32::MIN, f32::max))]
            }),
        ])
        .unwrap();
        let mut logs = LogRecord::new();
        logs.insert("loss", 1.0);
        let discovered = metrics.compute_into(&vec![1.0, 3.0], &vec![1.0, 1.0], &mut logs);
        assert_eq!(discovered, vec!["max".to_string()]);
        assert_eq!(logs.keys().collect::<Vec<_>>(), vec!["loss", "mae", "max"]);
        assert_eq!(logs.get("mae"), Some(1.0));
    }
}
