//! Mixed-precision policy
//!
//! - `Precision` - numeric policy for the forward pass
//! - `MixedPrecisionConfig` - loss-scaling parameters
//! - `GradScaler` - dynamic loss scaler with overflow backoff

mod config;
mod scaler;

pub use config::MixedPrecisionConfig;
pub use scaler::GradScaler;

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forward-pass precision policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Full precision (default)
    #[default]
    #[serde(alias = "off", alias = "none", alias = "no")]
    Fp32,
    /// 16-bit float autocast with dynamic loss scaling
    Fp16,
    /// bfloat16 autocast, no loss scaling
    Bf16,
}

impl Precision {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
        }
    }

    /// Whether forward runs under autocast
    pub fn is_reduced(&self) -> bool {
        matches!(self, Precision::Fp16 | Precision::Bf16)
    }

    /// Whether this policy needs a loss scaler
    pub fn needs_scaler(&self) -> bool {
        matches!(self, Precision::Fp16)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fp32" | "off" | "none" | "no" | "" => Ok(Precision::Fp32),
            "fp16" | "float16" => Ok(Precision::Fp16),
            "bf16" | "bfloat16" => Ok(Precision::Bf16),
            other => Err(Error::config(format!(
                "unsupported precision '{other}', expected one of fp32, fp16, bf16"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_from_str() {
        assert_eq!("fp16".parse::<Precision>().unwrap(), Precision::Fp16);
        assert_eq!("BF16".parse::<Precision>().unwrap(), Precision::Bf16);
        assert_eq!("off".parse::<Precision>().unwrap(), Precision::Fp32);
        assert!(matches!("int8".parse::<Precision>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_precision_serde_aliases() {
        let p: Precision = serde_yaml::from_str("off").unwrap();
        assert_eq!(p, Precision::Fp32);
        let p: Precision = serde_yaml::from_str("bf16").unwrap();
        assert_eq!(p, Precision::Bf16);
        assert!(serde_yaml::from_str::<Precision>("fp8").is_err());
    }

    #[test]
    fn test_only_fp16_needs_scaler() {
        assert!(Precision::Fp16.needs_scaler());
        assert!(!Precision::Bf16.needs_scaler());
        assert!(Precision::Bf16.is_reduced());
        assert!(!Precision::Fp32.is_reduced());
    }
}
