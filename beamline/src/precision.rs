// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime floating-point precision selection.
//!
//! The active precision decides the array element width and which compiled
//! device kernel set is eligible for dispatch. Double is the default: the
//! process starts on `{reference, double, none}` and single precision is
//! opted into for memory-bound or GPU-throughput-bound runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BeamlineError;

/// Active floating-point width for beam arrays and device kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floats; halves memory traffic, native throughput on consumer
    /// GPUs, relaxed tolerances.
    Single,
    /// 64-bit floats; numerical stability and reproducibility of published
    /// results. Default.
    #[default]
    Double,
}

impl Precision {
    /// Short name as used in configs and kernel-set selection.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }

    /// Element width in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }

    /// Machine epsilon of the selected width, as f64.
    #[must_use]
    pub fn epsilon(self) -> f64 {
        match self {
            Self::Single => f64::from(f32::EPSILON),
            Self::Double => f64::EPSILON,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Precision {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "f32" | "float" => Ok(Self::Single),
            "double" | "f64" => Ok(Self::Double),
            _ => Err(BeamlineError::UnsupportedMode(s.to_string())),
        }
    }
}
