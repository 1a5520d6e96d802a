// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for backend dispatch, pipeline assembly, and tracking.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (unknown operation, device rebind,
//! unrecognized stage) rather than parsing opaque strings. None of these are
//! retried internally: retrying a deterministic computation does not change
//! its outcome, so every error propagates to the immediate caller.

use std::fmt;

/// Errors arising from backend switching, dispatch, assembly, or tracking.
#[derive(Debug)]
pub enum BeamlineError {
    /// A configured stage name has no registered constructor; assembly is
    /// aborted before any pipeline is produced.
    NotTrackable(String),

    /// An operation-name lookup has no entry in the active backend variant.
    UnknownOperation(String),

    /// A backend switch requested a device id different from the one already
    /// bound for this process (one device per process, for its lifetime).
    DeviceAlreadyBound {
        /// Adapter index bound earlier in this process.
        bound: usize,
        /// Adapter index the rejected switch asked for.
        requested: usize,
    },

    /// An unrecognized mode string was supplied where a fixed enumerated set
    /// is expected (drift solver, precision, device mode).
    UnsupportedMode(String),

    /// No compatible GPU adapter was found by wgpu.
    NoAdapter,

    /// GPU lacks the `SHADER_F64` feature required for double-precision
    /// kernels.
    NoShaderF64,

    /// GPU device creation or buffer readback failed (wraps the underlying
    /// wgpu error message).
    DeviceCreation(String),

    /// Simulation config loading failed (path, underlying IO or parse error).
    ConfigLoad(String),

    /// A monitor/plot data dump could not be written.
    DataDump(String),

    /// Two array arguments to one operation disagree on length.
    ShapeMismatch {
        /// Operation name the mismatched arrays were passed to.
        op: &'static str,
        /// Length of the reference array.
        expected: usize,
        /// Length of the offending array.
        got: usize,
    },
}

impl fmt::Display for BeamlineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotTrackable(name) => {
                write!(f, "Stage '{name}' is not trackable (no registered constructor)")
            }
            Self::UnknownOperation(name) => {
                write!(f, "Operation '{name}' is not provided by the active backend")
            }
            Self::DeviceAlreadyBound { bound, requested } => {
                write!(
                    f,
                    "Device {requested} requested but device {bound} is already bound for this process"
                )
            }
            Self::UnsupportedMode(mode) => write!(f, "Unsupported mode: '{mode}'"),
            Self::NoAdapter => write!(f, "No GPU adapter found"),
            Self::NoShaderF64 => {
                write!(
                    f,
                    "GPU does not support SHADER_F64 — cannot run double-precision kernels"
                )
            }
            Self::DeviceCreation(e) => write!(f, "GPU device error: {e}"),
            Self::ConfigLoad(msg) => write!(f, "Config loading failed: {msg}"),
            Self::DataDump(msg) => write!(f, "Data dump failed: {msg}"),
            Self::ShapeMismatch { op, expected, got } => {
                write!(f, "{op}: array length mismatch (expected {expected}, got {got})")
            }
        }
    }
}

impl std::error::Error for BeamlineError {}
