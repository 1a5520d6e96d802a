// SPDX-License-Identifier: AGPL-3.0-only

//! Backend dispatch — named numeric operations over swappable variants.
//!
//! Every numerically heavy operation the tracking loop needs (`drift`,
//! `kick`, `slice`, ...) is a method of the [`BeamMath`] trait, implemented
//! once per execution target:
//!
//! | Variant | Target |
//! |---------|--------|
//! | [`reference::ReferenceBackend`] | scalar CPU loops, ground truth |
//! | [`vector::VectorBackend`] | rayon-parallel CPU |
//! | [`device::DeviceBackend`] | wgpu compute shaders |
//! | [`multi_node::MultiNodeBackend`] | distributed exec-mode tag, node-local vector compute |
//!
//! The active variant lives in a [`BackendContext`] value that call sites
//! receive by reference — there is no process-global mutable table, so a
//! switch is one atomic `Arc` replacement and concurrent readers of *other*
//! contexts are unaffected. Callables resolved through [`BackendContext::resolve`]
//! bind the variant active at resolve time and are deliberately **not**
//! retroactively updated by a later switch: call sites that must follow
//! switches resolve per call (or use [`BackendContext::ops`]), never cache a
//! [`Kernel`] across one.

pub mod device;
pub mod multi_node;
pub mod random;
pub mod reference;
pub mod shaders;
pub mod vector;

use std::fmt;
use std::sync::Arc;

use crate::error::BeamlineError;
use crate::gpu::GpuDevice;
use crate::precision::Precision;
use crate::ring::{DriftParams, RfParams};

/// Stable identifier of one named numeric capability.
///
/// The string names are the wire/config-facing identity; the enum is what
/// keeps the calling contract compile-time checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Advance arrival times from energy offsets (equation of motion).
    Drift,
    /// Discrete RF energy kick from the sum over harmonics.
    Kick,
    /// RF voltage sampled on the profile grid.
    RfVoltComp,
    /// Energy kick from a voltage array linearly interpolated at each particle.
    LinearInterpKick,
    /// Histogram of arrival times onto the profile grid.
    Slice,
    /// Beam phase relative to the RF wave (profile-weighted, band-filtered).
    BeamPhase,
    /// Beam phase without the exponential window.
    BeamPhaseFast,
    /// Synchrotron-radiation damping.
    SynchrotronRadiation,
    /// Synchrotron-radiation damping plus quantum excitation.
    SynchrotronRadiationFull,
    /// Piecewise-linear interpolation of a sampled function.
    Interp,
    /// Full-mode discrete convolution.
    Convolve,
    /// Arithmetic mean of an array.
    Mean,
    /// Population standard deviation of an array.
    Std,
    /// Reseed the backend's deterministic noise source.
    SetRandomSeed,
}

impl Op {
    /// Every operation the simulation requires from an active variant.
    pub const ALL: [Self; 14] = [
        Self::Drift,
        Self::Kick,
        Self::RfVoltComp,
        Self::LinearInterpKick,
        Self::Slice,
        Self::BeamPhase,
        Self::BeamPhaseFast,
        Self::SynchrotronRadiation,
        Self::SynchrotronRadiationFull,
        Self::Interp,
        Self::Convolve,
        Self::Mean,
        Self::Std,
        Self::SetRandomSeed,
    ];

    /// Stable string name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Drift => "drift",
            Self::Kick => "kick",
            Self::RfVoltComp => "rf_volt_comp",
            Self::LinearInterpKick => "linear_interp_kick",
            Self::Slice => "slice",
            Self::BeamPhase => "beam_phase",
            Self::BeamPhaseFast => "beam_phase_fast",
            Self::SynchrotronRadiation => "synchrotron_radiation",
            Self::SynchrotronRadiationFull => "synchrotron_radiation_full",
            Self::Interp => "interp",
            Self::Convolve => "convolve",
            Self::Mean => "mean",
            Self::Std => "std",
            Self::SetRandomSeed => "set_random_seed",
        }
    }

    /// Parse a stable string name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which interchangeable implementation set a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTag {
    /// Scalar CPU reference.
    Reference,
    /// Rayon-parallel CPU.
    Vector,
    /// GPU compute shaders.
    Device,
    /// Distributed execution (node-local compute + exec-mode tag).
    MultiNode,
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Vector => write!(f, "vector"),
            Self::Device => write!(f, "device"),
            Self::MultiNode => write!(f, "multi_node"),
        }
    }
}

/// Active execution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Host only.
    #[default]
    None,
    /// One GPU, bound for the process lifetime.
    Gpu,
    /// Distributed across nodes.
    MultiNode,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gpu => write!(f, "gpu"),
            Self::MultiNode => write!(f, "multi_node"),
        }
    }
}

/// The named-operation contract every backend variant satisfies.
///
/// For a fixed operation, argument shapes, units, and dtype are identical
/// across variants, and results agree within the documented tolerances
/// (`crate::tolerances`). Array-shape violations surface as
/// [`BeamlineError::ShapeMismatch`] on every variant alike.
pub trait BeamMath: fmt::Debug + Send + Sync {
    /// Which implementation set this is.
    fn tag(&self) -> BackendTag;

    /// Whether this variant supplies the given operation.
    fn provides(&self, op: Op) -> bool {
        let _ = op;
        true
    }

    /// Reseed the deterministic noise source used by quantum excitation.
    fn set_random_seed(&self, seed: u64);

    /// Advance arrival times by one turn from the energy offsets.
    fn drift(&self, dt: &mut [f64], de: &[f64], params: &DriftParams)
        -> Result<(), BeamlineError>;

    /// Apply the discrete RF kick (sum over harmonics) to the energy offsets.
    fn kick(&self, dt: &[f64], de: &mut [f64], rf: &RfParams) -> Result<(), BeamlineError>;

    /// RF voltage sampled on the profile bin centers.
    fn rf_volt_comp(&self, rf: &RfParams, bin_centers: &[f64])
        -> Result<Vec<f64>, BeamlineError>;

    /// Kick each particle with the voltage interpolated at its arrival time.
    ///
    /// Particles outside the grid receive only the acceleration kick.
    fn linear_interp_kick(
        &self,
        dt: &[f64],
        de: &mut [f64],
        voltage: &[f64],
        bin_centers: &[f64],
        charge: f64,
        acceleration_kick: f64,
    ) -> Result<(), BeamlineError>;

    /// Histogram arrival times into `profile` over `[cut_left, cut_right)`.
    ///
    /// `profile` is zeroed first; out-of-range particles are dropped.
    fn slice(
        &self,
        dt: &[f64],
        profile: &mut [f64],
        cut_left: f64,
        cut_right: f64,
    ) -> Result<(), BeamlineError>;

    /// Beam phase: ratio of sine- to cosine-weighted profile integrals under
    /// an exponential window `exp(alpha * t)`.
    fn beam_phase(
        &self,
        bin_centers: &[f64],
        profile: &[f64],
        alpha: f64,
        omega_rf: f64,
        phi_rf: f64,
    ) -> Result<f64, BeamlineError>;

    /// Beam phase without the exponential window.
    fn beam_phase_fast(
        &self,
        bin_centers: &[f64],
        profile: &[f64],
        omega_rf: f64,
        phi_rf: f64,
    ) -> Result<f64, BeamlineError>;

    /// Synchrotron-radiation damping: `n_kicks` damping sub-kicks per turn.
    fn synchrotron_radiation(
        &self,
        de: &mut [f64],
        u0: f64,
        n_kicks: u32,
        tau_z: f64,
    ) -> Result<(), BeamlineError>;

    /// Damping plus Gaussian quantum excitation.
    fn synchrotron_radiation_full(
        &self,
        de: &mut [f64],
        u0: f64,
        n_kicks: u32,
        tau_z: f64,
        sigma_de: f64,
        energy: f64,
    ) -> Result<(), BeamlineError>;

    /// Piecewise-linear interpolation of `(xp, yp)` at points `x`.
    ///
    /// `xp` must be ascending; `left`/`right` default to the boundary values.
    fn interp(
        &self,
        x: &[f64],
        xp: &[f64],
        yp: &[f64],
        left: Option<f64>,
        right: Option<f64>,
    ) -> Result<Vec<f64>, BeamlineError>;

    /// Full-mode discrete convolution (output length `n + m - 1`).
    fn convolve(&self, signal: &[f64], kernel: &[f64]) -> Result<Vec<f64>, BeamlineError>;

    /// Arithmetic mean (0.0 for an empty array).
    fn mean(&self, x: &[f64]) -> f64;

    /// Population standard deviation (0.0 for an empty array).
    fn std(&self, x: &[f64]) -> f64;
}

/// Read-only snapshot of the active backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendState {
    /// Active implementation set.
    pub tag: BackendTag,
    /// Active floating-point width.
    pub precision: Precision,
    /// Active execution target.
    pub device: DeviceMode,
}

/// A callable resolved against the variant that was active at resolve time.
///
/// Holding a `Kernel` across a backend switch keeps the *old* implementation
/// alive and dispatches to it — the documented non-retroactivity contract.
#[derive(Debug, Clone)]
pub struct Kernel {
    op: Op,
    math: Arc<dyn BeamMath>,
}

impl Kernel {
    /// The operation this kernel was resolved for.
    #[must_use]
    pub const fn op(&self) -> Op {
        self.op
    }

    /// Tag of the variant this kernel is bound to.
    #[must_use]
    pub fn tag(&self) -> BackendTag {
        self.math.tag()
    }

    /// The bound implementation set.
    #[must_use]
    pub fn math(&self) -> &dyn BeamMath {
        &*self.math
    }
}

/// The active backend state: one variant, one precision, one device mode.
///
/// Constructed once per configuration and passed by reference to every call
/// site. Initial state is `{reference, double, none}`. A switch replaces the
/// entire variant atomically — never a per-operation delta.
#[derive(Debug, Clone)]
pub struct BackendContext {
    active: Arc<dyn BeamMath>,
    precision: Precision,
    device: DeviceMode,
    gpu: Option<Arc<GpuDevice>>,
}

impl Default for BackendContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendContext {
    /// Context in the initial state `{reference, double, none}`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(reference::ReferenceBackend::new()),
            precision: Precision::Double,
            device: DeviceMode::None,
            gpu: None,
        }
    }

    /// Atomically replace the active variant.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::UnknownOperation`] if the variant fails to supply any
    /// operation the simulation requires; the previous state is untouched.
    pub fn switch_backend(
        &mut self,
        variant: Arc<dyn BeamMath>,
        precision: Precision,
        device: DeviceMode,
    ) -> Result<(), BeamlineError> {
        for op in Op::ALL {
            if !variant.provides(op) {
                return Err(BeamlineError::UnknownOperation(op.name().to_string()));
            }
        }
        self.active = variant;
        self.precision = precision;
        self.device = device;
        Ok(())
    }

    /// Revert to the scalar reference variant.
    ///
    /// Does not tear down a bound GPU: device resources stay reserved until
    /// process exit.
    pub fn use_reference(&mut self) {
        self.active = Arc::new(reference::ReferenceBackend::new());
        self.device = DeviceMode::None;
    }

    /// Switch to the rayon-parallel CPU variant.
    pub fn use_vector(&mut self) {
        self.active = Arc::new(vector::VectorBackend::new());
        self.device = DeviceMode::None;
    }

    /// Switch to the distributed variant (node-local vector compute).
    pub fn use_multi_node(&mut self, n_nodes: usize) {
        self.active = Arc::new(multi_node::MultiNodeBackend::new(n_nodes));
        self.device = DeviceMode::MultiNode;
    }

    /// Switch to the GPU variant on an acquired device.
    ///
    /// Compiles/selects the shader set for `precision` before the variant
    /// becomes active, so no dispatch ever runs under a stale width.
    /// Re-switching onto the same bound device is a no-op at the device
    /// layer; rebinding a different device fails in [`GpuDevice::acquire`].
    ///
    /// # Errors
    ///
    /// [`BeamlineError::NoShaderF64`] when `precision` is
    /// [`Precision::Double`] on a device without f64 shader support.
    pub fn use_device(
        &mut self,
        gpu: &Arc<GpuDevice>,
        precision: Precision,
    ) -> Result<(), BeamlineError> {
        let backend = device::DeviceBackend::new(Arc::clone(gpu), precision)?;
        self.active = Arc::new(backend);
        self.precision = precision;
        self.device = DeviceMode::Gpu;
        self.gpu = Some(Arc::clone(gpu));
        Ok(())
    }

    /// Change the active precision.
    ///
    /// On the device variant this rebuilds the backend so subsequently
    /// dispatched kernels use the new width; host variants carry the width
    /// in their f64 arithmetic and only the descriptor changes.
    ///
    /// # Errors
    ///
    /// Same as [`Self::use_device`] when a device is active.
    pub fn use_precision(&mut self, precision: Precision) -> Result<(), BeamlineError> {
        if self.device == DeviceMode::Gpu {
            let gpu = self
                .gpu
                .clone()
                .ok_or_else(|| BeamlineError::DeviceCreation("no device bound".into()))?;
            return self.use_device(&gpu, precision);
        }
        self.precision = precision;
        Ok(())
    }

    /// The active implementation set (the normal dispatch path).
    #[must_use]
    pub fn ops(&self) -> &dyn BeamMath {
        &*self.active
    }

    /// Resolve an operation name against the active variant.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::UnknownOperation`] if the name is not a known
    /// operation or the active variant does not provide it.
    pub fn resolve(&self, name: &str) -> Result<Kernel, BeamlineError> {
        let op = Op::parse(name)
            .ok_or_else(|| BeamlineError::UnknownOperation(name.to_string()))?;
        if !self.active.provides(op) {
            return Err(BeamlineError::UnknownOperation(name.to_string()));
        }
        Ok(Kernel {
            op,
            math: Arc::clone(&self.active),
        })
    }

    /// Read-only snapshot of `{variant tag, precision, device mode}`.
    #[must_use]
    pub fn current_state(&self) -> BackendState {
        BackendState {
            tag: self.active.tag(),
            precision: self.precision,
            device: self.device,
        }
    }

    /// Active floating-point width.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }
}
