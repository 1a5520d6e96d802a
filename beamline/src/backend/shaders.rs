// SPDX-License-Identifier: AGPL-3.0-only

//! WGSL shader sources for the device backend.
//!
//! The sources are f64 templates with a `{{WG}}` workgroup-size placeholder.
//! [`specialize`] fills the placeholder and, for single precision, rewrites
//! the scalar type — the f32 kernel set is *derived*, never hand-maintained,
//! so the two widths cannot drift apart. Kernels needing `sin` are prefixed
//! with the software range-reduced sine from the prelude (native f64 trig
//! builtins are driver-dependent).

use crate::precision::Precision;

/// Software sine, shared by the kick-family kernels.
pub const PRELUDE: &str = include_str!("shaders/prelude_f64.wgsl");

/// Drift kernel (all three solver modes branch in-shader).
pub const DRIFT: &str = include_str!("shaders/drift_f64.wgsl");

/// Discrete RF kick kernel.
pub const KICK: &str = include_str!("shaders/kick_f64.wgsl");

/// RF voltage on the profile grid.
pub const RF_VOLT_COMP: &str = include_str!("shaders/rf_volt_comp_f64.wgsl");

/// Linearly interpolated kick on a uniform grid.
pub const LINEAR_INTERP_KICK: &str = include_str!("shaders/linear_interp_kick_f64.wgsl");

/// Synchrotron-radiation damping.
pub const SYNCHROTRON_RADIATION: &str = include_str!("shaders/synchrotron_radiation_f64.wgsl");

/// Fill the workgroup-size placeholder and select the scalar width.
#[must_use]
pub fn specialize(source: &str, precision: Precision, workgroup_size: u32) -> String {
    let sized = source.replace("{{WG}}", &workgroup_size.to_string());
    match precision {
        Precision::Double => sized,
        Precision::Single => sized.replace("f64", "f32"),
    }
}

/// Drift kernel source for the given width and workgroup size.
#[must_use]
pub fn drift_source(precision: Precision, workgroup_size: u32) -> String {
    specialize(DRIFT, precision, workgroup_size)
}

/// Kick kernel source (prelude + kernel).
#[must_use]
pub fn kick_source(precision: Precision, workgroup_size: u32) -> String {
    specialize(&format!("{PRELUDE}\n{KICK}"), precision, workgroup_size)
}

/// RF-voltage kernel source (prelude + kernel).
#[must_use]
pub fn rf_volt_comp_source(precision: Precision, workgroup_size: u32) -> String {
    specialize(
        &format!("{PRELUDE}\n{RF_VOLT_COMP}"),
        precision,
        workgroup_size,
    )
}

/// Interpolated-kick kernel source.
#[must_use]
pub fn linear_interp_kick_source(precision: Precision, workgroup_size: u32) -> String {
    specialize(LINEAR_INTERP_KICK, precision, workgroup_size)
}

/// Radiation-damping kernel source.
#[must_use]
pub fn synchrotron_radiation_source(precision: Precision, workgroup_size: u32) -> String {
    specialize(SYNCHROTRON_RADIATION, precision, workgroup_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialize_fills_workgroup_size() {
        let src = drift_source(Precision::Double, 128);
        assert!(!src.contains("{{WG}}"));
        assert!(src.contains("@workgroup_size(128)"));
        assert!(src.contains("128u"));
    }

    #[test]
    fn single_precision_rewrites_scalar_type() {
        let src = kick_source(Precision::Single, 64);
        assert!(!src.contains("f64"));
        assert!(src.contains("f32"));
        assert!(src.contains("sin_rr"));
    }

    #[test]
    fn double_precision_keeps_f64() {
        let src = synchrotron_radiation_source(Precision::Double, 256);
        assert!(src.contains("f64"));
        assert!(!src.contains("f32"));
    }

    #[test]
    fn kick_family_carries_the_prelude() {
        assert!(kick_source(Precision::Double, 64).contains("fn sin_rr"));
        assert!(rf_volt_comp_source(Precision::Double, 64).contains("fn sin_rr"));
        // drift has no trig and stays prelude-free
        assert!(!drift_source(Precision::Double, 64).contains("fn sin_rr"));
    }
}
