// SPDX-License-Identifier: AGPL-3.0-only

//! Profile measurement stage.

use crate::assembler::{Stage, TrackContext};
use crate::error::BeamlineError;

/// Slices the beam onto the shared profile grid once per turn.
///
/// Runs first in the pipeline: every downstream consumer (induced voltage,
/// interpolated kick, plots) reads the histogram this stage refreshes.
#[derive(Debug, Default)]
pub struct Profile;

impl Profile {
    /// New profile stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Profile {
    fn stage_name(&self) -> &str {
        "Profile"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        let state = &mut *ctx.state;
        let grid = &mut state.profile;
        ctx.backend.ops().slice(
            &state.beam.dt,
            &mut grid.hist,
            grid.cut_left,
            grid.cut_right,
        )
    }
}
