// SPDX-License-Identifier: AGPL-3.0-only

//! Plot-data stage.
//!
//! Rendering is out of scope; this stage dumps gnuplot-ready profile
//! snapshots (`bin_center  count` columns) so runs can be inspected without
//! attaching a plotting frontend. Runs last in the pipeline by table order.

use std::fs;
use std::path::PathBuf;

use crate::assembler::{Stage, TrackContext};
use crate::error::BeamlineError;

/// Dumps the profile histogram to `<out_dir>/profile_turn_NNNNNN.dat`
/// every `every` turns.
#[derive(Debug)]
pub struct Plot {
    every: u64,
    out_dir: PathBuf,
}

impl Plot {
    /// Plot-data stage writing into `out_dir` every `every` turns.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            every: every.max(1),
            out_dir: out_dir.into(),
        }
    }

    /// Snapshot path for a given turn.
    #[must_use]
    pub fn snapshot_path(&self, turn: u64) -> PathBuf {
        self.out_dir.join(format!("profile_turn_{turn:06}.dat"))
    }
}

impl Stage for Plot {
    fn stage_name(&self) -> &str {
        "Plot"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        if ctx.turn % self.every != 0 {
            return Ok(());
        }
        let io = |e: std::io::Error| BeamlineError::DataDump(e.to_string());
        fs::create_dir_all(&self.out_dir).map_err(io)?;
        let profile = &ctx.state.profile;
        let mut text = String::with_capacity(profile.n_slices() * 32);
        text.push_str("# bin_center count\n");
        for (c, h) in profile.bin_centers.iter().zip(profile.hist.iter()) {
            text.push_str(&format!("{c:.9e} {h}\n"));
        }
        fs::write(self.snapshot_path(ctx.turn), text).map_err(io)
    }
}
