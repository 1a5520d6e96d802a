// SPDX-License-Identifier: AGPL-3.0-only

//! Bunch statistics monitor stage.

use std::io::Write;

use crate::assembler::{Stage, TrackContext};
use crate::error::BeamlineError;

/// Per-turn bunch statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnStats {
    /// Turn the snapshot was taken in (pre-increment counter value).
    pub turn: u64,
    /// Mean arrival time [s].
    pub mean_dt: f64,
    /// Mean energy offset [eV].
    pub mean_de: f64,
    /// RMS bunch length [s].
    pub sigma_dt: f64,
    /// RMS energy spread [eV].
    pub sigma_de: f64,
}

/// Records bunch statistics every `every` turns into an in-memory trace.
#[derive(Debug)]
pub struct BunchMonitor {
    every: u64,
    trace: Vec<TurnStats>,
}

impl BunchMonitor {
    /// Monitor sampling every `every` turns (0 is clamped to 1).
    #[must_use]
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            trace: Vec::new(),
        }
    }

    /// Recorded statistics, in turn order.
    #[must_use]
    pub fn trace(&self) -> &[TurnStats] {
        &self.trace
    }

    /// Write the trace as whitespace-separated columns with a header row.
    ///
    /// # Errors
    ///
    /// [`BeamlineError::DataDump`] on any write failure.
    pub fn dump(&self, mut w: impl Write) -> Result<(), BeamlineError> {
        let io = |e: std::io::Error| BeamlineError::DataDump(e.to_string());
        writeln!(w, "# turn mean_dt mean_de sigma_dt sigma_de").map_err(io)?;
        for s in &self.trace {
            writeln!(
                w,
                "{} {:.9e} {:.9e} {:.9e} {:.9e}",
                s.turn, s.mean_dt, s.mean_de, s.sigma_dt, s.sigma_de
            )
            .map_err(io)?;
        }
        Ok(())
    }
}

impl Stage for BunchMonitor {
    fn stage_name(&self) -> &str {
        "BunchMonitor"
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        if ctx.turn % self.every != 0 {
            return Ok(());
        }
        let ops = ctx.backend.ops();
        let beam = &ctx.state.beam;
        self.trace.push(TurnStats {
            turn: ctx.turn,
            mean_dt: ops.mean(&beam.dt),
            mean_de: ops.mean(&beam.de),
            sigma_dt: ops.std(&beam.dt),
            sigma_de: ops.std(&beam.de),
        });
        Ok(())
    }
}
