// SPDX-License-Identifier: AGPL-3.0-only

//! Pipeline assembly and turn-by-turn tracking.
//!
//! The assembler takes an unordered set of stages and produces a [`Tracker`]
//! whose pipeline respects the fixed domain ordering in [`STAGE_ORDER`]:
//! profile measurement feeds induced voltage, induced voltage feeds the RF
//! kick, monitors and plots observe the finished turn. Stage types the
//! table does not know sort last, preserving their relative input order.
//!
//! Stages are a formal trait; a bare function becomes a stage through the
//! [`FnStage`] adapter. Stages communicate only through the shared
//! [`SimState`](crate::stages::SimState) handed to every `track` call —
//! stage *i*'s effects are visible to stage *i+1* within the same turn,
//! never the reverse.

use std::fmt;

use crate::backend::BackendContext;
use crate::error::BeamlineError;
use crate::stages::SimState;

/// Fixed total preorder over known stage type names.
///
/// Lower index runs earlier. Unknown names rank after every known one.
pub const STAGE_ORDER: [&str; 6] = [
    "Profile",
    "TotalInducedVoltage",
    "FullRingAndRf",
    "RingRfTracker",
    "BunchMonitor",
    "Plot",
];

/// Rank of a stage type name; unknown names get the maximal rank.
#[must_use]
pub fn stage_rank(name: &str) -> usize {
    STAGE_ORDER
        .iter()
        .position(|&known| known == name)
        .unwrap_or(STAGE_ORDER.len())
}

/// Everything a stage sees during one turn: the active backend, the shared
/// simulation state, and the number of turns completed before this one.
pub struct TrackContext<'a> {
    /// Active backend; stages resolve operations through it on every call,
    /// never across a backend switch.
    pub backend: &'a BackendContext,
    /// Shared mutable simulation state.
    pub state: &'a mut SimState,
    /// Turns completed before this call (the counter advances only after
    /// every stage of the turn succeeds).
    pub turn: u64,
}

/// One unit of per-turn simulation work.
pub trait Stage {
    /// Runtime type name, matched against [`STAGE_ORDER`].
    fn stage_name(&self) -> &str;

    /// Advance this stage by one turn.
    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError>;
}

/// Adapter turning a bare callable into a [`Stage`].
///
/// The name given here is what the ordering table sees, so ad hoc stages
/// can opt into a known slot or deliberately stay unknown-ranked.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: FnMut(&mut TrackContext<'_>) -> Result<(), BeamlineError>,
{
    /// Wrap a callable under the given stage name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Stage for FnStage<F>
where
    F: FnMut(&mut TrackContext<'_>) -> Result<(), BeamlineError>,
{
    fn stage_name(&self) -> &str {
        &self.name
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> Result<(), BeamlineError> {
        (self.f)(ctx)
    }
}

struct Entry {
    rank: usize,
    stage: Box<dyn Stage>,
}

/// Assembles stage sets into trackers.
#[derive(Debug, Default)]
pub struct Assembler;

impl Assembler {
    /// Order the supplied stages by [`STAGE_ORDER`] and produce a tracker.
    ///
    /// Insertion is a stable linear scan: each stage lands immediately
    /// before the first already-inserted stage of strictly greater rank, so
    /// equal-rank and unknown stages keep their relative input order and
    /// the result is deterministic for a given input order.
    #[must_use]
    pub fn assemble(stages: Vec<Box<dyn Stage>>) -> Tracker {
        let mut tracker = Tracker::new();
        for stage in stages {
            tracker.insert_ordered(stage);
        }
        tracker
    }
}

/// The ordered, executable pipeline plus the turn counter.
///
/// A tracker has no terminal state — it may be invoked indefinitely. A turn
/// either fully completes and advances the counter by exactly one, or fails
/// without advancing it (shared state mutated by earlier stages of the
/// failed turn is *not* rolled back; callers must not resume without
/// external intervention).
pub struct Tracker {
    pipeline: Vec<Entry>,
    turn: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    /// Empty tracker at turn 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline: Vec::new(),
            turn: 0,
        }
    }

    fn insert_ordered(&mut self, stage: Box<dyn Stage>) {
        let rank = stage_rank(stage.stage_name());
        let pos = self
            .pipeline
            .iter()
            .position(|e| e.rank > rank)
            .unwrap_or(self.pipeline.len());
        self.pipeline.insert(pos, Entry { rank, stage });
    }

    /// Append a stage at the end of the pipeline, bypassing the ordering
    /// table. Escape hatch for stages that must run strictly last.
    pub fn append_stage(&mut self, stage: Box<dyn Stage>) {
        let rank = stage_rank(stage.stage_name());
        self.pipeline.push(Entry { rank, stage });
    }

    /// Execute one turn: every stage in pipeline order, same shared context.
    ///
    /// # Errors
    ///
    /// The first stage error propagates unchanged; the turn counter is not
    /// incremented and remaining stages do not run.
    pub fn track(
        &mut self,
        backend: &BackendContext,
        state: &mut SimState,
    ) -> Result<(), BeamlineError> {
        let mut ctx = TrackContext {
            backend,
            state,
            turn: self.turn,
        };
        for entry in &mut self.pipeline {
            entry.stage.track(&mut ctx)?;
        }
        self.turn += 1;
        Ok(())
    }

    /// Turns completed so far.
    #[must_use]
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipeline.iter().map(|e| e.stage.stage_name()).collect()
    }

    /// Number of stages in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipeline.len()
    }

    /// Whether the pipeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty()
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Tracker] Pipeline: [")?;
        for (i, entry) in self.pipeline.iter().enumerate() {
            if i > 0 {
                write!(f, " --> ")?;
            }
            write!(f, "{}", entry.stage.stage_name())?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("pipeline", &self.pipeline_names())
            .field("turn", &self.turn)
            .finish()
    }
}
