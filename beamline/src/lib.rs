// SPDX-License-Identifier: AGPL-3.0-only

#![deny(clippy::expect_used, clippy::unwrap_used)]

//! synchroSpring beamline — longitudinal beam dynamics with swappable
//! compute backends.
//!
//! A per-turn tracking loop over ordered stages (profile measurement,
//! induced voltage, RF kick/drift, monitoring, plot dumps), with the
//! numerically heavy operations dispatched through one of four
//! interchangeable backend variants: scalar reference, rayon-vectorized,
//! wgpu device, and distributed.
//!
//! ## Active modules
//!   - `backend` — named-operation dispatch over swappable variants
//!   - `assembler` — stage ordering, pipeline assembly, turn-by-turn tracker
//!   - `stages` — profile, induced voltage, RF tracker, monitor, plot dumps
//!   - `gpu` — wgpu device context (one device per process)
//!   - `config` — JSON simulation configs
//!   - `tolerances` / `validation` — documented thresholds + check harness
//!
//! ## Validation binaries
//!   - `validate_backends` — cross-variant parity for every operation
//!   - `validate_tracking` — end-to-end multi-turn tracking invariants
//!
//! ## Backend switching
//!
//! ```
//! use synchrospring_beamline::backend::{BackendContext, BackendTag};
//!
//! let mut ctx = BackendContext::new();      // {reference, double, none}
//! ctx.use_vector();                         // rayon CPU
//! let kick = ctx.resolve("kick")?;          // bound to the vector variant
//! ctx.use_reference();                      // `kick` is NOT retroactively updated
//! assert_eq!(kick.tag(), BackendTag::Vector);
//! assert_eq!(ctx.current_state().tag, BackendTag::Reference);
//! # Ok::<(), synchrospring_beamline::error::BeamlineError>(())
//! ```

pub mod assembler;
pub mod backend;
pub mod beam;
pub mod config;
pub mod error;
pub mod gpu;
pub mod precision;
pub mod ring;
pub mod stages;
pub mod tolerances;
pub mod validation;

pub use assembler::{Assembler, FnStage, Stage, TrackContext, Tracker, STAGE_ORDER};
pub use backend::{BackendContext, BackendState, BackendTag, BeamMath, DeviceMode, Kernel, Op};
pub use beam::Beam;
pub use error::BeamlineError;
pub use precision::Precision;
pub use ring::{DriftParams, RfParams, SolverMode};
pub use stages::SimState;
