//! The compile pass: replays a pattern's command log against a
//! [`MachineState`], turning authored courses into machine primitives.
//!
//! Yarn activation, the implicit first cast-on, direction selection, fixation
//! release, carrier retirement and the final drop-off all happen here; the
//! pattern itself stays a passive description.
//!
//! [`MachineState`]: crate::machine::MachineState

pub mod compiler;

pub use compiler::{GenerateOpts, GenerateReport, Position, generate};
