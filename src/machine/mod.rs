//! Machine model: bed/carrier state tracking, backend-specific sequences,
//! and the primitive operations everything compiles down to.
//!
//! [`MachineState`] simulates one V-bed machine over an [`InstructionSink`]:
//! every primitive validates against tracked state, mutates it, and emits the
//! corresponding instruction. Backend differences (how yarn comes in, how
//! fabric is cast on and off) live behind [`MachineBackend`].
//!
//! [`InstructionSink`]: crate::emit::InstructionSink

pub mod backend;
pub mod bed;
pub mod carrier;
pub mod kniterate;
pub mod spec;
pub mod state;
pub mod swg;

pub use backend::{BackendKind, CastOffArgs, CastOnArgs, Fixation, MachineBackend, backend_for};
pub use bed::BedState;
pub use carrier::Carrier;
pub use spec::MachineSpec;
pub use state::MachineState;
