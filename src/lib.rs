#![forbid(unsafe_code)]

pub mod compile;
pub mod emit;
pub mod foundation;
pub mod machine;
pub mod pattern;

pub use compile::{GenerateOpts, GenerateReport, Position, generate};
pub use emit::{EmittedOp, InMemorySink, InstructionSink, KnitoutFile};
pub use foundation::core::{Bed, Dir, Needle};
pub use foundation::error::{CourserError, CourserResult, Warning};
pub use machine::{
    BackendKind, CastOffArgs, CastOnArgs, MachineBackend, MachineSpec, MachineState, backend_for,
};
pub use pattern::{Command, Course, DropSpec, Pattern, TransferSpec, Yarn, YarnRecord};
