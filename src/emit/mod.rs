//! Instruction output.
//!
//! Compiled instructions leave the machine simulator through an
//! [`InstructionSink`] in strict emission order. [`KnitoutFile`] serializes
//! them as knitout v2 text; [`InMemorySink`] records them as values for tests.

pub mod knitout;
pub mod sink;

pub use knitout::KnitoutFile;
pub use sink::{EmittedOp, InMemorySink, InstructionSink};
