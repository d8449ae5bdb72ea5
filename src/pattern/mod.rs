//! Pattern authoring: yarns, courses, and the ordered command log.

pub mod builder;
pub mod command;
pub mod yarn;

pub use builder::Pattern;
pub use command::{Command, DropSpec, TransferSpec};
pub use yarn::{Course, YARN_ID_DELIMITER, Yarn, YarnRecord};
