#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Installation session state and operation-sequence derivation

pub mod plan;
mod preferences;
mod session;

pub use plan::{derive_operation_sequence, Operation, OperationKind, OperationSequence};
pub use preferences::Preferences;
pub use session::{Attempt, Session};
