#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dynamic system update installation for dsu
//!
//! Two execution paths consume the same derived operation sequence:
//!
//! - [`PrivilegedInstaller`] issues the operations over a leased privileged
//!   connection, streaming and decompressing the image chunk by chunk;
//! - [`ScriptGenerator`] renders them into a shell script, one command per
//!   operation, for execution outside this process.
//!
//! [`Installer`] picks the path from the session preferences and the
//! identity of the connected executor.

#[macro_use]
mod macros;
mod api;
mod emit;
mod executor;
mod installer;
mod script;
pub mod stream;

pub use executor::PrivilegedInstaller;
pub use installer::Installer;
pub use script::{CommandRenderer, GsiToolRenderer, RenderedCommand, ScriptGenerator};

// Re-export the public API surface from api module
pub use api::config::InstallConfig;
pub use api::context::InstallContext;
pub use api::result::{
    ExecutionOutcome, InstallOutcome, InstallReport, OperationRecord, ScriptReport,
};

// Re-export EventSender for use by macros and contexts
pub use dsu_events::EventSender;
pub use tokio_util::sync::CancellationToken;
