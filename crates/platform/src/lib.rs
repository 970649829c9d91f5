#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Platform abstraction layer for dsu
//!
//! This crate provides:
//! - Process execution with event emission and error mapping
//! - A command builder that renders POSIX shell lines for generated scripts
//! - A directory-backed privileged executor and its binder, used when the
//!   host has no system dynamic-partition service

pub mod core;
pub mod privileged;
pub mod process;

pub use self::core::PlatformContext;
pub use privileged::{LocalBinder, LocalPrivilegedService};
pub use process::{
    shell_quote, CommandOutput, PlatformCommand, ProcessOperations, SystemProcessOperations,
};
