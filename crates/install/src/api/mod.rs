//! Public API surface of the installer: configuration, contexts and results

pub mod config;
pub mod context;
pub mod result;
