//! fbxmaker library exports.
//!
//! The binary is a thin CLI over these modules; integration tests drive the
//! pipelines through a fake [`process::Runner`].

pub mod commands;
pub mod config;
pub mod customize;
pub mod machine;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod vagrant;
