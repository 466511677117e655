//! Command Line Interface (CLI) layer for eobands.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for inspecting, loading and
//! stacking one product. It wires user-provided options to the library
//! functionality exposed via `eobands::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
