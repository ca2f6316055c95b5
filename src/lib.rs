//! tikl - a lightweight lit/FileCheck-style test driver.
//!
//! The `tikl` binary discovers `RUN:` directives embedded in test-file
//! comments, expands placeholders against a substitution table, and shells
//! the commands out. The `tikl-check` binary verifies captured output
//! against `CHECK*` directives from the same file. The two are coupled
//! through the `TIKL_CHECK_SUBSTS` environment variable.

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod plan;
pub mod runner;
pub mod scanner;
pub mod shell;
pub mod subst;

pub use config::Settings;
pub use error::FatalError;
