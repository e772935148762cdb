//! CLI surface of the logger binary
//!
//! - [`run`] - Argument parsing and the run-until-shutdown lifecycle
//! - [`error`] - Errors surfaced at the process boundary

pub mod error;
pub mod run;

pub use error::CliError;
pub use run::{run, Cli};
