//! pdbstall library — the diagnostic pipeline behind the `pdbstall` binary, exposed so the
//! integration tests in tests/ can drive it against an in-memory cluster.
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,   // internal helpers; callers are tests, not library consumers
    clippy::missing_errors_doc,   // error variants are documented on error::Error
)]

pub mod cli;
pub mod error;
pub mod filter;
pub mod k8s;
pub mod logging;
pub mod model;
pub mod report;
pub mod run;
pub mod selector;

pub use error::{Error, Result};
