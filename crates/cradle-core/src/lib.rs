//! cradle-core: runtime context, app metadata, and the component repository
//! for the cradle application container.
//!
//! The pieces here are shared by the node-side engine and the worker-side
//! slave runtime:
//!
//! - [`Context`] - configuration plus the process-wide [`Repository`],
//!   constructed once in `main` and passed by reference.
//! - [`Repository`] - registry of typed component categories, populated by
//!   built-in components and by plugins loaded from shared objects.
//! - [`sandbox`] - the contract a language sandbox satisfies.
//! - [`isolate`] / [`process`] - strategies for hosting sandboxes, with the
//!   fork/exec child process as the default.
//! - [`Manifest`] / [`Profile`] - per-app static metadata and runtime tuning.

pub mod config;
pub mod context;
pub mod error;
pub mod isolate;
pub mod manifest;
pub mod process;
pub mod profile;
pub mod repository;
pub mod sandbox;

pub use config::Config;
pub use context::Context;
pub use error::{CoreError, Result};
pub use manifest::Manifest;
pub use profile::Profile;
pub use repository::{Repository, RepositoryError};
