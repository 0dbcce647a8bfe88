//! Core building blocks for shipline
//!
//! - **config**: pipeline definition (shipline.toml) parsing and validation
//! - **context**: everything a run needs, built once and passed by reference
//! - **error**: error types with contextual help messages and exit codes
//! - **params**: run parameters, derived values and `{{ name }}` templates
//! - **plan**: fully resolved run plans
//! - **secrets**: secret lookup and log redaction
//! - **vcs**: Git operations abstraction (SystemGit)

pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod plan;
pub mod secrets;
pub mod vcs;
