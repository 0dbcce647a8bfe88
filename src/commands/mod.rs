//! CLI commands for shipline
//!
//! - **init**: write the default release pipeline
//! - **validate**: check the pipeline and report on secrets
//! - **plan**: resolve a release without running it
//! - **run**: execute a release
//! - **artifacts**: list and prune stored artifacts

pub mod artifacts;
pub mod init;
pub mod plan;
pub mod run;
pub mod validate;

pub use artifacts::{run_artifacts_list, run_artifacts_prune};
pub use init::run_init;
pub use plan::run_plan;
pub use run::run_pipeline;
pub use validate::run_validate;
