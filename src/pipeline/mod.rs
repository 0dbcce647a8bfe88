//! Pipeline execution
//!
//! - **bump**: write the release version into version files
//! - **matrix**: expand matrix axes into jobs
//! - **report**: run outcome, persisted as JSON
//! - **runner**: stage ordering, parallel jobs, fail-fast
//! - **step**: execution of a single step

pub mod bump;
pub mod matrix;
pub mod report;
pub mod runner;
pub mod step;

pub use report::RunReport;
pub use runner::PipelineRunner;
