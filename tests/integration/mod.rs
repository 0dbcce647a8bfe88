//! Integration tests for shipline
//!
//! Each test builds a throwaway repository with a bare `origin` remote and
//! drives the real binary against it.

mod helpers;
mod test_artifacts;
mod test_init;
mod test_plan;
mod test_run;
mod test_validate;
