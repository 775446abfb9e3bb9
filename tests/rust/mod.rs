//! archstore integration tests
//!
//! Run with `cargo test --test integration`.

pub mod test_archiving_job;
pub mod test_job_scheduling;
pub mod test_patch_properties;

pub use common::*;
