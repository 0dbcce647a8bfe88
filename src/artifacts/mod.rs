//! Run-scoped artifact storage
//!
//! Artifacts live under `.shipline/artifacts/<run-id>/<name>/` with a
//! `manifest.json` recording each file's size and SHA-256. Downloads verify
//! the checksums, so a downstream stage sees exactly the bytes uploaded.

pub mod manifest;
pub mod store;

pub use manifest::ArtifactManifest;
pub use store::ArtifactStore;
