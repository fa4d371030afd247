#![forbid(unsafe_code)]

//! QC asset crawler — sequence-aware media fingerprinting with tamper-evident
//! JSON sidecars.
//!
//! The crawler walks shared-storage roots, groups frame files into image
//! sequences, hashes content through a per-directory cache, and records QC
//! state (`pass`/`fail`/`pending`) in small sidecar files written atomically
//! next to each asset.

pub mod core;
pub mod crawler;
pub mod hashing;
pub mod sequence;
pub mod sidecar;
pub mod tracker;
