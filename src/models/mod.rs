//! Data models and serialization helpers.
//!
//! This module contains the serde representations of the documents the tool
//! consumes: the snapshot.debian.org fileinfo listing, the security tracker
//! JSON feed, and the bug records cached in the working directory.
pub mod bug;
pub mod fileinfo;
pub mod serde_helpers;
pub mod tracker;
