//! Notepress - markdown notes with a typed document model
//!
//! Parses notes into a tree of registry-defined nodes, serializes them back
//! losslessly, and uploads pasted or dropped images to content-addressed
//! object storage.

pub mod asset;
pub mod core;
pub mod intake;
pub mod markdown;
pub mod model;
