//! Asset pipeline: content-addressed image uploads

pub mod fingerprint;
pub mod mime;
pub mod pipeline;
pub mod store;

pub use fingerprint::Fingerprint;
pub use pipeline::{local_pipeline, AssetBlob, AssetError, AssetPipeline, AssetRecord, BlobData, UploadOutcome};
pub use store::{LocalObjectStore, MemoryObjectStore, ObjectStore, StoreError};
