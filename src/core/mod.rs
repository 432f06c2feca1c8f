//! Core functionality: documents, editing sessions, file operations and configuration

pub mod config;
pub mod document;
pub mod file_system;
pub mod session;

pub use config::{AppConfig, StorageConfig};
pub use document::{Document, DocumentMetadata};
pub use session::{Applied, EditorSession, IntakeReport};
