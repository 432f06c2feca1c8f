//! Intake of pasted, dropped and picked images
//!
//! Each accepted item becomes its own upload task. Finished uploads are
//! handed back in completion order; the caller owns the document and
//! applies them one at a time.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::asset::mime;
use crate::asset::{AssetBlob, AssetError, AssetPipeline, AssetRecord, BlobData};

/// Intake failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    /// No storage is configured, so images cannot be uploaded
    #[error("Image uploads are unavailable: storage is not configured")]
    UploadsUnavailable,

    #[error("Intake is closed")]
    Closed,
}

/// One candidate item from the clipboard, a drop or the file picker
#[derive(Debug, Clone)]
pub struct IntakeItem {
    pub blob: AssetBlob,
}

impl IntakeItem {
    pub fn from_bytes(name: Option<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            blob: AssetBlob::from_bytes(name, mime, bytes),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            blob: AssetBlob::from_path(path),
        }
    }

    /// Declared MIME type, else the one implied by the file extension
    pub fn mime(&self) -> Option<String> {
        if let Some(mime) = self.blob.mime.as_deref() {
            return Some(mime.to_string());
        }
        let name = match (&self.blob.name, &self.blob.data) {
            (Some(name), _) => name.clone(),
            (None, BlobData::Path(path)) => path.to_string_lossy().into_owned(),
            (None, BlobData::Bytes(_)) => return None,
        };
        mime::detect_image_mime(&name).map(str::to_string)
    }

    pub fn is_image(&self) -> bool {
        self.mime().is_some_and(|mime| mime::is_image(&mime))
    }
}

/// Handle for one submitted upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// Handle for a drop position that follows later edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub u64);

/// Where a finished upload should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget {
    /// The cursor as it is when the upload finishes
    Cursor,
    /// A tracked block position
    Anchor(AnchorId),
}

/// A finished upload, successful or not
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub target: InsertTarget,
    pub name: String,
    pub result: Result<AssetRecord, AssetError>,
}

/// Runs uploads concurrently and yields them as they finish
pub struct IntakeController {
    pipeline: Option<Arc<AssetPipeline>>,
    tasks: JoinSet<Completion>,
    next_ticket: u64,
    closed: bool,
}

impl IntakeController {
    /// `None` means uploads are unavailable; submitting images then fails
    pub fn new(pipeline: Option<Arc<AssetPipeline>>) -> Self {
        Self {
            pipeline,
            tasks: JoinSet::new(),
            next_ticket: 0,
            closed: false,
        }
    }

    pub fn uploads_available(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Keep the image items and start one upload task per image.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, items: Vec<IntakeItem>, target: InsertTarget) -> Result<Vec<Ticket>, IntakeError> {
        if self.closed {
            return Err(IntakeError::Closed);
        }

        let total = items.len();
        let images: Vec<IntakeItem> = items.into_iter().filter(IntakeItem::is_image).collect();
        if images.len() < total {
            tracing::debug!("Ignoring {} non-image intake items", total - images.len());
        }
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let pipeline = self.pipeline.clone().ok_or(IntakeError::UploadsUnavailable)?;

        let mut tickets = Vec::with_capacity(images.len());
        for item in images {
            let ticket = Ticket(self.next_ticket);
            self.next_ticket += 1;

            let pipeline = pipeline.clone();
            let name = item.blob.display_name();
            self.tasks.spawn(async move {
                let result = pipeline.ingest(item.blob).await;
                Completion {
                    ticket,
                    target,
                    name,
                    result,
                }
            });
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    /// Uploads still in flight
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the next upload to finish. `None` once nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(completion) => return Some(completion),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => tracing::error!("Upload task panicked: {}", e),
            }
        }
        None
    }

    /// Abort every in-flight upload; their results are never delivered
    pub fn cancel_all(&mut self) {
        let pending = self.tasks.len();
        self.tasks.abort_all();
        self.tasks.detach_all();
        if pending > 0 {
            tracing::info!("Cancelled {} pending uploads", pending);
        }
    }

    /// Cancel everything and refuse further submissions
    pub fn close(&mut self) {
        self.cancel_all();
        self.closed = true;
    }
}

impl std::fmt::Debug for IntakeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeController")
            .field("pipeline", &self.pipeline)
            .field("pending", &self.tasks.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{MemoryObjectStore, UploadOutcome};

    fn controller() -> (IntakeController, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = AssetPipeline::new(store.clone(), "press/", "https://cdn.example.com/");
        (IntakeController::new(Some(Arc::new(pipeline))), store)
    }

    fn png(name: &str, byte: u8) -> IntakeItem {
        IntakeItem::from_bytes(Some(name.to_string()), Some("image/png".to_string()), vec![byte; 16])
    }

    #[test]
    fn test_image_filter() {
        assert!(png("a.png", 1).is_image());
        assert!(IntakeItem::from_bytes(Some("b.JPG".to_string()), None, vec![1]).is_image());
        assert!(!IntakeItem::from_bytes(Some("c.txt".to_string()), Some("text/plain".to_string()), vec![1]).is_image());
        assert!(!IntakeItem::from_bytes(None, None, vec![1]).is_image());
        assert!(IntakeItem::from_path("/tmp/shot.webp").is_image());
    }

    #[tokio::test]
    async fn test_uploads_complete() {
        let (mut intake, store) = controller();
        let items = vec![
            png("a.png", 1),
            IntakeItem::from_bytes(Some("notes.txt".to_string()), Some("text/plain".to_string()), vec![1]),
            png("b.png", 2),
        ];
        let tickets = intake.submit(items, InsertTarget::Cursor).unwrap();
        assert_eq!(tickets.len(), 2);

        let mut seen = Vec::new();
        while let Some(completion) = intake.next_completion().await {
            let record = completion.result.unwrap();
            assert_eq!(record.outcome, UploadOutcome::Uploaded);
            seen.push(completion.ticket);
        }
        seen.sort();
        assert_eq!(seen, tickets);
        assert_eq!(store.put_count(), 2);
        assert_eq!(intake.pending(), 0);
    }

    #[tokio::test]
    async fn test_without_storage() {
        let mut intake = IntakeController::new(None);
        assert_eq!(
            intake.submit(vec![png("a.png", 1)], InsertTarget::Cursor),
            Err(IntakeError::UploadsUnavailable)
        );
        let text = IntakeItem::from_bytes(None, Some("text/plain".to_string()), vec![1]);
        assert_eq!(intake.submit(vec![text], InsertTarget::Cursor), Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_closed_intake() {
        let (mut intake, _) = controller();
        intake.submit(vec![png("a.png", 1)], InsertTarget::Cursor).unwrap();
        intake.close();
        assert_eq!(intake.pending(), 0);
        assert!(intake.next_completion().await.is_none());
        assert_eq!(
            intake.submit(vec![png("b.png", 2)], InsertTarget::Cursor),
            Err(IntakeError::Closed)
        );
    }
}
