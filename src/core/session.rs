//! Editing session: one open document plus its in-flight image uploads
//!
//! The session owns the document exclusively. Upload tasks never touch the
//! tree; their results come back through [`EditorSession::apply`], the only
//! place an upload mutates the document.

use std::collections::HashMap;
use std::sync::Arc;

use crate::asset::{AssetError, AssetPipeline, AssetRecord};
use crate::intake::{AnchorId, Completion, InsertTarget, IntakeController, IntakeError, IntakeItem, Ticket};
use crate::model::error::NodeError;
use crate::model::node::Node;

use super::document::Document;

/// A tracked drop position and how many uploads still target it
#[derive(Debug, Clone, Copy)]
struct Anchor {
    index: usize,
    waiting: usize,
}

/// What applying one completion did to the document
#[derive(Debug)]
pub enum Applied {
    /// Image node inserted at this block index
    Inserted { ticket: Ticket, index: usize, record: AssetRecord },
    /// Upload failed; the document is unchanged
    Failed { ticket: Ticket, name: String, error: AssetError },
    /// Upload succeeded but its URL could not become an image node
    Rejected { ticket: Ticket, name: String, error: NodeError },
}

/// Outcome of waiting for every pending upload
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub inserted: Vec<AssetRecord>,
    pub failed: Vec<(String, AssetError)>,
    pub rejected: Vec<(String, NodeError)>,
}

impl IntakeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }
}

/// An open document with its intake controller
#[derive(Debug)]
pub struct EditorSession {
    document: Document,
    intake: IntakeController,
    anchors: HashMap<AnchorId, Anchor>,
    next_anchor: u64,
}

impl EditorSession {
    pub fn new(document: Document, pipeline: Option<Arc<AssetPipeline>>) -> Self {
        Self {
            document,
            intake: IntakeController::new(pipeline),
            anchors: HashMap::new(),
            next_anchor: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn pending_uploads(&self) -> usize {
        self.intake.pending()
    }

    /// Images from the clipboard land at the cursor
    pub fn paste(&mut self, items: Vec<IntakeItem>) -> Result<Vec<Ticket>, IntakeError> {
        self.intake.submit(items, InsertTarget::Cursor)
    }

    /// Images chosen in the file picker land at the cursor
    pub fn pick(&mut self, items: Vec<IntakeItem>) -> Result<Vec<Ticket>, IntakeError> {
        self.intake.submit(items, InsertTarget::Cursor)
    }

    /// Images dropped before block `index` land there, one after another
    pub fn drop_items(&mut self, index: usize, items: Vec<IntakeItem>) -> Result<Vec<Ticket>, IntakeError> {
        let id = AnchorId(self.next_anchor);
        let tickets = self.intake.submit(items, InsertTarget::Anchor(id))?;
        if !tickets.is_empty() {
            self.next_anchor += 1;
            let index = index.min(self.document.tree().len());
            self.anchors.insert(
                id,
                Anchor {
                    index,
                    waiting: tickets.len(),
                },
            );
        }
        Ok(tickets)
    }

    /// Move the cursor
    pub fn set_cursor(&mut self, index: usize) {
        self.document.set_cursor(index);
    }

    /// Insert a block as a user edit; pending drop positions follow it
    pub fn insert_block(&mut self, index: usize, node: Node) -> usize {
        let index = self.document.insert_block(index, node);
        for anchor in self.anchors.values_mut() {
            if anchor.index >= index {
                anchor.index += 1;
            }
        }
        index
    }

    /// Remove a block as a user edit; pending drop positions follow it
    pub fn remove_block(&mut self, index: usize) -> Option<Node> {
        let removed = self.document.remove_block(index)?;
        for anchor in self.anchors.values_mut() {
            if anchor.index > index {
                anchor.index -= 1;
            }
        }
        Some(removed)
    }

    /// Apply one finished upload to the document
    pub fn apply(&mut self, completion: Completion) -> Applied {
        let Completion {
            ticket,
            target,
            name,
            result,
        } = completion;

        let index = match target {
            InsertTarget::Cursor => self.document.cursor(),
            InsertTarget::Anchor(id) => self.release_anchor(id),
        };

        let record = match result {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!("Upload of {} failed: {}", name, error);
                return Applied::Failed { ticket, name, error };
            }
        };

        let image = match Node::image(record.url.clone(), None, None) {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!("Cannot insert {} as an image: {}", record.url, error);
                return Applied::Rejected { ticket, name, error };
            }
        };

        let index = self.insert_block(index, image);
        if let InsertTarget::Anchor(id) = target {
            // Later uploads of the same drop go after this one
            if let Some(anchor) = self.anchors.get_mut(&id) {
                anchor.index = index + 1;
            }
        }
        tracing::info!("Inserted {} at block {}", record.url, index);
        Applied::Inserted { ticket, index, record }
    }

    /// Current index of an anchor; forgets it once no upload waits on it
    fn release_anchor(&mut self, id: AnchorId) -> usize {
        let len = self.document.tree().len();
        let Some(anchor) = self.anchors.get_mut(&id) else {
            return len;
        };
        let index = anchor.index.min(len);
        anchor.waiting = anchor.waiting.saturating_sub(1);
        if anchor.waiting == 0 {
            self.anchors.remove(&id);
        }
        index
    }

    /// Wait for the next upload and apply it. `None` when nothing is pending.
    pub async fn next_applied(&mut self) -> Option<Applied> {
        let completion = self.intake.next_completion().await?;
        Some(self.apply(completion))
    }

    /// Apply every pending upload in completion order
    pub async fn settle(&mut self) -> IntakeReport {
        let mut report = IntakeReport::default();
        while let Some(applied) = self.next_applied().await {
            match applied {
                Applied::Inserted { record, .. } => report.inserted.push(record),
                Applied::Failed { name, error, .. } => report.failed.push((name, error)),
                Applied::Rejected { name, error, .. } => report.rejected.push((name, error)),
            }
        }
        report
    }

    /// Abort pending uploads and hand back the document. Nothing is inserted afterwards.
    pub fn close(mut self) -> Document {
        self.intake.close();
        self.anchors.clear();
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::asset::{Fingerprint, MemoryObjectStore, ObjectStore, StoreError};
    use crate::markdown::MarkdownCodec;
    use crate::model::node::BuiltinKind;

    const BASE: &str = "https://cdn.example.com/";

    /// Store whose uploads finish only when released, in whatever order the test picks
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryObjectStore,
        gates: std::sync::Mutex<HashMap<String, Arc<Notify>>>,
    }

    impl GatedStore {
        fn gate(&self, key: &str) -> Arc<Notify> {
            self.gates
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        }
    }

    #[async_trait]
    impl ObjectStore for GatedStore {
        async fn head_object(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.head_object(key).await
        }

        async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
            self.gate(key).notified().await;
            if bytes == b"broken" {
                return Err(StoreError::request("connection reset"));
            }
            self.inner.put_object(key, bytes).await
        }
    }

    fn png(name: &str, bytes: &[u8]) -> IntakeItem {
        IntakeItem::from_bytes(Some(name.to_string()), Some("image/png".to_string()), bytes.to_vec())
    }

    fn url_for(bytes: &[u8]) -> String {
        format!("{BASE}press/images/{}.png", Fingerprint::of(bytes))
    }

    fn session(text: &str, store: Arc<dyn ObjectStore>) -> EditorSession {
        let codec = MarkdownCodec::default();
        let (document, _) = Document::parse(PathBuf::from("note.md"), text, &codec);
        let pipeline = AssetPipeline::new(store, "press/", BASE);
        EditorSession::new(document, Some(Arc::new(pipeline)))
    }

    fn image_srcs(session: &EditorSession) -> Vec<String> {
        session
            .document()
            .tree()
            .blocks()
            .iter()
            .filter(|block| block.is(BuiltinKind::Image))
            .filter_map(|block| block.str_attr("src").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_paste_inserts_in_completion_order() {
        let store = Arc::new(GatedStore::default());
        let mut session = session("intro\n", store.clone());

        let payloads: [&[u8]; 3] = [b"first", b"second", b"third"];
        let items = payloads.iter().enumerate().map(|(i, b)| png(&format!("{i}.png"), b)).collect();
        let tickets = session.paste(items).unwrap();
        assert_eq!(tickets.len(), 3);
        assert_eq!(session.pending_uploads(), 3);

        // Release uploads in reverse submission order
        for bytes in payloads.iter().rev() {
            let key = format!("press/images/{}.png", Fingerprint::of(bytes));
            store.gate(&key).notify_one();
            match session.next_applied().await {
                Some(Applied::Inserted { record, .. }) => assert_eq!(record.url, url_for(bytes)),
                other => panic!("unexpected: {other:?}"),
            }
        }

        assert_eq!(
            image_srcs(&session),
            vec![url_for(b"third"), url_for(b"second"), url_for(b"first")]
        );
        assert!(session.document().tree().blocks()[0].is(BuiltinKind::Paragraph));
        assert_eq!(session.document().cursor(), 4);
        assert_eq!(store.inner.put_count(), 3);
    }

    #[tokio::test]
    async fn test_serialized_images_have_verbatim_urls() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut session = session("", store);

        session.pick(vec![png("shot.png", b"pixels")]).unwrap();
        let report = session.settle().await;
        assert!(report.is_clean());

        let codec = MarkdownCodec::default();
        let text = session.document().to_markdown(&codec).unwrap();
        assert_eq!(text, format!("![]({})\n", url_for(b"pixels")));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_document_untouched() {
        let store = Arc::new(GatedStore::default());
        let mut session = session("a\n\nb\n", store.clone());
        let before = session.document().tree().clone();

        session.paste(vec![png("bad.png", b"broken")]).unwrap();
        store.gate(&format!("press/images/{}.png", Fingerprint::of(b"broken"))).notify_one();

        let report = session.settle().await;
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, AssetError::Transport { .. }));
        assert_eq!(session.document().tree(), &before);
        assert!(!session.document().modified);
    }

    #[tokio::test]
    async fn test_drop_lands_at_anchor_after_edits() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut session = session("a\n\nb\n\nc\n", store);
        session.set_cursor(0);

        session.drop_items(2, vec![png("x.png", b"x"), png("y.png", b"y")]).unwrap();
        // The user removes the first block while uploads run
        session.remove_block(0);

        let report = session.settle().await;
        assert_eq!(report.inserted.len(), 2);

        let blocks = session.document().tree().blocks();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].plain_text(), "b");
        assert!(blocks[1].is(BuiltinKind::Image));
        assert!(blocks[2].is(BuiltinKind::Image));
        assert_eq!(blocks[3].plain_text(), "c");
        assert_eq!(session.document().cursor(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_paste_uploads_once() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut session = session("", store.clone());

        session.paste(vec![png("a.png", b"same")]).unwrap();
        session.settle().await;
        session.paste(vec![png("b.png", b"same")]).unwrap();
        session.settle().await;

        assert_eq!(image_srcs(&session), vec![url_for(b"same"), url_for(b"same")]);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_close_discards_pending_uploads() {
        let store = Arc::new(GatedStore::default());
        let mut session = session("keep\n", store.clone());
        session.paste(vec![png("slow.png", b"slow")]).unwrap();

        let document = session.close();
        assert_eq!(document.tree().len(), 1);
        assert_eq!(store.inner.put_count(), 0);
    }

    #[tokio::test]
    async fn test_paste_without_storage() {
        let codec = MarkdownCodec::default();
        let (document, _) = Document::parse(PathBuf::from("n.md"), "x\n", &codec);
        let mut session = EditorSession::new(document, None);
        assert_eq!(
            session.paste(vec![png("a.png", b"a")]),
            Err(IntakeError::UploadsUnavailable)
        );
        assert_eq!(session.document().tree().len(), 1);
    }
}
