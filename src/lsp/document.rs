//! Open text documents
//!
//! Tracks what the client has open. Full-content changes replace the text;
//! ranged changes are only recorded, never applied. Closing a document drops
//! it entirely.

use std::collections::HashMap;

use lsp_types::{Range, TextDocumentContentChangeEvent, Uri};

/// A ranged edit received through `textDocument/didChange`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocChange {
    pub range: Range,
    pub range_length: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: Uri,
    pub language_id: String,
    pub version: i32,
    pub text: String,
    pub changes: Vec<DocChange>,
}

impl Document {
    pub fn new(uri: Uri, language_id: String, version: i32, text: String) -> Self {
        Self {
            uri,
            language_id,
            version,
            text,
            changes: Vec::new(),
        }
    }

    /// Apply one change event.
    ///
    /// A change without a range carries the whole document and resets the
    /// pending change list.
    pub fn apply_change(&mut self, event: TextDocumentContentChangeEvent) {
        match event.range {
            None => {
                self.text = event.text;
                self.changes.clear();
            }
            Some(range) => self.changes.push(DocChange {
                range,
                range_length: event.range_length,
                text: event.text,
            }),
        }
    }
}

/// Open documents keyed by uri
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<Uri, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly opened document, replacing any previous entry
    pub fn open(&mut self, document: Document) {
        self.documents.insert(document.uri.clone(), document);
    }

    pub fn get(&self, uri: &Uri) -> Option<&Document> {
        self.documents.get(uri)
    }

    pub fn get_open_mut(&mut self, uri: &Uri) -> Option<&mut Document> {
        self.documents.get_mut(uri)
    }

    /// Forget a document. Returns false if it was not open.
    pub fn close(&mut self, uri: &Uri) -> bool {
        self.documents.remove(uri).is_some()
    }

    pub fn open_count(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::Position;
    use std::str::FromStr;

    fn uri(s: &str) -> Uri {
        Uri::from_str(s).unwrap()
    }

    #[test]
    fn test_full_change_replaces_text() {
        let mut doc = Document::new(uri("file:///a.txt"), "plaintext".into(), 1, "old".into());
        doc.apply_change(TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "new".into(),
        });
        assert_eq!(doc.text, "new");
        assert!(doc.changes.is_empty());
    }

    #[test]
    fn test_ranged_change_is_recorded() {
        let mut doc = Document::new(uri("file:///a.txt"), "plaintext".into(), 1, "abc".into());
        let range = Range::new(Position::new(0, 1), Position::new(0, 2));
        doc.apply_change(TextDocumentContentChangeEvent {
            range: Some(range),
            range_length: Some(1),
            text: "X".into(),
        });

        assert_eq!(doc.text, "abc");
        assert_eq!(
            doc.changes,
            vec![DocChange {
                range,
                range_length: Some(1),
                text: "X".into()
            }]
        );
    }

    #[test]
    fn test_store_open_close() {
        let mut store = DocumentStore::new();
        let a = uri("file:///a.txt");
        store.open(Document::new(a.clone(), "plaintext".into(), 1, "".into()));
        assert_eq!(store.open_count(), 1);

        assert!(store.close(&a));
        assert!(!store.close(&a));
        assert_eq!(store.open_count(), 0);
        assert!(store.get_open_mut(&a).is_none());
        assert!(store.get(&a).is_none());
    }
}
