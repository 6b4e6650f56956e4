use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique identity of a loaded document. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// A page identified by its owning document and 0-based local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub doc: DocId,
    pub index: u32,
}

impl PageRef {
    pub fn new(doc: DocId, index: u32) -> Self {
        Self { doc, index }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc, self.index)
    }
}

/// One visual group of the reordering UI: the pages shown under a document's
/// header, in display order.
///
/// A group usually holds pages of its owner, but pages dropped in from other
/// groups (as detached single-page documents) live here too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualGroup {
    pub owner: DocId,
    pub pages: Vec<PageRef>,
}

impl VisualGroup {
    pub fn new(owner: DocId, pages: Vec<PageRef>) -> Self {
        Self { owner, pages }
    }

    /// Group made of the owner's own pages in the given local order.
    pub fn from_indices(owner: DocId, indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            owner,
            pages: indices.into_iter().map(|index| PageRef::new(owner, index)).collect(),
        }
    }

    pub fn whole_document(owner: DocId, page_count: u32) -> Self {
        Self::from_indices(owner, 0..page_count)
    }
}
