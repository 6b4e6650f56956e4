use crate::page::{DocId, PageRef};
use std::collections::BTreeSet;

/// Selected pages, independent of their order on the workbench.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    pages: BTreeSet<PageRef>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips membership and returns whether the page is now selected.
    pub fn toggle(&mut self, page: PageRef) -> bool {
        if self.pages.remove(&page) {
            false
        } else {
            self.pages.insert(page);
            true
        }
    }

    pub fn select_all(&mut self, candidates: impl IntoIterator<Item = PageRef>) {
        self.pages.extend(candidates);
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn contains(&self, page: PageRef) -> bool {
        self.pages.contains(&page)
    }

    pub fn purge(&mut self, mut predicate: impl FnMut(PageRef) -> bool) {
        self.pages.retain(|page| !predicate(*page));
    }

    pub fn remap_key(&mut self, old: PageRef, new: PageRef) {
        if self.pages.remove(&old) {
            self.pages.insert(new);
        }
    }

    /// Renumbers the pages of `doc` after a rewrite that kept only the old
    /// indices in `kept`, in that order. Selections of dropped pages vanish.
    pub fn reindex(&mut self, doc: DocId, kept: &[u32]) {
        let affected: Vec<PageRef> = self.pages.iter().copied().filter(|page| page.doc == doc).collect();
        for page in affected {
            self.pages.remove(&page);
            if let Some(new_index) = kept.iter().position(|&old| old == page.index) {
                self.pages.insert(PageRef::new(doc, new_index as u32));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = PageRef> + '_ {
        self.pages.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
