//! Page Order Model.
//!
//! The canonical order is the flattened visual arrangement. It is rebuilt
//! wholesale from the groups after every structural change, never patched.

use crate::page::{PageRef, VisualGroup};
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOrder {
    refs: Vec<PageRef>,
    positions: HashMap<PageRef, usize>,
}

impl PageOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild_from_visual_state(&mut self, groups: &[VisualGroup]) {
        self.refs = groups.iter().flat_map(|group| group.pages.iter().copied()).collect();
        self.positions =
            self.refs.iter().enumerate().map(|(position, page)| (*page, position)).collect();
        debug!("page order rebuilt: {} pages in {} groups", self.refs.len(), groups.len());
    }

    pub fn index_of(&self, page: PageRef) -> Option<usize> {
        self.positions.get(&page).copied()
    }

    pub fn contains(&self, page: PageRef) -> bool {
        self.positions.contains_key(&page)
    }

    pub fn as_slice(&self) -> &[PageRef] {
        &self.refs
    }

    pub fn iter(&self) -> impl Iterator<Item = PageRef> + '_ {
        self.refs.iter().copied()
    }

    /// Pages matching `keep`, in page order.
    pub fn filtered(&self, mut keep: impl FnMut(PageRef) -> bool) -> Vec<PageRef> {
        self.refs.iter().copied().filter(|page| keep(*page)).collect()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
        self.positions.clear();
    }
}
