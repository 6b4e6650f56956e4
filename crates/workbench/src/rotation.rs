use crate::page::{DocId, PageRef};
use pdf_engine::normalize_degrees;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDirection {
    Left,
    Right,
    Half,
}

impl RotateDirection {
    pub fn delta_degrees(self) -> i32 {
        match self {
            Self::Left => -90,
            Self::Right => 90,
            Self::Half => 180,
        }
    }
}

/// Absolute display rotation per page, in `[0, 360)`. Missing entries are 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationMap {
    angles: BTreeMap<PageRef, u16>,
}

impl RotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: PageRef) -> u16 {
        self.angles.get(&page).copied().unwrap_or(0)
    }

    pub fn set(&mut self, page: PageRef, degrees: i64) {
        let degrees = normalize_degrees(degrees);
        if degrees == 0 {
            self.angles.remove(&page);
        } else {
            self.angles.insert(page, degrees);
        }
    }

    /// Adds `delta` to the page's angle and returns the new angle.
    pub fn rotate(&mut self, page: PageRef, delta: i32) -> u16 {
        let next = i64::from(self.get(page)) + i64::from(delta);
        self.set(page, next);
        self.get(page)
    }

    pub fn remap_key(&mut self, old: PageRef, new: PageRef) {
        if let Some(angle) = self.angles.remove(&old) {
            self.angles.insert(new, angle);
        }
    }

    pub fn purge(&mut self, mut predicate: impl FnMut(PageRef) -> bool) {
        self.angles.retain(|page, _| !predicate(*page));
    }

    /// Rebuilds the entries of `doc` after a rewrite that kept only the old
    /// indices in `kept`, in that order. Each angle stays with its page.
    pub fn reindex(&mut self, doc: DocId, kept: &[u32]) {
        let previous: Vec<(PageRef, u16)> = self
            .angles
            .iter()
            .filter(|(page, _)| page.doc == doc)
            .map(|(page, angle)| (*page, *angle))
            .collect();

        for (page, _) in &previous {
            self.angles.remove(page);
        }
        for (page, angle) in previous {
            if let Some(new_index) = kept.iter().position(|&old| old == page.index) {
                self.angles.insert(PageRef::new(doc, new_index as u32), angle);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageRef, u16)> + '_ {
        self.angles.iter().map(|(page, angle)| (*page, *angle))
    }

    pub fn references_doc(&self, doc: DocId) -> bool {
        self.angles.keys().any(|page| page.doc == doc)
    }

    pub fn clear(&mut self) {
        self.angles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_in_both_directions() {
        let page = PageRef::new(DocId(0), 0);
        let mut rotations = RotationMap::new();

        assert_eq!(rotations.rotate(page, RotateDirection::Left.delta_degrees()), 270);
        assert_eq!(rotations.rotate(page, RotateDirection::Half.delta_degrees()), 90);
        assert_eq!(rotations.rotate(page, 270), 0);
        assert_eq!(rotations.iter().count(), 0);
    }

    #[test]
    fn reindex_keeps_angle_with_physical_page() {
        let doc = DocId(0);
        let mut rotations = RotationMap::new();
        rotations.set(PageRef::new(doc, 1), 90);
        rotations.set(PageRef::new(doc, 0), 180);

        rotations.reindex(doc, &[1, 2]);

        assert_eq!(rotations.get(PageRef::new(doc, 0)), 90);
        assert_eq!(rotations.get(PageRef::new(doc, 1)), 0);
        assert_eq!(rotations.iter().count(), 1);
    }

    #[test]
    fn remap_moves_angle_to_new_identity() {
        let old = PageRef::new(DocId(0), 2);
        let new = PageRef::new(DocId(5), 0);
        let mut rotations = RotationMap::new();
        rotations.set(old, 270);

        rotations.remap_key(old, new);

        assert_eq!(rotations.get(old), 0);
        assert_eq!(rotations.get(new), 270);
        assert!(!rotations.references_doc(DocId(0)));
    }
}
