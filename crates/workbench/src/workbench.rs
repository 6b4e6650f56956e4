use crate::config::{OrphanPolicy, WorkbenchConfig};
use crate::error::{WorkbenchError, WorkbenchResult};
use crate::export::{self, ExportKind, ExportSink, PDF_MIME_TYPE};
use crate::order::PageOrder;
use crate::page::{DocId, PageRef, VisualGroup};
use crate::registry::{Registry, SourceDocument};
use crate::rotation::{RotateDirection, RotationMap};
use crate::selection::SelectionSet;
use crate::thumbnail::{ThumbnailJob, ThumbnailTicket, ThumbnailTracker};
use crate::watermark::{EnqueueOutcome, WatermarkConfig, WatermarkDraft, WatermarkQueue};
use image::imageops::{self, FilterType};
use log::{debug, info, warn};
use pdf_engine::{
    normalize_degrees, CodecError, DocumentCodec, LopdfCodec, PageRasterizer, Placement,
    RgbaImage,
};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A prepared change to one document's bytes. Preparing never touches the
/// model, so a failure while preparing leaves everything as it was.
enum DocumentChange<H> {
    Rewrite { doc: DocId, kept: Vec<u32>, handle: H, bytes: Vec<u8> },
    Remove(DocId),
}

/// The multi-document page workbench.
///
/// Owns the registry and every structure keyed by [`PageRef`]. Structural
/// operations take `&mut self`, so at most one is in flight at a time;
/// exports borrow `&self` and therefore always see a consistent state.
pub struct Workbench<C: DocumentCodec = LopdfCodec> {
    config: WorkbenchConfig,
    registry: Registry<C>,
    groups: Vec<VisualGroup>,
    order: PageOrder,
    selection: SelectionSet,
    rotations: RotationMap,
    watermarks: WatermarkQueue,
    thumbnails: ThumbnailTracker,
}

impl Workbench<LopdfCodec> {
    pub fn new(config: WorkbenchConfig) -> Self {
        Self::with_codec(LopdfCodec::new(), config)
    }
}

impl Default for Workbench<LopdfCodec> {
    fn default() -> Self {
        Self::new(WorkbenchConfig::default())
    }
}

impl<C: DocumentCodec> Workbench<C> {
    pub fn with_codec(codec: C, config: WorkbenchConfig) -> Self {
        Self {
            config,
            registry: Registry::new(codec),
            groups: Vec::new(),
            order: PageOrder::new(),
            selection: SelectionSet::new(),
            rotations: RotationMap::new(),
            watermarks: WatermarkQueue::new(),
            thumbnails: ThumbnailTracker::new(),
        }
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    pub fn document(&self, id: DocId) -> WorkbenchResult<&SourceDocument<C::Handle>> {
        self.registry.get(id)
    }

    pub fn groups(&self) -> &[VisualGroup] {
        &self.groups
    }

    pub fn page_order(&self) -> &PageOrder {
        &self.order
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn rotations(&self) -> &RotationMap {
        &self.rotations
    }

    pub fn watermarks(&self) -> &WatermarkQueue {
        &self.watermarks
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Loads a document and appends it as a new group.
    pub fn load_document(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> WorkbenchResult<DocId> {
        let id = self.registry.load(name, bytes)?;

        let intrinsic = match self.intrinsic_rotations(id) {
            Ok(intrinsic) => intrinsic,
            Err(err) => {
                if let Err(remove_err) = self.registry.remove(id) {
                    debug!("{remove_err}");
                }
                return Err(err);
            }
        };
        for (index, degrees) in intrinsic.iter().enumerate() {
            self.rotations.set(PageRef::new(id, index as u32), i64::from(*degrees));
        }

        self.groups.push(VisualGroup::whole_document(id, intrinsic.len() as u32));
        self.rebuild_order();
        Ok(id)
    }

    /// Deletes a whole document: selection, rotations, its pages in every
    /// group and its own group, then the registry entry.
    pub fn remove_document(&mut self, id: DocId) -> WorkbenchResult<()> {
        if !self.registry.contains(id) {
            return Err(WorkbenchError::DocumentNotFound(id));
        }

        self.discard_document(id);
        self.rebuild_order();
        Ok(())
    }

    /// Replaces the arrangement after a reorder inside or across groups.
    ///
    /// The new arrangement must hold exactly the pages currently shown and
    /// exactly the current group owners.
    pub fn rearrange(&mut self, groups: Vec<VisualGroup>) -> WorkbenchResult<()> {
        let current_owners: BTreeSet<DocId> = self.groups.iter().map(|group| group.owner).collect();
        let owners: BTreeSet<DocId> = groups.iter().map(|group| group.owner).collect();
        if owners.len() != groups.len() || owners != current_owners {
            return Err(WorkbenchError::InvalidLayout(
                "groups cannot be added, removed or duplicated by a reorder".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for page in groups.iter().flat_map(|group| group.pages.iter().copied()) {
            if !self.order.contains(page) {
                return Err(WorkbenchError::InvalidLayout(format!("page {page} is not on the workbench")));
            }
            if !seen.insert(page) {
                return Err(WorkbenchError::InvalidLayout(format!("page {page} appears twice")));
            }
        }
        if seen.len() != self.order.len() {
            return Err(WorkbenchError::InvalidLayout(format!(
                "{} pages are missing from the arrangement",
                self.order.len() - seen.len()
            )));
        }

        self.groups = groups;
        self.rebuild_order();
        Ok(())
    }

    /// Moves `moved` into the group owned by `to_doc` at `position`.
    ///
    /// A page dropped into another document's group is detached first: it is
    /// copied into a new single-page document carrying its rotation, and that
    /// copy takes its place everywhere. What happens to the original page is
    /// governed by [`OrphanPolicy`]. Returns the page's identity after the move.
    pub fn cross_group_drop(
        &mut self,
        moved: PageRef,
        to_doc: DocId,
        position: usize,
    ) -> WorkbenchResult<PageRef> {
        let from = self.group_position_of(moved).ok_or(WorkbenchError::PageNotFound(moved))?;
        let to = self
            .groups
            .iter()
            .position(|group| group.owner == to_doc)
            .ok_or(WorkbenchError::DocumentNotFound(to_doc))?;

        if from == to || moved.doc == to_doc {
            self.take_from_groups(moved);
            let pages = &mut self.groups[to].pages;
            pages.insert(position.min(pages.len()), moved);
            self.rebuild_order();
            return Ok(moved);
        }

        let source = self.registry.get(moved.doc)?;
        let detach_failed = |err: CodecError| WorkbenchError::DetachFailed { page: moved, source: err };
        let (handle, bytes) = self.prepare_detached(source, moved).map_err(detach_failed)?;
        let name = format!("Page from {}", source.display_name());

        let origin_change = match self.config.orphan_policy {
            OrphanPolicy::DeleteImmediately => {
                let kept = self.visible_indices_except(moved.doc, &BTreeSet::from([moved.index]));
                self.prepare_change(source, kept).map_err(detach_failed)?
            }
            OrphanPolicy::Defer => None,
        };

        let detached = PageRef::new(self.registry.insert_parsed(name, handle, bytes), 0);
        self.selection.remap_key(moved, detached);
        self.rotations.remap_key(moved, detached);
        self.thumbnails.invalidate_page(moved);

        self.take_from_groups(moved);
        let pages = &mut self.groups[to].pages;
        pages.insert(position.min(pages.len()), detached);

        if let Some(change) = origin_change {
            self.commit_change(change);
        }
        self.sweep();
        self.rebuild_order();

        info!("detached {moved} into {detached}");
        Ok(detached)
    }

    /// Pages of live documents that are no longer shown anywhere.
    pub fn orphaned_pages(&self) -> Vec<PageRef> {
        self.registry
            .iter()
            .flat_map(|document| {
                (0..document.page_count()).map(move |index| PageRef::new(document.id(), index))
            })
            .filter(|page| !self.order.contains(*page))
            .collect()
    }

    /// Rewrites every document that has orphaned pages without them.
    /// Returns how many pages were removed.
    pub fn purge_orphans(&mut self) -> WorkbenchResult<usize> {
        let orphans = self.orphaned_pages();
        if orphans.is_empty() {
            return Ok(0);
        }

        let docs: BTreeSet<DocId> = orphans.iter().map(|page| page.doc).collect();
        let plan = docs.into_iter().map(|doc| (doc, self.visible_indices_except(doc, &BTreeSet::new())));
        let changes = self.prepare_changes(plan.collect())?;
        for change in changes {
            self.commit_change(change);
        }
        self.sweep();
        self.rebuild_order();

        info!("purged {} orphaned pages", orphans.len());
        Ok(orphans.len())
    }

    /// Deletes every selected page. Documents left without pages are removed;
    /// the others are rewritten and keep each page's rotation. Orphaned pages
    /// of the rewritten documents go with them.
    pub fn delete_selected(&mut self) -> WorkbenchResult<usize> {
        self.require_selection()?;

        let mut picks: BTreeMap<DocId, BTreeSet<u32>> = BTreeMap::new();
        for page in self.selection.iter() {
            picks.entry(page.doc).or_default().insert(page.index);
        }
        let deleted = self.selection.len();

        let plan = picks
            .iter()
            .map(|(doc, removed)| (*doc, self.visible_indices_except(*doc, removed)))
            .collect();
        let changes = self.prepare_changes(plan)?;
        for change in changes {
            self.commit_change(change);
        }
        self.sweep();
        self.rebuild_order();

        info!("deleted {deleted} pages from {} documents", picks.len());
        Ok(deleted)
    }

    pub fn toggle_selection(&mut self, page: PageRef) -> WorkbenchResult<bool> {
        if !self.order.contains(page) {
            return Err(WorkbenchError::PageNotFound(page));
        }
        Ok(self.selection.toggle(page))
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(self.order.iter());
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn rotate_page(&mut self, page: PageRef, direction: RotateDirection) -> WorkbenchResult<u16> {
        if !self.order.contains(page) {
            return Err(WorkbenchError::PageNotFound(page));
        }
        self.thumbnails.invalidate_page(page);
        Ok(self.rotations.rotate(page, direction.delta_degrees()))
    }

    pub fn rotate_selected(&mut self, direction: RotateDirection) -> WorkbenchResult<()> {
        self.require_selection()?;

        let pages: Vec<PageRef> = self.selection.iter().collect();
        for page in pages {
            self.rotations.rotate(page, direction.delta_degrees());
            self.thumbnails.invalidate_page(page);
        }
        debug!("rotated {} pages {direction:?}", self.selection.len());
        Ok(())
    }

    pub fn queue_watermark(&mut self, config: WatermarkConfig) -> WorkbenchResult<EnqueueOutcome> {
        self.watermarks.enqueue(config)
    }

    /// Normalizes raw form input against the configured defaults and queues it.
    pub fn queue_watermark_draft(&mut self, draft: &WatermarkDraft) -> WorkbenchResult<EnqueueOutcome> {
        let config = WatermarkConfig::from_raw(draft, &self.config.watermark);
        self.watermarks.enqueue(config)
    }

    pub fn clear_watermarks(&mut self) {
        self.watermarks.clear();
    }

    /// Pages an export of `kind` would contain, in page order.
    pub fn pages_for(&self, kind: ExportKind) -> WorkbenchResult<Vec<PageRef>> {
        if self.order.is_empty() {
            return Err(WorkbenchError::EmptyWorkbench);
        }
        if !kind.uses_selection() {
            return Ok(self.order.as_slice().to_vec());
        }

        let picked = self.order.filtered(|page| self.selection.contains(page));
        if picked.is_empty() {
            return Err(WorkbenchError::NothingSelected);
        }
        Ok(picked)
    }

    /// Serialized output of an export of `kind`. Does not change any state.
    pub fn export_bytes<R: Rng>(&self, kind: ExportKind, rng: &mut R) -> WorkbenchResult<Vec<u8>> {
        let pages = self.pages_for(kind)?;
        export::compose(&self.registry, &pages, &self.rotations, &self.watermarks, rng)
    }

    /// Exports and delivers the result. A full download also empties the
    /// watermark queue.
    pub fn export<S: ExportSink, R: Rng>(
        &mut self,
        kind: ExportKind,
        sink: &mut S,
        rng: &mut R,
    ) -> WorkbenchResult<()> {
        let bytes = self.export_bytes(kind, rng)?;
        sink.deliver(&bytes, kind.suggested_filename(), PDF_MIME_TYPE);
        info!("exported {} ({} bytes)", kind.suggested_filename(), bytes.len());

        if kind == ExportKind::FullDownload {
            self.watermarks.clear();
        }
        Ok(())
    }

    /// Merges the selection, or every page when nothing is selected.
    pub fn merge<S: ExportSink, R: Rng>(&mut self, sink: &mut S, rng: &mut R) -> WorkbenchResult<ExportKind> {
        let kind = if self.selection.is_empty() {
            ExportKind::MergeAll
        } else {
            ExportKind::MergeSelected
        };
        self.export(kind, sink, rng)?;
        Ok(kind)
    }

    /// Draws `overlay` over the whole page box and stores the result as the
    /// document's new bytes.
    pub fn bake_annotation(&mut self, page: PageRef, overlay: &RgbaImage) -> WorkbenchResult<()> {
        let source = self.registry.get(page.doc)?;
        if page.index >= source.page_count() {
            return Err(WorkbenchError::PageNotFound(page));
        }

        let bytes = self.annotated_bytes(source, page.index, overlay).map_err(|err| {
            WorkbenchError::CorruptDocument { name: source.display_name().to_string(), source: err }
        })?;
        self.registry.replace_bytes(page.doc, bytes)?;
        self.thumbnails.invalidate_document(page.doc);

        info!("baked annotation into {page}");
        Ok(())
    }

    /// The page at `scale` with `overlay` stretched over it, for saving an
    /// annotated preview as an image.
    pub fn render_annotated_preview<R: PageRasterizer>(
        &self,
        rasterizer: &R,
        page: PageRef,
        overlay: Option<&RgbaImage>,
        scale: f32,
    ) -> WorkbenchResult<RgbaImage> {
        let source = self.registry.get(page.doc)?;
        if page.index >= source.page_count() {
            return Err(WorkbenchError::PageNotFound(page));
        }

        let mut base = rasterizer.render_page_at_scale(source.bytes(), page.index, scale).map_err(|err| {
            WorkbenchError::CorruptDocument { name: source.display_name().to_string(), source: err }
        })?;
        if let Some(overlay) = overlay {
            let fitted = if overlay.dimensions() == base.dimensions() {
                overlay.clone()
            } else {
                imageops::resize(overlay, base.width(), base.height(), FilterType::Triangle)
            };
            imageops::overlay(&mut base, &fitted, 0, 0);
        }
        Ok(base)
    }

    pub fn annotated_preview_filename(page: PageRef) -> String {
        format!("pdf-{}-page-{}.png", page.doc.0, page.index + 1)
    }

    /// Starts a thumbnail render for a shown page. Any earlier job for the
    /// page stops being current.
    pub fn request_thumbnail(&mut self, page: PageRef) -> WorkbenchResult<ThumbnailJob> {
        if !self.order.contains(page) {
            return Err(WorkbenchError::PageNotFound(page));
        }

        let source = self.registry.get(page.doc)?;
        let intrinsic = self
            .registry
            .codec()
            .page_rotation(source.handle(), page.index)
            .map_err(|err| WorkbenchError::CorruptDocument {
                name: source.display_name().to_string(),
                source: err,
            })?;
        let preview_rotation =
            normalize_degrees(i64::from(self.rotations.get(page)) - i64::from(intrinsic));
        let bytes = source.bytes().clone();

        Ok(self.thumbnails.job(page, bytes, self.config.thumbnail_width_px, preview_rotation))
    }

    pub fn is_thumbnail_current(&self, ticket: &ThumbnailTicket) -> bool {
        self.thumbnails.is_current(ticket)
    }

    /// Discards every document, page, selection, rotation and queued
    /// watermark. Outstanding thumbnail jobs become stale.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.groups.clear();
        self.order.clear();
        self.selection.clear();
        self.rotations.clear();
        self.watermarks.clear();
        self.thumbnails.clear();
        info!("workbench reset");
    }

    fn rebuild_order(&mut self) {
        self.order.rebuild_from_visual_state(&self.groups);
    }

    fn require_selection(&self) -> WorkbenchResult<()> {
        if self.order.is_empty() {
            return Err(WorkbenchError::EmptyWorkbench);
        }
        if self.selection.is_empty() {
            return Err(WorkbenchError::NothingSelected);
        }
        Ok(())
    }

    fn intrinsic_rotations(&self, id: DocId) -> WorkbenchResult<Vec<u16>> {
        let document = self.registry.get(id)?;
        (0..document.page_count())
            .map(|index| self.registry.codec().page_rotation(document.handle(), index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| WorkbenchError::CorruptDocument {
                name: document.display_name().to_string(),
                source,
            })
    }

    fn group_position_of(&self, page: PageRef) -> Option<usize> {
        self.groups.iter().position(|group| group.pages.contains(&page))
    }

    fn take_from_groups(&mut self, page: PageRef) {
        for group in &mut self.groups {
            group.pages.retain(|candidate| *candidate != page);
        }
    }

    /// Shown pages of `doc` minus `removed`, in document order.
    fn visible_indices_except(&self, doc: DocId, removed: &BTreeSet<u32>) -> Vec<u32> {
        let visible: BTreeSet<u32> = self
            .order
            .iter()
            .filter(|page| page.doc == doc && !removed.contains(&page.index))
            .map(|page| page.index)
            .collect();
        visible.into_iter().collect()
    }

    fn prepare_detached(
        &self,
        source: &SourceDocument<C::Handle>,
        page: PageRef,
    ) -> Result<(C::Handle, Vec<u8>), CodecError> {
        let codec = self.registry.codec();
        let mut output = codec.create_empty();
        let copied = codec.copy_pages(source.handle(), &[page.index], &mut output)?;

        let angle = self.rotations.get(page);
        for index in copied {
            if codec.page_rotation(&output, index)? != angle {
                codec.set_page_rotation(&mut output, index, angle)?;
            }
        }

        let bytes = codec.save(&output)?;
        let handle = codec.load(&bytes)?;
        Ok((handle, bytes))
    }

    /// `None` when `kept` already is the whole document.
    fn prepare_change(
        &self,
        source: &SourceDocument<C::Handle>,
        kept: Vec<u32>,
    ) -> Result<Option<DocumentChange<C::Handle>>, CodecError> {
        if kept.is_empty() {
            return Ok(Some(DocumentChange::Remove(source.id())));
        }
        if kept.len() as u32 == source.page_count() {
            return Ok(None);
        }

        let codec = self.registry.codec();
        let mut output = codec.create_empty();
        codec.copy_pages(source.handle(), &kept, &mut output)?;
        let bytes = codec.save(&output)?;
        let handle = codec.load(&bytes)?;
        Ok(Some(DocumentChange::Rewrite { doc: source.id(), kept, handle, bytes }))
    }

    fn prepare_changes(
        &self,
        plan: Vec<(DocId, Vec<u32>)>,
    ) -> WorkbenchResult<Vec<DocumentChange<C::Handle>>> {
        let mut changes = Vec::with_capacity(plan.len());
        for (doc, kept) in plan {
            let source = self.registry.get(doc)?;
            let change = self.prepare_change(source, kept).map_err(|err| {
                WorkbenchError::CorruptDocument { name: source.display_name().to_string(), source: err }
            })?;
            changes.extend(change);
        }
        Ok(changes)
    }

    fn commit_change(&mut self, change: DocumentChange<C::Handle>) {
        match change {
            DocumentChange::Remove(doc) => self.discard_document(doc),
            DocumentChange::Rewrite { doc, kept, handle, bytes } => {
                if let Err(err) = self.registry.replace_parsed(doc, handle, bytes) {
                    warn!("skipping rewrite of {doc}: {err}");
                    return;
                }
                let renumber = |page: PageRef| -> Option<PageRef> {
                    if page.doc != doc {
                        return Some(page);
                    }
                    kept.iter()
                        .position(|&old| old == page.index)
                        .map(|index| PageRef::new(doc, index as u32))
                };
                for group in &mut self.groups {
                    group.pages = group.pages.iter().copied().filter_map(renumber).collect();
                }
                self.selection.reindex(doc, &kept);
                self.rotations.reindex(doc, &kept);
                self.thumbnails.invalidate_document(doc);
            }
        }
    }

    fn discard_document(&mut self, doc: DocId) {
        self.selection.purge(|page| page.doc == doc);
        self.rotations.purge(|page| page.doc == doc);
        for group in &mut self.groups {
            group.pages.retain(|page| page.doc != doc);
        }
        self.dissolve_group(doc);
        self.thumbnails.invalidate_document(doc);
        if let Err(err) = self.registry.remove(doc) {
            debug!("{err}");
        }
    }

    /// Removes the group owned by `owner`. Pages of other documents shown in
    /// it join the neighbouring group so the flattened order is unchanged.
    fn dissolve_group(&mut self, owner: DocId) {
        let Some(position) = self.groups.iter().position(|group| group.owner == owner) else {
            return;
        };
        let group = self.groups.remove(position);
        if group.pages.is_empty() {
            return;
        }

        if position > 0 {
            self.groups[position - 1].pages.extend(group.pages);
        } else if let Some(next) = self.groups.first_mut() {
            next.pages.splice(0..0, group.pages);
        } else {
            let new_owner = group.pages[0].doc;
            self.groups.push(VisualGroup::new(new_owner, group.pages));
        }
    }

    /// Removes documents that show no page and own no group.
    fn sweep(&mut self) {
        let unused: Vec<DocId> = self
            .registry
            .ids()
            .filter(|doc| {
                !self
                    .groups
                    .iter()
                    .any(|group| group.owner == *doc || group.pages.iter().any(|page| page.doc == *doc))
            })
            .collect();

        for doc in unused {
            debug!("{doc} has no pages left on the workbench");
            self.discard_document(doc);
        }
    }

    fn annotated_bytes(
        &self,
        source: &SourceDocument<C::Handle>,
        page_index: u32,
        overlay: &RgbaImage,
    ) -> Result<Vec<u8>, CodecError> {
        let codec = self.registry.codec();
        let mut handle = codec.load(source.bytes())?;
        let image = codec.embed_image(&mut handle, overlay)?;
        let size = codec.page_size(&handle, page_index)?;
        let placement = Placement { x: 0.0, y: 0.0, width: size.width_pt, height: size.height_pt };
        codec.draw_image(&mut handle, page_index, &image, placement)?;
        codec.save(&handle)
    }
}
