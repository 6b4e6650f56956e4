use pdf_engine::fixtures::{sample_pdf, SampleDocument};
use pdf_engine::{DocumentCodec, LopdfCodec, PageRasterizer, PreviewRasterizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use workbench::{
    CollectingSink, DocId, ExportKind, OrphanPolicy, PageRef, RotateDirection, WatermarkConfig,
    WatermarkDefaults, Workbench, WorkbenchConfig, WorkbenchError,
};

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

fn load_x_and_y(workbench: &mut Workbench) -> (DocId, DocId) {
    let x = workbench.load_document("x.pdf", sample_pdf("x", 3)).expect("load x");
    let y = workbench.load_document("y.pdf", sample_pdf("y", 2)).expect("load y");
    (x, y)
}

fn page_contents(bytes: &[u8]) -> Vec<Vec<u8>> {
    let codec = LopdfCodec::new();
    let handle = codec.load(bytes).expect("export should parse");
    (0..codec.page_count(&handle))
        .map(|index| handle.page_content(index).expect("content"))
        .collect()
}

fn original_content(label: &str, pages: u32, index: u32) -> Vec<u8> {
    let codec = LopdfCodec::new();
    let handle = codec.load(&sample_pdf(label, pages)).expect("sample should parse");
    handle.page_content(index).expect("content")
}

#[test]
fn merge_selected_follows_page_order_not_click_order() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);

    workbench.toggle_selection(PageRef::new(y, 0)).expect("select y0");
    workbench.toggle_selection(PageRef::new(x, 1)).expect("select x1");
    let mut sink = CollectingSink::default();
    workbench.export(ExportKind::MergeSelected, &mut sink, &mut rng()).expect("merge selected");

    let delivery = &sink.deliveries[0];
    assert_eq!(delivery.suggested_filename, "merged-selected.pdf");
    assert_eq!(
        page_contents(&delivery.bytes),
        vec![original_content("x", 3, 1), original_content("y", 2, 0)]
    );
}

#[test]
fn dragging_a_page_into_another_group_detaches_it() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);

    let z = workbench.cross_group_drop(PageRef::new(x, 0), y, 0).expect("drop");

    assert_ne!(z.doc, x);
    assert_ne!(z.doc, y);
    assert_eq!(workbench.document(x).expect("x").page_count(), 2);
    assert_eq!(workbench.document(z.doc).expect("z").page_count(), 1);
    assert_eq!(
        workbench.page_order().as_slice(),
        &[PageRef::new(x, 0), PageRef::new(x, 1), z, PageRef::new(y, 0), PageRef::new(y, 1)]
    );

    let codec = LopdfCodec::new();
    let rewritten = codec.load(workbench.document(x).expect("x").bytes()).expect("x parses");
    assert_eq!(rewritten.page_content(0).expect("content"), original_content("x", 3, 1));

    let detached = codec.load(workbench.document(z.doc).expect("z").bytes()).expect("z parses");
    assert_eq!(detached.page_content(0).expect("content"), original_content("x", 3, 0));
}

#[test]
fn detach_carries_selection_and_rotation() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);
    let moved = PageRef::new(x, 2);
    workbench.toggle_selection(moved).expect("select");
    workbench.rotate_page(moved, RotateDirection::Left).expect("rotate");

    let z = workbench.cross_group_drop(moved, y, 1).expect("drop");

    assert!(workbench.selection().contains(z));
    assert!(!workbench.selection().contains(moved));
    assert_eq!(workbench.rotations().get(z), 270);

    let codec = LopdfCodec::new();
    let detached = codec.load(workbench.document(z.doc).expect("z").bytes()).expect("z parses");
    assert_eq!(codec.page_rotation(&detached, 0).expect("rotation"), 270);
}

#[test]
fn detached_page_exports_like_the_original() {
    let rasterizer = PreviewRasterizer::new();
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);
    let page = PageRef::new(x, 1);
    workbench.rotate_page(page, RotateDirection::Right).expect("rotate");
    workbench.toggle_selection(page).expect("select");

    let before = workbench.export_bytes(ExportKind::SplitSelected, &mut rng()).expect("split");
    let z = workbench.cross_group_drop(page, y, 2).expect("drop");
    assert!(workbench.selection().contains(z));
    let after = workbench.export_bytes(ExportKind::SplitSelected, &mut rng()).expect("split");

    let expected = rasterizer.render_page_at_scale(&before, 0, 0.5).expect("render before");
    let actual = rasterizer.render_page_at_scale(&after, 0, 0.5).expect("render after");
    assert_eq!(expected.dimensions(), actual.dimensions());
    assert_eq!(expected.dimensions(), (396, 306));
    assert_eq!(expected.as_raw(), actual.as_raw());
}

#[test]
fn rotation_follows_the_physical_page_through_deletion() {
    let mut workbench = Workbench::default();
    let (x, _) = load_x_and_y(&mut workbench);

    workbench.rotate_page(PageRef::new(x, 1), RotateDirection::Right).expect("rotate");
    workbench.toggle_selection(PageRef::new(x, 0)).expect("select");
    workbench.delete_selected().expect("delete");

    assert_eq!(workbench.rotations().get(PageRef::new(x, 0)), 90);
    assert_eq!(workbench.rotations().get(PageRef::new(x, 1)), 0);

    let bytes = workbench.export_bytes(ExportKind::MergeAll, &mut rng()).expect("export");
    let codec = LopdfCodec::new();
    let output = codec.load(&bytes).expect("export parses");
    assert_eq!(codec.page_count(&output), 4);
    assert_eq!(codec.page_rotation(&output, 0).expect("rotation"), 90);
    assert_eq!(output.page_content(0).expect("content"), original_content("x", 3, 1));
}

#[test]
fn deleting_every_page_of_a_document_removes_it() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);
    workbench.rotate_page(PageRef::new(x, 2), RotateDirection::Half).expect("rotate");
    for index in 0..3 {
        workbench.toggle_selection(PageRef::new(x, index)).expect("select");
    }
    workbench.toggle_selection(PageRef::new(y, 1)).expect("select");

    assert_eq!(workbench.delete_selected().expect("delete"), 4);

    assert!(matches!(workbench.document(x), Err(WorkbenchError::DocumentNotFound(_))));
    assert!(!workbench.rotations().references_doc(x));
    assert!(workbench.selection().iter().all(|page| page.doc != x));
    assert!(workbench.selection().is_empty());
    assert_eq!(workbench.page_order().as_slice(), &[PageRef::new(y, 0)]);
    assert_eq!(workbench.groups().len(), 1);
}

#[test]
fn repeated_export_without_changes_is_byte_identical() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);
    workbench.rotate_page(PageRef::new(y, 1), RotateDirection::Left).expect("rotate");
    workbench.cross_group_drop(PageRef::new(x, 2), y, 0).expect("drop");

    let first = workbench.export_bytes(ExportKind::FullDownload, &mut rng()).expect("export");
    let second = workbench
        .export_bytes(ExportKind::FullDownload, &mut StdRng::seed_from_u64(9))
        .expect("export");

    assert_eq!(first, second);
}

#[test]
fn removing_a_document_purges_its_selection() {
    let mut workbench = Workbench::default();
    let (x, y) = load_x_and_y(&mut workbench);
    workbench.toggle_selection(PageRef::new(x, 0)).expect("select");

    workbench.remove_document(x).expect("remove");

    assert!(workbench.selection().is_empty());
    assert!(matches!(workbench.delete_selected(), Err(WorkbenchError::NothingSelected)));
    assert_eq!(workbench.page_order().as_slice(), &[PageRef::new(y, 0), PageRef::new(y, 1)]);
}

#[test]
fn watermarks_never_exceed_page_ceiling_in_output() {
    let mut workbench = Workbench::default();
    load_x_and_y(&mut workbench);
    let defaults = WatermarkDefaults::default();
    for n in 0..4 {
        let config = WatermarkConfig::new(&format!("style {n}"), 12, 16, 0.3, "#223344", &defaults);
        workbench.queue_watermark(config).expect("queue");
    }

    let bytes = workbench.export_bytes(ExportKind::MergeAll, &mut rng()).expect("export");

    for (index, content) in page_contents(&bytes).iter().enumerate() {
        let stamps = String::from_utf8_lossy(content).matches(" Do Q").count();
        assert_eq!(stamps, 30, "page {index}");
    }
}

#[test]
fn seeded_watermark_exports_are_reproducible() {
    let mut workbench = Workbench::default();
    load_x_and_y(&mut workbench);
    let config = WatermarkConfig::new("SEED", 5, 24, 0.5, "#ff0000", &WatermarkDefaults::default());
    workbench.queue_watermark(config).expect("queue");

    let first = workbench.export_bytes(ExportKind::MergeAll, &mut rng()).expect("export");
    let second = workbench.export_bytes(ExportKind::MergeAll, &mut rng()).expect("export");
    let other = workbench
        .export_bytes(ExportKind::MergeAll, &mut StdRng::seed_from_u64(1))
        .expect("export");

    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn deferred_orphans_are_cleaned_by_a_later_delete() {
    let config = WorkbenchConfig { orphan_policy: OrphanPolicy::Defer, ..WorkbenchConfig::default() };
    let mut workbench = Workbench::new(config);
    let (x, y) = load_x_and_y(&mut workbench);

    workbench.cross_group_drop(PageRef::new(x, 0), y, 0).expect("drop");
    assert_eq!(workbench.document(x).expect("x").page_count(), 3);
    assert_eq!(workbench.orphaned_pages(), vec![PageRef::new(x, 0)]);

    workbench.toggle_selection(PageRef::new(x, 2)).expect("select");
    workbench.delete_selected().expect("delete");

    assert_eq!(workbench.document(x).expect("x").page_count(), 1);
    assert!(workbench.orphaned_pages().is_empty());
    assert_eq!(workbench.page_order().as_slice()[0], PageRef::new(x, 0));
}

#[test]
fn intrinsic_rotation_is_not_applied_twice_on_detach() {
    let mut workbench = Workbench::default();
    let r = workbench
        .load_document("r.pdf", SampleDocument::new("r").pages(2).inherited_rotation(90).build())
        .expect("load r");
    let y = workbench.load_document("y.pdf", sample_pdf("y", 1)).expect("load y");

    let z = workbench.cross_group_drop(PageRef::new(r, 0), y, 0).expect("drop");

    assert_eq!(workbench.rotations().get(z), 90);
    let bytes = workbench.export_bytes(ExportKind::MergeAll, &mut rng()).expect("export");
    let codec = LopdfCodec::new();
    let output = codec.load(&bytes).expect("export parses");
    for index in 0..codec.page_count(&output) {
        let expected = if index == 2 { 0 } else { 90 };
        assert_eq!(codec.page_rotation(&output, index).expect("rotation"), expected, "page {index}");
    }
}
