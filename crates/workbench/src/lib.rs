//! Multi-document page workbench.
//!
//! Pages from several loaded documents are arranged in visual groups,
//! selected, rotated, dragged between groups and finally exported into new
//! documents, optionally stamped with queued watermarks. Every structure
//! except the [`Registry`] holds plain [`PageRef`] values and is rebuilt or
//! remapped whenever the arrangement changes.

mod config;
mod error;
mod export;
mod order;
mod page;
mod registry;
mod rotation;
mod selection;
mod thumbnail;
pub mod watermark;
mod workbench;

pub use config::{OrphanPolicy, WorkbenchConfig, DEFAULT_THUMBNAIL_WIDTH_PX};
pub use error::{WorkbenchError, WorkbenchResult};
pub use export::{
    compose, random_placement, CollectingSink, Delivery, DirectorySink, ExportKind, ExportSink,
    PDF_MIME_TYPE,
};
pub use order::PageOrder;
pub use page::{DocId, PageRef, VisualGroup};
pub use registry::{Registry, SourceDocument};
pub use rotation::{RotateDirection, RotationMap};
pub use selection::SelectionSet;
pub use thumbnail::{ThumbnailJob, ThumbnailTicket, ThumbnailTracker};
pub use watermark::{
    EnqueueOutcome, WatermarkConfig, WatermarkDefaults, WatermarkDraft, WatermarkQueue,
};
pub use workbench::Workbench;
