use crate::page::{DocId, PageRef};
use pdf_engine::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    #[error("cannot read document \"{name}\": {source}")]
    CorruptDocument {
        name: String,
        #[source]
        source: CodecError,
    },
    #[error("could not move page {page} into a new document: {source}")]
    DetachFailed {
        page: PageRef,
        #[source]
        source: CodecError,
    },
    #[error("export failed: {reason}")]
    ExportFailed {
        reason: String,
        #[source]
        source: Option<CodecError>,
    },
    #[error("watermark queue is full ({capacity} distinct styles)")]
    QueueFull { capacity: usize },
    #[error("no pages are selected")]
    NothingSelected,
    #[error("the workbench has no pages")]
    EmptyWorkbench,
    #[error("document {0} is not loaded")]
    DocumentNotFound(DocId),
    #[error("page {0} is not on the workbench")]
    PageNotFound(PageRef),
    #[error("invalid page arrangement: {0}")]
    InvalidLayout(String),
}

impl WorkbenchError {
    pub(crate) fn export(source: CodecError) -> Self {
        Self::ExportFailed { reason: source.to_string(), source: Some(source) }
    }
}

pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
