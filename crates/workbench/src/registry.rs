//! Document Registry: owns every loaded document and its bytes.
//!
//! The registry performs no cascading cleanup. Callers purge page order,
//! selection and rotation entries for a document before removing it.

use crate::error::{WorkbenchError, WorkbenchResult};
use crate::page::DocId;
use log::{debug, info};
use pdf_engine::DocumentCodec;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct SourceDocument<H> {
    id: DocId,
    display_name: String,
    handle: H,
    page_count: u32,
    bytes: Arc<[u8]>,
}

impl<H> SourceDocument<H> {
    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Serialized form of the document as it currently stands.
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub(crate) fn handle(&self) -> &H {
        &self.handle
    }
}

pub struct Registry<C: DocumentCodec> {
    codec: C,
    documents: BTreeMap<DocId, SourceDocument<C::Handle>>,
    next_id: u64,
}

impl<C: DocumentCodec> Registry<C> {
    pub fn new(codec: C) -> Self {
        Self { codec, documents: BTreeMap::new(), next_id: 0 }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Parses `bytes` and registers them under a fresh id.
    pub fn load(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> WorkbenchResult<DocId> {
        let name = name.into();
        let handle = match self.codec.load(&bytes) {
            Ok(handle) => handle,
            Err(source) => return Err(WorkbenchError::CorruptDocument { name, source }),
        };

        let id = self.insert_parsed(name, handle, bytes);
        Ok(id)
    }

    /// Registers an already parsed document. `handle` must be the parse of `bytes`.
    pub(crate) fn insert_parsed(&mut self, name: String, handle: C::Handle, bytes: Vec<u8>) -> DocId {
        let id = DocId(self.next_id);
        self.next_id += 1;

        let page_count = self.codec.page_count(&handle);
        info!("registered {id} \"{name}\" ({page_count} pages)");
        self.documents.insert(
            id,
            SourceDocument { id, display_name: name, handle, page_count, bytes: bytes.into() },
        );
        id
    }

    pub fn get(&self, id: DocId) -> WorkbenchResult<&SourceDocument<C::Handle>> {
        self.documents.get(&id).ok_or(WorkbenchError::DocumentNotFound(id))
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.documents.contains_key(&id)
    }

    pub fn remove(&mut self, id: DocId) -> WorkbenchResult<SourceDocument<C::Handle>> {
        let removed = self.documents.remove(&id).ok_or(WorkbenchError::DocumentNotFound(id))?;
        info!("removed {id} \"{}\"", removed.display_name);
        Ok(removed)
    }

    /// Re-parses `bytes` and swaps them in. Returns the new page count.
    ///
    /// On a codec failure the previous bytes and handle stay in place.
    pub fn replace_bytes(&mut self, id: DocId, bytes: Vec<u8>) -> WorkbenchResult<u32> {
        let name = self.get(id)?.display_name.clone();
        let handle = match self.codec.load(&bytes) {
            Ok(handle) => handle,
            Err(source) => return Err(WorkbenchError::CorruptDocument { name, source }),
        };

        self.replace_parsed(id, handle, bytes)
    }

    pub(crate) fn replace_parsed(
        &mut self,
        id: DocId,
        handle: C::Handle,
        bytes: Vec<u8>,
    ) -> WorkbenchResult<u32> {
        let page_count = self.codec.page_count(&handle);
        let document = self.documents.get_mut(&id).ok_or(WorkbenchError::DocumentNotFound(id))?;

        document.handle = handle;
        document.bytes = bytes.into();
        document.page_count = page_count;
        debug!("replaced bytes of {id}, now {page_count} pages");
        Ok(page_count)
    }

    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.documents.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDocument<C::Handle>> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Drops every document. Ids keep counting up from where they were.
    pub fn clear(&mut self) {
        self.documents.clear();
    }
}
