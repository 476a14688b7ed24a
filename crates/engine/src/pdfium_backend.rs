//! Pdfium rendering backend
//!
//! Geometry comes from the lopdf backend; rasters and text come from the
//! system Pdfium library, which is bound for each call so the engine stays
//! `Send`.

use crate::{
    DocumentHandle, LopdfEngine, OpenSource, PageSize, PdfEngineError, RenderEngine,
    RenderRequest, RgbaImage,
};
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::fs;

pub struct PdfiumEngine {
    inner: LopdfEngine,
    bytes: HashMap<DocumentHandle, Vec<u8>>,
}

fn bind() -> Result<Pdfium, PdfEngineError> {
    let bindings = Pdfium::bind_to_system_library().map_err(|err| {
        PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
    })?;
    Ok(Pdfium::new(bindings))
}

fn backend_error(err: PdfiumError) -> PdfEngineError {
    PdfEngineError::Backend(err.to_string())
}

impl PdfiumEngine {
    pub fn from_system_library() -> Result<Self, PdfEngineError> {
        bind()?;
        Ok(Self { inner: LopdfEngine::new(), bytes: HashMap::new() })
    }

    fn bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError> {
        self.bytes
            .get(&handle)
            .map(Vec::as_slice)
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl RenderEngine for PdfiumEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };
        let handle = self.inner.open(OpenSource::Bytes(bytes.clone()))?;
        self.bytes.insert(handle, bytes);
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.inner.page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.inner.page_size(handle, page_index)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let size = self.page_size(handle, request.page_index)?;
        let (width, _) = request.pixel_size(size)?;

        let pdfium = bind()?;
        let document =
            pdfium.load_pdf_from_byte_slice(self.bytes(handle)?, None).map_err(backend_error)?;
        let page = document.pages().get(request.page_index as u16).map_err(backend_error)?;
        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().set_target_width(width as i32))
            .map_err(backend_error)?;

        RgbaImage::from_raw(
            bitmap.width() as u32,
            bitmap.height() as u32,
            bitmap.as_rgba_bytes(),
        )
        .ok_or_else(|| PdfEngineError::Backend("pdfium returned a malformed bitmap".to_owned()))
    }

    fn extract_text(&self, handle: DocumentHandle, page_index: u32) -> Result<String, PdfEngineError> {
        let pdfium = bind()?;
        let document =
            pdfium.load_pdf_from_byte_slice(self.bytes(handle)?, None).map_err(backend_error)?;
        let page = document.pages().get(page_index as u16).map_err(backend_error)?;
        let text = page.text().map_err(backend_error)?.all();
        Ok(text)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.bytes.remove(&handle);
        self.inner.close(handle)
    }
}
