//! Lock-guarded engine handle
//!
//! Rendering backends are not re-entrant. [`SharedEngine`] serialises every
//! call behind one mutex; concurrent callers wait their turn instead of
//! failing.

use crate::{
    DocumentHandle, OpenSource, PageSize, PdfEngineError, RenderEngine, RenderRequest, RgbaImage,
    SearchHit,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Result of rendering a page for display
#[derive(Debug, Clone)]
pub enum PageRender {
    Ready(RgbaImage),
    /// The page could not be rendered; the viewer shows a placeholder
    Unavailable { page_index: u32, reason: String },
}

impl PageRender {
    pub fn image(&self) -> Option<&RgbaImage> {
        match self {
            PageRender::Ready(image) => Some(image),
            PageRender::Unavailable { .. } => None,
        }
    }
}

type Engine = Box<dyn RenderEngine + Send>;

#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: impl RenderEngine + Send + 'static) -> Self {
        Self { inner: Arc::new(Mutex::new(Box::new(engine))) }
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        // A panic inside a backend call leaves no partial state we rely on
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, source: impl Into<OpenSource>) -> Result<DocumentHandle, PdfEngineError> {
        self.lock().open(source.into())
    }

    pub fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.lock().page_count(handle)
    }

    pub fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.lock().page_size(handle, page_index)
    }

    pub fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        self.lock().render_page(handle, request)
    }

    /// Render for display; failures become a placeholder for that page only
    pub fn render_or_unavailable(&self, handle: DocumentHandle, request: RenderRequest) -> PageRender {
        match self.render_page(handle, request) {
            Ok(image) => PageRender::Ready(image),
            Err(err) => {
                warn!(page = request.page_index, error = %err, "page render failed");
                PageRender::Unavailable { page_index: request.page_index, reason: err.to_string() }
            }
        }
    }

    pub fn extract_text(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<String, PdfEngineError> {
        self.lock().extract_text(handle, page_index)
    }

    pub fn search(&self, handle: DocumentHandle, query: &str) -> Result<Vec<SearchHit>, PdfEngineError> {
        self.lock().search(handle, query)
    }

    pub fn close(&self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.lock().close(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pdf_with_pages;
    use crate::LopdfEngine;
    use std::thread;

    #[test]
    fn concurrent_callers_are_serialised() {
        let engine = SharedEngine::new(LopdfEngine::new());
        let handle = engine.open(pdf_with_pages(&["one", "two", "three"])).expect("open");

        let workers: Vec<_> = (0..3)
            .map(|page| {
                let engine = engine.clone();
                thread::spawn(move || engine.render_page(handle, RenderRequest::new(page, 0.25)))
            })
            .collect();

        for worker in workers {
            let image = worker.join().expect("thread").expect("render");
            assert_eq!(image.width(), 149);
        }
    }

    #[test]
    fn out_of_range_page_is_unavailable() {
        let engine = SharedEngine::new(LopdfEngine::new());
        let handle = engine.open(pdf_with_pages(&["one"])).expect("open");

        let render = engine.render_or_unavailable(handle, RenderRequest::new(5, 1.0));
        assert!(matches!(render, PageRender::Unavailable { page_index: 5, .. }));
        assert!(render.image().is_none());

        let ok = engine.render_or_unavailable(handle, RenderRequest::new(0, 1.0));
        assert!(ok.image().is_some());
    }

    #[test]
    fn oversized_render_is_unavailable() {
        let engine = SharedEngine::new(LopdfEngine::new());
        let handle = engine.open(pdf_with_pages(&["one"])).expect("open");

        let render = engine.render_or_unavailable(handle, RenderRequest::new(0, 1.0e6));
        assert!(matches!(render, PageRender::Unavailable { page_index: 0, .. }));

        let render = engine.render_or_unavailable(handle, RenderRequest::new(0, f32::INFINITY));
        assert!(render.image().is_none());
    }
}
