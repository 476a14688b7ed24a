//! Rendering and OCR boundary for the PDF annotator
//!
//! The [`RenderEngine`] trait is the only way the annotator touches PDF
//! content. The default [`LopdfEngine`] parses page geometry and text with
//! `lopdf` and rasterises blank page canvases; the `pdfium` feature adds a
//! full renderer. Engines are not re-entrant, so shared use goes through
//! [`SharedEngine`].

mod cache;
mod lopdf_backend;
mod ocr;
mod prefetch;
mod search;
mod shared;

#[cfg(feature = "pdfium")]
pub mod pdfium_backend;

pub use cache::{CacheStats, PageCache, PageKey};
pub use lopdf_backend::LopdfEngine;
pub use ocr::{NoOcrBackend, OcrEngine, OcrError, OcrOutput, OcrService, OcrState, WordBox};
pub use prefetch::{pages_around, Prefetcher};
pub use search::{find_in_text, SearchEvent, SearchTask};
pub use shared::{PageRender, SharedEngine};

use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a page declares no usable MediaBox
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

/// Largest bitmap edge a backend will allocate, in pixels
pub const MAX_RENDER_DIMENSION: u32 = 16_384;

impl RenderRequest {
    pub fn new(page_index: u32, scale: f32) -> Self {
        Self { page_index, scale }
    }

    /// Bitmap size for a page of `page_size` at this request's scale
    ///
    /// Non-positive scales render at 1.0. Non-finite scales and bitmaps with
    /// an edge above [`MAX_RENDER_DIMENSION`] are rejected before anything
    /// is allocated.
    pub fn pixel_size(&self, page_size: PageSize) -> Result<(u32, u32), PdfEngineError> {
        if !self.scale.is_finite() {
            return Err(PdfEngineError::InvalidScale(self.scale));
        }
        let scale = if self.scale <= 0.0 { 1.0 } else { self.scale };

        let width = (f64::from(page_size.width_pt) * f64::from(scale)).round().max(1.0);
        let height = (f64::from(page_size.height_pt) * f64::from(scale)).round().max(1.0);
        let limit = f64::from(MAX_RENDER_DIMENSION);
        if !(width <= limit && height <= limit) {
            return Err(PdfEngineError::RenderTooLarge { width, height });
        }
        Ok((width as u32, height as u32))
    }
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

/// Quadrilateral in page points, corners in reading order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub points: [(f32, f32); 4],
}

/// One occurrence of a search query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub page_index: u32,
    /// Location on the page, when the backend can report it
    pub quad: Option<Quad>,
    /// Text surrounding the match
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("render of {width}x{height} px exceeds the bitmap limit")]
    RenderTooLarge { width: f64, height: f64 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

pub trait RenderEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn extract_text(&self, handle: DocumentHandle, page_index: u32)
        -> Result<String, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;

    /// Case-insensitive search over every page's text
    fn search(&self, handle: DocumentHandle, query: &str) -> Result<Vec<SearchHit>, PdfEngineError> {
        let mut hits = Vec::new();
        for page_index in 0..self.page_count(handle)? {
            let text = self.extract_text(handle, page_index)?;
            hits.extend(find_in_text(page_index, &text, query));
        }
        Ok(hits)
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one text line per page
    pub fn pdf_with_pages(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
