use crate::{
    DocumentHandle, OpenSource, PageSize, PdfEngineError, RenderEngine, RenderRequest, RgbaImage,
};
use image::Rgba;
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use tracing::debug;

/// Page tree levels searched for an inherited MediaBox
const MAX_INHERITANCE_DEPTH: usize = 16;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

struct DocumentRecord {
    document: Document,
    /// Page numbers as used by lopdf (1-based), in page order
    page_numbers: Vec<u32>,
    page_sizes: Vec<PageSize>,
}

impl DocumentRecord {
    fn page_number(&self, page_index: u32) -> Result<u32, PdfEngineError> {
        self.page_numbers.get(page_index as usize).copied().ok_or(
            PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: self.page_numbers.len() as u32,
            },
        )
    }
}

/// Pure-Rust backend: geometry and text via `lopdf`, blank page rasters
#[derive(Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(bytes: &[u8]) -> Result<DocumentRecord, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let document = Document::load_mem(bytes)?;
        let pages = document.get_pages();
        let mut page_numbers = Vec::with_capacity(pages.len());
        let mut page_sizes = Vec::with_capacity(pages.len());

        for (number, object_id) in pages {
            page_numbers.push(number);
            page_sizes.push(media_box(&document, object_id).unwrap_or(PageSize::LETTER));
        }

        if page_sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(DocumentRecord { document, page_numbers, page_sizes })
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Page size from the page's MediaBox, following `/Parent` for inherited boxes
fn media_box(document: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut dict = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(array) = dict.get(b"MediaBox").and_then(Object::as_array) {
            if array.len() != 4 {
                return None;
            }
            let x0 = array[0].as_float().ok()?;
            let y0 = array[1].as_float().ok()?;
            let x1 = array[2].as_float().ok()?;
            let y1 = array[3].as_float().ok()?;
            return Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() });
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = document.get_dictionary(parent).ok()?;
    }
    None
}

impl RenderEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let record = Self::load(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        debug!(handle = handle.raw(), pages = record.page_sizes.len(), "opened document");
        self.docs.insert(handle, record);

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let (width, height) = request.pixel_size(page_size)?;

        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(image)
    }

    fn extract_text(&self, handle: DocumentHandle, page_index: u32) -> Result<String, PdfEngineError> {
        let record = self.record(handle)?;
        let number = record.page_number(page_index)?;
        Ok(record.document.extract_text(&[number])?)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}
