//! OCR boundary
//!
//! [`OcrEngine`] is the recognition backend; [`OcrService`] wraps one behind
//! a lock and tracks whether it could be initialised. A backend that fails
//! to initialise makes OCR unavailable without affecting reading or
//! annotating.

use crate::{DocumentHandle, RenderRequest, RgbaImage, SharedEngine};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Scale used when rasterising a page for recognition
const OCR_RENDER_SCALE: f32 = 2.0;

/// A recognised word in image pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrOutput {
    pub text: String,
    /// Mean confidence, 0.0 to 1.0
    pub confidence: f32,
    pub words: Vec<WordBox>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OcrError {
    #[error("OCR is unavailable: {0}")]
    Unavailable(String),
    #[error("OCR initialisation failed: {0}")]
    Initialization(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("page could not be rendered for OCR: {0}")]
    Render(String),
}

pub trait OcrEngine {
    /// Load models for `language`; called once before the first recognition
    fn initialize(&mut self, language: &str) -> Result<(), OcrError>;
    fn recognize(&mut self, image: &RgbaImage) -> Result<OcrOutput, OcrError>;
}

/// Backend used when no OCR engine is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcrBackend;

impl OcrEngine for NoOcrBackend {
    fn initialize(&mut self, _language: &str) -> Result<(), OcrError> {
        Err(OcrError::Unavailable("no OCR backend configured".to_owned()))
    }

    fn recognize(&mut self, _image: &RgbaImage) -> Result<OcrOutput, OcrError> {
        Err(OcrError::Unavailable("no OCR backend configured".to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrState {
    Uninitialized,
    Ready,
    Unavailable(String),
}

struct ServiceState {
    engine: Box<dyn OcrEngine + Send>,
    language: String,
    state: OcrState,
}

impl ServiceState {
    fn ensure_initialized(&mut self) -> OcrState {
        if self.state == OcrState::Uninitialized {
            self.state = match self.engine.initialize(&self.language) {
                Ok(()) => {
                    debug!(language = %self.language, "OCR engine ready");
                    OcrState::Ready
                }
                Err(err) => {
                    warn!(language = %self.language, error = %err, "OCR unavailable");
                    OcrState::Unavailable(err.to_string())
                }
            };
        }
        self.state.clone()
    }
}

/// Shared, lazily initialised OCR engine
#[derive(Clone)]
pub struct OcrService {
    inner: Arc<Mutex<ServiceState>>,
}

impl OcrService {
    pub fn new(engine: impl OcrEngine + Send + 'static, language: impl Into<String>) -> Self {
        let state = ServiceState {
            engine: Box::new(engine),
            language: language.into(),
            state: OcrState::Uninitialized,
        };
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    /// Service that reports OCR as unavailable
    pub fn disabled() -> Self {
        Self::new(NoOcrBackend, "eng")
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialise the backend if it has not been tried yet
    ///
    /// Never fails; the outcome is the resulting state.
    pub fn initialize(&self) -> OcrState {
        self.lock().ensure_initialized()
    }

    pub fn state(&self) -> OcrState {
        self.lock().state.clone()
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.state(), OcrState::Unavailable(_))
    }

    pub fn recognize(&self, image: &RgbaImage) -> Result<OcrOutput, OcrError> {
        let mut state = self.lock();
        match state.ensure_initialized() {
            OcrState::Unavailable(reason) => Err(OcrError::Unavailable(reason)),
            _ => state.engine.recognize(image),
        }
    }

    /// Rasterise a page and recognise its text
    pub fn recognize_page(
        &self,
        engine: &SharedEngine,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<OcrOutput, OcrError> {
        if let OcrState::Unavailable(reason) = self.initialize() {
            return Err(OcrError::Unavailable(reason));
        }
        let image = engine
            .render_page(handle, RenderRequest::new(page_index, OCR_RENDER_SCALE))
            .map_err(|err| OcrError::Render(err.to_string()))?;
        self.recognize(&image)
    }
}
