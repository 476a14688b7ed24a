//! PDF Annotator Scheduler Library
//!
//! Cooperative cancellation and named background tasks for best-effort
//! work such as page prefetching and text search.
//!
//! # Example
//!
//! ```
//! use pdf_annotator_scheduler::RestartableTask;
//!
//! let mut prefetch = RestartableTask::new("prefetch");
//!
//! // Every page change replaces the previous task
//! prefetch.restart(|token| {
//!     for page in 0..3 {
//!         if token.is_cancelled() {
//!             return;
//!         }
//!         let _ = page; // render page...
//!     }
//! });
//!
//! prefetch.cancel();
//! ```

mod cancel;
mod task;

pub use cancel::{Cancelled, CancellationToken};
pub use task::{BackgroundTask, RestartableTask, TaskError};
