//! Page prefetching
//!
//! After every page change the pages around the new current page are
//! rendered into the [`PageCache`] in the background. The previous prefetch
//! is cancelled first. Prefetching is best-effort: failures are logged and
//! the page is rendered on demand later.

use crate::{DocumentHandle, PageCache, PageKey, RenderRequest, SharedEngine};
use pdf_annotator_scheduler::RestartableTask;
use tracing::debug;

/// Pages to prefetch, nearest first: `current`, `current+1`, `current-1`, ...
pub fn pages_around(current: u32, page_count: u32, radius: u32) -> Vec<u32> {
    if current >= page_count {
        return Vec::new();
    }
    let mut pages = vec![current];
    for distance in 1..=radius {
        if let Some(next) = current.checked_add(distance).filter(|p| *p < page_count) {
            pages.push(next);
        }
        if let Some(previous) = current.checked_sub(distance) {
            pages.push(previous);
        }
    }
    pages
}

pub struct Prefetcher {
    engine: SharedEngine,
    cache: PageCache,
    radius: u32,
    task: RestartableTask,
}

impl Prefetcher {
    pub fn new(engine: SharedEngine, cache: PageCache, radius: u32) -> Self {
        Self { engine, cache, radius, task: RestartableTask::new("prefetch") }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Restart prefetching around `current_page`
    pub fn on_page_changed(&mut self, handle: DocumentHandle, current_page: u32, scale: f32) {
        let engine = self.engine.clone();
        let cache = self.cache.clone();
        let radius = self.radius;

        self.task.restart(move |token| {
            let page_count = match engine.page_count(handle) {
                Ok(count) => count,
                Err(err) => {
                    debug!(error = %err, "prefetch skipped");
                    return;
                }
            };

            for page_index in pages_around(current_page, page_count, radius) {
                if token.is_cancelled() {
                    debug!(page = current_page, "prefetch cancelled");
                    return;
                }
                let key = PageKey::new(handle, page_index, scale);
                if cache.contains(&key) {
                    continue;
                }
                match engine.render_page(handle, RenderRequest::new(page_index, scale)) {
                    Ok(image) => {
                        cache.put(key, image);
                    }
                    Err(err) => debug!(page = page_index, error = %err, "prefetch render failed"),
                }
            }
        });
    }

    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    /// Wait for the running prefetch to finish
    pub fn wait(&mut self) {
        if let Err(err) = self.task.join() {
            debug!(error = %err, "prefetch task ended abnormally");
        }
    }
}
