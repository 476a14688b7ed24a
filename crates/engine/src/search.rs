//! Background text search
//!
//! [`SearchTask`] walks the document page by page on its own thread and
//! streams hits over a channel, checking its cancellation token between
//! pages so a new query can replace a running one.

use crate::{DocumentHandle, SearchHit, SharedEngine};
use pdf_annotator_scheduler::{BackgroundTask, TaskError};
use std::sync::mpsc::{self, Receiver};
use tracing::debug;

/// Characters of context kept on each side of a match
const SNIPPET_CONTEXT: usize = 30;

/// Case-insensitive occurrences of `query` in one page's text
pub fn find_in_text(page_index: u32, text: &str, query: &str) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = chars.iter().flat_map(|c| c.to_lowercase()).collect();
    let needle: Vec<char> = needle.chars().collect();
    // Lowercasing can change the char count; match case-sensitively then so
    // snippet indices stay aligned with the original text
    let haystack = if lowered.len() == chars.len() { &lowered } else { &chars };

    let mut hits = Vec::new();
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        if haystack[start..start + needle.len()] == needle[..] {
            let from = start.saturating_sub(SNIPPET_CONTEXT);
            let to = (start + needle.len() + SNIPPET_CONTEXT).min(chars.len());
            let snippet: String = chars[from..to].iter().collect();
            hits.push(SearchHit {
                page_index,
                quad: None,
                snippet: snippet.split_whitespace().collect::<Vec<_>>().join(" "),
            });
            start += needle.len();
        } else {
            start += 1;
        }
    }
    hits
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// Hits found on one page
    Page { page_index: u32, hits: Vec<SearchHit> },
    Finished { total: usize },
    Cancelled,
    Failed(String),
}

pub struct SearchTask {
    task: BackgroundTask,
    events: Receiver<SearchEvent>,
}

impl SearchTask {
    pub fn start(
        engine: SharedEngine,
        handle: DocumentHandle,
        query: impl Into<String>,
    ) -> Result<Self, TaskError> {
        let query = query.into();
        let (sender, events) = mpsc::channel();

        let task = BackgroundTask::spawn("search", move |token| {
            let page_count = match engine.page_count(handle) {
                Ok(count) => count,
                Err(err) => {
                    let _ = sender.send(SearchEvent::Failed(err.to_string()));
                    return;
                }
            };

            let mut total = 0;
            for page_index in 0..page_count {
                if token.is_cancelled() {
                    let _ = sender.send(SearchEvent::Cancelled);
                    return;
                }
                let text = match engine.extract_text(handle, page_index) {
                    Ok(text) => text,
                    Err(err) => {
                        debug!(page = page_index, error = %err, "skipping page without text");
                        continue;
                    }
                };
                let hits = find_in_text(page_index, &text, &query);
                if !hits.is_empty() {
                    total += hits.len();
                    if sender.send(SearchEvent::Page { page_index, hits }).is_err() {
                        return;
                    }
                }
            }
            let _ = sender.send(SearchEvent::Finished { total });
        })?;

        Ok(Self { task, events })
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// Block until the search ends, returning every hit in page order
    ///
    /// `None` when the search was cancelled or failed.
    pub fn collect(self) -> Option<Vec<SearchHit>> {
        let mut all = Vec::new();
        for event in self.events.iter() {
            match event {
                SearchEvent::Page { hits, .. } => all.extend(hits),
                SearchEvent::Finished { .. } => return Some(all),
                SearchEvent::Cancelled | SearchEvent::Failed(_) => return None,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pdf_with_pages;
    use crate::LopdfEngine;

    #[test]
    fn finds_case_insensitive_matches_with_snippets() {
        let hits = find_in_text(3, "The Quick fox.\nA quick   reply", "quick");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.page_index == 3));
        assert_eq!(hits[1].snippet, "The Quick fox. A quick reply");
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert!(find_in_text(0, "anything", "  ").is_empty());
    }

    #[test]
    fn background_search_streams_hits() {
        let engine = SharedEngine::new(LopdfEngine::new());
        let handle = engine.open(pdf_with_pages(&["needle here", "hay", "another needle"])).unwrap();

        let task = SearchTask::start(engine, handle, "needle").unwrap();
        let hits = task.collect().expect("search should finish");
        let pages: Vec<u32> = hits.iter().map(|hit| hit.page_index).collect();
        assert_eq!(pages, [0, 2]);
    }

    #[test]
    fn unknown_document_fails() {
        let engine = SharedEngine::new(LopdfEngine::new());
        let task = SearchTask::start(engine, DocumentHandle(42), "x").unwrap();
        let event = task.events().recv().unwrap();
        assert!(matches!(event, SearchEvent::Failed(_)));
    }
}
