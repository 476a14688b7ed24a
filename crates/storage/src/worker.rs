//! Background persistence worker
//!
//! A dedicated thread owns the SQLite connection so database I/O never runs
//! on the caller's thread. Jobs are processed in submission order; every
//! job queued before shutdown is completed, so an in-flight save is never
//! abandoned.

use crate::annotations::AnnotationRepository;
use crate::recent::{RecentDocument, RecentDocumentsRepository};
use crate::{Storage, StorageError, StorageResult};
use pdf_annotator_core::PageAnnotations;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Pages = BTreeMap<u32, PageAnnotations>;

enum Job {
    Load { document: String, reply: Sender<StorageResult<Pages>> },
    Save { document: String, pages: Pages, reply: Sender<StorageResult<()>> },
    Clear { document: String, reply: Sender<StorageResult<usize>> },
    RecordOpened { entry: RecentDocument, reply: Sender<StorageResult<()>> },
    UpdateLastPage { path: String, page: u32, reply: Sender<StorageResult<bool>> },
    Shutdown,
}

/// Pending result of a submitted job
#[derive(Debug)]
pub struct ReplyHandle<T> {
    receiver: Receiver<StorageResult<T>>,
}

impl<T> ReplyHandle<T> {
    /// Block until the job has run
    pub fn wait(self) -> StorageResult<T> {
        self.receiver.recv().map_err(|_| StorageError::WorkerStopped)?
    }

    /// Result if the job has already run
    pub fn try_get(&self) -> Option<StorageResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(StorageError::WorkerStopped)),
        }
    }
}

pub struct PersistenceWorker {
    sender: Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

impl PersistenceWorker {
    /// Open the storage database and start the worker on it
    pub fn spawn(storage: &Storage) -> StorageResult<Self> {
        Self::with_connection(storage.open_database()?)
    }

    /// Start the worker on an already migrated connection
    pub fn with_connection(conn: Connection) -> StorageResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("annotation-persistence".to_string())
            .spawn(move || Self::run(conn, receiver))?;

        Ok(Self { sender, thread: Some(thread) })
    }

    pub fn load(&self, document: impl Into<String>) -> ReplyHandle<Pages> {
        let document = document.into();
        self.submit(|reply| Job::Load { document, reply })
    }

    /// Queue a destructive replace of a document's annotations
    pub fn save(&self, document: impl Into<String>, pages: Pages) -> ReplyHandle<()> {
        let document = document.into();
        self.submit(|reply| Job::Save { document, pages, reply })
    }

    pub fn clear(&self, document: impl Into<String>) -> ReplyHandle<usize> {
        let document = document.into();
        self.submit(|reply| Job::Clear { document, reply })
    }

    pub fn record_opened(&self, entry: RecentDocument) -> ReplyHandle<()> {
        self.submit(|reply| Job::RecordOpened { entry, reply })
    }

    pub fn update_last_page(&self, path: impl Into<String>, page: u32) -> ReplyHandle<bool> {
        let path = path.into();
        self.submit(|reply| Job::UpdateLastPage { path, page, reply })
    }

    /// Finish every queued job, then stop the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn submit<T>(&self, build: impl FnOnce(Sender<StorageResult<T>>) -> Job) -> ReplyHandle<T> {
        let (reply, receiver) = mpsc::channel();
        // A failed send drops the job and its reply sender, which the
        // handle reports as `WorkerStopped`.
        if self.sender.send(build(reply)).is_err() {
            warn!("persistence worker is not running; job dropped");
        }
        ReplyHandle { receiver }
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(Job::Shutdown);
        if thread.join().is_err() {
            warn!("persistence worker panicked");
        }
    }

    fn run(conn: Connection, receiver: Receiver<Job>) {
        debug!("persistence worker started");
        let annotations = AnnotationRepository::new(&conn);
        let recent = RecentDocumentsRepository::new(&conn);

        while let Ok(job) = receiver.recv() {
            // Reply send failures mean the caller dropped its handle
            match job {
                Job::Load { document, reply } => {
                    let _ = reply.send(annotations.load_for_document(&document));
                }
                Job::Save { document, pages, reply } => {
                    let result = annotations.save_all(&document, &pages);
                    if let Err(err) = &result {
                        warn!(document = %document, error = %err, "saving annotations failed");
                    }
                    let _ = reply.send(result);
                }
                Job::Clear { document, reply } => {
                    let _ = reply.send(annotations.delete_all_for_document(&document));
                }
                Job::RecordOpened { entry, reply } => {
                    let _ = reply.send(recent.upsert(&entry));
                }
                Job::UpdateLastPage { path, page, reply } => {
                    let _ = reply.send(recent.update_last_page(&path, page));
                }
                Job::Shutdown => break,
            }
        }
        debug!("persistence worker stopped");
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;
    use pdf_annotator_core::{Color, Stroke, StrokePoint};

    fn pages() -> Pages {
        let stroke = Stroke::new(1, vec![StrokePoint::new(1.0, 2.0, 1.0, 0)], Color::BLUE, 2.0);
        let mut pages = Pages::new();
        pages.insert(1, PageAnnotations { strokes: vec![stroke], shapes: vec![] });
        pages
    }

    #[test]
    fn test_save_then_load_through_worker() {
        let worker = PersistenceWorker::with_connection(open_in_memory().unwrap()).unwrap();
        worker.save("/a.pdf", pages()).wait().unwrap();
        assert_eq!(worker.load("/a.pdf").wait().unwrap(), pages());
        assert_eq!(worker.clear("/a.pdf").wait().unwrap(), 1);
        assert!(worker.load("/a.pdf").wait().unwrap().is_empty());
    }

    #[test]
    fn test_queued_save_completes_before_shutdown() {
        let temp = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(temp.path());

        let worker = PersistenceWorker::spawn(&storage).unwrap();
        let pending = worker.save("/a.pdf", pages());
        worker.shutdown();
        pending.wait().unwrap();

        let conn = storage.open_database().unwrap();
        let loaded = AnnotationRepository::new(&conn).load_for_document("/a.pdf").unwrap();
        assert_eq!(loaded, pages());
    }

    #[test]
    fn test_recent_documents_through_worker() {
        let worker = PersistenceWorker::with_connection(open_in_memory().unwrap()).unwrap();
        worker.record_opened(RecentDocument::opened_now("/a.pdf", "a.pdf", 12)).wait().unwrap();
        assert!(worker.update_last_page("/a.pdf", 3).wait().unwrap());
        assert!(!worker.update_last_page("/b.pdf", 3).wait().unwrap());
    }
}
