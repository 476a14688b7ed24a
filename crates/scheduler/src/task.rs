//! Named background tasks
//!
//! A [`BackgroundTask`] runs a closure on its own thread with a
//! [`CancellationToken`]. Dropping the task cancels it without waiting.
//! [`RestartableTask`] keeps at most one live task and cancels the previous
//! one whenever it is restarted, which is what page prefetching and
//! search-as-you-type need.

use crate::CancellationToken;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to spawn task thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("task {0} panicked")]
    Panicked(String),
}

pub struct BackgroundTask {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Run `work` on a new named thread
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Result<Self, TaskError>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || work(task_token))?;
        debug!(task = %name, "background task started");

        Ok(Self { name, token, handle: Some(handle) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token observed by the task body
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Ask the task to stop; returns immediately
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task body to return
    pub fn join(mut self) -> Result<(), TaskError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| TaskError::Panicked(self.name.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}

/// Slot holding at most one live [`BackgroundTask`]
pub struct RestartableTask {
    name: String,
    current: Option<BackgroundTask>,
    generation: u64,
}

impl RestartableTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), current: None, generation: 0 }
    }

    /// Cancel the running task, if any, and start `work` in its place
    ///
    /// The old task is not joined; it observes its cancelled token and
    /// winds down on its own.
    pub fn restart<F>(&mut self, work: F)
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let name = format!("{}-{}", self.name, self.generation);
        match BackgroundTask::spawn(name, work) {
            Ok(task) => self.current = Some(task),
            Err(err) => warn!(task = %self.name, error = %err, "could not start background task"),
        }
    }

    /// Cancel the running task, if any
    pub fn cancel(&mut self) {
        if let Some(task) = self.current.take() {
            task.cancel();
        }
    }

    /// Number of times the task has been (re)started
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the current task, if any, to finish
    pub fn join(&mut self) -> Result<(), TaskError> {
        match self.current.take() {
            Some(task) => task.join(),
            None => Ok(()),
        }
    }
}
