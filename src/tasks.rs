//! Background ingestion tasks and their status records.
//!
//! [`TaskRegistry::submit`] spawns a job on the tokio runtime and returns its id at once. Each
//! record lives in a `watch` channel: the job publishes through its [`TaskReporter`], request
//! handlers read the latest value, and tests can await completion via [`TaskRegistry::subscribe`].
//! Records still processing are never evicted; finished ones are dropped oldest first once
//! more than the history limit have accumulated.

use crate::processing::{IngestionObserver, IngestionStage};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Work is still running.
    Processing,
    /// Work finished successfully.
    Completed,
    /// Work stopped with an error.
    Failed,
}

/// Status record returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    /// Current state.
    pub status: TaskState,
    /// Human-readable progress line.
    pub message: String,
    /// Completion percentage, 0 to 100.
    pub progress: u8,
    /// Collection the task writes into.
    pub collection_name: String,
}

impl TaskStatus {
    fn started(collection: &str) -> Self {
        Self {
            status: TaskState::Processing,
            message: IngestionStage::Received.message().to_string(),
            progress: IngestionStage::Received.progress(),
            collection_name: collection.to_string(),
        }
    }

    /// Whether the task has reached `completed` or `failed`.
    pub fn is_finished(&self) -> bool {
        self.status != TaskState::Processing
    }
}

type StatusSender = Arc<watch::Sender<TaskStatus>>;

/// Handle given to a running job for publishing progress.
#[derive(Clone)]
pub struct TaskReporter {
    sender: StatusSender,
}

impl IngestionObserver for TaskReporter {
    fn on_progress(&self, stage: IngestionStage, progress: u8, message: &str) {
        // Terminal states come from the job result in `TaskRegistry::finish`.
        if matches!(stage, IngestionStage::Completed | IngestionStage::Failed) {
            return;
        }
        self.sender.send_modify(|status| {
            if status.is_finished() {
                return;
            }
            status.progress = progress.min(100);
            status.message = message.to_string();
        });
    }
}

struct RegistryInner {
    tasks: HashMap<String, StatusSender>,
    finished: VecDeque<String>,
    history_limit: usize,
}

/// Shared map from task id to status channel.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl TaskRegistry {
    /// Create a registry retaining at most `history_limit` finished records.
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                tasks: HashMap::new(),
                finished: VecDeque::new(),
                history_limit: history_limit.max(1),
            })),
        }
    }

    /// Spawn `job` for `collection` and return the new task id.
    ///
    /// `Ok(message)` marks the task completed at 100%, `Err(message)` marks it failed at 0%. A
    /// panicking job is recorded as failed.
    pub fn submit<F, Fut>(&self, collection: &str, job: F) -> String
    where
        F: FnOnce(TaskReporter) -> Fut,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let task_id = Uuid::new_v4().to_string();
        let (sender, _) = watch::channel(TaskStatus::started(collection));
        let sender: StatusSender = Arc::new(sender);
        self.lock().tasks.insert(task_id.clone(), sender.clone());
        tracing::debug!(task_id = %task_id, collection, "Task submitted");

        let work = tokio::spawn(job(TaskReporter {
            sender: sender.clone(),
        }));
        let registry = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let result = match work.await {
                Ok(result) => result,
                Err(error) => Err(format!("Ingestion worker failed: {error}")),
            };
            registry.finish(&id, &sender, result);
        });

        task_id
    }

    /// Latest status of `task_id`, if the record exists.
    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.lock()
            .tasks
            .get(task_id)
            .map(|sender| sender.borrow().clone())
    }

    /// Receiver that observes every update of `task_id`.
    pub fn subscribe(&self, task_id: &str) -> Option<watch::Receiver<TaskStatus>> {
        self.lock().tasks.get(task_id).map(|sender| sender.subscribe())
    }

    /// Wait until `task_id` finishes and return its final status.
    pub async fn wait(&self, task_id: &str) -> Option<TaskStatus> {
        let mut receiver = self.subscribe(task_id)?;
        let finished = receiver
            .wait_for(TaskStatus::is_finished)
            .await
            .map(|status| status.clone());
        Some(finished.unwrap_or_else(|_| receiver.borrow().clone()))
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, task_id: &str, sender: &StatusSender, result: Result<String, String>) {
        {
            let mut inner = self.lock();
            inner.finished.push_back(task_id.to_string());
            while inner.finished.len() > inner.history_limit {
                if let Some(oldest) = inner.finished.pop_front() {
                    inner.tasks.remove(&oldest);
                    tracing::debug!(task_id = %oldest, "Evicted finished task record");
                }
            }
        }

        tracing::info!(task_id, ok = result.is_ok(), "Task finished");
        sender.send_modify(|status| match result {
            Ok(message) => {
                status.status = TaskState::Completed;
                status.progress = IngestionStage::Completed.progress();
                status.message = message;
            }
            Err(message) => {
                status.status = TaskState::Failed;
                status.progress = IngestionStage::Failed.progress();
                status.message = message;
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
