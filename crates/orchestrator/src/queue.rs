use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{OrchestratorError, Result};

#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    async fn handle(&self, job: T) -> Result<()>;
}

enum QueueMessage<T> {
    Job(T),
    Shutdown,
}

enum WorkerState<T> {
    Idle(mpsc::UnboundedReceiver<QueueMessage<T>>),
    Running(JoinHandle<mpsc::UnboundedReceiver<QueueMessage<T>>>),
    Stopped,
}

/// FIFO queue drained by a single background worker.
///
/// Each job runs in its own task, so a failing or panicking job is logged
/// and the worker moves on to the next one.
pub struct JobQueue<T> {
    sender: mpsc::UnboundedSender<QueueMessage<T>>,
    handler: Arc<dyn JobHandler<T>>,
    state: Mutex<WorkerState<T>>,
}

impl<T: Send + 'static> JobQueue<T> {
    pub fn new(handler: Arc<dyn JobHandler<T>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            handler,
            state: Mutex::new(WorkerState::Idle(receiver)),
        }
    }

    /// Spawns the worker. Calling it while the worker runs does nothing.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        let receiver = match std::mem::replace(&mut *state, WorkerState::Stopped) {
            WorkerState::Idle(receiver) => receiver,
            other => {
                *state = other;
                return;
            }
        };

        let handler = self.handler.clone();
        *state = WorkerState::Running(tokio::spawn(run_worker(receiver, handler)));
        info!("Job queue worker started");
    }

    pub fn enqueue(&self, job: T) -> Result<()> {
        self.sender
            .send(QueueMessage::Job(job))
            .map_err(|_| OrchestratorError::QueueClosed)
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, WorkerState::Running(handle) if !handle.is_finished())
    }

    /// Lets the worker finish the jobs queued before this call, then waits
    /// for it to exit. The queue can be started again afterwards.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let handle = match std::mem::replace(&mut *state, WorkerState::Stopped) {
            WorkerState::Running(handle) => handle,
            other => {
                *state = other;
                return;
            }
        };

        if self.sender.send(QueueMessage::Shutdown).is_err() {
            warn!("Job queue channel closed before shutdown");
        }

        match handle.await {
            Ok(receiver) => *state = WorkerState::Idle(receiver),
            Err(e) => error!(error = %e, "Job queue worker did not exit cleanly"),
        }
        info!("Job queue worker stopped");
    }
}

async fn run_worker<T: Send + 'static>(
    mut receiver: mpsc::UnboundedReceiver<QueueMessage<T>>,
    handler: Arc<dyn JobHandler<T>>,
) -> mpsc::UnboundedReceiver<QueueMessage<T>> {
    while let Some(message) = receiver.recv().await {
        let job = match message {
            QueueMessage::Job(job) => job,
            QueueMessage::Shutdown => break,
        };

        let handler = handler.clone();
        match tokio::spawn(async move { handler.handle(job).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Queued job failed"),
            Err(e) => error!(error = %e, "Queued job panicked"),
        }
    }
    receiver
}
