//! # Lifecycle Supervisor
//!
//! Starts every registered task with a clone of one [`CancellationToken`] and
//! supervises them until all have stopped.
//!
//! ## Shutdown
//!
//! The token is cancelled by the first of: a shutdown signal, an external call
//! to [`CancellationToken::cancel`], or any task failing or panicking. Once
//! cancelled:
//!
//! 1. Server tasks get the grace period to finish in-flight requests. A server
//!    still running at the deadline is aborted and reported as
//!    [`LifecycleError::ShutdownTimeout`].
//! 2. Worker tasks are always awaited to completion.
//!
//! [`Lifecycle::run`] returns the first error recorded, if any.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::signals::wait_for_shutdown_signal;
use crate::logging::log_task_lifecycle;
use super::LifecycleError;

type StartFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), String>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    /// Bounded by the shutdown grace period
    Server,
    /// Awaited without a deadline
    Worker,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            TaskKind::Server => "server",
            TaskKind::Worker => "worker",
        }
    }
}

struct TaskSpec {
    name: String,
    kind: TaskKind,
    start: StartFn,
}

struct RunningTask {
    name: String,
    kind: TaskKind,
    watcher: JoinHandle<()>,
    abort: AbortHandle,
}

/// First error wins; later ones are only logged
#[derive(Clone, Default)]
struct FirstError(Arc<Mutex<Option<LifecycleError>>>);

impl FirstError {
    fn record(&self, err: LifecycleError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            warn!(error = %err, "Additional task error after shutdown started");
        }
    }

    fn take(&self) -> Option<LifecycleError> {
        self.0.lock().take()
    }
}

/// Builder and supervisor for the application's long-running tasks
pub struct Lifecycle {
    name: String,
    grace: Duration,
    token: CancellationToken,
    handle_signals: bool,
    tasks: Vec<TaskSpec>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>, grace: Duration) -> Self {
        Self {
            name: name.into(),
            grace,
            token: CancellationToken::new(),
            handle_signals: true,
            tasks: Vec::new(),
        }
    }

    /// Token shared by every task; cancelling it starts the shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Do not install process signal handlers
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Register a task bounded by the shutdown grace period
    pub fn with_server<F, Fut, E>(self, name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.with_task(name.into(), TaskKind::Server, start)
    }

    /// Register a task that is always awaited to completion
    pub fn with_worker<F, Fut, E>(self, name: impl Into<String>, start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.with_task(name.into(), TaskKind::Worker, start)
    }

    fn with_task<F, Fut, E>(mut self, name: String, kind: TaskKind, start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let start: StartFn = Box::new(move |token| {
            start(token)
                .map(|result| result.map_err(|e| e.to_string()))
                .boxed()
        });
        self.tasks.push(TaskSpec { name, kind, start });
        self
    }

    /// Run every task until shutdown completes
    pub async fn run(self) -> Result<(), LifecycleError> {
        let Self {
            name,
            grace,
            token,
            handle_signals,
            tasks,
        } = self;

        info!(app = %name, tasks = tasks.len(), "Starting application lifecycle");

        let first_error = FirstError::default();
        let signal_task = handle_signals.then(|| spawn_signal_listener(token.clone()));

        let running: Vec<RunningTask> = tasks
            .into_iter()
            .map(|registered| spawn_supervised(registered, token.clone(), first_error.clone()))
            .collect();

        token.cancelled().await;
        info!(app = %name, "Shutdown started");

        let deadline = Instant::now() + grace;
        let (servers, workers): (Vec<_>, Vec<_>) = running
            .into_iter()
            .partition(|task| task.kind == TaskKind::Server);

        for mut server in servers {
            if tokio::time::timeout_at(deadline, &mut server.watcher)
                .await
                .is_err()
            {
                let err = LifecycleError::ShutdownTimeout {
                    task: server.name.clone(),
                    grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                };
                error!(task = %server.name, error = %err, "Server did not stop in time; aborting");
                server.abort.abort();
                first_error.record(err);
                let _ = server.watcher.await;
            }
        }

        for worker in workers {
            let _ = worker.watcher.await;
            log_task_lifecycle(&worker.name, "stopped", None);
        }

        if let Some(handle) = signal_task {
            handle.abort();
        }

        match first_error.take() {
            Some(err) => {
                error!(app = %name, error = %err, "Application stopped with error");
                Err(err)
            }
            None => {
                info!(app = %name, "Application stopped cleanly");
                Ok(())
            }
        }
    }
}

fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            result = wait_for_shutdown_signal() => match result {
                Ok(signal) => {
                    info!(%signal, "Shutdown signal received");
                    token.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to install signal handlers; shutdown only via token");
                }
            },
        }
    })
}

/// Spawn the task and a watcher that records its failure and cancels siblings
fn spawn_supervised(registered: TaskSpec, token: CancellationToken, errors: FirstError) -> RunningTask {
    let TaskSpec { name, kind, start } = registered;

    let task = tokio::spawn((start)(token.clone()));
    let abort = task.abort_handle();

    let task_name = name.clone();
    let watcher = tokio::spawn(async move {
        let failure = match task.await {
            Ok(Ok(())) => {
                if !token.is_cancelled() {
                    warn!(task = %task_name, "Task finished before shutdown was requested");
                }
                None
            }
            Ok(Err(message)) => Some(LifecycleError::task_failed(&task_name, message)),
            Err(join_err) if join_err.is_panic() => Some(LifecycleError::TaskPanicked {
                task: task_name.clone(),
            }),
            // Aborted after the grace period; the timeout is already recorded
            Err(_) => None,
        };

        if let Some(err) = failure {
            error!(task = %task_name, error = %err, "Task failed; cancelling application");
            errors.record(err);
            token.cancel();
        }
    });

    log_task_lifecycle(&name, "started", Some(kind.as_str()));
    RunningTask {
        name,
        kind,
        watcher,
        abort,
    }
}
