//! The sandbox manager - owns one worker process and a FIFO job queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::job::SandboxJob;
use crate::protocol::{ManagerMessage, WorkerMessage};
use crate::worker::{WorkerBackend, WorkerHandle, WorkerLimits, WorkerStatus};

struct PendingJob {
    job: SandboxJob,
    respond: oneshot::Sender<Result<Value, SandboxError>>,
}

enum Command {
    Submit(PendingJob),
    Shutdown,
}

/// Manager for one isolated worker and its job queue.
///
/// Strict one-worker/one-job semantics: horizontal concurrency comes
/// from running multiple manager instances, not from multiplexing one.
pub struct SandboxManager {
    config: SandboxConfig,
    cmd_tx: mpsc::UnboundedSender<Command>,
    queue_depth: Arc<AtomicUsize>,
    status_rx: watch::Receiver<WorkerStatus>,
}

impl SandboxManager {
    /// Create a manager and start its driver task.
    pub fn new(config: SandboxConfig, backend: Arc<dyn WorkerBackend>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::Inactive);
        let queue_depth = Arc::new(AtomicUsize::new(0));

        let driver = Driver {
            config: config.clone(),
            backend,
            cmd_rx,
            queue: VecDeque::new(),
            queue_depth: queue_depth.clone(),
            status_tx,
            restarts: 0,
        };
        tokio::spawn(driver.run());

        Self {
            config,
            cmd_tx,
            queue_depth,
            status_rx,
        }
    }

    /// Run a job in the sandbox, returning its decoded output.
    ///
    /// Fails immediately, without touching the queue, when the job's
    /// language is not supported. Otherwise the job is queued FIFO and
    /// a worker is started if none is active.
    pub async fn run_user_code(&self, job: SandboxJob) -> Result<Value, SandboxError> {
        if !self.config.supports_language(&job.language) {
            return Err(SandboxError::UnsupportedLanguage(job.language));
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Submit(PendingJob { job, respond: tx }))
            .map_err(|_| SandboxError::ShuttingDown)?;
        rx.await.map_err(|_| SandboxError::ShuttingDown)?
    }

    /// Number of jobs queued but not yet dispatched.
    pub fn queue_len(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    /// Current manager status.
    pub fn status(&self) -> WorkerStatus {
        *self.status_rx.borrow()
    }

    /// Ask the driver to shut down; queued and in-flight jobs are
    /// rejected.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

struct WorkerSession {
    handle: Box<dyn WorkerHandle>,
    rx: mpsc::Receiver<WorkerMessage>,
    last_heartbeat: Instant,
}

enum ServeExit {
    /// Worker crashed, timed out, or was lost; restart if jobs remain.
    Crashed,
    /// Idle timeout released the worker; no restart.
    IdleStop,
    /// Manager shutdown requested.
    Shutdown,
}

enum IdlePhase {
    JobArrived,
    Exit(ServeExit),
}

enum ProcessPhase {
    Done,
    Exit(ServeExit),
}

struct Driver {
    config: SandboxConfig,
    backend: Arc<dyn WorkerBackend>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    queue: VecDeque<PendingJob>,
    queue_depth: Arc<AtomicUsize>,
    status_tx: watch::Sender<WorkerStatus>,
    restarts: u32,
}

impl Driver {
    async fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                self.set_status(WorkerStatus::Inactive);
                match self.cmd_rx.recv().await {
                    Some(Command::Submit(pending)) => self.enqueue(pending),
                    Some(Command::Shutdown) | None => {
                        self.drain_queue();
                        return;
                    }
                }
                continue;
            }

            if self.config.max_restarts > 0 && self.restarts >= self.config.max_restarts {
                error!(
                    restarts = self.restarts,
                    "worker restart limit reached, rejecting queued jobs"
                );
                while let Some(pending) = self.pop_job() {
                    let _ = pending.respond.send(Err(SandboxError::RestartLimit));
                }
                self.restarts = 0;
                continue;
            }

            self.set_status(WorkerStatus::Starting);
            let session = match self.start_worker().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "worker startup failed");
                    if let Some(pending) = self.pop_job() {
                        let _ = pending.respond.send(Err(e));
                    }
                    self.restarts += 1;
                    continue;
                }
            };

            match self.serve(session).await {
                ServeExit::Shutdown => {
                    self.drain_queue();
                    self.set_status(WorkerStatus::Inactive);
                    return;
                }
                ServeExit::Crashed => {
                    self.restarts += 1;
                    // Loop restarts the worker if jobs remain queued
                }
                ServeExit::IdleStop => {}
            }
        }
    }

    async fn start_worker(&mut self) -> Result<WorkerSession, SandboxError> {
        let limits = WorkerLimits {
            memory_mb: self.config.memory_limit_mb,
            job_timeout: self.config.job_timeout(),
        };
        let (mut handle, mut rx) = self.backend.create_worker(&limits).await?;
        info!(worker_id = handle.id(), "worker spawned");

        let ready_deadline = tokio::time::sleep(self.config.ready_timeout());
        tokio::pin!(ready_deadline);
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(WorkerMessage::Ready) => break,
                    Some(WorkerMessage::Heartbeat) => {}
                    Some(WorkerMessage::Log { log }) => {
                        debug!(worker_id = handle.id(), %log, "worker log");
                    }
                    Some(WorkerMessage::Error { error }) => {
                        self.set_status(WorkerStatus::Terminating);
                        let _ = handle.terminate(self.config.termination_grace()).await;
                        return Err(SandboxError::StartFailed(error));
                    }
                    Some(WorkerMessage::Output { .. }) => {
                        debug!(worker_id = handle.id(), "ignoring output before ready");
                    }
                    None => {
                        self.set_status(WorkerStatus::Terminating);
                        let _ = handle.terminate(self.config.termination_grace()).await;
                        return Err(SandboxError::StartFailed(
                            "worker exited during startup".into(),
                        ));
                    }
                },
                _ = &mut ready_deadline => {
                    warn!(worker_id = handle.id(), "worker missed ready deadline");
                    self.set_status(WorkerStatus::Terminating);
                    let _ = handle.terminate(self.config.termination_grace()).await;
                    return Err(SandboxError::ReadyTimeout(self.config.ready_timeout_ms));
                }
            }
        }

        Ok(WorkerSession {
            handle,
            rx,
            last_heartbeat: Instant::now(),
        })
    }

    async fn serve(&mut self, mut session: WorkerSession) -> ServeExit {
        let mut heartbeat_check = tokio::time::interval(self.config.heartbeat_check());
        heartbeat_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let Some(pending) = self.pop_job() else {
                match self.idle(&mut session, &mut heartbeat_check).await {
                    IdlePhase::JobArrived => continue,
                    IdlePhase::Exit(exit) => return exit,
                }
            };
            match self
                .process(&mut session, &mut heartbeat_check, pending)
                .await
            {
                ProcessPhase::Done => continue,
                ProcessPhase::Exit(exit) => return exit,
            }
        }
    }

    /// Wait for work with the worker alive. Heartbeats are still
    /// monitored; the idle timeout tears the worker down for good.
    async fn idle(
        &mut self,
        session: &mut WorkerSession,
        heartbeat_check: &mut tokio::time::Interval,
    ) -> IdlePhase {
        self.set_status(WorkerStatus::Idle);
        let idle_deadline = tokio::time::sleep(self.config.idle_timeout());
        tokio::pin!(idle_deadline);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Submit(pending)) => {
                        self.enqueue(pending);
                        return IdlePhase::JobArrived;
                    }
                    Some(Command::Shutdown) | None => {
                        self.terminate(session).await;
                        return IdlePhase::Exit(ServeExit::Shutdown);
                    }
                },
                msg = session.rx.recv() => match msg {
                    Some(WorkerMessage::Heartbeat | WorkerMessage::Ready) => {
                        session.last_heartbeat = Instant::now();
                    }
                    Some(WorkerMessage::Log { log }) => {
                        debug!(worker_id = session.handle.id(), %log, "worker log");
                    }
                    Some(other) => {
                        debug!(worker_id = session.handle.id(), message = ?other,
                            "ignoring unexpected message while idle");
                    }
                    None => {
                        warn!(worker_id = session.handle.id(), "worker lost while idle");
                        self.terminate(session).await;
                        return IdlePhase::Exit(ServeExit::Crashed);
                    }
                },
                _ = heartbeat_check.tick() => {
                    if session.last_heartbeat.elapsed() > self.config.heartbeat_timeout() {
                        warn!(worker_id = session.handle.id(), "heartbeat missed while idle");
                        self.terminate(session).await;
                        return IdlePhase::Exit(ServeExit::Crashed);
                    }
                },
                _ = &mut idle_deadline => {
                    debug!(worker_id = session.handle.id(), "idle timeout, releasing worker");
                    self.terminate(session).await;
                    return IdlePhase::Exit(ServeExit::IdleStop);
                }
            }
        }
    }

    /// Dispatch one job and wait for its outcome under the job deadline
    /// and heartbeat monitoring.
    async fn process(
        &mut self,
        session: &mut WorkerSession,
        heartbeat_check: &mut tokio::time::Interval,
        pending: PendingJob,
    ) -> ProcessPhase {
        self.set_status(WorkerStatus::Processing);
        let PendingJob { job, respond } = pending;
        let mut respond = Some(respond);

        if !session.handle.is_active() {
            warn!(worker_id = session.handle.id(), job_id = %job.id,
                "worker exited between jobs");
            if let Some(tx) = respond.take() {
                let _ = tx.send(Err(SandboxError::WorkerCrashed));
            }
            self.terminate(session).await;
            return ProcessPhase::Exit(ServeExit::Crashed);
        }

        info!(
            worker_id = session.handle.id(),
            job_id = %job.id,
            language = %job.language,
            "dispatching job"
        );

        let message = ManagerMessage::Job {
            id: job.id,
            code: job.code.clone(),
            language: job.language.clone(),
            input: job.input.clone(),
        };
        if let Err(e) = session.handle.send_message(&message).await {
            warn!(error = %e, "failed to send job to worker");
            if let Some(tx) = respond.take() {
                let _ = tx.send(Err(SandboxError::WorkerCrashed));
            }
            self.terminate(session).await;
            return ProcessPhase::Exit(ServeExit::Crashed);
        }

        let timeout = job.timeout.unwrap_or_else(|| self.config.job_timeout());
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                msg = session.rx.recv() => match msg {
                    Some(WorkerMessage::Ready | WorkerMessage::Heartbeat) => {
                        session.last_heartbeat = Instant::now();
                    }
                    Some(WorkerMessage::Log { log }) => {
                        debug!(worker_id = session.handle.id(), job_id = %job.id, %log, "worker log");
                    }
                    Some(WorkerMessage::Output { output }) => {
                        session.last_heartbeat = Instant::now();
                        debug!(job_id = %job.id, "job completed");
                        self.restarts = 0;
                        if let Some(tx) = respond.take() {
                            let _ = tx.send(Ok(codec::decode(output)));
                        }
                        return ProcessPhase::Done;
                    }
                    Some(WorkerMessage::Error { error }) => {
                        session.last_heartbeat = Instant::now();
                        debug!(job_id = %job.id, %error, "job failed in worker");
                        if let Some(tx) = respond.take() {
                            let _ = tx.send(Err(SandboxError::Execution(error)));
                        }
                        return ProcessPhase::Done;
                    }
                    None => {
                        warn!(worker_id = session.handle.id(), job_id = %job.id,
                            "worker lost mid-job");
                        if let Some(tx) = respond.take() {
                            let _ = tx.send(Err(SandboxError::WorkerCrashed));
                        }
                        self.terminate(session).await;
                        return ProcessPhase::Exit(ServeExit::Crashed);
                    }
                },
                _ = heartbeat_check.tick() => {
                    if session.last_heartbeat.elapsed() > self.config.heartbeat_timeout() {
                        warn!(worker_id = session.handle.id(), job_id = %job.id,
                            "heartbeat missed mid-job");
                        if let Some(tx) = respond.take() {
                            let _ = tx.send(Err(SandboxError::WorkerCrashed));
                        }
                        self.terminate(session).await;
                        return ProcessPhase::Exit(ServeExit::Crashed);
                    }
                },
                _ = &mut deadline => {
                    warn!(job_id = %job.id, timeout_ms = timeout.as_millis() as u64,
                        "job deadline expired");
                    if let Some(tx) = respond.take() {
                        let _ = tx.send(Err(SandboxError::JobTimeout(timeout.as_millis() as u64)));
                    }
                    self.terminate(session).await;
                    return ProcessPhase::Exit(ServeExit::Crashed);
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Submit(queued)) => self.enqueue(queued),
                    Some(Command::Shutdown) | None => {
                        if let Some(tx) = respond.take() {
                            let _ = tx.send(Err(SandboxError::ShuttingDown));
                        }
                        self.terminate(session).await;
                        return ProcessPhase::Exit(ServeExit::Shutdown);
                    }
                },
            }
        }
    }

    async fn terminate(&mut self, session: &mut WorkerSession) {
        self.set_status(WorkerStatus::Terminating);
        if let Err(e) = session.handle.terminate(self.config.termination_grace()).await {
            warn!(worker_id = session.handle.id(), error = %e, "worker termination failed");
        }
    }

    fn enqueue(&mut self, pending: PendingJob) {
        self.queue.push_back(pending);
        self.queue_depth.store(self.queue.len(), Ordering::SeqCst);
    }

    fn pop_job(&mut self) -> Option<PendingJob> {
        let pending = self.queue.pop_front();
        self.queue_depth.store(self.queue.len(), Ordering::SeqCst);
        pending
    }

    fn drain_queue(&mut self) {
        while let Some(pending) = self.pop_job() {
            let _ = pending.respond.send(Err(SandboxError::ShuttingDown));
        }
    }

    fn set_status(&self, status: WorkerStatus) {
        let _ = self.status_tx.send(status);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
