use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use super::*;

/// How a scripted worker behaves once spawned.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    /// Ready, heartbeats, echoes job input back as output.
    Echo,
    /// Ready, then goes completely silent.
    SilentAfterReady,
    /// Never sends anything.
    NeverReady,
    /// Ready, heartbeats, rejects every job with an error message.
    FailJobs,
    /// Ready, heartbeats, but never answers jobs.
    HangWithHeartbeat,
    /// Ready, heartbeats, answers one job, then its process exits while
    /// the message channel stays open.
    EchoThenExit,
}

struct ScriptedBackend {
    behaviors: Mutex<Vec<Behavior>>,
    spawned: AtomicUsize,
}

impl ScriptedBackend {
    fn new(behaviors: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(behaviors),
            spawned: AtomicUsize::new(0),
        })
    }

    fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerBackend for ScriptedBackend {
    async fn create_worker(
        &self,
        _limits: &WorkerLimits,
    ) -> Result<(Box<dyn WorkerHandle>, mpsc::Receiver<WorkerMessage>), SandboxError> {
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let behaviors = self.behaviors.lock().unwrap();
            behaviors.get(index).copied().unwrap_or(Behavior::Echo)
        };

        let (msg_tx, msg_rx) = mpsc::channel(64);
        let (job_tx, job_rx) = mpsc::channel(64);
        let active = Arc::new(AtomicBool::new(true));
        tokio::spawn(simulate(behavior, job_rx, msg_tx, active.clone()));

        let handle = ScriptedHandle {
            id: format!("scripted-{}", index),
            job_tx: Some(job_tx),
            active,
        };
        Ok((Box::new(handle), msg_rx))
    }
}

async fn simulate(
    behavior: Behavior,
    mut job_rx: mpsc::Receiver<ManagerMessage>,
    msg_tx: mpsc::Sender<WorkerMessage>,
    active: Arc<AtomicBool>,
) {
    match behavior {
        Behavior::NeverReady | Behavior::SilentAfterReady => {
            if behavior == Behavior::SilentAfterReady {
                let _ = msg_tx.send(WorkerMessage::Ready).await;
            }
            // Swallow everything until the handle is torn down
            while job_rx.recv().await.is_some() {}
        }
        Behavior::Echo
        | Behavior::FailJobs
        | Behavior::HangWithHeartbeat
        | Behavior::EchoThenExit => {
            let _ = msg_tx.send(WorkerMessage::Ready).await;
            let mut heartbeat = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        if msg_tx.send(WorkerMessage::Heartbeat).await.is_err() {
                            break;
                        }
                    }
                    msg = job_rx.recv() => match msg {
                        Some(ManagerMessage::Job { input, .. }) => {
                            let response = match behavior {
                                Behavior::Echo => Some(WorkerMessage::Output { output: input }),
                                Behavior::EchoThenExit => {
                                    active.store(false, Ordering::SeqCst);
                                    Some(WorkerMessage::Output { output: input })
                                }
                                Behavior::FailJobs => Some(WorkerMessage::Error {
                                    error: "scripted failure".into(),
                                }),
                                Behavior::HangWithHeartbeat => None,
                                _ => unreachable!(),
                            };
                            if let Some(response) = response {
                                let _ = msg_tx.send(response).await;
                            }
                        }
                        Some(ManagerMessage::Shutdown) | None => break,
                    }
                }
            }
        }
    }
}

struct ScriptedHandle {
    id: String,
    job_tx: Option<mpsc::Sender<ManagerMessage>>,
    active: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerHandle for ScriptedHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn send_message(&mut self, message: &ManagerMessage) -> Result<(), SandboxError> {
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| SandboxError::Protocol("worker already terminated".into()))?;
        tx.send(message.clone())
            .await
            .map_err(|_| SandboxError::Protocol("worker gone".into()))
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<(), SandboxError> {
        self.active.store(false, Ordering::SeqCst);
        // Dropping the job channel stops the simulated worker
        self.job_tx = None;
        Ok(())
    }
}

fn test_config() -> SandboxConfig {
    SandboxConfig {
        job_timeout_ms: 60_000,
        ready_timeout_ms: 2_000,
        heartbeat_check_ms: 1_000,
        heartbeat_timeout_ms: 5_000,
        idle_timeout_ms: 30_000,
        termination_grace_ms: 100,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_language_rejects_immediately() {
    let backend = ScriptedBackend::new(vec![]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    let before = manager.queue_len();
    let err = manager
        .run_user_code(SandboxJob::new("print(1)", "cobol", json!(null)))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Unsupported code language: cobol");
    assert_eq!(manager.queue_len(), before);
    assert_eq!(backend.spawn_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_echo_job_round_trip() {
    let backend = ScriptedBackend::new(vec![Behavior::Echo]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    let output = manager
        .run_user_code(SandboxJob::new("input", "javascript", json!({"x": 1})))
        .await
        .unwrap();

    assert_eq!(output, json!({"x": 1}));
    assert_eq!(backend.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_output_decoded_through_codec() {
    let backend = ScriptedBackend::new(vec![Behavior::Echo]);
    let manager = SandboxManager::new(test_config(), backend);

    let output = manager
        .run_user_code(SandboxJob::new(
            "input",
            "javascript",
            json!({"$type": "map", "value": [["k", 7]]}),
        ))
        .await
        .unwrap();

    assert_eq!(output, json!({"k": 7}));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_miss_triggers_one_recovery_cycle() {
    let backend = ScriptedBackend::new(vec![Behavior::SilentAfterReady, Behavior::Echo]);
    let manager = Arc::new(SandboxManager::new(test_config(), backend.clone()));

    let m1 = manager.clone();
    let first = tokio::spawn(async move {
        m1.run_user_code(SandboxJob::new("first", "javascript", json!(1)))
            .await
    });
    // Make sure the first job is queued ahead of the second
    tokio::time::sleep(Duration::from_millis(10)).await;
    let m2 = manager.clone();
    let second = tokio::spawn(async move {
        m2.run_user_code(SandboxJob::new("second", "javascript", json!(2)))
            .await
    });

    let first_err = first.await.unwrap().unwrap_err();
    assert_eq!(first_err.to_string(), "Worker crashed or became unresponsive");

    // The next queued job is served by a fresh worker
    let second_out = second.await.unwrap().unwrap();
    assert_eq!(second_out, json!(2));
    assert_eq!(backend.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_job_error_does_not_restart_worker() {
    let backend = ScriptedBackend::new(vec![Behavior::FailJobs]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    for _ in 0..2 {
        let err = manager
            .run_user_code(SandboxJob::new("boom", "javascript", json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Execution(ref m) if m == "scripted failure"));
    }
    // Both jobs went to the same worker
    assert_eq!(backend.spawn_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_rejects_head_job() {
    let backend = ScriptedBackend::new(vec![Behavior::NeverReady, Behavior::Echo]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    let err = manager
        .run_user_code(SandboxJob::new("first", "javascript", json!(null)))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ReadyTimeout(2000)));

    // Manager returns to inactive and can serve later jobs
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.status(), WorkerStatus::Inactive);

    let output = manager
        .run_user_code(SandboxJob::new("second", "javascript", json!("ok")))
        .await
        .unwrap();
    assert_eq!(output, json!("ok"));
    assert_eq!(backend.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_job_timeout_rejects_and_restarts() {
    let backend = ScriptedBackend::new(vec![Behavior::HangWithHeartbeat, Behavior::Echo]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    let err = manager
        .run_user_code(
            SandboxJob::new("hang", "javascript", json!(null))
                .with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::JobTimeout(2000)));

    let output = manager
        .run_user_code(SandboxJob::new("next", "javascript", json!("ok")))
        .await
        .unwrap();
    assert_eq!(output, json!("ok"));
    assert_eq!(backend.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dead_handle_rejected_before_dispatch() {
    let backend = ScriptedBackend::new(vec![Behavior::EchoThenExit, Behavior::Echo]);
    let manager = SandboxManager::new(test_config(), backend.clone());

    let output = manager
        .run_user_code(SandboxJob::new("one", "javascript", json!(1)))
        .await
        .unwrap();
    assert_eq!(output, json!(1));

    // The worker process exited but its channel still heartbeats, so
    // only the handle liveness check can catch it
    let err = manager
        .run_user_code(SandboxJob::new("two", "javascript", json!(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::WorkerCrashed));

    let output = manager
        .run_user_code(SandboxJob::new("three", "javascript", json!(3)))
        .await
        .unwrap();
    assert_eq!(output, json!(3));
    assert_eq!(backend.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_releases_worker_without_restart() {
    let config = SandboxConfig {
        idle_timeout_ms: 3_000,
        ..test_config()
    };
    let backend = ScriptedBackend::new(vec![Behavior::Echo, Behavior::Echo]);
    let manager = SandboxManager::new(config, backend.clone());

    manager
        .run_user_code(SandboxJob::new("one", "javascript", json!(1)))
        .await
        .unwrap();

    // Queue is empty; the idle timeout tears the worker down
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(manager.status(), WorkerStatus::Inactive);
    assert_eq!(backend.spawn_count(), 1);

    // A later job spawns a fresh worker
    manager
        .run_user_code(SandboxJob::new("two", "javascript", json!(2)))
        .await
        .unwrap();
    assert_eq!(backend.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_pending_jobs() {
    let backend = ScriptedBackend::new(vec![Behavior::HangWithHeartbeat]);
    let manager = Arc::new(SandboxManager::new(test_config(), backend));

    let m = manager.clone();
    let job = tokio::spawn(async move {
        m.run_user_code(SandboxJob::new("hang", "javascript", json!(null)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown();

    let err = job.await.unwrap().unwrap_err();
    assert!(matches!(err, SandboxError::ShuttingDown));
}
