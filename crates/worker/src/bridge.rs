use crate::config::{WorkerConfig, CHUNKER_CONFIG_ENV};
use crate::error::{BridgeError, Result};
use insight_protocol::{decode_response, serialize_json, FileOutcome, FileTask, Request, Response};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

enum Message {
    Call {
        request: Request,
        reply: oneshot::Sender<Result<Response>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the worker process.
///
/// Requests are queued to a single actor task that owns the child process and
/// handles them strictly one at a time in arrival order. Cloning the handle
/// shares the same queue.
#[derive(Clone)]
pub struct WorkerBridge {
    messages: mpsc::Sender<Message>,
}

impl WorkerBridge {
    /// Spawn the worker, verify it answers `ping`, and start the actor
    pub async fn start(config: WorkerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BridgeError::HealthCheck(format!("invalid worker config: {e}")))?;

        let (messages, queue) = mpsc::channel(config.queue_depth);
        let mut supervisor = Supervisor::new(config);
        supervisor.ensure_running().await?;
        tokio::spawn(supervisor.run(queue));

        Ok(Self { messages })
    }

    pub async fn ping(&self) -> Result<()> {
        match self.call(Request::Ping).await? {
            Response::Success { .. } => Ok(()),
            Response::Error { message } => Err(BridgeError::HealthCheck(message)),
        }
    }

    /// Restore and chunk one archived script
    pub async fn process(&self, task: FileTask) -> Result<FileOutcome> {
        let url = task.url.clone();
        let mut outcomes = self.process_batch(vec![task]).await?;
        let outcome = outcomes
            .pop()
            .ok_or_else(|| BridgeError::Protocol(format!("no result for {url}")))?;
        match outcome.error {
            Some(message) => Err(BridgeError::Resource { url, message }),
            None => Ok(outcome),
        }
    }

    /// Send several scripts as one request; per-file failures stay in the outcomes
    pub async fn process_batch(&self, files: Vec<FileTask>) -> Result<Vec<FileOutcome>> {
        let expected = files.len();
        match self.call(Request::Parse { files }).await? {
            Response::Success { results, .. } if results.len() == expected => Ok(results),
            Response::Success { results, .. } => Err(BridgeError::Protocol(format!(
                "expected {expected} results, got {}",
                results.len()
            ))),
            Response::Error { message } => Err(BridgeError::Rejected(message)),
        }
    }

    /// Stop the worker after queued requests ahead of this call are answered.
    /// Later calls on any clone fail with [`BridgeError::Shutdown`].
    pub async fn shutdown(&self) {
        let (done, stopped) = oneshot::channel();
        if self.messages.send(Message::Shutdown { done }).await.is_ok() {
            let _ = stopped.await;
        }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.messages
            .send(Message::Call { request, reply })
            .await
            .map_err(|_| BridgeError::Shutdown)?;
        response.await.map_err(|_| BridgeError::Shutdown)?
    }
}

/// A running worker process and its pipes
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let line = serialize_json(request).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        let closed = |e: std::io::Error| BridgeError::ChannelClosed(e.to_string());
        self.stdin.write_all(line.as_bytes()).await.map_err(closed)?;
        self.stdin.write_all(b"\n").await.map_err(closed)?;
        self.stdin.flush().await.map_err(closed)?;

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply).await {
            Ok(0) => Err(BridgeError::ChannelClosed("worker exited".to_string())),
            Ok(_) => decode_response(&reply).map_err(|e| BridgeError::Protocol(format!("{e:#}"))),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(BridgeError::Protocol(e.to_string()))
            }
            Err(e) => Err(closed(e)),
        }
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            log::debug!("Worker kill failed: {e}");
        }
    }

    async fn stop(self) {
        let WorkerProcess {
            mut child,
            stdin,
            stdout,
        } = self;
        drop(stdin);
        drop(stdout);
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => log::debug!("Worker exited with {status}"),
            Ok(Err(e)) => log::warn!("Worker wait failed: {e}"),
            Err(_) => {
                log::warn!("Worker ignored shutdown, killing");
                if let Err(e) = child.kill().await {
                    log::debug!("Worker kill failed: {e}");
                }
            }
        }
    }
}

/// Owns the worker process; restarts it when it dies or stops responding
struct Supervisor {
    config: WorkerConfig,
    process: Option<WorkerProcess>,
    spawns: u64,
}

impl Supervisor {
    fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            process: None,
            spawns: 0,
        }
    }

    async fn run(mut self, mut queue: mpsc::Receiver<Message>) {
        let mut done = None;
        while let Some(message) = queue.recv().await {
            match message {
                Message::Call { request, reply } => {
                    let result = self.handle(&request).await;
                    if reply.send(result).is_err() {
                        log::debug!("Bridge caller went away before the reply");
                    }
                }
                Message::Shutdown { done: ack } => {
                    done = Some(ack);
                    break;
                }
            }
        }
        queue.close();
        if let Some(process) = self.process.take() {
            process.stop().await;
        }
        log::debug!("Worker bridge stopped after {} spawns", self.spawns);
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn handle(&mut self, request: &Request) -> Result<Response> {
        self.ensure_running().await?;
        let timeout = self.config.request_timeout();
        let Some(process) = self.process.as_mut() else {
            return Err(BridgeError::ChannelClosed("worker not running".to_string()));
        };

        let result = match tokio::time::timeout(timeout, process.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(timeout)),
        };

        if let Err(e) = &result {
            if e.is_process_fatal() {
                log::warn!("Worker failed ({e}); it will be restarted");
                if let Some(process) = self.process.take() {
                    process.kill().await;
                }
            }
        }
        result
    }

    /// Make sure a healthy worker is running, spawning one if needed
    async fn ensure_running(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            match process.child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => log::warn!("Worker exited unexpectedly with {status}"),
                Err(e) => log::warn!("Worker status unknown: {e}"),
            }
            self.process = None;
        }

        let mut last_error = None;
        for attempt in 0..=self.config.max_restarts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 << attempt.min(5))).await;
            }
            match self.spawn().await {
                Ok(process) => {
                    self.process = Some(process);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("Worker start attempt {} failed: {e}", attempt + 1);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BridgeError::HealthCheck("worker never started".to_string())))
    }

    async fn spawn(&mut self) -> Result<WorkerProcess> {
        let program = self.config.program.display().to_string();
        let chunker = serde_json::to_string(&self.config.chunker)
            .map_err(|e| BridgeError::HealthCheck(format!("unencodable chunker config: {e}")))?;

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env(CHUNKER_CONFIG_ENV, chunker)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(BridgeError::HealthCheck("worker pipes unavailable".to_string()));
        };
        let mut process = WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let timeout = self.config.request_timeout();
        let pong = tokio::time::timeout(timeout, process.exchange(&Request::Ping)).await;
        match pong {
            Ok(Ok(Response::Success { .. })) => {
                if self.spawns == 0 {
                    log::info!("Worker started (pid {:?})", process.child.id());
                } else {
                    log::info!("Worker restarted (pid {:?})", process.child.id());
                }
                self.spawns += 1;
                Ok(process)
            }
            Ok(Ok(Response::Error { message })) => {
                process.kill().await;
                Err(BridgeError::HealthCheck(message))
            }
            Ok(Err(e)) => {
                process.kill().await;
                Err(BridgeError::HealthCheck(e.to_string()))
            }
            Err(_) => {
                process.kill().await;
                Err(BridgeError::HealthCheck(format!(
                    "no pong from {program} within {timeout:?}"
                )))
            }
        }
    }
}
