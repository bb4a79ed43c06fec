//! Child worker process transport
//!
//! Owns the worker process, frames newline-delimited JSON-RPC over its
//! stdio, correlates out-of-order responses by id, retries timed-out
//! requests within a per-request budget, and reconnects with exponential
//! backoff when the worker exits unexpectedly.

use crate::config::WorkerConfig;
use crate::core::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, Message, METHOD_INITIALIZE,
};
use crate::core::request_id::SharedRequestIdGenerator;
use crate::transport::events::TransportEvent;
use crate::transport::pending::PendingRequests;
use crate::utils::errors::{RelayError, RelayResult};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Transport lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Starting,
    Initialized,
    Reconnecting,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Stopped => write!(f, "stopped"),
            ConnectionState::Starting => write!(f, "starting"),
            ConnectionState::Initialized => write!(f, "initialized"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Delay before reconnection attempt `attempt` (1-based):
/// `base * multiplier^(attempt-1)`.
pub fn backoff_delay(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    base.mul_f64(multiplier.powi(attempt.saturating_sub(1) as i32))
}

/// Request/response messaging over an unreliable child process.
#[derive(Clone)]
pub struct WorkerTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: WorkerConfig,
    state: parking_lot::RwLock<ConnectionState>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingRequests,
    id_gen: SharedRequestIdGenerator,
    events: broadcast::Sender<TransportEvent>,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    /// Bumped on every spawn; a reader task whose generation is stale has
    /// been superseded and must not run exit handling.
    generation: AtomicU64,
}

impl WorkerTransport {
    pub fn new(config: WorkerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                config,
                state: parking_lot::RwLock::new(ConnectionState::Stopped),
                child: Mutex::new(None),
                stdin: Mutex::new(None),
                pending: PendingRequests::new(),
                id_gen: SharedRequestIdGenerator::new(),
                events,
                reconnecting: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state() == ConnectionState::Initialized
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Spawn the worker and run the initialize handshake. Spawn and
    /// handshake failures are fatal here and are not retried automatically.
    pub async fn start(&self) -> RelayResult<()> {
        match self.inner.state() {
            ConnectionState::Starting | ConnectionState::Initialized => {
                return Err(RelayError::Transport(
                    "transport already running".to_string(),
                ))
            }
            _ => {}
        }
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.inner.start_worker().await
    }

    /// Terminate the worker and reject anything still in flight. No-op when
    /// nothing is running; safe to call mid-reconnect.
    pub async fn stop(&self) -> RelayResult<()> {
        self.inner.set_state(ConnectionState::Stopped);
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        *self.inner.stdin.lock().await = None;

        let child = self.inner.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill worker process");
            }
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => info!(?status, "worker exited"),
                Ok(Err(e)) => error!(error = %e, "failed to wait for worker"),
                Err(_) => warn!("timeout waiting for worker to exit"),
            }
        }

        let rejected = self.inner.pending.abort_all(|| RelayError::Disconnected);
        if rejected > 0 {
            debug!(rejected, "rejected in-flight requests on stop");
        }
        Ok(())
    }

    /// Explicit restart, also the escape hatch once automatic reconnection
    /// is exhausted.
    pub async fn reconnect(&self) -> RelayResult<()> {
        self.stop().await?;
        self.start().await
    }

    /// Send a request with the configured retry budget.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> RelayResult<Value> {
        self.inner
            .request(method, params, self.inner.config.request_retries)
            .await
    }

    /// Send a request with an explicit retry budget.
    pub async fn send_request_with_retries(
        &self,
        method: &str,
        params: Option<Value>,
        retries: u32,
    ) -> RelayResult<Value> {
        self.inner.request(method, params, retries).await
    }

    /// Fire-and-forget notification; no response is correlated.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> RelayResult<()> {
        if !self.inner.is_attached().await {
            return Err(RelayError::Transport("transport not running".to_string()));
        }
        let json = serde_json::to_string(&Message::notification(method, params))?;
        self.inner
            .write_line(&json)
            .await
            .map_err(|e| RelayError::Transport(format!("failed to write notification: {}", e)))
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(from = %*state, to = %next, "transport state change");
            *state = next;
        }
    }

    fn is_exhausted(&self) -> bool {
        self.reconnect_attempts.load(Ordering::SeqCst) > self.config.max_reconnect_attempts
    }

    async fn is_attached(&self) -> bool {
        self.stdin.lock().await.is_some()
    }

    /// Boxed at the definition: the spawn path awaits `request`, which can
    /// await `ensure_connected`, which awaits a restart. Type erasure here
    /// keeps that cycle out of the opaque future types.
    fn start_worker<'a>(
        self: &'a Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = RelayResult<()>> + Send + 'a>> {
        Box::pin(self.start_worker_inner())
    }

    async fn start_worker_inner(self: &Arc<Self>) -> RelayResult<()> {
        self.set_state(ConnectionState::Starting);

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            self.set_state(ConnectionState::Disconnected);
            RelayError::Spawn(format!("{}: {}", self.config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Transport("failed to open worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Transport("failed to open worker stdout".to_string()))?;
        let stderr = child.stderr.take();

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(read_loop(self.clone(), stdout, generation));
        if let Some(stderr) = stderr {
            tokio::spawn(stderr_loop(stderr));
        }

        // Give a slow worker a moment to come up before the handshake.
        tokio::time::sleep(self.config.startup_grace).await;

        let params = InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: ClientCapabilities {
                resources: Some(true),
                tools: Some(false),
            },
            client_info: ClientInfo {
                name: self.config.client_name.clone(),
                version: self.config.client_version.clone(),
            },
        };
        let params = serde_json::to_value(params)?;

        match self.request(METHOD_INITIALIZE, Some(params), 0).await {
            Ok(_) => {
                self.set_state(ConnectionState::Initialized);
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                info!(command = %self.config.command, "worker initialized");
                Ok(())
            }
            Err(e) => {
                self.shutdown_child().await;
                self.set_state(ConnectionState::Disconnected);
                Err(RelayError::Handshake(e.to_string()))
            }
        }
    }

    async fn shutdown_child(&self) {
        *self.stdin.lock().await = None;
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        }
    }

    /// Explicit bounded retry loop; `retries` is the number of re-issues
    /// allowed after the first attempt.
    async fn request(
        self: &Arc<Self>,
        method: &str,
        params: Option<Value>,
        retries: u32,
    ) -> RelayResult<Value> {
        let timeout_ms = self.config.request_timeout.as_millis() as u64;
        let mut budget = retries;

        loop {
            if !self.is_attached().await {
                if budget == 0 {
                    return Err(RelayError::Transport("transport not running".to_string()));
                }
                budget -= 1;
                self.ensure_connected().await;
                continue;
            }

            let id = self.id_gen.next_id();
            let rx = self.pending.register(id.clone());
            let json = serde_json::to_string(&Message::request(id.clone(), method, params.clone()))?;

            debug!(method, id = %id, "sending request");
            if let Err(e) = self.write_line(&json).await {
                self.pending.abandon(&id);
                warn!(method, error = %e, "request write failed");
                if budget == 0 {
                    return Err(RelayError::Transport(format!(
                        "failed to write request '{}': {}",
                        method, e
                    )));
                }
                budget -= 1;
                continue;
            }

            match tokio::time::timeout(self.config.request_timeout, rx).await {
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(RelayError::Disconnected))) => {
                    // Worker died mid-request; the reconnection path decides
                    // whether a re-issue can still succeed.
                    if budget == 0 {
                        return Err(RelayError::Disconnected);
                    }
                    budget -= 1;
                }
                Ok(Ok(Err(e))) => return Err(e),
                Ok(Err(_)) => {
                    if budget == 0 {
                        return Err(RelayError::Transport(
                            "response channel closed".to_string(),
                        ));
                    }
                    budget -= 1;
                }
                Err(_) => {
                    self.pending.abandon(&id);
                    debug!(method, id = %id, "request timed out");
                    if budget == 0 {
                        return Err(RelayError::Timeout {
                            method: method.to_string(),
                            timeout_ms,
                        });
                    }
                    budget -= 1;
                }
            }
        }
    }

    async fn write_line(&self, json: &str) -> std::io::Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "worker stdin closed")
        })?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    /// Bring the worker back for a caller that found it detached. Joins an
    /// in-flight reconnection instead of racing it. A stopped or exhausted
    /// transport stays down; only an explicit `start`/`reconnect` revives it.
    async fn ensure_connected(self: &Arc<Self>) {
        if self.state() == ConnectionState::Stopped || self.is_exhausted() {
            return;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            while self.reconnecting.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            return;
        }

        if let Err(e) = self.start_worker().await {
            warn!(error = %e, "on-demand worker restart failed");
        }
        self.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Runs exactly once per disconnect: the exiting reader takes the child
    /// handle, and a missing handle means cleanup already happened.
    async fn handle_worker_exit(self: &Arc<Self>) {
        let child = self.child.lock().await.take();
        let Some(mut child) = child else { return };

        let status = match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => {
                let _ = child.start_kill();
                None
            }
        };
        let code = status.and_then(|s| s.code());

        *self.stdin.lock().await = None;
        self.set_state(ConnectionState::Disconnected);
        let rejected = self.pending.abort_all(|| RelayError::Disconnected);
        if rejected > 0 {
            warn!(rejected, ?code, "worker disconnected with requests in flight");
        } else {
            info!(?code, "worker disconnected");
        }
        let _ = self.events.send(TransportEvent::Disconnected { status: code });

        let crashed = code != Some(0);
        if crashed && !self.is_exhausted() && !self.reconnecting.swap(true, Ordering::SeqCst) {
            tokio::spawn(run_reconnect(self.clone()));
        }
    }
}

/// Consume worker stdout line by line. Tokio's buffered line reader carries
/// partial lines over between reads, so only complete JSON documents are
/// parsed, in arrival order.
async fn read_loop(inner: Arc<Inner>, stdout: ChildStdout, generation: u64) {
    let reader = BufReader::new(stdout);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(&line) {
            Ok(Message::SuccessResponse(response)) => {
                if !inner.pending.settle(&response.id, Ok(response.result)) {
                    debug!(id = %response.id, "dropping response with no pending request");
                }
            }
            Ok(Message::ErrorResponse(response)) => {
                let outcome = Err(RelayError::Rpc(response.error.message));
                if !inner.pending.settle(&response.id, outcome) {
                    debug!(id = %response.id, "dropping error response with no pending request");
                }
            }
            Ok(Message::Notification(notification)) => {
                let _ = inner.events.send(TransportEvent::Notification {
                    method: notification.method,
                    params: notification.params,
                });
            }
            Ok(Message::Request(request)) => {
                debug!(method = %request.method, "ignoring worker-initiated request");
            }
            Err(e) => {
                warn!(error = %e, line = %line, "discarding unparseable worker output");
            }
        }
    }

    // Stream ended: the worker exited or closed stdout. A stale generation
    // means a newer spawn already replaced this reader.
    if inner.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    if inner.state() == ConnectionState::Stopped {
        return;
    }
    inner.handle_worker_exit().await;
}

async fn stderr_loop(stderr: ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "worker stderr");
    }
}

async fn run_reconnect(inner: Arc<Inner>) {
    let max = inner.config.max_reconnect_attempts;

    loop {
        let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > max {
            inner.set_state(ConnectionState::Disconnected);
            warn!(max, "reconnection attempts exhausted; transport stays down");
            let _ = inner.events.send(TransportEvent::ReconnectExhausted);
            break;
        }

        inner.set_state(ConnectionState::Reconnecting);
        let delay = backoff_delay(
            inner.config.reconnect_base_delay,
            inner.config.backoff_multiplier,
            attempt,
        );
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting to worker");
        tokio::time::sleep(delay).await;

        if inner.state() == ConnectionState::Stopped {
            break;
        }

        match inner.start_worker().await {
            Ok(()) => {
                let _ = inner.events.send(TransportEvent::Reconnected);
                break;
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnection attempt failed");
            }
        }
    }

    inner.reconnecting.store(false, Ordering::SeqCst);
}
